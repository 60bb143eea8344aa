//! JSON Repair Engine: turn "almost JSON" model output into a parsed value.
//!
//! ## Why is repair necessary?
//!
//! Even well-prompted models frequently emit output that is *semantically*
//! the requested document but *syntactically* invalid JSON:
//!
//! - wrapped in ` ```json ... ``` ` fences despite the prompt saying not to
//! - leading commentary ("Here is the JSON:") before the first brace
//! - trailing commas, unquoted object keys, doubled commas
//! - curly quotes copied from the source document
//! - strings truncated mid-value when the completion hit its token limit
//!
//! ## Stage order
//!
//! The stages run conservative-to-aggressive and short-circuit on the first
//! successful parse, so well-formed output returns at the direct-parse stage
//! with zero risk of a later transform corrupting it:
//!
//! 1. basic clean (fences, control characters, curly quotes, `\`-newline)
//! 2. block extraction (first `{` to last `}`)
//! 3. direct parse — short-circuit on success
//! 4. structural pass (duplicate commas, trailing commas, unquoted keys)
//! 5. numeric-safety pass (quote long bare digit runs that lost their
//!    opening quote; close a dangling string)
//! 6. terminal failure — dump the original raw text and give up
//!
//! The stage-4/5 transforms are written as string-aware scanners, not blind
//! regexes: they track quote state and only rewrite tokens *outside* string
//! literals. This makes them guaranteed no-ops on conformant JSON — a
//! required property, since `{"a": "x, b: y"}` must never be rewritten even
//! if these passes were applied to it.
//!
//! Parse errors are not retried here; retrying belongs to the caller at the
//! level of re-invoking the model. The only outputs are "parsed value" or
//! "unrecoverable, with dumped artefact".

use crate::dump::DumpSink;
use crate::error::ConvertError;
use crate::output::RepairStage;
use serde_json::Value;
use tracing::{debug, warn};

/// Run the full repair pipeline over raw model output.
///
/// On success returns the parsed value plus the stage that produced it
/// (useful for observability: a batch where everything lands in
/// [`RepairStage::NumericFallback`] points at a prompt regression).
///
/// On terminal failure the original `raw` text — not any intermediate
/// candidate — is dumped to `sink` keyed by `identity`, and
/// [`ConvertError::UnrecoverableOutput`] carries the final parse error.
pub fn repair(
    raw: &str,
    identity: &str,
    sink: &dyn DumpSink,
) -> Result<(Value, RepairStage), ConvertError> {
    // Stages 1–2: always applied; cheap and content-preserving for any
    // input that parses afterwards.
    let cleaned = basic_clean(raw);
    let block = extract_json_block(&cleaned);

    // Stage 3: direct parse.
    match serde_json::from_str::<Value>(block) {
        Ok(v) => {
            debug!("'{identity}': parsed directly");
            return Ok((v, RepairStage::Direct));
        }
        Err(e) => debug!("'{identity}': direct parse failed: {e}"),
    }

    // Stage 4: structural repairs.
    let structural = quote_unquoted_keys(&fix_trailing_commas(&collapse_duplicate_commas(block)));
    match serde_json::from_str::<Value>(&structural) {
        Ok(v) => {
            debug!("'{identity}': parsed after structural repair");
            return Ok((v, RepairStage::Structural));
        }
        Err(e) => debug!("'{identity}': structural repair insufficient: {e}"),
    }

    // Stage 5: numeric-safety fallback.
    let fallback = close_dangling_quote(&quote_orphan_numbers(&structural));
    match serde_json::from_str::<Value>(&fallback) {
        Ok(v) => {
            debug!("'{identity}': parsed after numeric-safety fallback");
            Ok((v, RepairStage::NumericFallback))
        }
        Err(e) => {
            // Stage 6: terminal failure. Preserve the raw text verbatim.
            warn!("'{identity}': all repair stages failed: {e}");
            sink.dump(identity, raw);
            Err(ConvertError::UnrecoverableOutput {
                identity: identity.to_string(),
                parse_error: e.to_string(),
            })
        }
    }
}

// ── Stage 1: basic clean ─────────────────────────────────────────────────────

/// Strip fences and characters that break the tokenizer.
///
/// Order matters: backslash-newline must collapse before control characters
/// are dropped, otherwise the newline disappears and a stray `\` is left
/// behind inside a string literal.
pub(crate) fn basic_clean(text: &str) -> String {
    let s = text.replace("```json", "").replace("```", "");
    let s = s.replace("\\\n", "");
    let s: String = s
        .chars()
        .filter(|&c| !matches!(c as u32, 0x00..=0x1F | 0x7F))
        .collect();
    s.replace(['\u{201C}', '\u{201D}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'")
}

// ── Stage 2: block extraction ────────────────────────────────────────────────

/// Slice to the first `{` .. last `}` span, dropping surrounding commentary.
///
/// A brace-less input is returned whole: it will predictably fail every
/// parse attempt and surface as a terminal failure, which is the intended
/// outcome for an empty or refusal response.
pub(crate) fn extract_json_block(text: &str) -> &str {
    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if start < end => &text[start..=end],
        _ => text,
    }
}

// ── String-aware scanning helper ─────────────────────────────────────────────

/// Tracks whether the scanner is inside a JSON string literal.
struct QuoteState {
    in_string: bool,
    escaped: bool,
}

impl QuoteState {
    fn new() -> Self {
        Self {
            in_string: false,
            escaped: false,
        }
    }

    /// Advance over one character, returning whether it was *inside* a
    /// string (the opening/closing quotes themselves count as inside).
    fn step(&mut self, c: char) -> bool {
        if self.in_string {
            if self.escaped {
                self.escaped = false;
            } else if c == '\\' {
                self.escaped = true;
            } else if c == '"' {
                self.in_string = false;
            }
            true
        } else if c == '"' {
            self.in_string = true;
            true
        } else {
            false
        }
    }
}

// ── Stage 4 transforms ───────────────────────────────────────────────────────

/// Collapse runs of commas outside strings (`, ,` → `,`).
pub(crate) fn collapse_duplicate_commas(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut state = QuoteState::new();
    let mut last_significant = '\0';

    for c in text.chars() {
        let in_string = state.step(c);
        if !in_string && c == ',' && last_significant == ',' {
            continue;
        }
        if in_string || !c.is_whitespace() {
            last_significant = c;
        }
        out.push(c);
    }
    out
}

/// Remove a comma whose next significant character (outside strings) is a
/// closing brace or bracket.
pub(crate) fn fix_trailing_commas(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut state = QuoteState::new();

    for (i, &c) in chars.iter().enumerate() {
        let in_string = state.step(c);
        if !in_string && c == ',' {
            let next = chars[i + 1..].iter().find(|ch| !ch.is_whitespace());
            if matches!(next, Some('}') | Some(']')) {
                continue;
            }
        }
        out.push(c);
    }
    out
}

/// Wrap bare identifiers in key position (`{key:` / `, key:`) in quotes.
///
/// Only fires outside strings, only directly after `{` or `,`, and only
/// when the identifier's next significant character is `:` — so `true`,
/// `false`, `null`, and bare numbers in value position pass through.
pub(crate) fn quote_unquoted_keys(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len() + 16);
    let mut state = QuoteState::new();
    let mut last_significant = '\0';
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        // Peek: is this the start of a bare identifier in key position?
        if !state.in_string
            && (c.is_ascii_alphanumeric() || c == '_')
            && matches!(last_significant, '{' | ',')
        {
            let mut j = i;
            while j < chars.len() && (chars[j].is_ascii_alphanumeric() || chars[j] == '_') {
                j += 1;
            }
            let next = chars[j..].iter().find(|ch| !ch.is_whitespace());
            if next == Some(&':') {
                out.push('"');
                out.extend(&chars[i..j]);
                out.push('"');
                last_significant = '"';
                i = j;
                continue;
            }
        }

        let in_string = state.step(c);
        if in_string || !c.is_whitespace() {
            last_significant = c;
        }
        out.push(c);
        i += 1;
    }
    out
}

// ── Stage 5 transforms ───────────────────────────────────────────────────────

/// Re-open quoting for a long digit run that lost its opening quote.
///
/// Targets the truncation pattern `"year": 2023"` where the value's opening
/// quote went missing: a bare run of 4+ digits outside any string whose next
/// significant character is a double quote gets the quote moved in front of
/// it. A number followed by `"` is never valid JSON, so this cannot fire on
/// conformant input. Runs shorter than 4 digits are left alone — they are
/// far more likely legitimate numbers than truncated text.
pub(crate) fn quote_orphan_numbers(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len() + 8);
    let mut state = QuoteState::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if !state.in_string && c.is_ascii_digit() {
            let mut j = i;
            while j < chars.len() && chars[j].is_ascii_digit() {
                j += 1;
            }
            let run_len = j - i;
            // Skip whitespace after the run, looking for the stray quote.
            let mut k = j;
            while k < chars.len() && chars[k].is_whitespace() {
                k += 1;
            }
            if run_len >= 4 && k < chars.len() && chars[k] == '"' {
                out.push('"');
                out.extend(&chars[i..j]);
                out.push('"');
                i = k + 1; // consume the stray closing quote
                continue;
            }
            out.extend(&chars[i..j]);
            i = j;
            continue;
        }
        state.step(c);
        out.push(c);
        i += 1;
    }
    out
}

/// Close a string left dangling at the end of the document.
///
/// If the count of unescaped double quotes is odd, one string never closed
/// (typically the completion hit its token limit mid-value). Insert the
/// missing quote immediately before the final `}` / `]`, or append it if no
/// closer exists. Valid JSON always has an even unescaped-quote count, so
/// this is a no-op on conformant input.
pub(crate) fn close_dangling_quote(text: &str) -> String {
    let mut count = 0usize;
    let mut escaped = false;
    let mut in_string = false;
    for c in text.chars() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
                count += 1;
            }
        } else if c == '"' {
            in_string = true;
            count += 1;
        }
    }
    if count % 2 == 0 {
        return text.to_string();
    }

    let insert_at = text
        .rfind(|c| c == '}' || c == ']')
        .unwrap_or(text.len());
    let mut out = String::with_capacity(text.len() + 1);
    out.push_str(&text[..insert_at]);
    out.push('"');
    out.push_str(&text[insert_at..]);
    out
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dump::MemoryDumpSink;

    fn repair_ok(raw: &str) -> (Value, RepairStage) {
        let sink = MemoryDumpSink::new();
        repair(raw, "test", &sink).expect("should repair")
    }

    // ── Stage 1/2 ────────────────────────────────────────────────────────

    #[test]
    fn basic_clean_strips_fences_and_control_chars() {
        let input = "```json\n{\"a\": 1}\n```";
        let cleaned = basic_clean(input);
        assert!(!cleaned.contains("```"));
        assert!(cleaned.contains("{\"a\": 1}"));

        let with_ctrl = "{\"a\":\x01 \"b\x7f\"}";
        assert_eq!(basic_clean(with_ctrl), "{\"a\": \"b\"}");
    }

    #[test]
    fn basic_clean_normalizes_curly_quotes() {
        let input = "{\u{201C}key\u{201D}: \u{2018}v\u{2019}}";
        assert_eq!(basic_clean(input), "{\"key\": 'v'}");
    }

    #[test]
    fn basic_clean_collapses_backslash_newline() {
        let input = "{\"a\": \"line one \\\nline two\"}";
        assert_eq!(basic_clean(input), "{\"a\": \"line one line two\"}");
    }

    #[test]
    fn extract_block_drops_commentary() {
        let input = "Here is the JSON:\n{\"a\": 1}\nHope that helps!";
        assert_eq!(extract_json_block(input), "{\"a\": 1}");
    }

    #[test]
    fn extract_block_braceless_passthrough() {
        assert_eq!(extract_json_block("no json here"), "no json here");
    }

    #[test]
    fn extract_block_reversed_braces_passthrough() {
        // A '}' before the only '{' is not a usable span.
        assert_eq!(extract_json_block("} oops {"), "} oops {");
    }

    // ── Stage 4 transforms ───────────────────────────────────────────────

    #[test]
    fn trailing_commas_removed() {
        assert_eq!(fix_trailing_commas("[1, 2, ]"), "[1, 2 ]");
        assert_eq!(fix_trailing_commas("{\"a\": 1,}"), "{\"a\": 1}");
    }

    #[test]
    fn trailing_comma_inside_string_untouched() {
        let valid = "{\"a\": \"x, }\"}";
        assert_eq!(fix_trailing_commas(valid), valid);
    }

    #[test]
    fn duplicate_commas_collapsed() {
        assert_eq!(collapse_duplicate_commas("[1,,2,, 3]"), "[1,2, 3]");
        let valid = "{\"a\": \"x,, y\"}";
        assert_eq!(collapse_duplicate_commas(valid), valid);
    }

    #[test]
    fn unquoted_keys_get_quoted() {
        assert_eq!(
            quote_unquoted_keys("{subject: \"Chemistry\", id: 1}"),
            "{\"subject\": \"Chemistry\", \"id\": 1}"
        );
    }

    #[test]
    fn key_like_text_inside_strings_untouched() {
        // The reason these passes are scanners, not regexes.
        let valid = "{\"instruction\": \"Use the map, answer: questions 1-3\"}";
        assert_eq!(quote_unquoted_keys(valid), valid);
    }

    #[test]
    fn bare_literals_in_value_position_untouched() {
        let valid = "{\"a\": true, \"b\": null, \"c\": [1, 2]}";
        assert_eq!(quote_unquoted_keys(valid), valid);
    }

    // ── Stage 5 transforms ───────────────────────────────────────────────

    #[test]
    fn orphan_number_requoted() {
        assert_eq!(
            quote_orphan_numbers("{\"year\": 2023\"}"),
            "{\"year\": \"2023\"}"
        );
    }

    #[test]
    fn short_and_legitimate_numbers_untouched() {
        let valid = "{\"id\": 42, \"year\": 2023}";
        assert_eq!(quote_orphan_numbers(valid), valid);
    }

    #[test]
    fn dangling_quote_closed_before_brace() {
        assert_eq!(
            close_dangling_quote("{\"a\": \"truncated}"),
            "{\"a\": \"truncated\"}"
        );
    }

    #[test]
    fn balanced_quotes_untouched() {
        let valid = "{\"a\": \"done\"}";
        assert_eq!(close_dangling_quote(valid), valid);
        let escaped = "{\"a\": \"he said \\\"hi\\\"\"}";
        assert_eq!(close_dangling_quote(escaped), escaped);
    }

    // ── Idempotence on conformant input (required property) ─────────────

    #[test]
    fn stage4_and_5_are_noops_on_valid_json() {
        let samples = [
            "{\"a\": 1}",
            "{\"subject\": \"Chemistry\", \"questions\": [{\"id\": 1, \"options\": [\"A. x\", \"B. y\"]}]}",
            "{\"text\": \"commas, inside, strings: fine, }\", \"n\": 12345}",
            "[true, false, null, 2023]",
        ];
        for s in samples {
            let once = close_dangling_quote(&quote_orphan_numbers(&quote_unquoted_keys(
                &fix_trailing_commas(&collapse_duplicate_commas(s)),
            )));
            assert_eq!(once, s, "transforms must not alter valid JSON: {s}");
        }
    }

    #[test]
    fn valid_json_parses_at_direct_stage() {
        let (v, stage) = repair_ok("{\"subject\": \"Physics\", \"questions\": []}");
        assert_eq!(stage, RepairStage::Direct);
        assert_eq!(v["subject"], "Physics");
    }

    // ── Full pipeline scenarios ──────────────────────────────────────────

    #[test]
    fn fenced_output_with_commentary_parses_directly() {
        let raw = "Sure! Here you go:\n```json\n{\"a\": 1}\n```\nLet me know.";
        let (v, stage) = repair_ok(raw);
        assert_eq!(stage, RepairStage::Direct);
        assert_eq!(v["a"], 1);
    }

    #[test]
    fn unquoted_keys_and_trailing_comma_parse_at_structural() {
        let raw = "{subject: \"Chemistry\", questions: [{id: 1, options: [\"A. x\",]}]}";
        let (v, stage) = repair_ok(raw);
        assert_eq!(stage, RepairStage::Structural);
        assert_eq!(v["subject"], "Chemistry");
        assert_eq!(v["questions"][0]["id"], 1);
    }

    #[test]
    fn truncated_string_parses_at_fallback() {
        let raw = "{\"subject\": \"History\", \"note\": \"cut off here}";
        let (v, stage) = repair_ok(raw);
        assert_eq!(stage, RepairStage::NumericFallback);
        assert_eq!(v["note"], "cut off here");
    }

    #[test]
    fn refusal_text_is_unrecoverable_and_dumped_verbatim() {
        let sink = MemoryDumpSink::new();
        let raw = "Sorry, I cannot comply.";
        let err = repair(raw, "civic_ss1.txt", &sink).unwrap_err();
        match err {
            ConvertError::UnrecoverableOutput { identity, .. } => {
                assert_eq!(identity, "civic_ss1.txt");
            }
            other => panic!("expected UnrecoverableOutput, got {other:?}"),
        }
        let entries = sink.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].1, raw, "raw text must be dumped verbatim");
    }

    #[test]
    fn adversarial_inputs_terminate() {
        let sink = MemoryDumpSink::new();
        for raw in ["{{{{{{", "}}}}}", "{[}{]}", "", "{\"a\": [[[["] {
            // Must return (either way) without looping.
            let _ = repair(raw, "adversarial", &sink);
        }
    }

    #[test]
    fn fenced_unquoted_exam_output_parses_at_structural() {
        let raw = "Here is the JSON:\n```json\n{subject: \"Chemistry\", questions: [{id:1, question:\"CO2 is?\", options:[\"A. acid\",\"B. base\",\"C. salt\",\"D. gas\",], correctOption:\"D\"}]}\n```";
        let (v, stage) = repair_ok(raw);
        assert_eq!(stage, RepairStage::Structural);
        assert_eq!(v["questions"][0]["correctOption"], "D");
        assert_eq!(v["questions"][0]["options"].as_array().unwrap().len(), 4);
    }
}
