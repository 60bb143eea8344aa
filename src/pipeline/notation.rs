//! Subject-gated subscript/superscript markup.
//!
//! Science and mathematics papers carry notation the model flattens to plain
//! text: `CO2` should render as CO₂ and `x^2` as x². This module restores
//! the markup with two single-pass substitutions, applied subscript-first —
//! the patterns never overlap in matched text, so the order only matters for
//! reproducible golden output, not correctness.
//!
//! The chemical-formula pattern is deliberately narrow (one uppercase letter,
//! at most one lowercase letter, then digits) and carries an exception list
//! for letter+digit tokens that are not chemistry at all: class-level codes
//! (`SS1`) and question-number artifacts (`Q7`, `NO2` as a list marker would
//! be ambiguous with nitrogen dioxide and is *not* excepted — the chemistry
//! reading wins there).

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// Subjects whose question/option text receives notation formatting.
/// Matched case-insensitively against the detected subject.
const NOTATION_SUBJECTS: &[&str] = &[
    "chemistry",
    "mathematics",
    "further mathematics",
    "physics",
    "biology",
];

/// Letter prefixes that, followed by digits, are never chemical formulas.
/// Additive: new artifact families get appended here, not special-cased in
/// the replacement logic.
const NON_CHEMICAL_PREFIXES: &[&str] = &["SS", "Q"];

static RE_SUBSCRIPT: Lazy<Regex> = Lazy::new(|| Regex::new(r"([A-Z][a-z]?)(\d+)").unwrap());
static RE_SUPERSCRIPT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\w)\^(\d+)").unwrap());

/// True when `subject` is in the notation-sensitive set.
pub fn is_notation_subject(subject: &str) -> bool {
    let s = subject.trim().to_lowercase();
    NOTATION_SUBJECTS.iter().any(|n| *n == s)
}

/// Apply subscript/superscript markup to `text` when the subject calls for it.
pub fn apply_notation(text: &str, subject: &str) -> String {
    if text.is_empty() || !is_notation_subject(subject) {
        return text.to_string();
    }
    let subbed = RE_SUBSCRIPT.replace_all(text, |caps: &Captures<'_>| {
        let start = caps
            .get(0)
            .map(|m| m.start())
            .unwrap_or_default();
        if is_non_chemical_token(text, start, &caps[1]) {
            caps[0].to_string()
        } else {
            format!("{}<sub>{}</sub>", &caps[1], &caps[2])
        }
    });
    RE_SUPERSCRIPT
        .replace_all(&subbed, "$1<sup>$2</sup>")
        .to_string()
}

/// Decide whether a letter+digit match is a known non-chemical token.
///
/// Two cases: the matched letters themselves are an excepted prefix (`Q7`),
/// or the match sits at the tail of an all-caps token that is (`SS1` — the
/// regex anchors on the second `S`, so we look one character back).
fn is_non_chemical_token(text: &str, match_start: usize, letters: &str) -> bool {
    let upper = letters.to_ascii_uppercase();
    if NON_CHEMICAL_PREFIXES.contains(&upper.as_str()) {
        return true;
    }
    // Walk back over any uppercase run preceding the match and test the
    // full letter token (handles SS1/SS2/SS3 where the regex anchors on the
    // second S, leaving the first outside the match).
    let head = &text[..match_start];
    let run_start = head
        .rfind(|c: char| !c.is_ascii_uppercase())
        .map(|i| i + head[i..].chars().next().map_or(1, char::len_utf8))
        .unwrap_or(0);
    if run_start < match_start {
        let token = format!("{}{}", &head[run_start..], letters);
        return NON_CHEMICAL_PREFIXES
            .iter()
            .any(|p| token.eq_ignore_ascii_case(p));
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chemistry_gets_subscripts() {
        assert_eq!(apply_notation("CO2 is a gas", "Chemistry"), "CO<sub>2</sub> is a gas");
        assert_eq!(apply_notation("H2O", "chemistry"), "H<sub>2</sub>O");
        assert_eq!(
            apply_notation("Na2SO4", "Chemistry"),
            "Na<sub>2</sub>SO<sub>4</sub>"
        );
    }

    #[test]
    fn exponents_get_superscripts() {
        assert_eq!(apply_notation("x^2 + y^10", "Mathematics"), "x<sup>2</sup> + y<sup>10</sup>");
    }

    #[test]
    fn non_notation_subject_passthrough() {
        assert_eq!(apply_notation("CO2 levels rose", "Economics"), "CO2 levels rose");
        assert_eq!(apply_notation("x^2", "English"), "x^2");
    }

    #[test]
    fn biology_is_notation_sensitive() {
        assert!(is_notation_subject("Biology"));
        assert!(is_notation_subject("further mathematics"));
        assert!(!is_notation_subject("Literature"));
    }

    #[test]
    fn class_codes_pass_through() {
        assert_eq!(apply_notation("for SS2 students", "Chemistry"), "for SS2 students");
    }

    #[test]
    fn question_artifacts_pass_through() {
        assert_eq!(apply_notation("see Q7 above", "Physics"), "see Q7 above");
    }

    #[test]
    fn mixed_text() {
        assert_eq!(
            apply_notation("In SS3, CO2 and x^3 appear", "Chemistry"),
            "In SS3, CO<sub>2</sub> and x<sup>3</sup> appear"
        );
    }

    #[test]
    fn empty_text_passthrough() {
        assert_eq!(apply_notation("", "Chemistry"), "");
    }
}
