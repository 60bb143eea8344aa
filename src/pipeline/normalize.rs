//! Schema Normalizer: force a loosely-parsed value into the exam schema.
//!
//! The repair engine guarantees only that its output *parsed*. Fields may be
//! missing, mistyped, duplicated, or mislabelled; option lists may be short,
//! long, or carry the wrong letters; groups may be absent entirely. This
//! module repairs all of that in place and never fails — with one exception:
//! a `questions` field that is present but not an array cannot be salvaged
//! and raises [`ConvertError::InvalidSchema`].
//!
//! Every fidelity loss is recorded as a [`ConversionWarning`] rather than
//! silently absorbed, so a batch run can report how much it had to invent.
//!
//! ## Invariants established here
//!
//! * question ids are positive, unique within the document, and sorted
//!   ascending (positional 1-based assignment when absent or invalid;
//!   duplicates reassigned with a warning)
//! * exactly four options per question, labelled `A.`–`D.` purely by
//!   position — the model's own letters are stripped and ignored
//! * `correct_option` is a real [`AnswerLetter`]; unrecognizable answers
//!   fall back to the configured letter *and* warn
//! * at least one group exists whenever questions do; groups are sorted by
//!   `start_id` with `question_ids`/bounds mutually backfilled

use crate::error::{ConvertError, ConversionWarning};
use crate::pipeline::notation::apply_notation;
use crate::schema::{AnswerLetter, ClassCategory, ExamDocument, Group, Question};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::collections::HashSet;
use tracing::{debug, warn};

/// Placeholder text for options the model failed to produce.
const PLACEHOLDER_OPTION: &str = "---";

/// Instruction used for the synthesized all-questions group.
const DEFAULT_INSTRUCTION: &str = "Answer all questions.";

/// Leading option-label pattern: a single A–D letter that is bracketed
/// (`(b)`, `[C]`) or followed by punctuation (`A.`, `d)`, `B -`). A bare
/// capital with no punctuation is left alone so "Acid" keeps its A.
static RE_OPTION_LABEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?:[\(\[]\s*[A-Da-d]\s*[\)\]]|[A-Da-d]\s*[\.\):;\-])[\.\):;\-\s]*").unwrap()
});

/// Normalize a parsed document into a schema-conformant [`ExamDocument`].
///
/// `expected_count` enables count enforcement: over-extraction is truncated
/// to the first N by id order, under-extraction is kept and warned.
/// `fallback_answer` is substituted (and warned about) whenever the model's
/// answer cannot be canonicalized.
pub fn normalize(
    doc: Value,
    subject: &str,
    class_category: ClassCategory,
    expected_count: Option<usize>,
    fallback_answer: AnswerLetter,
    identity: &str,
) -> Result<(ExamDocument, Vec<ConversionWarning>), ConvertError> {
    let mut warnings = Vec::new();

    let raw_questions = match doc.get("questions") {
        None | Some(Value::Null) => {
            warnings.push(ConversionWarning::QuestionsMissing);
            Vec::new()
        }
        Some(Value::Array(items)) => items.clone(),
        Some(other) => {
            return Err(ConvertError::InvalidSchema {
                identity: identity.to_string(),
                detail: format!(
                    "'questions' must be an array, got {}",
                    type_name(other)
                ),
            });
        }
    };

    let mut questions = normalize_questions(raw_questions, subject, fallback_answer, &mut warnings);

    // Count enforcement after sorting: truncation keeps the *first* N ids.
    if let Some(expected) = expected_count {
        if questions.len() != expected {
            warnings.push(ConversionWarning::CountMismatch {
                expected,
                actual: questions.len(),
            });
            warn!(
                "'{identity}': expected {expected} questions, got {}",
                questions.len()
            );
            if questions.len() > expected {
                questions.truncate(expected);
            }
        }
    }

    let groups = normalize_groups(doc.get("groups"), &questions);

    Ok((
        ExamDocument {
            subject: subject.to_string(),
            class_category,
            groups,
            questions,
        },
        warnings,
    ))
}

// ── Question normalization ───────────────────────────────────────────────────

fn normalize_questions(
    raw: Vec<Value>,
    subject: &str,
    fallback_answer: AnswerLetter,
    warnings: &mut Vec<ConversionWarning>,
) -> Vec<Question> {
    let mut questions: Vec<Question> = raw
        .into_iter()
        .enumerate()
        .map(|(i, q)| normalize_question(q, i, subject, fallback_answer, warnings))
        .collect();

    // A repeated id is as invalid as a missing one: the first occurrence
    // keeps it, later ones fall back to positional assignment (bumped past
    // any id already taken).
    let mut seen = HashSet::new();
    for (index, question) in questions.iter_mut().enumerate() {
        if seen.insert(question.id) {
            continue;
        }
        let mut id = index as u32 + 1;
        while seen.contains(&id) {
            id += 1;
        }
        warnings.push(ConversionWarning::DuplicateId {
            question_id: question.id,
            reassigned: id,
        });
        question.id = id;
        seen.insert(id);
    }

    questions.sort_by_key(|q| q.id);
    questions
}

fn normalize_question(
    value: Value,
    index: usize,
    subject: &str,
    fallback_answer: AnswerLetter,
    warnings: &mut Vec<ConversionWarning>,
) -> Question {
    // Positional 1-based id when the field is missing or not a positive int.
    let id = value
        .get("id")
        .and_then(Value::as_u64)
        .filter(|&n| n > 0 && n <= u64::from(u32::MAX))
        .map(|n| n as u32)
        .unwrap_or(index as u32 + 1);

    let text = value
        .get("question")
        .map(coerce_string)
        .unwrap_or_default();
    let text = apply_notation(&text, subject);

    let raw_options: Vec<Value> = match value.get("options") {
        Some(Value::Array(items)) => items.clone(),
        _ => Vec::new(),
    };
    let found = raw_options.len();
    if found != 4 {
        warnings.push(ConversionWarning::OptionsAdjusted {
            question_id: id,
            found,
        });
    }
    let options = normalize_options(raw_options, subject);

    let correct_option = resolve_answer(&value).unwrap_or_else(|| {
        warnings.push(ConversionWarning::AnswerDefaulted {
            question_id: id,
            fallback: fallback_answer.to_string(),
        });
        fallback_answer
    });

    // Raw diagram keys survive to the attacher, which resolves or clears them.
    let diagram = value
        .get("diagram")
        .filter(|v| !v.is_null())
        .map(coerce_string)
        .filter(|s| !s.is_empty());

    Question {
        id,
        question: text,
        options,
        correct_option,
        diagram,
    }
}

/// Strip source labels, apply notation, re-label by position, pad/truncate
/// to exactly four.
fn normalize_options(raw: Vec<Value>, subject: &str) -> Vec<String> {
    let mut options: Vec<String> = raw
        .into_iter()
        .take(4)
        .enumerate()
        .map(|(i, opt)| {
            let s = coerce_string(&opt);
            let stripped = RE_OPTION_LABEL.replace(&s, "");
            let formatted = apply_notation(stripped.trim(), subject);
            format!("{}. {}", AnswerLetter::from_index(i), formatted)
        })
        .collect();

    while options.len() < 4 {
        let letter = AnswerLetter::from_index(options.len());
        options.push(format!("{letter}. {PLACEHOLDER_OPTION}"));
    }
    options
}

/// Canonicalize the answer letter, checking the known key spellings in
/// priority order.
fn resolve_answer(value: &Value) -> Option<AnswerLetter> {
    for key in ["correctOption", "correct_option", "answer"] {
        if let Some(v) = value.get(key) {
            if let Some(letter) = AnswerLetter::parse_loose(&coerce_string(v)) {
                return Some(letter);
            }
        }
    }
    None
}

/// Loose string coercion: non-string scalars become their JSON text rather
/// than being rejected.
fn coerce_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

// ── Group normalization ──────────────────────────────────────────────────────

fn normalize_groups(raw: Option<&Value>, questions: &[Question]) -> Vec<Group> {
    // Only object entries carry group fields; scalars and arrays here are
    // model noise and must not fabricate groups.
    let raw_groups: Vec<&Value> = match raw {
        Some(Value::Array(items)) => items
            .iter()
            .filter(|v| {
                if v.is_object() {
                    true
                } else {
                    debug!("ignoring non-object group entry: {v}");
                    false
                }
            })
            .collect(),
        _ => Vec::new(),
    };

    if raw_groups.is_empty() {
        // Synthesize exactly one group spanning all questions.
        if questions.is_empty() {
            return Vec::new();
        }
        let start_id = questions.first().map(|q| q.id).unwrap_or(1);
        let end_id = questions.last().map(|q| q.id).unwrap_or(start_id);
        return vec![Group {
            start_id,
            end_id,
            instruction: DEFAULT_INSTRUCTION.to_string(),
            passage: String::new(),
            diagram: None,
            question_ids: questions.iter().map(|q| q.id).collect(),
        }];
    }

    let mut groups: Vec<Group> = raw_groups.into_iter().map(normalize_group).collect();
    groups.sort_by_key(|g| g.start_id);
    groups
}

fn normalize_group(value: &Value) -> Group {
    let as_id = |v: Option<&Value>| v.and_then(Value::as_u64).map(|n| n as u32);

    let mut question_ids: Vec<u32> = match value.get("question_ids") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_u64)
            .map(|n| n as u32)
            .collect(),
        _ => Vec::new(),
    };
    question_ids.sort_unstable();
    question_ids.dedup();

    // Bounds and id list mutually backfill each other.
    let start_id = as_id(value.get("start_id"))
        .or_else(|| question_ids.first().copied())
        .unwrap_or(1);
    let end_id = as_id(value.get("end_id"))
        .or_else(|| question_ids.last().copied())
        .unwrap_or(start_id)
        .max(start_id);
    if question_ids.is_empty() {
        question_ids = (start_id..=end_id).collect();
    }

    let text_field = |key: &str| {
        value
            .get(key)
            .filter(|v| !v.is_null())
            .map(coerce_string)
            .unwrap_or_default()
    };

    // The diagram key stays raw here; the attacher resolves it to a path or
    // clears it.
    let diagram = value
        .get("diagram")
        .filter(|v| !v.is_null())
        .map(coerce_string)
        .filter(|s| !s.is_empty());

    Group {
        start_id,
        end_id,
        instruction: text_field("instruction"),
        passage: text_field("passage"),
        diagram,
        question_ids,
    }
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
