//! Extraction prompts and grouping-mode selection.
//!
//! Centralising every prompt here serves two purposes:
//!
//! 1. **Single source of truth** — tightening the schema instructions or the
//!    grouping rules requires editing exactly one place.
//!
//! 2. **Testability** — unit tests can inspect the built prompt directly
//!    without a live model call.
//!
//! The prompt differs only in its grouping instructions: flat mode demands a
//! single group spanning every question, sectioned mode demands one group per
//! shared-context section. Everything downstream (repair, normalization) is
//! mode-agnostic and must cope with output from either.

use once_cell::sync::Lazy;
use regex::Regex;

/// How the model is told to group questions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptMode {
    /// One group spanning all questions. For papers with no passages.
    Flat,
    /// Section-aware grouping: passages, shared instructions, diagrams.
    Sectioned,
}

/// Subjects that never carry passages; always flat regardless of text.
const KNOWN_FLAT_SUBJECTS: &[&str] = &[
    "accounting",
    "mathematics",
    "further mathematics",
    "economics",
];

/// Section headers like "SECTION A", "PART II", "Section 1:".
static RE_SECTION_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)^\s*(?:SECTION|PART)\s+[A-Z0-9IVX]+\b").unwrap()
});

/// Pick the grouping mode from the detected subject and the raw exam text.
///
/// Deterministic and pure. Known-flat subjects short-circuit; otherwise any
/// sectioning signal in the text forces sectioned mode.
pub fn select_mode(subject: &str, full_text: &str) -> PromptMode {
    let subject_lower = subject.trim().to_lowercase();
    if KNOWN_FLAT_SUBJECTS.iter().any(|s| *s == subject_lower) {
        return PromptMode::Flat;
    }

    let text_lower = full_text.to_lowercase();
    let has_use_answer_phrasing =
        text_lower.contains("use the") && text_lower.contains("answer");
    if RE_SECTION_MARKER.is_match(full_text)
        || has_use_answer_phrasing
        || text_lower.contains("passage")
    {
        return PromptMode::Sectioned;
    }
    PromptMode::Flat
}

const SCHEMA_BLOCK: &str = r#"{
  "subject": string,
  "class_category": "SS1" | "SS2" | "SS3" | "GENERAL",
  "groups": [
    {"start_id": int, "end_id": int, "instruction": string,
     "passage": string, "diagram": string or null, "question_ids": [int]}
  ],
  "questions": [
    {"id": int, "question": string,
     "options": [string, string, string, string],
     "correctOption": "A" | "B" | "C" | "D"}
  ]
}"#;

const FLAT_INSTRUCTIONS: &str = r#"GROUPING
   - Produce exactly ONE group spanning every question
   - Its instruction is "Answer all questions." and its passage is empty"#;

const SECTIONED_INSTRUCTIONS: &str = r#"GROUPING
   - Produce one group per section of the paper
   - A section is a run of questions sharing an instruction, a passage, or a diagram
   - Copy shared passages into the group's "passage" field verbatim
   - Reference a diagram by the order it appears in the source: "1" for the first, "2" for the second
   - question_ids must list every question id the group covers"#;

/// Build the full extraction prompt for one document.
pub fn build_prompt(
    subject: &str,
    mode: PromptMode,
    expected_count: Option<usize>,
    exam_text: &str,
) -> String {
    let grouping = match mode {
        PromptMode::Flat => FLAT_INSTRUCTIONS,
        PromptMode::Sectioned => SECTIONED_INSTRUCTIONS,
    };
    let count_line = match expected_count {
        Some(n) => format!("The paper contains exactly {n} questions; extract all of them."),
        None => "Extract every question in the paper.".to_string(),
    };

    format!(
        r#"You are an expert exam digitizer. Extract every multiple-choice question from the {subject} exam text below into JSON.

Follow these rules precisely:

1. OUTPUT SHAPE
   Return a single JSON object matching this schema exactly:
{SCHEMA_BLOCK}

2. QUESTIONS
   - {count_line}
   - Number questions sequentially from 1 in source order
   - Each question has exactly four options, prefixed "A. " through "D. "
   - correctOption is the single letter of the correct answer

3. {grouping}

4. OUTPUT FORMAT
   - Output ONLY the JSON object
   - Do NOT wrap it in markdown fences
   - Do NOT add commentary before or after

EXAM TEXT:
"""
{exam_text}
""""#
    )
}
