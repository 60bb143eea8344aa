//! Subject and class detection from source file names.
//!
//! Source documents arrive as files named by hand (`further_maths_ss2.txt`,
//! `Chemistry-SS1.txt`), so detection is fuzzy substring matching. The rules
//! live in ordered tables evaluated first-match-wins; adding a subject means
//! appending a row, not touching the logic. Order matters where one pattern
//! contains another: "further math" must precede "math".

use crate::schema::ClassCategory;

/// Ordered (pattern, canonical subject) rules, matched against the
/// lowercased file name. First match wins.
const SUBJECT_RULES: &[(&str, &str)] = &[
    ("further math", "Further Mathematics"),
    ("further_math", "Further Mathematics"),
    ("furthermath", "Further Mathematics"),
    ("math", "Mathematics"),
    ("chem", "Chemistry"),
    ("physic", "Physics"),
    ("biolog", "Biology"),
    ("literature", "Literature in English"),
    ("english", "English Language"),
    ("account", "Accounting"),
    ("computer", "Computer Studies"),
    ("government", "Government"),
    ("civic", "Civic Education"),
    ("econ", "Economics"),
];

/// Fallback when no rule matches.
const DEFAULT_SUBJECT: &str = "General";

/// Detect the canonical subject from a source file name.
pub fn detect_subject(file_name: &str) -> &'static str {
    let lower = file_name.to_lowercase();
    SUBJECT_RULES
        .iter()
        .find(|(pattern, _)| lower.contains(pattern))
        .map(|(_, subject)| *subject)
        .unwrap_or(DEFAULT_SUBJECT)
}

/// Detect the class level from a source file name. Unmarked files fall into
/// the GENERAL bucket.
pub fn detect_class(file_name: &str) -> ClassCategory {
    let lower = file_name.to_lowercase();
    if lower.contains("ss1") {
        ClassCategory::SS1
    } else if lower.contains("ss2") {
        ClassCategory::SS2
    } else if lower.contains("ss3") {
        ClassCategory::SS3
    } else {
        ClassCategory::General
    }
}

/// Persistence/diagram-folder form of a subject name: lowercase with
/// underscores for spaces.
pub fn subject_slug(subject: &str) -> String {
    subject.trim().to_lowercase().replace(' ', "_")
}
