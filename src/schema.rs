//! The target exam schema: the types every conversion must produce.
//!
//! These types are the *contract* of the repair → normalize pipeline. The
//! repair engine hands over an untyped `serde_json::Value` with no guaranteed
//! shape; the normalizer's job is to force that value into these structs, and
//! once constructed they carry their invariants by type:
//!
//! * every [`Question`] has exactly four options, each prefixed `"A. "`–`"D. "`
//! * [`Question::correct_option`] is an [`AnswerLetter`], never a free string
//! * [`ExamDocument::groups`] is sorted by `start_id` and never empty when
//!   questions exist
//!
//! Serialized field names match the persisted JSON contract exactly
//! (`correctOption`, `class_category`), so a round-trip through serde_json
//! reproduces the on-disk format modulo whitespace.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A fully normalized exam document, keyed by subject + class category.
///
/// Created once per source document, mutated through
/// repair → normalize → attach, then persisted immutably.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExamDocument {
    pub subject: String,
    pub class_category: ClassCategory,
    pub groups: Vec<Group>,
    pub questions: Vec<Question>,
}

/// A shared-context scope (instruction / passage / diagram) covering a
/// contiguous or explicit set of question ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub start_id: u32,
    pub end_id: u32,
    pub instruction: String,
    pub passage: String,
    pub diagram: Option<String>,
    pub question_ids: Vec<u32>,
}

/// A single multiple-choice question.
///
/// `diagram` is attached post-normalization and omitted from the JSON when
/// absent, matching the persisted contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: u32,
    pub question: String,
    /// Exactly four entries, each `"<Letter>. text"` with the letter derived
    /// purely from position (0 → A, 1 → B, …).
    pub options: Vec<String>,
    #[serde(rename = "correctOption")]
    pub correct_option: AnswerLetter,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub diagram: Option<String>,
}

/// The canonical single-letter answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnswerLetter {
    A,
    B,
    C,
    D,
}

impl AnswerLetter {
    /// Letter for a 0-based option index. Panics on index > 3, which the
    /// normalizer's exactly-four invariant makes unreachable.
    pub fn from_index(i: usize) -> Self {
        match i {
            0 => AnswerLetter::A,
            1 => AnswerLetter::B,
            2 => AnswerLetter::C,
            3 => AnswerLetter::D,
            _ => unreachable!("option index out of range: {i}"),
        }
    }

    /// Parse the first alphabetic character of a loose answer string.
    ///
    /// Leading punctuation and whitespace are skipped, so `"b)"`, `"(C)"`,
    /// and `" d."` all resolve. Returns `None` when the first alphabetic
    /// character is not A–D (e.g. `"maybe"` → `None`: its first letter is
    /// `m`, and scanning deeper into the string would turn `"maybe"` into
    /// `A` by accident).
    pub fn parse_loose(s: &str) -> Option<Self> {
        let first = s.chars().find(|c| c.is_ascii_alphabetic())?;
        match first.to_ascii_uppercase() {
            'A' => Some(AnswerLetter::A),
            'B' => Some(AnswerLetter::B),
            'C' => Some(AnswerLetter::C),
            'D' => Some(AnswerLetter::D),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AnswerLetter::A => "A",
            AnswerLetter::B => "B",
            AnswerLetter::C => "C",
            AnswerLetter::D => "D",
        }
    }
}

impl fmt::Display for AnswerLetter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// School class level the document belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ClassCategory {
    SS1,
    SS2,
    SS3,
    #[serde(rename = "GENERAL")]
    #[default]
    General,
}

impl ClassCategory {
    /// Uppercase form used for persistence folder names.
    pub fn as_str(&self) -> &'static str {
        match self {
            ClassCategory::SS1 => "SS1",
            ClassCategory::SS2 => "SS2",
            ClassCategory::SS3 => "SS3",
            ClassCategory::General => "GENERAL",
        }
    }

    /// Lowercase form used in file names and diagram folder keys.
    pub fn as_lower(&self) -> &'static str {
        match self {
            ClassCategory::SS1 => "ss1",
            ClassCategory::SS2 => "ss2",
            ClassCategory::SS3 => "ss3",
            ClassCategory::General => "general",
        }
    }
}

impl fmt::Display for ClassCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn answer_letter_parse_loose() {
        assert_eq!(AnswerLetter::parse_loose("b)"), Some(AnswerLetter::B));
        assert_eq!(AnswerLetter::parse_loose("(C)"), Some(AnswerLetter::C));
        assert_eq!(AnswerLetter::parse_loose(" d."), Some(AnswerLetter::D));
        assert_eq!(AnswerLetter::parse_loose("A"), Some(AnswerLetter::A));
        assert_eq!(AnswerLetter::parse_loose("maybe"), None);
        assert_eq!(AnswerLetter::parse_loose(""), None);
        assert_eq!(AnswerLetter::parse_loose("42"), None);
    }

    #[test]
    fn answer_letter_from_index() {
        assert_eq!(AnswerLetter::from_index(0), AnswerLetter::A);
        assert_eq!(AnswerLetter::from_index(3), AnswerLetter::D);
    }

    #[test]
    fn class_category_serde_names() {
        assert_eq!(
            serde_json::to_string(&ClassCategory::General).unwrap(),
            "\"GENERAL\""
        );
        assert_eq!(
            serde_json::to_string(&ClassCategory::SS2).unwrap(),
            "\"SS2\""
        );
        let c: ClassCategory = serde_json::from_str("\"GENERAL\"").unwrap();
        assert_eq!(c, ClassCategory::General);
    }

    #[test]
    fn question_serializes_correct_option_key() {
        let q = Question {
            id: 1,
            question: "CO<sub>2</sub> is?".into(),
            options: vec![
                "A. acid".into(),
                "B. base".into(),
                "C. salt".into(),
                "D. gas".into(),
            ],
            correct_option: AnswerLetter::D,
            diagram: None,
        };
        let json = serde_json::to_value(&q).unwrap();
        assert_eq!(json["correctOption"], "D");
        assert!(json.get("diagram").is_none(), "absent diagram is omitted");
    }
}
