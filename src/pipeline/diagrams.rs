//! Diagram attachment: join normalized documents to their image files.
//!
//! Diagrams arrive through a side channel, not through the model. Two
//! strategies exist because the two intake modes differ:
//!
//! * **index-based** — extraction assigned each encountered image a small
//!   integer key in order; the model's raw `diagram` values reference those
//!   keys (`"2"` means the second extracted image).
//! * **filename-convention** — a manually curated folder keyed by
//!   `{subject_slug}_{class}` holds files named `diagram_<id>.<ext>`; a
//!   question or group with id N resolves by probing for that file.
//!
//! Exactly one strategy is active per run, selected by which source was
//! supplied. Attachment is pure and total: a missing mapping entry leaves
//! `diagram` absent, and a missing folder just yields an empty map.

use crate::schema::ExamDocument;
use crate::subjects::subject_slug;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, warn};

const DIAGRAM_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif"];

/// Side-channel lookup from diagram identifier to image path.
#[derive(Debug, Clone, Default)]
pub enum DiagramMap {
    /// No diagram source supplied; attachment is a no-op.
    #[default]
    Empty,
    /// Extraction-order integer keys, as strings.
    Indexed(HashMap<String, String>),
    /// Lowercased conventional file names mapped to their on-disk paths.
    Folder(HashMap<String, String>),
}

impl DiagramMap {
    /// Build an index-based map from extraction-order image paths. Key `"1"`
    /// is the first image encountered.
    pub fn from_index(paths: Vec<String>) -> Self {
        let map = paths
            .into_iter()
            .enumerate()
            .map(|(i, p)| ((i + 1).to_string(), p))
            .collect();
        DiagramMap::Indexed(map)
    }

    /// Scan the conventional folder `{base}/{subject_slug}_{class}` for
    /// diagram files. A missing folder is non-fatal and yields an empty map.
    pub fn from_folder(base: &Path, subject: &str, class_lower: &str) -> Self {
        let dir = base.join(format!("{}_{}", subject_slug(subject), class_lower));
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(_) => {
                debug!("no diagram folder at {}, skipping attachment", dir.display());
                return DiagramMap::Empty;
            }
        };

        let mut map = HashMap::new();
        for entry in entries.flatten() {
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let lower = name.to_lowercase();
            let is_diagram = lower.starts_with("diagram_")
                && DIAGRAM_EXTENSIONS
                    .iter()
                    .any(|ext| lower.ends_with(&format!(".{ext}")));
            if is_diagram {
                map.insert(lower, path.display().to_string());
            } else {
                warn!("ignoring non-diagram file {}", path.display());
            }
        }
        DiagramMap::Folder(map)
    }

    /// Resolve a raw diagram key from the model (index-based only).
    fn resolve_key(&self, key: &str) -> Option<String> {
        match self {
            DiagramMap::Indexed(map) => map.get(key.trim()).cloned(),
            _ => None,
        }
    }

    /// Probe for `diagram_<id>.<ext>` (filename-convention only).
    fn resolve_id(&self, id: u32) -> Option<String> {
        match self {
            DiagramMap::Folder(map) => DIAGRAM_EXTENSIONS
                .iter()
                .find_map(|ext| map.get(&format!("diagram_{id}.{ext}")).cloned()),
            _ => None,
        }
    }
}

/// Attach diagram paths to every question and group that has one.
///
/// Pure and total: entries that do not resolve leave `diagram` absent.
pub fn attach(doc: &mut ExamDocument, map: &DiagramMap) {
    match map {
        DiagramMap::Empty => {
            // Raw keys from the model are meaningless without a map; clear
            // them so they never leak into the persisted document.
            for group in &mut doc.groups {
                group.diagram = None;
            }
            for question in &mut doc.questions {
                question.diagram = None;
            }
        }
        DiagramMap::Indexed(_) => {
            for group in &mut doc.groups {
                group.diagram = group.diagram.as_deref().and_then(|k| map.resolve_key(k));
            }
            for question in &mut doc.questions {
                question.diagram = question
                    .diagram
                    .as_deref()
                    .and_then(|k| map.resolve_key(k));
            }
        }
        DiagramMap::Folder(_) => {
            for group in &mut doc.groups {
                group.diagram = map.resolve_id(group.start_id);
            }
            for question in &mut doc.questions {
                question.diagram = map.resolve_id(question.id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{AnswerLetter, ClassCategory, Group, Question};

    fn doc_with(group_diagram: Option<&str>) -> ExamDocument {
        ExamDocument {
            subject: "Physics".into(),
            class_category: ClassCategory::SS1,
            groups: vec![Group {
                start_id: 1,
                end_id: 2,
                instruction: "Answer all questions.".into(),
                passage: String::new(),
                diagram: group_diagram.map(str::to_string),
                question_ids: vec![1, 2],
            }],
            questions: (1..=2)
                .map(|id| Question {
                    id,
                    question: format!("q{id}"),
                    options: vec!["A. w".into(), "B. x".into(), "C. y".into(), "D. z".into()],
                    correct_option: AnswerLetter::A,
                    diagram: None,
                })
                .collect(),
        }
    }

    #[test]
    fn indexed_map_resolves_raw_keys() {
        let map = DiagramMap::from_index(vec!["img/one.png".into(), "img/two.png".into()]);
        let mut doc = doc_with(Some("2"));
        attach(&mut doc, &map);
        assert_eq!(doc.groups[0].diagram.as_deref(), Some("img/two.png"));
    }

    #[test]
    fn indexed_map_drops_unresolvable_keys() {
        let map = DiagramMap::from_index(vec!["img/one.png".into()]);
        let mut doc = doc_with(Some("9"));
        attach(&mut doc, &map);
        assert!(doc.groups[0].diagram.is_none());
    }

    #[test]
    fn empty_map_clears_raw_keys() {
        let mut doc = doc_with(Some("1"));
        attach(&mut doc, &DiagramMap::Empty);
        assert!(doc.groups[0].diagram.is_none());
    }

    #[test]
    fn folder_map_probes_by_id_case_insensitively() {
        let dir = tempfile::tempdir().unwrap();
        let folder = dir.path().join("physics_ss1");
        std::fs::create_dir(&folder).unwrap();
        std::fs::write(folder.join("Diagram_1.PNG"), b"").unwrap();
        std::fs::write(folder.join("diagram_2.jpg"), b"").unwrap();

        let map = DiagramMap::from_folder(dir.path(), "Physics", "ss1");
        let mut doc = doc_with(None);
        attach(&mut doc, &map);

        assert!(doc.questions[0].diagram.is_some(), "id 1 resolves");
        assert!(doc.questions[1].diagram.is_some(), "id 2 resolves");
        assert!(
            doc.groups[0].diagram.is_some(),
            "group probes by start_id"
        );
    }

    #[test]
    fn missing_folder_is_non_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let map = DiagramMap::from_folder(dir.path(), "Chemistry", "ss3");
        assert!(matches!(map, DiagramMap::Empty));
    }
}
