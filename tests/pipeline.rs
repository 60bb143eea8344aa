//! Offline integration tests for the repair → normalize → attach pipeline.
//!
//! Everything after the model call is deterministic, so these tests feed raw
//! model-output strings straight into the pipeline stages and assert on the
//! final documents. No API key or network access is needed.

use exam2json::pipeline::{diagrams, normalize, repair};
use exam2json::{
    AnswerLetter, ClassCategory, ConversionWarning, ConvertError, MemoryDumpSink, NullDumpSink,
    RepairStage,
};
use serde_json::json;

// ── Full repair + normalize scenarios ────────────────────────────────────────

#[test]
fn chemistry_paper_end_to_end() {
    // Commentary prefix, markdown fence, unquoted keys, and a trailing comma
    // in one response. Typical of a cheap model asked for strict JSON.
    let raw = "Here is the JSON:\n```json\n{subject: \"Chemistry\", questions: [{id:1, question:\"CO2 is?\", options:[\"A. acid\",\"B. base\",\"C. salt\",\"D. gas\",], correctOption:\"D\"}]}\n```";

    let (value, stage) = repair::repair(raw, "chemistry_ss2.txt", &NullDumpSink).unwrap();
    assert_eq!(stage, RepairStage::Structural);

    let (doc, warnings) = normalize::normalize(
        value,
        "Chemistry",
        ClassCategory::SS2,
        None,
        AnswerLetter::A,
        "chemistry_ss2.txt",
    )
    .unwrap();

    assert_eq!(doc.questions.len(), 1);
    let q = &doc.questions[0];
    assert_eq!(q.question, "CO<sub>2</sub> is?");
    assert_eq!(
        q.options,
        vec!["A. acid", "B. base", "C. salt", "D. gas"]
    );
    assert_eq!(q.correct_option, AnswerLetter::D);

    assert_eq!(doc.groups.len(), 1);
    assert_eq!(doc.groups[0].start_id, 1);
    assert_eq!(doc.groups[0].end_id, 1);
    assert_eq!(doc.groups[0].question_ids, vec![1]);

    assert!(warnings.is_empty(), "clean input must not warn: {warnings:?}");
}

#[test]
fn refusal_text_is_dumped_verbatim() {
    let sink = MemoryDumpSink::new();
    let raw = "Sorry, I cannot comply.";

    let err = repair::repair(raw, "physics_ss1.txt", &sink).unwrap_err();
    assert!(matches!(err, ConvertError::UnrecoverableOutput { .. }));

    let entries = sink.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].0, "physics_ss1.txt");
    assert_eq!(entries[0].1, raw, "dump must carry the raw text untouched");
}

#[test]
fn valid_json_parses_directly_and_unchanged() {
    let raw = r#"{"subject": "Biology", "questions": [{"id": 1, "question": "a, b,, c inside a string", "options": ["A. x", "B. y", "C. z", "D. w"], "correctOption": "A"}]}"#;

    let (value, stage) = repair::repair(raw, "t", &NullDumpSink).unwrap();
    assert_eq!(stage, RepairStage::Direct);
    assert_eq!(
        value["questions"][0]["question"],
        "a, b,, c inside a string",
        "repair must not touch string contents of valid JSON"
    );
}

#[test]
fn serialized_document_matches_contract() {
    let raw = r#"{"questions": [{"id": 1, "question": "q", "options": ["A. x", "B. y", "C. z", "D. w"], "correctOption": "B"}]}"#;
    let (value, _) = repair::repair(raw, "t", &NullDumpSink).unwrap();
    let (doc, _) = normalize::normalize(
        value,
        "Economics",
        ClassCategory::SS3,
        None,
        AnswerLetter::A,
        "t",
    )
    .unwrap();

    let out = serde_json::to_value(&doc).unwrap();
    assert_eq!(out["subject"], "Economics");
    assert_eq!(out["class_category"], "SS3");
    assert_eq!(out["questions"][0]["correctOption"], "B");
    assert!(
        out["questions"][0].get("diagram").is_none(),
        "absent diagram keys must be omitted from the persisted JSON"
    );
    assert_eq!(out["groups"][0]["passage"], "");
}

// ── Normalizer invariants through the public API ─────────────────────────────

#[test]
fn options_relabelled_and_padded() {
    let (doc, _) = normalize::normalize(
        json!({"questions": [{"id": 1, "question": "q", "options": ["D. foo", "A. bar"], "correctOption": "A"}]}),
        "English Language",
        ClassCategory::General,
        None,
        AnswerLetter::A,
        "t",
    )
    .unwrap();
    assert_eq!(
        doc.questions[0].options,
        vec!["A. foo", "B. bar", "C. ---", "D. ---"]
    );
}

#[test]
fn answer_fallback_warns() {
    let (doc, warnings) = normalize::normalize(
        json!({"questions": [{"id": 1, "question": "q", "options": [], "correctOption": "maybe"}]}),
        "English Language",
        ClassCategory::General,
        None,
        AnswerLetter::A,
        "t",
    )
    .unwrap();
    assert_eq!(doc.questions[0].correct_option, AnswerLetter::A);
    assert!(warnings
        .iter()
        .any(|w| matches!(w, ConversionWarning::AnswerDefaulted { question_id: 1, .. })));
}

#[test]
fn count_enforcement_truncates() {
    let questions: Vec<_> = (1..=53)
        .map(|i| json!({"id": i, "question": "q", "options": ["A. 1","B. 2","C. 3","D. 4"], "correctOption": "A"}))
        .collect();
    let (doc, warnings) = normalize::normalize(
        json!({ "questions": questions }),
        "Government",
        ClassCategory::SS1,
        Some(50),
        AnswerLetter::A,
        "t",
    )
    .unwrap();
    assert_eq!(doc.questions.len(), 50);
    assert!(warnings
        .iter()
        .any(|w| matches!(w, ConversionWarning::CountMismatch { expected: 50, actual: 53 })));
}

// ── Diagram attachment on a normalized document ──────────────────────────────

#[test]
fn indexed_diagrams_resolve_through_normalization() {
    let (mut doc, _) = normalize::normalize(
        json!({
            "questions": [
                {"id": 1, "question": "q", "options": ["A. 1","B. 2","C. 3","D. 4"], "correctOption": "A"},
                {"id": 2, "question": "q", "options": ["A. 1","B. 2","C. 3","D. 4"], "correctOption": "B"}
            ],
            "groups": [
                {"start_id": 1, "end_id": 2, "instruction": "Use the diagram below", "diagram": "1"}
            ]
        }),
        "Physics",
        ClassCategory::SS2,
        None,
        AnswerLetter::A,
        "t",
    )
    .unwrap();

    let map = diagrams::DiagramMap::from_index(vec!["images/fig1.png".into()]);
    diagrams::attach(&mut doc, &map);

    assert_eq!(doc.groups[0].diagram.as_deref(), Some("images/fig1.png"));
    assert!(doc.questions[0].diagram.is_none());
}

#[test]
fn folder_diagrams_attach_by_question_id() {
    let dir = tempfile::tempdir().unwrap();
    let folder = dir.path().join("biology_ss3");
    std::fs::create_dir(&folder).unwrap();
    std::fs::write(folder.join("diagram_2.png"), b"").unwrap();

    let (mut doc, _) = normalize::normalize(
        json!({
            "questions": [
                {"id": 1, "question": "q", "options": ["A. 1","B. 2","C. 3","D. 4"], "correctOption": "A"},
                {"id": 2, "question": "q", "options": ["A. 1","B. 2","C. 3","D. 4"], "correctOption": "B"}
            ]
        }),
        "Biology",
        ClassCategory::SS3,
        None,
        AnswerLetter::A,
        "t",
    )
    .unwrap();

    let map = diagrams::DiagramMap::from_folder(dir.path(), "Biology", "ss3");
    diagrams::attach(&mut doc, &map);

    assert!(doc.questions[0].diagram.is_none());
    assert!(doc.questions[1].diagram.is_some());
}

// ── Persistence key ──────────────────────────────────────────────────────────

#[test]
fn output_path_reflects_detection() {
    let path = exam2json::output_path(
        std::path::Path::new("out"),
        "Further Mathematics",
        ClassCategory::SS1,
    );
    assert_eq!(
        path,
        std::path::Path::new("out/SS1/further_mathematics_ss1.json")
    );
}
