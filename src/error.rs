//! Error types for the exam2json library.
//!
//! Two distinct types reflect two distinct failure modes:
//!
//! * [`ConvertError`] — **Fatal for this document**: the conversion of one
//!   source document cannot produce a usable `ExamDocument` (unrecoverable
//!   model output, `questions` not list-shaped, model call exhausted its
//!   retries). Returned as `Err(ConvertError)` from the `convert*` functions.
//!   The batch driver catches these, logs, and moves on — one malformed
//!   document never terminates the batch.
//!
//! * [`ConversionWarning`] — **Non-fatal**: the document was repaired but
//!   with a recorded fidelity loss (question count mismatch, defaulted
//!   answer letter). Collected in [`crate::output::ConversionOutput`] so
//!   callers can surface them instead of silently absorbing them.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal per-document errors returned by the exam2json library.
#[derive(Debug, Error)]
pub enum ConvertError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Source document was not found at the given path.
    #[error("source document not found: '{path}'")]
    SourceNotFound { path: PathBuf },

    /// Source document exists but could not be read.
    #[error("failed to read source document '{path}': {source}")]
    SourceRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Repair errors ─────────────────────────────────────────────────────
    /// Every repair stage failed to produce parseable JSON.
    ///
    /// The raw model output has been dumped to the configured
    /// [`crate::dump::DumpSink`] under `identity` for postmortem.
    #[error("unrecoverable model output for '{identity}': {parse_error}\nRaw text dumped for inspection.")]
    UnrecoverableOutput {
        identity: String,
        parse_error: String,
    },

    /// The output parsed, but `questions` is present and not list-shaped —
    /// there is no safe way to salvage a document from that.
    #[error("invalid schema for '{identity}': {detail}")]
    InvalidSchema { identity: String, detail: String },

    // ── Model errors ──────────────────────────────────────────────────────
    /// The model call failed after all retries.
    #[error("model call failed after {attempts} attempts: {detail}")]
    ModelCallFailure { attempts: u32, detail: String },

    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output JSON file.
    #[error("failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// A recoverable fidelity loss recorded during normalization.
///
/// Warnings never abort a conversion; they are collected into
/// [`crate::output::ConversionOutput::warnings`] and logged at `warn` level.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum ConversionWarning {
    /// Parsed question count differs from the expected count.
    /// Over-extraction is truncated; under-extraction is kept as-is.
    #[error("expected {expected} questions, model returned {actual}")]
    CountMismatch { expected: usize, actual: usize },

    /// `correctOption` was missing or unrecognizable; the configured
    /// fallback letter was substituted. A known fidelity loss, not a
    /// correctness guarantee.
    #[error("question {question_id}: answer missing or unrecognized, defaulted to {fallback}")]
    AnswerDefaulted { question_id: u32, fallback: String },

    /// The parsed document had no `questions` field at all.
    #[error("parsed document had no questions field")]
    QuestionsMissing,

    /// A question's options were padded or truncated to exactly four.
    #[error("question {question_id}: {found} options recovered, adjusted to 4")]
    OptionsAdjusted { question_id: u32, found: usize },

    /// Two questions carried the same id; the later one was reassigned so
    /// ids stay unique within the document.
    #[error("question id {question_id} duplicated, reassigned to {reassigned}")]
    DuplicateId { question_id: u32, reassigned: u32 },
}
