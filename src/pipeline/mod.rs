//! Pipeline stages for exam-text-to-JSON conversion.
//!
//! Each submodule implements exactly one transformation step.
//! Keeping stages separate makes each independently testable and lets us
//! tighten one stage (e.g. add a repair transform) without touching the
//! others.
//!
//! ## Data Flow
//!
//! ```text
//! llm ──▶ repair ──▶ normalize ──▶ notation ──▶ diagrams
//! (model) (parse)    (schema)     (markup)     (attach)
//! ```
//!
//! 1. [`llm`]       — drive the extraction call with retry/backoff; the only
//!    stage with network I/O
//! 2. [`repair`]    — staged salvage of the model's JSON, from verbatim parse
//!    down to structural surgery
//! 3. [`normalize`] — force the parsed value into the exam schema, repairing
//!    ids, options, answers, and groups in place
//! 4. [`notation`]  — subject-gated subscript/superscript markup (called from
//!    `normalize`, public for direct use)
//! 5. [`diagrams`]  — join the normalized document to its image side channel

pub mod diagrams;
pub mod llm;
pub mod normalize;
pub mod notation;
pub mod repair;
