//! # exam2json
//!
//! Convert plain-text exam papers into normalized multiple-choice JSON using
//! Large Language Models.
//!
//! ## Why this crate?
//!
//! Extracting structured questions from exam text is easy for an LLM and
//! miserable for regexes — but the JSON an LLM returns is unreliable: fenced,
//! prefixed with commentary, missing quotes, carrying trailing commas, or cut
//! off mid-array. This crate treats the model's output as hostile input: a
//! staged repair engine salvages it into a parseable value, and a normalizer
//! then forces it into a strict schema (exactly four options per question,
//! positional A–D labels, canonical answer letters, synthesized groups),
//! recording every fidelity loss as a warning instead of hiding it.
//!
//! ## Pipeline Overview
//!
//! ```text
//! exam.txt
//!  │
//!  ├─ 1. Detect     subject + class level from the file name
//!  ├─ 2. Prompt     flat or sectioned grouping, chosen by text heuristics
//!  ├─ 3. Model      one temperature-0 extraction call with retry/backoff
//!  ├─ 4. Repair     staged JSON salvage (direct → structural → fallback)
//!  ├─ 5. Normalize  ids, options, answers, groups, notation markup
//!  ├─ 6. Diagrams   join to extracted images or a curated folder
//!  └─ 7. Persist    {out}/{CLASS}/{subject}_{class}.json (atomic write)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use exam2json::{convert, ConversionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / GEMINI_API_KEY
//!     let config = ConversionConfig::builder().expected_count(50).build()?;
//!     let output = convert("chemistry_ss2.txt", &config).await?;
//!     println!("{} questions", output.document.questions.len());
//!     for warning in &output.warnings {
//!         eprintln!("warning: {warning}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `exam2json` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! exam2json = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod dump;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod schema;
pub mod subjects;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{BatchOptions, ConversionConfig, ConversionConfigBuilder};
pub use convert::{convert, convert_to_file, output_path, run_batch};
pub use dump::{DumpSink, FileDumpSink, MemoryDumpSink, NullDumpSink};
pub use error::{ConvertError, ConversionWarning};
pub use output::{BatchSummary, ConversionOutput, ConversionStats, RepairStage};
pub use progress::{BatchProgress, NoopBatchProgress};
pub use schema::{AnswerLetter, ClassCategory, ExamDocument, Group, Question};
