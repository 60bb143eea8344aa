//! Configuration types for exam-to-JSON conversion.
//!
//! All conversion behaviour is controlled through [`ConversionConfig`], built
//! via its [`ConversionConfigBuilder`]. Keeping every knob in one struct makes
//! it trivial to share configs across a batch run and to diff two runs to
//! understand why their outputs differ.
//!
//! # Design choice: builder over constructor
//! A dozen-field constructor is unreadable and breaks on every new field.
//! The builder pattern lets callers set only what they care about and rely on
//! well-documented defaults for the rest.

use crate::dump::{DumpSink, NullDumpSink};
use crate::error::ConvertError;
use crate::progress::BatchProgress;
use crate::schema::{AnswerLetter, ClassCategory};
use edgequake_llm::LLMProvider;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Configuration for converting exam text documents to normalized JSON.
///
/// Built via [`ConversionConfig::builder()`] or using
/// [`ConversionConfig::default()`].
///
/// # Example
/// ```rust
/// use exam2json::{AnswerLetter, ConversionConfig};
///
/// let config = ConversionConfig::builder()
///     .model("gpt-4.1-nano")
///     .expected_count(50)
///     .fallback_answer(AnswerLetter::A)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    /// LLM model identifier, e.g. "gpt-4o", "claude-sonnet-4-20250514".
    /// If None, uses provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    /// If None along with `provider`, uses `ProviderFactory::from_env()`.
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature for the extraction call. Default: 0.0.
    ///
    /// Extraction is transcription, not generation: the model must copy
    /// questions faithfully into JSON. Zero temperature keeps it deterministic
    /// and minimises invented text.
    pub temperature: f32,

    /// Maximum tokens the model may generate per document. Default: 16384.
    ///
    /// A 50-question paper with passages serializes to well over 8k tokens.
    /// Setting this too low truncates the JSON mid-array, pushing every
    /// document into the repair engine's worst case.
    pub max_tokens: usize,

    /// Maximum retry attempts on a transient model API failure. Default: 2.
    pub max_retries: u32,

    /// Fixed delay between retry attempts in milliseconds. Default: 2000.
    ///
    /// Conversions run sequentially, so there is no herd to stagger; a fixed
    /// pause is enough for a rate-limited endpoint to recover.
    pub retry_backoff_ms: u64,

    /// Exact question count the paper is known to contain. When set, the
    /// prompt demands it and the normalizer enforces it (truncate if over,
    /// warn if under). Default: None.
    pub expected_count: Option<usize>,

    /// Override the subject detected from the file name.
    pub subject: Option<String>,

    /// Override the class level detected from the file name.
    pub class_category: Option<ClassCategory>,

    /// Letter substituted when the model's answer cannot be canonicalized.
    /// Every substitution is reported as a warning. Default: A.
    pub fallback_answer: AnswerLetter,

    /// Sink receiving raw model output that no repair stage could parse.
    /// Default: a discarding sink that logs the loss.
    pub dump_sink: Arc<dyn DumpSink>,

    /// Base directory of manually curated diagram folders
    /// (`{subject_slug}_{class}/diagram_<id>.<ext>`). Default: None.
    pub diagrams_dir: Option<PathBuf>,

    /// Batch progress callback. Default: None.
    pub progress_callback: Option<Arc<dyn BatchProgress>>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.0,
            max_tokens: 16384,
            max_retries: 2,
            retry_backoff_ms: 2000,
            expected_count: None,
            subject: None,
            class_category: None,
            fallback_answer: AnswerLetter::A,
            dump_sink: Arc::new(NullDumpSink),
            diagrams_dir: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("expected_count", &self.expected_count)
            .field("subject", &self.subject)
            .field("class_category", &self.class_category)
            .field("fallback_answer", &self.fallback_answer)
            .field("diagrams_dir", &self.diagrams_dir)
            .finish()
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ConversionConfig`].
#[derive(Debug)]
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl ConversionConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn expected_count(mut self, n: usize) -> Self {
        self.config.expected_count = Some(n);
        self
    }

    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.config.subject = Some(subject.into());
        self
    }

    pub fn class_category(mut self, class: ClassCategory) -> Self {
        self.config.class_category = Some(class);
        self
    }

    pub fn fallback_answer(mut self, letter: AnswerLetter) -> Self {
        self.config.fallback_answer = letter;
        self
    }

    pub fn dump_sink(mut self, sink: Arc<dyn DumpSink>) -> Self {
        self.config.dump_sink = sink;
        self
    }

    pub fn diagrams_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.diagrams_dir = Some(dir.into());
        self
    }

    pub fn progress_callback(mut self, cb: Arc<dyn BatchProgress>) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, ConvertError> {
        let c = &self.config;
        if c.max_tokens == 0 {
            return Err(ConvertError::InvalidConfig(
                "max_tokens must be ≥ 1".into(),
            ));
        }
        if let Some(0) = c.expected_count {
            return Err(ConvertError::InvalidConfig(
                "expected_count must be ≥ 1 when set".into(),
            ));
        }
        Ok(self.config)
    }
}

/// Options for a batch run over a folder of source documents.
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchOptions {
    /// Delete all previously persisted output before converting.
    pub clear: bool,
    /// Skip sources whose output file already exists.
    pub resume: bool,
    /// Stop the batch at the first failed document instead of continuing.
    /// A safety valve against burning paid model calls on a systemic fault.
    pub stop_on_failure: bool,
}
