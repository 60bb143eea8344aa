//! Conversion entry points: single document and batch.
//!
//! [`convert`] runs the whole pipeline for one source document and returns
//! the normalized result in memory; [`convert_to_file`] additionally persists
//! it under the `(class, subject)` key. [`run_batch`] drives a folder of
//! sources through `convert_to_file` with per-item retry and skip semantics —
//! one document's failure never terminates the batch unless the caller asked
//! for stop-on-failure as a cost safety valve.

use crate::config::{BatchOptions, ConversionConfig};
use crate::error::ConvertError;
use crate::output::{BatchSummary, ConversionOutput, ConversionStats};
use crate::pipeline::{diagrams, llm, normalize, repair};
use crate::prompts::{build_prompt, select_mode};
use crate::schema::ClassCategory;
use crate::subjects::{detect_class, detect_subject, subject_slug};
use edgequake_llm::{LLMProvider, ProviderFactory};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Convert one exam text document to a normalized [`crate::schema::ExamDocument`].
///
/// This is the primary entry point for the library.
///
/// # Arguments
/// * `input` — path to a plain-text exam file
/// * `config` — conversion configuration
///
/// # Returns
/// `Ok(ConversionOutput)` on success, possibly with warnings
/// (check `output.warnings`).
///
/// # Errors
/// Returns `Err(ConvertError)` only for errors fatal to this document:
/// - file not found / unreadable
/// - model call exhausted its retries
/// - model output unrecoverable or schema-invalid
pub async fn convert(
    input: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, ConvertError> {
    let total_start = Instant::now();
    let input = input.as_ref();
    let identity = file_identity(input);
    info!("Starting conversion: {}", identity);

    // ── Step 1: Read source text ─────────────────────────────────────────
    if !input.exists() {
        return Err(ConvertError::SourceNotFound {
            path: input.to_path_buf(),
        });
    }
    let text = tokio::fs::read_to_string(input)
        .await
        .map_err(|e| ConvertError::SourceRead {
            path: input.to_path_buf(),
            source: e,
        })?;

    // ── Step 2: Detect subject and class ─────────────────────────────────
    let subject = config
        .subject
        .clone()
        .unwrap_or_else(|| detect_subject(&identity).to_string());
    let class_category = config
        .class_category
        .unwrap_or_else(|| detect_class(&identity));
    debug!("'{identity}': subject={subject}, class={class_category}");

    // ── Step 3: Build prompt ─────────────────────────────────────────────
    let mode = select_mode(&subject, &text);
    debug!("'{identity}': prompt mode {mode:?}");
    let prompt = build_prompt(&subject, mode, config.expected_count, &text);

    // ── Step 4: Model call ───────────────────────────────────────────────
    let provider = resolve_provider(config)?;
    let response = llm::request_extraction(&provider, &identity, &prompt, config).await?;

    // ── Step 5: Repair ───────────────────────────────────────────────────
    let (value, repair_stage) = repair::repair(&response.text, &identity, &*config.dump_sink)?;
    debug!("'{identity}': repaired at stage {repair_stage}");

    // ── Step 6: Normalize ────────────────────────────────────────────────
    let (mut document, warnings) = normalize::normalize(
        value,
        &subject,
        class_category,
        config.expected_count,
        config.fallback_answer,
        &identity,
    )?;
    for w in &warnings {
        warn!("'{identity}': {w}");
    }

    // ── Step 7: Attach diagrams ──────────────────────────────────────────
    let diagram_map = match &config.diagrams_dir {
        Some(base) => diagrams::DiagramMap::from_folder(base, &subject, class_category.as_lower()),
        None => diagrams::DiagramMap::Empty,
    };
    diagrams::attach(&mut document, &diagram_map);

    let stats = ConversionStats {
        input_tokens: Some(response.input_tokens),
        output_tokens: Some(response.output_tokens),
        duration_ms: total_start.elapsed().as_millis() as u64,
        attempts: response.attempts,
        repair_stage: Some(repair_stage),
    };
    info!(
        "Conversion complete: {} questions, {} warnings, {}ms",
        document.questions.len(),
        warnings.len(),
        stats.duration_ms
    );

    Ok(ConversionOutput {
        document,
        warnings,
        stats,
    })
}

/// Convert a document and persist it under the `(class, subject)` key.
///
/// Writes `{out_dir}/{CLASS}/{subject_slug}_{class}.json`; re-running for the
/// same key overwrites. Uses atomic write (temp file + rename) to prevent
/// partial files.
pub async fn convert_to_file(
    input: impl AsRef<Path>,
    out_dir: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<(ConversionOutput, PathBuf), ConvertError> {
    let output = convert(input, config).await?;
    let path = output_path(
        out_dir.as_ref(),
        &output.document.subject,
        output.document.class_category,
    );
    save_document(&output, &path).await?;
    Ok((output, path))
}

/// Persistence location for a subject/class key.
pub fn output_path(out_dir: &Path, subject: &str, class: ClassCategory) -> PathBuf {
    out_dir
        .join(class.as_str())
        .join(format!("{}_{}.json", subject_slug(subject), class.as_lower()))
}

async fn save_document(output: &ConversionOutput, path: &Path) -> Result<(), ConvertError> {
    let json = serde_json::to_string_pretty(&output.document).map_err(|e| {
        ConvertError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: std::io::Error::other(e),
        }
    })?;

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| ConvertError::OutputWriteFailed {
                path: path.to_path_buf(),
                source: e,
            })?;
    }

    let tmp_path = path.with_extension("json.tmp");
    tokio::fs::write(&tmp_path, &json)
        .await
        .map_err(|e| ConvertError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| ConvertError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

    info!("Saved {}", path.display());
    Ok(())
}

/// Convert every `.txt` source in a folder.
///
/// Sources are processed in name order, one at a time. Per-document errors
/// are caught, logged, and counted; the batch continues unless
/// `options.stop_on_failure` is set.
pub async fn run_batch(
    input_dir: impl AsRef<Path>,
    out_dir: impl AsRef<Path>,
    config: &ConversionConfig,
    options: BatchOptions,
) -> Result<BatchSummary, ConvertError> {
    let input_dir = input_dir.as_ref();
    let out_dir = out_dir.as_ref();

    let sources = list_sources(input_dir)?;
    info!("Batch: {} source documents in {}", sources.len(), input_dir.display());

    if options.clear {
        clear_output(out_dir).await;
    }

    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_start(sources.len());
    }

    let mut summary = BatchSummary::default();
    let total = sources.len();

    for (i, source) in sources.iter().enumerate() {
        let index = i + 1;
        let identity = file_identity(source);

        if options.resume {
            let subject = config
                .subject
                .clone()
                .unwrap_or_else(|| detect_subject(&identity).to_string());
            let class = config
                .class_category
                .unwrap_or_else(|| detect_class(&identity));
            let existing = output_path(out_dir, &subject, class);
            if existing.exists() {
                info!("'{identity}': output exists, skipping");
                summary.skipped += 1;
                if let Some(ref cb) = config.progress_callback {
                    cb.on_document_skipped(index, total, &identity);
                }
                continue;
            }
        }

        if let Some(ref cb) = config.progress_callback {
            cb.on_document_start(index, total, &identity);
        }

        match convert_to_file(source, out_dir, config).await {
            Ok((output, _)) => {
                summary.converted += 1;
                if let Some(ref cb) = config.progress_callback {
                    cb.on_document_complete(index, total, &identity, output.document.questions.len());
                }
            }
            Err(e) => {
                warn!("'{identity}': conversion failed: {e}");
                summary.failed += 1;
                if let Some(ref cb) = config.progress_callback {
                    cb.on_document_error(index, total, &identity, &e.to_string());
                }
                if options.stop_on_failure {
                    warn!("Stopping batch after first failure (stop-on-failure set)");
                    break;
                }
            }
        }
    }

    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_complete(total, summary.converted, summary.failed);
    }
    info!("Batch complete: {summary}");
    Ok(summary)
}

/// All `.txt` files in the folder, sorted by name for a stable order.
fn list_sources(dir: &Path) -> Result<Vec<PathBuf>, ConvertError> {
    let entries = std::fs::read_dir(dir).map_err(|e| ConvertError::SourceRead {
        path: dir.to_path_buf(),
        source: e,
    })?;

    let mut sources: Vec<PathBuf> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("txt"))
        .collect();
    sources.sort();
    Ok(sources)
}

/// Remove previously persisted output. Best-effort: a missing directory or
/// a failed delete just logs.
async fn clear_output(out_dir: &Path) {
    for class in [
        ClassCategory::SS1,
        ClassCategory::SS2,
        ClassCategory::SS3,
        ClassCategory::General,
    ] {
        let dir = out_dir.join(class.as_str());
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => info!("Cleared {}", dir.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Could not clear {}: {e}", dir.display()),
        }
    }
}

fn file_identity(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

// ── Provider resolution ──────────────────────────────────────────────────

/// Instantiate a named provider with the given model.
fn create_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, ConvertError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        ConvertError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the LLM provider, from most-specific to least-specific.
///
/// The four-level fallback chain lets library users and CLI users each set
/// exactly as much or as little as they need:
///
/// 1. **Pre-built provider** (`config.provider`) — the caller constructed and
///    configured the provider entirely; we use it as-is. Useful in tests or
///    when the caller needs custom middleware.
///
/// 2. **Named provider + model** (`config.provider_name`) — the caller named
///    a provider (e.g. `"openai"`); [`ProviderFactory::create_llm_provider`]
///    reads the corresponding API key from the environment.
///
/// 3. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`) —
///    a provider and model chosen at the execution-environment level.
///    Checked before full auto-detection so the model choice is honoured
///    even when multiple API keys are present.
///
/// 4. **Full auto-detection** (`ProviderFactory::from_env`) — the factory
///    scans all known API key variables and picks the first available
///    provider. When an OpenAI key is present it is preferred explicitly so
///    multi-key environments behave predictably.
fn resolve_provider(config: &ConversionConfig) -> Result<Arc<dyn LLMProvider>, ConvertError> {
    // 1) User-provided provider takes priority
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    // 2) Provider name + model
    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or("gpt-4.1-nano");
        return create_provider(name, model);
    }

    // 3) Environment pair
    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_provider(&prov, &model);
        }
    }

    // 4) Auto-detect, preferring OpenAI when its key is set
    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            let model = config.model.as_deref().unwrap_or("gpt-4.1-nano");
            return create_provider("openai", model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| ConvertError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}
