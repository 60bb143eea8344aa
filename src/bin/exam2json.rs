//! CLI binary for exam2json.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ConversionConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use exam2json::{
    convert, convert_to_file, run_batch, AnswerLetter, BatchOptions, BatchProgress, ClassCategory,
    ConversionConfig, FileDumpSink,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: renders a live progress bar and per-document
/// log lines using [indicatif].
struct CliBatchProgress {
    bar: ProgressBar,
    errors: AtomicUsize,
}

impl CliBatchProgress {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0); // length set in on_batch_start

        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            errors: AtomicUsize::new(0),
        })
    }
}

impl BatchProgress for CliBatchProgress {
    fn on_batch_start(&self, total_docs: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} documents  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        self.bar.set_length(total_docs as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Converting");
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Starting conversion of {total_docs} documents…"))
        ));
    }

    fn on_document_start(&self, _index: usize, _total: usize, identity: &str) {
        self.bar.set_message(identity.to_string());
    }

    fn on_document_complete(
        &self,
        index: usize,
        total: usize,
        identity: &str,
        question_count: usize,
    ) {
        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {:<32}  {}",
            green("✓"),
            index,
            total,
            identity,
            dim(&format!("{question_count} questions")),
        ));
        self.bar.inc(1);
    }

    fn on_document_error(&self, index: usize, total: usize, identity: &str, error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);

        // Truncate very long error messages to keep output tidy.
        let msg = if error.len() > 80 {
            format!("{}\u{2026}", &error[..79])
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {:<32}  {}",
            red("✗"),
            index,
            total,
            identity,
            red(&msg),
        ));
        self.bar.inc(1);
    }

    fn on_document_skipped(&self, index: usize, total: usize, identity: &str) {
        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {:<32}  {}",
            dim("→"),
            index,
            total,
            identity,
            dim("output exists, skipped"),
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total_docs: usize, converted: usize, failed: usize) {
        self.bar.finish_and_clear();

        if failed == 0 {
            eprintln!(
                "{} {} documents converted successfully",
                green("✔"),
                bold(&converted.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} documents converted  ({} failed)",
                if converted == 0 { red("✘") } else { cyan("⚠") },
                bold(&converted.to_string()),
                total_docs,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert one exam paper (JSON to stdout)
  exam2json chemistry_ss2.txt

  # Convert and persist under out/SS2/chemistry_ss2.json
  exam2json chemistry_ss2.txt --out-dir out

  # A paper known to have exactly 50 questions
  exam2json --expected-count 50 economics_ss1.txt --out-dir out

  # Convert a whole folder, skipping already-converted papers
  exam2json papers/ --out-dir out --resume

  # Re-convert everything from scratch, stopping at the first failure
  exam2json papers/ --out-dir out --clear --stop-on-failure

  # Override detection when the file name is unhelpful
  exam2json --subject Chemistry --class ss2 paper_final_v3.txt --out-dir out

  # Keep unparseable model output for postmortem
  exam2json papers/ --out-dir out --dump-dir dumps

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID

SETUP:
  1. Set API key:     export OPENAI_API_KEY=sk-...
  2. Convert:         exam2json chemistry_ss2.txt --out-dir out
"#;

/// Convert plain-text exam papers to normalized multiple-choice JSON.
#[derive(Parser, Debug)]
#[command(
    name = "exam2json",
    version,
    about = "Convert plain-text exam papers to normalized multiple-choice JSON using LLMs",
    long_about = "Extract multiple-choice questions from plain-text exam papers into a strict \
JSON schema using Large Language Models. Malformed model output is repaired in stages; the \
normalized result is persisted per (class, subject) key. Supports OpenAI, Anthropic, Google \
Gemini, and any OpenAI-compatible endpoint (Ollama, vLLM, LiteLLM, etc.).",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Exam text file, or a folder of .txt files for batch conversion.
    input: PathBuf,

    /// Persist output under this directory ({CLASS}/{subject}_{class}.json).
    /// Required for folder input; single-file output goes to stdout without it.
    #[arg(short, long, env = "EXAM2JSON_OUT_DIR")]
    out_dir: Option<PathBuf>,

    /// LLM model ID (e.g. gpt-4.1-nano, gpt-4.1, claude-sonnet-4-20250514).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(
        long,
        env = "EDGEQUAKE_PROVIDER",
        long_help = "LLM provider. Auto-detected from API key env vars if not set.\n\
          Supported: openai, anthropic, gemini, azure, ollama, or any OpenAI-compatible URL."
    )]
    provider: Option<String>,

    /// Exact question count the paper is known to contain.
    #[arg(long, env = "EXAM2JSON_EXPECTED_COUNT")]
    expected_count: Option<usize>,

    /// Override the subject detected from the file name.
    #[arg(long, env = "EXAM2JSON_SUBJECT")]
    subject: Option<String>,

    /// Override the class level detected from the file name.
    #[arg(long, env = "EXAM2JSON_CLASS", value_enum)]
    class: Option<ClassArg>,

    /// Letter substituted when the model's answer is unrecognizable.
    #[arg(long, env = "EXAM2JSON_FALLBACK_ANSWER", value_enum, default_value = "a")]
    fallback_answer: AnswerArg,

    /// Base directory of curated diagram folders.
    #[arg(long, env = "EXAM2JSON_DIAGRAMS_DIR")]
    diagrams_dir: Option<PathBuf>,

    /// Directory receiving raw dumps of unparseable model output.
    #[arg(long, env = "EXAM2JSON_DUMP_DIR")]
    dump_dir: Option<PathBuf>,

    /// Max LLM output tokens per document.
    #[arg(long, env = "EXAM2JSON_MAX_TOKENS", default_value_t = 16384)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "EXAM2JSON_TEMPERATURE", default_value_t = 0.0)]
    temperature: f32,

    /// Retries per document on LLM failure.
    #[arg(long, env = "EXAM2JSON_MAX_RETRIES", default_value_t = 2)]
    max_retries: u32,

    /// Batch: delete all previously persisted output before converting.
    #[arg(long)]
    clear: bool,

    /// Batch: skip sources whose output file already exists.
    #[arg(long)]
    resume: bool,

    /// Batch: stop at the first failed document instead of continuing.
    #[arg(long)]
    stop_on_failure: bool,

    /// Output the full ConversionOutput (document, warnings, stats) as JSON.
    #[arg(long, env = "EXAM2JSON_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "EXAM2JSON_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "EXAM2JSON_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "EXAM2JSON_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum ClassArg {
    Ss1,
    Ss2,
    Ss3,
    General,
}

impl From<ClassArg> for ClassCategory {
    fn from(v: ClassArg) -> Self {
        match v {
            ClassArg::Ss1 => ClassCategory::SS1,
            ClassArg::Ss2 => ClassCategory::SS2,
            ClassArg::Ss3 => ClassCategory::SS3,
            ClassArg::General => ClassCategory::General,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum AnswerArg {
    A,
    B,
    C,
    D,
}

impl From<AnswerArg> for AnswerLetter {
    fn from(v: AnswerArg) -> Self {
        match v {
            AnswerArg::A => AnswerLetter::A,
            AnswerArg::B => AnswerLetter::B,
            AnswerArg::C => AnswerLetter::C,
            AnswerArg::D => AnswerLetter::D,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active;
    // the bar provides all the feedback that matters to the user.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && cli.input.is_dir();
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let config = build_config(&cli, show_progress)?;

    // ── Batch mode ───────────────────────────────────────────────────────
    if cli.input.is_dir() {
        let out_dir = cli
            .out_dir
            .as_ref()
            .context("--out-dir is required when converting a folder")?;
        let options = BatchOptions {
            clear: cli.clear,
            resume: cli.resume,
            stop_on_failure: cli.stop_on_failure,
        };

        let summary = run_batch(&cli.input, out_dir, &config, options)
            .await
            .context("Batch conversion failed")?;

        if !cli.quiet && !show_progress {
            eprintln!("{summary}");
        }
        if summary.converted == 0 && summary.failed > 0 {
            anyhow::bail!("every document in the batch failed");
        }
        return Ok(());
    }

    // ── Single-document mode ─────────────────────────────────────────────
    if let Some(ref out_dir) = cli.out_dir {
        let (output, path) = convert_to_file(&cli.input, out_dir, &config)
            .await
            .context("Conversion failed")?;

        if !cli.quiet {
            eprintln!(
                "{}  {} questions  {}ms  →  {}",
                if output.warnings.is_empty() {
                    green("✔")
                } else {
                    cyan("⚠")
                },
                output.document.questions.len(),
                output.stats.duration_ms,
                bold(&path.display().to_string()),
            );
            for warning in &output.warnings {
                eprintln!("   {} {}", cyan("⚠"), warning);
            }
            if let (Some(input), Some(out)) = (output.stats.input_tokens, output.stats.output_tokens)
            {
                eprintln!(
                    "   {} tokens in  /  {} tokens out",
                    dim(&input.to_string()),
                    dim(&out.to_string()),
                );
            }
        }
    } else {
        let output = convert(&cli.input, &config)
            .await
            .context("Conversion failed")?;

        let json = if cli.json {
            serde_json::to_string_pretty(&output).context("Failed to serialise output")?
        } else {
            serde_json::to_string_pretty(&output.document)
                .context("Failed to serialise document")?
        };

        let stdout = io::stdout();
        let mut handle = stdout.lock();
        handle
            .write_all(json.as_bytes())
            .context("Failed to write to stdout")?;
        handle.write_all(b"\n").ok();

        if !cli.quiet && !cli.json {
            for warning in &output.warnings {
                eprintln!("{} {}", cyan("⚠"), warning);
            }
        }
    }

    Ok(())
}

/// Map CLI args to `ConversionConfig`.
fn build_config(cli: &Cli, show_progress: bool) -> Result<ConversionConfig> {
    let mut builder = ConversionConfig::builder()
        .max_tokens(cli.max_tokens)
        .temperature(cli.temperature)
        .max_retries(cli.max_retries)
        .fallback_answer(cli.fallback_answer.into());

    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(n) = cli.expected_count {
        builder = builder.expected_count(n);
    }
    if let Some(ref subject) = cli.subject {
        builder = builder.subject(subject);
    }
    if let Some(class) = cli.class {
        builder = builder.class_category(class.into());
    }
    if let Some(ref dir) = cli.diagrams_dir {
        builder = builder.diagrams_dir(dir);
    }
    if let Some(ref dir) = cli.dump_dir {
        builder = builder.dump_sink(Arc::new(FileDumpSink::new(dir)));
    }
    if show_progress {
        builder = builder.progress_callback(CliBatchProgress::new() as Arc<dyn BatchProgress>);
    }

    builder.build().context("Invalid configuration")
}
