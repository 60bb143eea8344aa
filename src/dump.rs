//! Side-channel sink for unrecoverable model output.
//!
//! When every repair stage fails, the raw model text must be preserved
//! verbatim for human postmortem without blocking the pipeline. The sink is
//! an injected dependency rather than ambient global state so tests (and
//! embedders) can substitute an in-memory implementation.
//!
//! A dump failure is itself non-fatal: the pipeline is already on its
//! terminal-failure path, and losing the artefact must not mask the real
//! `UnrecoverableOutput` error. Implementations log and swallow I/O errors.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;

/// Write-only sink for raw model output that could not be repaired.
///
/// `Send + Sync` so a single sink can be shared across a batch run.
pub trait DumpSink: Send + Sync {
    /// Persist `raw` keyed by the document `identity` (typically the source
    /// file name). Best-effort: failures are logged, never propagated.
    fn dump(&self, identity: &str, raw: &str);
}

/// Directory-backed sink writing `{identity}_raw.txt` files.
pub struct FileDumpSink {
    dir: PathBuf,
}

impl FileDumpSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl DumpSink for FileDumpSink {
    fn dump(&self, identity: &str, raw: &str) {
        // Identity comes from a file name; strip separators in case it
        // carries a path component.
        let safe: String = identity
            .chars()
            .map(|c| if c == '/' || c == '\\' { '_' } else { c })
            .collect();
        let path = self.dir.join(format!("{safe}_raw.txt"));

        if let Err(e) = std::fs::create_dir_all(&self.dir) {
            warn!("could not create dump directory {}: {e}", self.dir.display());
            return;
        }
        match std::fs::write(&path, raw) {
            Ok(()) => warn!("unrecoverable output dumped to {}", path.display()),
            Err(e) => warn!("could not dump raw output to {}: {e}", path.display()),
        }
    }
}

/// In-memory sink for tests: records every `(identity, raw)` pair.
#[derive(Default)]
pub struct MemoryDumpSink {
    entries: Mutex<Vec<(String, String)>>,
}

impl MemoryDumpSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything dumped so far.
    pub fn entries(&self) -> Vec<(String, String)> {
        self.entries.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl DumpSink for MemoryDumpSink {
    fn dump(&self, identity: &str, raw: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push((identity.to_string(), raw.to_string()));
        }
    }
}

/// Sink that discards everything. Default when no dump directory is set.
pub struct NullDumpSink;

impl DumpSink for NullDumpSink {
    fn dump(&self, identity: &str, _raw: &str) {
        warn!("no dump sink configured; raw output for '{identity}' discarded");
    }
}
