//! Progress-callback trait for batch conversion events.
//!
//! Inject an [`Arc<dyn BatchProgress>`] via
//! [`crate::config::ConversionConfigBuilder::progress_callback`] to receive
//! events as the batch driver works through a folder of source documents.
//!
//! # Why callbacks instead of channels?
//!
//! The callback approach is the least-invasive integration point: callers can
//! forward events to a channel, a WebSocket, a database record, or a terminal
//! progress bar — without the library knowing anything about how the host
//! application communicates. The trait is `Send + Sync` so a single callback
//! can be shared with the rest of the configuration.

use std::sync::Arc;

/// Called by the batch driver as it processes each source document.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
pub trait BatchProgress: Send + Sync {
    /// Called once before any document is converted.
    fn on_batch_start(&self, total_docs: usize) {
        let _ = total_docs;
    }

    /// Called just before a document's conversion begins.
    ///
    /// `identity` is the source file name.
    fn on_document_start(&self, index: usize, total_docs: usize, identity: &str) {
        let _ = (index, total_docs, identity);
    }

    /// Called when a document converts successfully.
    ///
    /// `question_count` is the number of questions in the persisted output.
    fn on_document_complete(
        &self,
        index: usize,
        total_docs: usize,
        identity: &str,
        question_count: usize,
    ) {
        let _ = (index, total_docs, identity, question_count);
    }

    /// Called when a document fails after all retries are exhausted.
    fn on_document_error(&self, index: usize, total_docs: usize, identity: &str, error: &str) {
        let _ = (index, total_docs, identity, error);
    }

    /// Called when a document is skipped without conversion (resume mode
    /// found existing output). Skipped documents still count towards
    /// `total_docs`.
    fn on_document_skipped(&self, index: usize, total_docs: usize, identity: &str) {
        let _ = (index, total_docs, identity);
    }

    /// Called once after all documents have been attempted.
    fn on_batch_complete(&self, total_docs: usize, converted: usize, failed: usize) {
        let _ = (total_docs, converted, failed);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopBatchProgress;

impl BatchProgress for NoopBatchProgress {}

/// Convenience alias matching the type stored in [`crate::config::ConversionConfig`].
pub type ProgressCallback = Arc<dyn BatchProgress>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct TrackingCallback {
        completes: AtomicUsize,
        errors: AtomicUsize,
    }

    impl BatchProgress for TrackingCallback {
        fn on_document_complete(
            &self,
            _index: usize,
            _total: usize,
            _identity: &str,
            _question_count: usize,
        ) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_document_error(&self, _index: usize, _total: usize, _identity: &str, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopBatchProgress;
        cb.on_batch_start(3);
        cb.on_document_start(1, 3, "chem_ss1.txt");
        cb.on_document_complete(1, 3, "chem_ss1.txt", 50);
        cb.on_document_error(2, 3, "physics_ss2.txt", "model timeout");
        cb.on_document_skipped(3, 3, "econ_ss3.txt");
        cb.on_batch_complete(3, 1, 1);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback {
            completes: AtomicUsize::new(0),
            errors: AtomicUsize::new(0),
        };
        tracker.on_document_complete(1, 2, "a.txt", 40);
        tracker.on_document_error(2, 2, "b.txt", "boom");
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: Arc<dyn BatchProgress> = Arc::new(NoopBatchProgress);
        cb.on_batch_start(10);
        cb.on_document_start(1, 10, "econ_ss3.txt");
    }
}
