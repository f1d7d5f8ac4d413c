//! Progress-callback trait for per-job batch events.
//!
//! Inject an [`Arc<dyn BatchProgressCallback>`] via
//! [`crate::config::BatchConfigBuilder::progress_callback`] to receive
//! events as the orchestrator works through the worklist. Callers can
//! forward them to a terminal progress bar, a channel or a log sink without
//! the library knowing how the host communicates.
//!
//! # Example
//!
//! ```rust
//! use a4squeeze::{BatchConfig, BatchProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     done: AtomicUsize,
//! }
//!
//! impl BatchProgressCallback for CountingCallback {
//!     fn on_job_complete(&self, label: &str, result_ref: &str, size_bytes: u64) {
//!         self.done.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{label}: {size_bytes} bytes → {result_ref}");
//!     }
//! }
//!
//! let cb = Arc::new(CountingCallback { done: AtomicUsize::new(0) });
//! let config = BatchConfig::builder()
//!     .progress_callback(cb as Arc<dyn BatchProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the orchestrator as it processes each job.
///
/// With `concurrency > 1` the per-job methods may be called concurrently
/// from different tasks, so implementations must synchronise shared state.
/// All methods default to no-ops.
pub trait BatchProgressCallback: Send + Sync {
    /// Called once before any job is dequeued.
    fn on_batch_start(&self, total_jobs: usize) {
        let _ = total_jobs;
    }

    /// Called when a job enters the `Running` state.
    fn on_job_start(&self, label: &str) {
        let _ = label;
    }

    /// Called when a job is skipped because it already has a result.
    fn on_job_skipped(&self, label: &str) {
        let _ = label;
    }

    /// Called when a job reaches `Done`.
    fn on_job_complete(&self, label: &str, result_ref: &str, size_bytes: u64) {
        let _ = (label, result_ref, size_bytes);
    }

    /// Called when a job reaches `Failed`.
    fn on_job_error(&self, label: &str, error: &str) {
        let _ = (label, error);
    }

    /// Called once after every job has been accounted for.
    fn on_batch_complete(&self, done: usize, skipped: usize, failed: usize) {
        let _ = (done, skipped, failed);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl BatchProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::BatchConfig`].
pub type ProgressCallback = Arc<dyn BatchProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        starts: AtomicUsize,
        skips: AtomicUsize,
        completes: AtomicUsize,
        errors: AtomicUsize,
    }

    impl BatchProgressCallback for TrackingCallback {
        fn on_job_start(&self, _label: &str) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_job_skipped(&self, _label: &str) {
            self.skips.fetch_add(1, Ordering::SeqCst);
        }

        fn on_job_complete(&self, _label: &str, _result_ref: &str, _size: u64) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_job_error(&self, _label: &str, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_batch_start(3);
        cb.on_job_start("INV-1");
        cb.on_job_skipped("INV-2");
        cb.on_job_complete("INV-1", "file:///tmp/INV-1.pdf", 42);
        cb.on_job_error("INV-3", "fetch failed");
        cb.on_batch_complete(1, 1, 1);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();
        tracker.on_job_start("a");
        tracker.on_job_complete("a", "ref", 1);
        tracker.on_job_skipped("b");
        tracker.on_job_start("c");
        tracker.on_job_error("c", "boom");

        assert_eq!(tracker.starts.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.skips.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_batch_start(10);
        cb.on_job_start("x");
    }
}
