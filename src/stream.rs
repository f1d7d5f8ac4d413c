//! Streaming batch API: emit job outcomes as they complete.
//!
//! [`JobOrchestrator::run_batch`] waits for every job before returning a
//! [`crate::output::RunSummary`]. [`JobOrchestrator::outcome_stream`] yields
//! each [`JobOutcome`] as soon as its job reaches a terminal state, which
//! suits long worklists where the caller wants to report progress itself.
//! With `concurrency > 1` outcomes arrive in completion order, not worklist
//! order.
//!
//! Batch-level progress callbacks (`on_batch_start`, `on_batch_complete`)
//! are not fired by the stream; per-job callbacks are.

use crate::job::Job;
use crate::orchestrator::JobOrchestrator;
use crate::output::JobOutcome;
use futures::StreamExt;
use std::pin::Pin;
use tokio_stream::Stream;
use tokio_util::sync::CancellationToken;

/// A boxed stream of job outcomes.
pub type OutcomeStream = Pin<Box<dyn Stream<Item = JobOutcome> + Send>>;

impl JobOrchestrator {
    /// Process `jobs`, yielding each outcome as it is ready.
    ///
    /// Jobs not yet started when `cancel` fires are still yielded, marked
    /// `cancelled`, so the stream accounts for every job exactly once.
    pub fn outcome_stream(&self, jobs: Vec<Job>, cancel: CancellationToken) -> OutcomeStream {
        Box::pin(
            self.indexed_outcomes(jobs, cancel)
                .map(|(_, outcome)| outcome),
        )
    }
}
