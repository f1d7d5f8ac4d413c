//! Result types surfaced to callers.
//!
//! [`RunSummary`] is the single authoritative report of an orchestration
//! pass: every listed job appears in it exactly once.

use crate::job::{JobId, JobState};
use serde::{Deserialize, Serialize};

/// One trial of the size-budget search. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompressionAttempt {
    pub quality: f32,
    pub size_bytes: u64,
}

/// What the compressor settled on for a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompressionReport {
    /// Accepted quality parameter.
    pub quality: f32,
    /// Effective raster resolution at `quality`.
    pub dpi: u32,
    /// JPEG quality at `quality`.
    pub jpeg_quality: u8,
    pub final_size_bytes: u64,
    pub attempts: Vec<CompressionAttempt>,
}

impl CompressionReport {
    /// Status text written back for a successfully compressed job.
    pub fn status_line(&self) -> String {
        format!(
            "COMPRESSED q={:.2} dpi={} jpeg={} size={} trials={}",
            self.quality,
            self.dpi,
            self.jpeg_quality,
            self.final_size_bytes,
            self.attempts.len()
        )
    }
}

/// A compressed document ready to upload.
#[derive(Debug, Clone)]
pub struct PressedDocument {
    pub bytes: Vec<u8>,
    pub page_count: usize,
    pub report: CompressionReport,
}

/// How a single job ended.
///
/// `state` is terminal (`Skipped`, `Done`, `Failed`) for every job that was
/// dequeued; jobs left untouched by cancellation are reported with
/// `cancelled = true` and state `Pending`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobOutcome {
    pub job_id: JobId,
    pub label: String,
    pub state: JobState,
    #[serde(default)]
    pub cancelled: bool,
    /// Result reference written for `Done` jobs.
    pub result_ref: Option<String>,
    /// Status text written back (or the reason for a skip/cancel).
    pub status: String,
    pub compression: Option<CompressionReport>,
    pub duration_ms: u64,
}

/// Label and cause of one failed job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureReport {
    pub job_id: JobId,
    pub label: String,
    pub reason: String,
}

/// Aggregate of one orchestration pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: usize,
    pub done: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Jobs never dequeued because the run was cancelled.
    pub cancelled: usize,
    pub failures: Vec<FailureReport>,
    pub outcomes: Vec<JobOutcome>,
    pub duration_ms: u64,
}

impl RunSummary {
    /// Fold a list of outcomes into a summary. Outcomes may arrive in any
    /// order; they are kept in the order given.
    pub fn from_outcomes(outcomes: Vec<JobOutcome>, duration_ms: u64) -> Self {
        let mut summary = RunSummary {
            total: outcomes.len(),
            duration_ms,
            ..Default::default()
        };
        for o in &outcomes {
            if o.cancelled {
                summary.cancelled += 1;
                continue;
            }
            match o.state {
                JobState::Done => summary.done += 1,
                JobState::Skipped => summary.skipped += 1,
                JobState::Failed => {
                    summary.failed += 1;
                    summary.failures.push(FailureReport {
                        job_id: o.job_id.clone(),
                        label: o.label.clone(),
                        reason: o.status.clone(),
                    });
                }
                JobState::Pending | JobState::Running => summary.cancelled += 1,
            }
        }
        summary.outcomes = outcomes;
        summary
    }

    /// Outcome for a given job id, if it was part of this run.
    pub fn outcome(&self, id: &JobId) -> Option<&JobOutcome> {
        self.outcomes.iter().find(|o| &o.job_id == id)
    }

    pub fn is_clean(&self) -> bool {
        self.failed == 0 && self.cancelled == 0
    }
}
