//! Jobs and their lifecycle.
//!
//! A [`Job`] is one row of the worklist. Its lifecycle is an explicit state
//! machine rather than a scattering of empty-string checks:
//!
//! ```text
//! Pending ──AlreadyProcessed──▶ Skipped
//!    │
//!    └──Started──▶ Running ──Completed──▶ Done
//!                     │
//!                     └──Errored──▶ Failed
//! ```
//!
//! `Skipped`, `Done` and `Failed` are terminal. Whether a job is skipped is
//! decided solely by [`Job::eligibility`]: a non-empty result reference means
//! a previous run already finished it.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identifier of a row inside its [`crate::store::RowStore`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// One document job as materialised from the row store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    /// Where to fetch the source document from.
    pub source_ref: String,
    /// Human identifier, e.g. an invoice number. Used for the upload name.
    pub label: String,
    /// Durable reference to the compressed result; empty until done.
    #[serde(default)]
    pub result_ref: String,
    /// Free-text outcome of the last attempt.
    #[serde(default)]
    pub status: String,
}

/// Outcome of the skip policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
    /// No result reference yet: run the pipeline.
    Eligible,
    /// A result reference is present: never touch this job again.
    AlreadyProcessed,
}

impl Job {
    pub fn new(
        id: impl Into<String>,
        label: impl Into<String>,
        source_ref: impl Into<String>,
    ) -> Self {
        Self {
            id: JobId::new(id),
            source_ref: source_ref.into(),
            label: label.into(),
            result_ref: String::new(),
            status: String::new(),
        }
    }

    pub fn with_result_ref(mut self, result_ref: impl Into<String>) -> Self {
        self.result_ref = result_ref.into();
        self
    }

    /// The skip policy. Whitespace-only references count as empty.
    pub fn eligibility(&self) -> Eligibility {
        if self.result_ref.trim().is_empty() {
            Eligibility::Eligible
        } else {
            Eligibility::AlreadyProcessed
        }
    }

    /// Label for logs: the job label, or its id when the label is blank.
    pub fn display_name(&self) -> &str {
        let label = self.label.trim();
        if label.is_empty() {
            self.id.as_str()
        } else {
            label
        }
    }
}

/// Lifecycle state of a job within one orchestration pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Running,
    Skipped,
    Done,
    Failed,
}

/// Events that drive [`JobState`] transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobEvent {
    AlreadyProcessed,
    Started,
    Completed,
    Errored,
}

impl JobState {
    /// Apply `event`, returning the next state or `None` when the transition
    /// is not part of the lifecycle.
    pub fn on(self, event: JobEvent) -> Option<JobState> {
        match (self, event) {
            (JobState::Pending, JobEvent::AlreadyProcessed) => Some(JobState::Skipped),
            (JobState::Pending, JobEvent::Started) => Some(JobState::Running),
            (JobState::Running, JobEvent::Completed) => Some(JobState::Done),
            (JobState::Running, JobEvent::Errored) => Some(JobState::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Skipped | JobState::Done | JobState::Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobState::Pending => "pending",
            JobState::Running => "running",
            JobState::Skipped => "skipped",
            JobState::Done => "done",
            JobState::Failed => "failed",
        };
        f.write_str(s)
    }
}
