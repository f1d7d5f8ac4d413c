//! Row stores and result sinks: the orchestrator's view of the outside world.
//!
//! A [`RowStore`] lists the worklist and durably records each job's outcome.
//! A [`ResultSink`] receives compressed documents and hands back a stable
//! reference to them. Both are shared across concurrent jobs, so
//! implementations must tolerate concurrent calls.
//!
//! Shipped implementations:
//!
//! | Type | Backing |
//! |------|---------|
//! | [`JsonRowStore`]   | JSON array of rows on disk, rewritten atomically |
//! | [`DirectorySink`]  | files in an output directory, optional public base URL |
//! | [`MemoryRowStore`] | in-process rows, with call counters and failure injection |
//! | [`MemorySink`]     | in-process uploads |

mod directory;
mod json;
mod memory;

pub use directory::DirectorySink;
pub use json::JsonRowStore;
pub use memory::{MemoryRowStore, MemorySink};

use crate::error::StoreError;
use crate::job::{Job, JobId};
use async_trait::async_trait;

/// Source of jobs and destination of their outcomes.
#[async_trait]
pub trait RowStore: Send + Sync {
    /// All rows that are jobs, in worklist order.
    async fn list_jobs(&self) -> Result<Vec<Job>, StoreError>;

    /// Record `result_ref` and `status` for one job in a single update.
    ///
    /// Either both fields change or neither does.
    async fn write_result(
        &self,
        id: &JobId,
        result_ref: &str,
        status: &str,
    ) -> Result<(), StoreError>;
}

/// Destination for compressed documents.
#[async_trait]
pub trait ResultSink: Send + Sync {
    /// Store `bytes` and return a stable, dereferenceable reference to them.
    async fn upload(&self, bytes: Vec<u8>, suggested_name: &str) -> Result<String, StoreError>;
}
