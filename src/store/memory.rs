use super::{ResultSink, RowStore};
use crate::error::StoreError;
use crate::job::{Job, JobId};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// In-process [`RowStore`]. Counts calls and can be told to fail.
#[derive(Debug, Default)]
pub struct MemoryRowStore {
    jobs: Mutex<Vec<Job>>,
    unavailable: bool,
    failing_writes: HashSet<JobId>,
    list_calls: AtomicUsize,
    write_calls: AtomicUsize,
}

impl MemoryRowStore {
    pub fn new(jobs: Vec<Job>) -> Self {
        Self {
            jobs: Mutex::new(jobs),
            ..Default::default()
        }
    }

    /// A store whose `list_jobs` always fails.
    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Default::default()
        }
    }

    /// Make every write-back for `id` fail.
    pub fn fail_writes_for(mut self, id: impl Into<String>) -> Self {
        self.failing_writes.insert(JobId::new(id));
        self
    }

    /// Snapshot of the current rows.
    pub fn jobs(&self) -> Vec<Job> {
        self.rows().clone()
    }

    pub fn job(&self, id: &JobId) -> Option<Job> {
        self.rows().iter().find(|j| &j.id == id).cloned()
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn write_calls(&self) -> usize {
        self.write_calls.load(Ordering::SeqCst)
    }

    fn rows(&self) -> std::sync::MutexGuard<'_, Vec<Job>> {
        // A panic while holding the lock leaves plain data behind; keep going.
        self.jobs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl RowStore for MemoryRowStore {
    async fn list_jobs(&self) -> Result<Vec<Job>, StoreError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.unavailable {
            return Err(StoreError::Unavailable {
                reason: "memory store configured as unavailable".into(),
            });
        }
        Ok(self.jobs())
    }

    async fn write_result(
        &self,
        id: &JobId,
        result_ref: &str,
        status: &str,
    ) -> Result<(), StoreError> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_writes.contains(id) {
            return Err(StoreError::Unavailable {
                reason: format!("write-back for '{id}' rejected"),
            });
        }
        let mut rows = self.rows();
        let job = rows
            .iter_mut()
            .find(|j| &j.id == id)
            .ok_or_else(|| StoreError::UnknownJob { id: id.to_string() })?;
        job.result_ref = result_ref.to_string();
        job.status = status.to_string();
        Ok(())
    }
}

/// In-process [`ResultSink`]. References look like `memory://<n>/<name>`.
#[derive(Debug, Default)]
pub struct MemorySink {
    uploads: Mutex<Vec<(String, Vec<u8>)>>,
    failing: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink whose uploads always fail.
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Default::default()
        }
    }

    /// `(suggested name, bytes)` of every successful upload, in order.
    pub fn uploads(&self) -> Vec<(String, Vec<u8>)> {
        self.uploads
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn upload_count(&self) -> usize {
        self.uploads
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

#[async_trait]
impl ResultSink for MemorySink {
    async fn upload(&self, bytes: Vec<u8>, suggested_name: &str) -> Result<String, StoreError> {
        if self.failing {
            return Err(StoreError::Unavailable {
                reason: "memory sink configured as failing".into(),
            });
        }
        let mut uploads = self
            .uploads
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        uploads.push((suggested_name.to_string(), bytes));
        Ok(format!("memory://{}/{}", uploads.len(), suggested_name))
    }
}
