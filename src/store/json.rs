//! Worklist kept as a JSON array of rows.
//!
//! ```json
//! [
//!   { "id": "r1", "label": "INV-1", "source_ref": "https://…/a.pdf" },
//!   { "label": "INV-2", "source_ref": "https://…/b.pdf", "result_ref": "https://…" }
//! ]
//! ```
//!
//! Rows without a `source_ref` are not jobs and are never listed. Rows
//! without an `id` are addressed by their 1-based position in the array.
//! Unknown columns are preserved on write-back.

use super::RowStore;
use crate::error::StoreError;
use crate::job::{Job, JobId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoredRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(default)]
    label: String,
    #[serde(default)]
    source_ref: String,
    #[serde(default)]
    result_ref: String,
    #[serde(default)]
    status: String,
    #[serde(flatten)]
    extra: serde_json::Map<String, serde_json::Value>,
}

impl StoredRow {
    fn job_id(&self, index: usize) -> JobId {
        match self.id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => JobId::new(id),
            _ => JobId::new((index + 1).to_string()),
        }
    }
}

/// [`RowStore`] backed by a JSON file.
///
/// Each write re-reads the file, updates one row and replaces the file via
/// temp file + rename, so an interrupted run never leaves a truncated
/// worklist behind. Writes are serialised within the process.
#[derive(Debug)]
pub struct JsonRowStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonRowStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<Vec<StoredRow>, StoreError> {
        let raw = tokio::fs::read(&self.path)
            .await
            .map_err(|e| StoreError::Io {
                path: self.path.clone(),
                source: e,
            })?;
        serde_json::from_slice(&raw).map_err(|e| {
            StoreError::Malformed(format!("{}: {e}", self.path.display()))
        })
    }

    async fn save(&self, rows: &[StoredRow]) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(rows)
            .map_err(|e| StoreError::Malformed(e.to_string()))?;
        let io_err = |e| StoreError::Io {
            path: self.path.clone(),
            source: e,
        };

        let tmp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, &json).await.map_err(io_err)?;
        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .map_err(io_err)?;
        Ok(())
    }
}

#[async_trait]
impl RowStore for JsonRowStore {
    async fn list_jobs(&self) -> Result<Vec<Job>, StoreError> {
        let rows = self.load().await?;
        let jobs: Vec<Job> = rows
            .iter()
            .enumerate()
            .filter(|(_, row)| !row.source_ref.trim().is_empty())
            .map(|(idx, row)| Job {
                id: row.job_id(idx),
                source_ref: row.source_ref.trim().to_string(),
                label: row.label.clone(),
                result_ref: row.result_ref.clone(),
                status: row.status.clone(),
            })
            .collect();
        debug!(
            "Listed {} jobs from {} rows in {}",
            jobs.len(),
            rows.len(),
            self.path.display()
        );
        Ok(jobs)
    }

    async fn write_result(
        &self,
        id: &JobId,
        result_ref: &str,
        status: &str,
    ) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut rows = self.load().await?;
        let row = rows
            .iter_mut()
            .enumerate()
            .find(|(idx, row)| &row.job_id(*idx) == id)
            .map(|(_, row)| row)
            .ok_or_else(|| StoreError::UnknownJob {
                id: id.to_string(),
            })?;
        row.result_ref = result_ref.to_string();
        row.status = status.to_string();
        self.save(&rows).await
    }
}
