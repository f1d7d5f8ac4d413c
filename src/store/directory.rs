use super::ResultSink;
use crate::error::StoreError;
use async_trait::async_trait;
use reqwest::Url;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

/// [`ResultSink`] that writes documents into a local directory.
///
/// Existing files are never overwritten: a clashing name gets a `-1`, `-2`,
/// … suffix. The returned reference is `<public_base_url>/<file name>` when
/// a base URL is configured (e.g. the directory is served or synced), and a
/// `file://` URL otherwise.
#[derive(Debug)]
pub struct DirectorySink {
    dir: PathBuf,
    public_base_url: Option<String>,
    name_lock: Mutex<()>,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            public_base_url: None,
            name_lock: Mutex::new(()),
        }
    }

    pub fn with_public_base_url(mut self, base: impl Into<String>) -> Self {
        let base = base.into();
        self.public_base_url = (!base.trim().is_empty()).then_some(base);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn free_path(&self, name: &str) -> Result<PathBuf, StoreError> {
        let (stem, ext) = match name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => (stem, format!(".{ext}")),
            _ => (name, String::new()),
        };
        let mut candidate = self.dir.join(name);
        let mut n = 0u32;
        while tokio::fs::try_exists(&candidate)
            .await
            .map_err(|e| StoreError::Io {
                path: candidate.clone(),
                source: e,
            })?
        {
            n += 1;
            candidate = self.dir.join(format!("{stem}-{n}{ext}"));
        }
        Ok(candidate)
    }

    fn reference_for(&self, path: &Path) -> Result<String, StoreError> {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        match &self.public_base_url {
            Some(base) => {
                let mut url = Url::parse(base).map_err(|e| StoreError::Unavailable {
                    reason: format!("invalid public base URL '{base}': {e}"),
                })?;
                url.path_segments_mut()
                    .map_err(|_| StoreError::Unavailable {
                        reason: format!("public base URL '{base}' cannot hold a path"),
                    })?
                    .pop_if_empty()
                    .push(&file_name);
                Ok(url.to_string())
            }
            None => {
                let absolute = std::path::absolute(path).map_err(|e| StoreError::Io {
                    path: path.to_path_buf(),
                    source: e,
                })?;
                Url::from_file_path(&absolute)
                    .map(|u| u.to_string())
                    .map_err(|_| StoreError::Unavailable {
                        reason: format!("cannot express {} as a file URL", absolute.display()),
                    })
            }
        }
    }
}

#[async_trait]
impl ResultSink for DirectorySink {
    async fn upload(&self, bytes: Vec<u8>, suggested_name: &str) -> Result<String, StoreError> {
        let io_err = |path: &Path, e| StoreError::Io {
            path: path.to_path_buf(),
            source: e,
        };
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| io_err(&self.dir, e))?;

        // Name choice and rename happen under one lock so concurrent uploads
        // with the same name cannot pick the same free slot.
        let _guard = self.name_lock.lock().await;
        let target = self.free_path(suggested_name).await?;
        let tmp_path = target.with_extension("part");
        tokio::fs::write(&tmp_path, &bytes)
            .await
            .map_err(|e| io_err(&tmp_path, e))?;
        tokio::fs::rename(&tmp_path, &target)
            .await
            .map_err(|e| io_err(&target, e))?;
        debug!("Stored {} bytes at {}", bytes.len(), target.display());

        self.reference_for(&target)
    }
}
