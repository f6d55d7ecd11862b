//! JSON-file backed job store.
//!
//! The whole collection lives in one pretty-printed JSON object keyed by
//! job id. Every write rewrites the file atomically: the new document goes
//! to a sibling `*.tmp`, is fsynced, renamed over the target, and the
//! parent directory is fsynced so the rename itself is durable.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use omnidocs_core::job::Job;
use omnidocs_core::types::JobId;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};

use crate::store::{check_overwrite, newest_first, JobStore, StoreError};

#[derive(Debug)]
pub struct FileJobStore {
    path: PathBuf,
    jobs: RwLock<BTreeMap<JobId, Job>>,
    /// Serializes file rewrites so they land in the order the map changed.
    write_lock: Mutex<()>,
}

impl FileJobStore {
    /// Open the store at `path`, loading any existing document.
    ///
    /// A missing or empty file is an empty store. A file that does not
    /// parse is an error.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();

        let jobs = match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => BTreeMap::new(),
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        tracing::info!(path = %path.display(), jobs = jobs.len(), "Opened file job store");

        Ok(Self {
            path,
            jobs: RwLock::new(jobs),
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "job-store.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    async fn write_document(&self, bytes: &[u8]) -> std::io::Result<()> {
        let tmp = self.tmp_path();

        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&tmp, &self.path).await?;

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            // Not every platform can open a directory for syncing.
            if let Ok(dir) = tokio::fs::File::open(dir).await {
                if let Err(e) = dir.sync_all().await {
                    tracing::debug!(error = %e, "Directory fsync failed");
                }
            }
        }

        Ok(())
    }
}

#[async_trait]
impl JobStore for FileJobStore {
    async fn put(&self, job: &Job) -> Result<(), StoreError> {
        let _writer = self.write_lock.lock().await;

        let document = {
            let mut jobs = self.jobs.write().await;
            check_overwrite(jobs.get(&job.id), job)?;
            jobs.insert(job.id, job.clone());
            serde_json::to_vec_pretty(&*jobs)?
        };

        self.write_document(&document)
            .await
            .map_err(|e| StoreError::Persistence {
                id: job.id,
                message: format!("{}: {e}", self.path.display()),
            })
    }

    async fn get(&self, id: JobId) -> Result<Option<Job>, StoreError> {
        Ok(self.jobs.read().await.get(&id).cloned())
    }

    async fn list(&self) -> Result<Vec<Job>, StoreError> {
        let jobs = self.jobs.read().await.values().cloned().collect();
        Ok(newest_first(jobs))
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        match self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            Some(dir) => {
                tokio::fs::metadata(dir).await?;
                Ok(())
            }
            None => Ok(()),
        }
    }
}
