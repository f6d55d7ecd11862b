//! Artifact retrieval for completed jobs.

use std::sync::Arc;

use omnidocs_cloud::{ObjectStore, ObjectStoreError};
use omnidocs_converter::{Converter, ConverterError};
use omnidocs_core::job::{ArtifactRef, Job, JobStatus};
use omnidocs_core::request::OutputFormat;
use omnidocs_core::types::JobId;
use omnidocs_db::{JobStore, StoreError};

/// A downloadable artifact.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub bytes: Vec<u8>,
    pub content_type: String,
    pub filename: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("Job {0} not found")]
    NotFound(JobId),

    #[error("Job {id} is not ready for download (status: {status})")]
    NotReady { id: JobId, status: JobStatus },

    /// The job completed but records nowhere to fetch the artifact from.
    #[error("No artifact source available for job {0}")]
    Unavailable(JobId),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Converter(#[from] ConverterError),

    #[error(transparent)]
    ObjectStore(#[from] ObjectStoreError),
}

/// Resolves completed jobs to artifact bytes.
#[derive(Clone)]
pub struct ArtifactService {
    store: Arc<dyn JobStore>,
    converter: Arc<dyn Converter>,
    objects: Option<Arc<dyn ObjectStore>>,
}

/// Where the bytes came from, before naming and typing.
struct Fetched {
    bytes: Vec<u8>,
    content_type: Option<String>,
    filename: Option<String>,
}

impl ArtifactService {
    pub fn new(
        store: Arc<dyn JobStore>,
        converter: Arc<dyn Converter>,
        objects: Option<Arc<dyn ObjectStore>>,
    ) -> Self {
        Self {
            store,
            converter,
            objects,
        }
    }

    /// Fetch the artifact of job `id`.
    ///
    /// `format` overrides the job's own output format when choosing the
    /// fallback content type and filename.
    pub async fn fetch(
        &self,
        id: JobId,
        format: Option<OutputFormat>,
    ) -> Result<Artifact, ArtifactError> {
        let job = self.store.get(id).await?.ok_or(ArtifactError::NotFound(id))?;
        if job.status != JobStatus::Completed {
            return Err(ArtifactError::NotReady {
                id,
                status: job.status,
            });
        }

        let format = format.unwrap_or(job.input.output_format);
        let fetched = self.fetch_bytes(&job).await?;

        let content_type = fetched
            .content_type
            .filter(|ct| !ct.is_empty())
            .unwrap_or_else(|| format.default_content_type().to_string());
        let filename = fetched
            .filename
            .unwrap_or_else(|| default_filename(&job, format));

        tracing::debug!(job_id = %id, filename = %filename, bytes = fetched.bytes.len(), "Artifact fetched");

        Ok(Artifact {
            bytes: fetched.bytes,
            content_type,
            filename,
        })
    }

    async fn fetch_bytes(&self, job: &Job) -> Result<Fetched, ArtifactError> {
        match (&job.artifact, &self.objects) {
            (Some(ArtifactRef::Object { bucket, key }), Some(objects)) => {
                let object = objects.get_object(bucket.as_deref(), key).await?;
                Ok(Fetched {
                    bytes: object.bytes,
                    content_type: object.content_type,
                    filename: key_filename(key),
                })
            }
            (Some(ArtifactRef::Converter { task_id }), _) => self.download(task_id).await,
            _ => match &job.converter_task_id {
                Some(task_id) => self.download(task_id).await,
                None => Err(ArtifactError::Unavailable(job.id)),
            },
        }
    }

    async fn download(&self, task_id: &str) -> Result<Fetched, ArtifactError> {
        let file = self.converter.download(task_id).await?;
        Ok(Fetched {
            bytes: file.bytes,
            content_type: file.content_type,
            filename: file.filename,
        })
    }
}

/// Last path segment of an object key.
fn key_filename(key: &str) -> Option<String> {
    key.rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
        .map(str::to_string)
}

/// `{host}-docs.{ext}`, e.g. `docs.example.com-docs.zip`.
fn default_filename(job: &Job, format: OutputFormat) -> String {
    let host = job.input.host().unwrap_or_else(|| "site".to_string());
    format!("{host}-docs.{}", format.file_extension())
}
