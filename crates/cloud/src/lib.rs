//! Object storage access for finished conversion artifacts.
//!
//! The converter may upload its output to an S3-compatible bucket
//! (Cloudflare R2 in production). [`ObjectStore`] is the read seam the
//! artifact service uses; [`S3ObjectStore`] implements it with
//! `aws-sdk-s3`.

pub mod s3;

pub use s3::{ObjectStoreConfig, S3ObjectStore};

use async_trait::async_trait;

/// Errors from object storage.
#[derive(Debug, thiserror::Error)]
pub enum ObjectStoreError {
    #[error("Object not found: {bucket}/{key}")]
    NotFound { bucket: String, key: String },

    /// No bucket was given and no default bucket is configured.
    #[error("No bucket configured for object {0}")]
    MissingBucket(String),

    #[error("Object storage request failed: {0}")]
    Request(String),
}

/// Bytes and metadata of a stored object.
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

/// Read access to an object store.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch `key` from `bucket`, or from the default bucket when `None`.
    async fn get_object(&self, bucket: Option<&str>, key: &str)
        -> Result<StoredObject, ObjectStoreError>;
}
