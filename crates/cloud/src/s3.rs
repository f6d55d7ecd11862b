use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_credential_types::Credentials;
use aws_sdk_s3::Client;

use crate::{ObjectStore, ObjectStoreError, StoredObject};

/// Region used for R2, which ignores it but requires one to be set.
const R2_REGION: &str = "auto";

/// Connection settings for an S3-compatible store.
///
/// Unset credentials and region fall back to the standard AWS provider
/// chain (environment, profile, instance metadata).
#[derive(Debug, Clone, Default)]
pub struct ObjectStoreConfig {
    pub bucket: String,
    pub endpoint_url: Option<String>,
    pub region: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    /// Cloudflare account id; implies the R2 endpoint when no explicit
    /// endpoint is given.
    pub r2_account_id: Option<String>,
}

impl ObjectStoreConfig {
    /// Endpoint to talk to, if not plain AWS S3.
    pub fn resolved_endpoint(&self) -> Option<String> {
        self.endpoint_url.clone().or_else(|| {
            self.r2_account_id
                .as_ref()
                .map(|id| format!("https://{id}.r2.cloudflarestorage.com"))
        })
    }

    pub fn resolved_region(&self) -> Option<String> {
        self.region.clone().or_else(|| {
            self.r2_account_id
                .as_ref()
                .map(|_| R2_REGION.to_string())
        })
    }
}

/// [`ObjectStore`] backed by `aws-sdk-s3`.
#[derive(Clone)]
pub struct S3ObjectStore {
    client: Client,
    default_bucket: String,
}

impl S3ObjectStore {
    pub async fn from_config(config: &ObjectStoreConfig) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = config.resolved_region() {
            loader = loader.region(Region::new(region));
        }
        if let (Some(access_key), Some(secret_key)) =
            (&config.access_key_id, &config.secret_access_key)
        {
            loader = loader.credentials_provider(Credentials::new(
                access_key,
                secret_key,
                None,
                None,
                "omnidocs-env",
            ));
        }
        let shared = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if let Some(endpoint) = config.resolved_endpoint() {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        tracing::info!(bucket = %config.bucket, "Configured object store");

        Self {
            client: Client::from_conf(builder.build()),
            default_bucket: config.bucket.clone(),
        }
    }

    pub fn with_client(client: Client, default_bucket: impl Into<String>) -> Self {
        Self {
            client,
            default_bucket: default_bucket.into(),
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn get_object(
        &self,
        bucket: Option<&str>,
        key: &str,
    ) -> Result<StoredObject, ObjectStoreError> {
        let bucket = bucket
            .filter(|b| !b.is_empty())
            .unwrap_or(self.default_bucket.as_str());
        if bucket.is_empty() {
            return Err(ObjectStoreError::MissingBucket(key.to_string()));
        }

        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().is_some_and(|se| se.is_no_such_key()) {
                    ObjectStoreError::NotFound {
                        bucket: bucket.to_string(),
                        key: key.to_string(),
                    }
                } else {
                    ObjectStoreError::Request(format!("s3://{bucket}/{key}: {e}"))
                }
            })?;

        let content_type = response.content_type().map(str::to_string);
        let bytes = response
            .body
            .collect()
            .await
            .map_err(|e| ObjectStoreError::Request(format!("reading s3://{bucket}/{key}: {e}")))?
            .into_bytes()
            .to_vec();

        Ok(StoredObject {
            bytes,
            content_type,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_endpoint_wins_over_r2_account() {
        let config = ObjectStoreConfig {
            bucket: "docs".into(),
            endpoint_url: Some("http://localhost:9000".into()),
            r2_account_id: Some("acct".into()),
            ..Default::default()
        };
        assert_eq!(config.resolved_endpoint().as_deref(), Some("http://localhost:9000"));
    }

    #[test]
    fn r2_account_implies_endpoint_and_region() {
        let config = ObjectStoreConfig {
            bucket: "docs".into(),
            r2_account_id: Some("acct".into()),
            ..Default::default()
        };
        assert_eq!(
            config.resolved_endpoint().as_deref(),
            Some("https://acct.r2.cloudflarestorage.com")
        );
        assert_eq!(config.resolved_region().as_deref(), Some("auto"));
    }

    #[test]
    fn plain_s3_uses_provider_chain() {
        let config = ObjectStoreConfig {
            bucket: "docs".into(),
            ..Default::default()
        };
        assert!(config.resolved_endpoint().is_none());
        assert!(config.resolved_region().is_none());
    }
}
