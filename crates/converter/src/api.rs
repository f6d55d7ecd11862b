//! REST client for the converter HTTP endpoints.
//!
//! Wraps task submission, status polling and artifact download using
//! [`reqwest`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_TYPE};

use crate::error::ConverterError;
use crate::messages::{ConversionRequest, StatusResponse, SubmitResponse};
use crate::{Converter, ConverterStatus, DownloadedFile};

/// HTTP client for one converter deployment.
#[derive(Clone)]
pub struct HttpConverter {
    client: reqwest::Client,
    api_url: String,
}

/// Non-2xx answer from the converter.
struct HttpFailure {
    status: u16,
    body: String,
}

impl HttpConverter {
    /// Create a client with a per-request `timeout`.
    ///
    /// * `api_url` - Base HTTP URL, e.g. `http://localhost:8000`.
    pub fn new(api_url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, api_url))
    }

    /// Create a client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, api_url: impl Into<String>) -> Self {
        let api_url = api_url.into().trim_end_matches('/').to_string();
        Self { client, api_url }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    // ---- private helpers ----

    /// Return the response unchanged on success, or its status and body
    /// text on failure.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, HttpFailure> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(HttpFailure {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    fn header(response: &reqwest::Response, name: reqwest::header::HeaderName) -> Option<String> {
        response
            .headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }
}

#[async_trait]
impl Converter for HttpConverter {
    /// `POST /api/convert`.
    async fn submit(&self, request: &ConversionRequest) -> Result<String, ConverterError> {
        let response = self
            .client
            .post(format!("{}/api/convert", self.api_url))
            .json(request)
            .send()
            .await
            .map_err(|e| ConverterError::Delegation {
                status: None,
                message: format!("Converter unreachable: {e}"),
            })?;

        let response = Self::ensure_success(response)
            .await
            .map_err(|f| ConverterError::Delegation {
                status: Some(f.status),
                message: format!("API error: {} - {}", f.status, f.body),
            })?;

        let body: SubmitResponse =
            response
                .json()
                .await
                .map_err(|e| ConverterError::Delegation {
                    status: None,
                    message: format!("Invalid submission response: {e}"),
                })?;

        tracing::debug!(task_id = %body.job_id, "Converter accepted submission");
        Ok(body.job_id)
    }

    /// `GET /api/job/{task_id}/status`.
    async fn poll(&self, task_id: &str) -> Result<ConverterStatus, ConverterError> {
        let response = self
            .client
            .get(format!("{}/api/job/{}/status", self.api_url, task_id))
            .send()
            .await
            .map_err(|e| ConverterError::TransientPoll(e.to_string()))?;

        let response = Self::ensure_success(response).await.map_err(|f| {
            ConverterError::TransientPoll(format!("status {}: {}", f.status, f.body))
        })?;

        let body: StatusResponse = response
            .json()
            .await
            .map_err(|e| ConverterError::TransientPoll(format!("invalid status body: {e}")))?;

        body.into_status(task_id)
    }

    /// `GET /api/download/{task_id}`.
    async fn download(&self, task_id: &str) -> Result<DownloadedFile, ConverterError> {
        let response = self
            .client
            .get(format!("{}/api/download/{}", self.api_url, task_id))
            .send()
            .await
            .map_err(|e| ConverterError::Download {
                status: None,
                message: e.to_string(),
            })?;

        let response = Self::ensure_success(response)
            .await
            .map_err(|f| ConverterError::Download {
                status: Some(f.status),
                message: f.body,
            })?;

        let content_type = Self::header(&response, CONTENT_TYPE);
        let filename =
            Self::header(&response, CONTENT_DISPOSITION).and_then(|v| disposition_filename(&v));

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ConverterError::Download {
                status: None,
                message: e.to_string(),
            })?;

        Ok(DownloadedFile {
            bytes: bytes.to_vec(),
            content_type,
            filename,
        })
    }
}

/// Extract `filename` from a `Content-Disposition` value, quoted or bare.
pub fn disposition_filename(value: &str) -> Option<String> {
    value.split(';').find_map(|part| {
        let (key, raw) = part.trim().split_once('=')?;
        if !key.trim().eq_ignore_ascii_case("filename") {
            return None;
        }
        let name = raw.trim().trim_matches('"').trim();
        (!name.is_empty()).then(|| name.to_string())
    })
}
