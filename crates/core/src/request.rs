//! Inbound job creation request and its validation.
//!
//! [`CreateJobRequest`] is the raw client payload. [`CreateJobRequest::validate_input`]
//! turns it into a [`JobInput`] or a [`CoreError::Validation`]; nothing is
//! persisted for a request that fails here.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::CoreError;

/// Maximum number of include or exclude path filters per job.
pub const MAX_PATH_FILTERS: u64 = 100;

/// Requested artifact kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum OutputFormat {
    /// A zip archive with one markdown file per page.
    #[default]
    #[serde(rename = "archive", alias = "zip")]
    Archive,
    /// All pages merged into a single markdown document.
    #[serde(rename = "single-document", alias = "single_md")]
    SingleDocument,
}

impl OutputFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            OutputFormat::Archive => "archive",
            OutputFormat::SingleDocument => "single-document",
        }
    }

    /// Identifier understood by the external converter.
    pub fn converter_code(self) -> &'static str {
        match self {
            OutputFormat::Archive => "zip",
            OutputFormat::SingleDocument => "single_md",
        }
    }

    /// Content type used when the artifact source does not provide one.
    pub fn default_content_type(self) -> &'static str {
        match self {
            OutputFormat::Archive => "application/zip",
            OutputFormat::SingleDocument => "text/markdown",
        }
    }

    pub fn file_extension(self) -> &'static str {
        match self {
            OutputFormat::Archive => "zip",
            OutputFormat::SingleDocument => "md",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "archive" | "zip" => Ok(OutputFormat::Archive),
            "single-document" | "single_md" => Ok(OutputFormat::SingleDocument),
            other => Err(CoreError::Validation(format!(
                "Unsupported output format '{other}' (expected archive or single-document)"
            ))),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw `POST /api/jobs` payload.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateJobRequest {
    #[validate(
        length(min = 1, message = "URL is required"),
        url(message = "Invalid URL format")
    )]
    #[serde(default)]
    pub url: String,
    /// Absent means [`OutputFormat::Archive`].
    pub output_format: Option<String>,
    #[validate(length(max = MAX_PATH_FILTERS, message = "Too many include paths"))]
    pub paths_to_include: Option<Vec<String>>,
    #[validate(length(max = MAX_PATH_FILTERS, message = "Too many exclude paths"))]
    pub paths_to_exclude: Option<Vec<String>>,
}

/// Validated, immutable input attributes of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobInput {
    pub url: String,
    pub output_format: OutputFormat,
    #[serde(default)]
    pub paths_to_include: Vec<String>,
    #[serde(default)]
    pub paths_to_exclude: Vec<String>,
}

impl CreateJobRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn with_output_format(mut self, format: impl Into<String>) -> Self {
        self.output_format = Some(format.into());
        self
    }

    /// Validate the payload and normalize it into a [`JobInput`].
    ///
    /// The URL must be absolute, use `http` or `https` and carry a host.
    /// Blank path filters are dropped.
    pub fn validate_input(self) -> Result<JobInput, CoreError> {
        self.validate()
            .map_err(|e| CoreError::Validation(e.to_string()))?;

        let url = self.url.trim().to_string();
        let parsed = url::Url::parse(&url)
            .map_err(|_| CoreError::Validation("Invalid URL format".into()))?;
        if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
            return Err(CoreError::Validation(
                "URL must be an absolute http(s) address".into(),
            ));
        }

        let output_format = match self.output_format.as_deref() {
            None => OutputFormat::default(),
            Some(raw) => raw.parse()?,
        };

        Ok(JobInput {
            url,
            output_format,
            paths_to_include: clean_paths(self.paths_to_include),
            paths_to_exclude: clean_paths(self.paths_to_exclude),
        })
    }
}

impl JobInput {
    /// Host of the target site, used for default artifact filenames.
    pub fn host(&self) -> Option<String> {
        url::Url::parse(&self.url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
    }
}

fn clean_paths(paths: Option<Vec<String>>) -> Vec<String> {
    paths
        .unwrap_or_default()
        .into_iter()
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect()
}
