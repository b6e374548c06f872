//! Error types for the kfops core library.
//!
//! Uses `thiserror` for public API error types covering configuration,
//! pipeline API transport, and cleanup orchestration. Cleanup failures are
//! returned as [`CleanupError`] directly so the failing step stays visible.

use std::path::PathBuf;

/// Top-level error type for the kfops core library.
#[derive(Debug, thiserror::Error)]
pub enum KfopsError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Pipeline API error: {0}")]
    Api(#[from] ApiError),
}

/// Errors from configuration loading and connection discovery.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    #[error("Failed to read {what} from {path}: {source}")]
    ReadFile {
        what: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid endpoint '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("Invalid CA certificate at {path}: {reason}")]
    InvalidCaCert { path: PathBuf, reason: String },

    #[error("No endpoint configured and no namespace available for in-cluster discovery")]
    NoEndpoint,
}

/// Errors from the pipeline orchestration REST API.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Request to {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("Authentication rejected by pipeline API ({status})")]
    Unauthorized { status: u16 },

    #[error("Resource not found: {url}")]
    NotFound { url: String },

    #[error("HTTP {status} from {url}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    #[error("Invalid response from {url}: {message}")]
    Decode { url: String, message: String },

    #[error("Pipeline name '{name}' is ambiguous: {count} pipelines share it")]
    AmbiguousPipeline { name: String, count: usize },

    #[error("Pagination did not terminate after {pages} pages at {url}")]
    TooManyPages { url: String, pages: usize },

    #[error("Failed to build HTTP client: {0}")]
    Client(String),
}

/// A failure during cascading deletion, tagged with the step that failed.
#[derive(Debug, thiserror::Error)]
#[error("{step} failed: {source}")]
pub struct CleanupError {
    pub step: CleanupStep,
    #[source]
    pub source: ApiError,
}

impl CleanupError {
    pub fn new(step: CleanupStep, source: ApiError) -> Self {
        Self { step, source }
    }
}

/// Steps of a cleanup operation, used to report where it stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupStep {
    ResolvePipeline,
    ListVersions,
    DeleteVersion,
    DeletePipeline,
    ListExperiments,
    DeleteExperiment,
    ListRuns,
    DeleteRun,
}

impl std::fmt::Display for CleanupStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::ResolvePipeline => "Resolving pipeline id",
            Self::ListVersions => "Listing pipeline versions",
            Self::DeleteVersion => "Deleting pipeline version",
            Self::DeletePipeline => "Deleting pipeline",
            Self::ListExperiments => "Listing experiments",
            Self::DeleteExperiment => "Deleting experiment",
            Self::ListRuns => "Listing runs",
            Self::DeleteRun => "Deleting run",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cleanup_error_names_step() {
        let err = CleanupError::new(
            CleanupStep::DeleteVersion,
            ApiError::Status {
                url: "http://kfp/apis/v2beta1/pipelines/p1/versions/v1".into(),
                status: 500,
                body: "boom".into(),
            },
        );
        let msg = err.to_string();
        assert!(msg.starts_with("Deleting pipeline version failed"));
        assert!(msg.contains("500"));
    }

    #[test]
    fn test_kfops_error_from_api() {
        let err: KfopsError = ApiError::Unauthorized { status: 401 }.into();
        assert!(matches!(err, KfopsError::Api(ApiError::Unauthorized { .. })));
    }
}
