//! Error types shared across the crate.
//!
//! Orchestration code returns `anyhow::Result`; these typed errors sit at the
//! library boundaries where callers need to branch on the failure.

pub mod diagnostic;

use std::path::PathBuf;
use std::time::Duration;

pub use diagnostic::Diagnostic;

/// Batch config errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse YAML in {path}: {message}")]
    Parse { path: PathBuf, message: String },

    /// First error-level diagnostic found by validation.
    #[error("invalid config: {}", .0.message)]
    Invalid(Diagnostic),

    #[error("no data loader for dataset '{0}' (known: toy_data, vatex, video_storytelling)")]
    UnknownDataset(String),
}

impl ConfigError {
    /// Diagnostic view for reporting (validate command, run preflight).
    pub fn to_diagnostic(&self) -> Diagnostic {
        use diagnostic::codes;
        match self {
            Self::Read { path, .. } => Diagnostic::new(codes::E_PATH_NOT_FOUND, self.to_string())
                .with_context(serde_json::json!({ "file": path })),
            Self::Parse { path, .. } => Diagnostic::new(codes::E_CFG_PARSE, self.to_string())
                .with_context(serde_json::json!({ "file": path })),
            Self::Invalid(d) => d.clone(),
            Self::UnknownDataset(_) => Diagnostic::new(codes::E_DATASET_UNKNOWN, self.to_string()),
        }
    }
}

/// Errors from the LLM and embedding HTTP clients.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("missing API key: set {var}")]
    MissingApiKey { var: &'static str },

    #[error("rate limited: retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("server error (HTTP {status}): {message}")]
    Server { status: u16, message: String },

    #[error("request rejected (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("network error: {message}")]
    Network { message: String },

    #[error("invalid response: {message}")]
    InvalidResponse { message: String },
}

impl LlmError {
    /// Whether another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::Server { .. } | Self::Network { .. }
        )
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network {
            message: err.to_string(),
        }
    }
}

/// Why an LLM completion could not be turned into a reconstruction.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    #[error("unexpected shape: {0}")]
    Shape(String),

    #[error("expected {expected} clips, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("masked clip {index} was not filled")]
    Unfilled { index: usize },

    #[error("video {video_id}: clip {index} has timestamp {timestamp}, expected a positive number of seconds")]
    InvalidTimestamp {
        video_id: String,
        index: usize,
        timestamp: f64,
    },
}

impl ParseError {
    /// Short machine-friendly tag used as the skip reason.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::InvalidJson(_) => "invalid_json",
            Self::Shape(_) => "unexpected_shape",
            Self::LengthMismatch { .. } => "length_mismatch",
            Self::Unfilled { .. } => "unfilled_clip",
            Self::InvalidTimestamp { .. } => "invalid_timestamp",
        }
    }
}

/// Run tracking errors.
#[derive(Debug, thiserror::Error)]
pub enum TrackingError {
    #[error("Duplicate key: {key} v1={first} v2={second}")]
    DuplicateParam {
        key: String,
        first: String,
        second: String,
    },

    #[error("working tree at {path} has uncommitted changes; commit them or pass --allow-dirty")]
    DirtyWorkingTree { path: PathBuf },

    #[error("run not found: {0}")]
    RunNotFound(String),

    #[error("run id prefix '{prefix}' matches {count} runs; use more characters")]
    AmbiguousRunId { prefix: String, count: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(LlmError::RateLimited { retry_after: None }.is_retryable());
        assert!(LlmError::Server {
            status: 503,
            message: String::new()
        }
        .is_retryable());
        assert!(!LlmError::Rejected {
            status: 400,
            message: String::new()
        }
        .is_retryable());
        assert!(!LlmError::MissingApiKey {
            var: "OPENAI_API_KEY"
        }
        .is_retryable());
    }

    #[test]
    fn duplicate_param_message() {
        let e = TrackingError::DuplicateParam {
            key: "b".into(),
            first: "2".into(),
            second: "99".into(),
        };
        assert_eq!(e.to_string(), "Duplicate key: b v1=2 v2=99");
    }
}
