//! Error types for the harvester.
//!
//! Uses the dual-error pattern: `HarvesterError` for library consumers
//! with detailed error context. Recoverable conditions never leave the
//! retry controller as errors; they are folded into page outcomes there.

use thiserror::Error;

/// Main error type for the harvester library.
#[derive(Debug, Error)]
pub enum HarvesterError {
    /// Configuration value rejected by validation.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// HTTP request failed (timeout, connection error, bad URL).
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Response body could not be decoded as the expected JSON.
    #[error("Malformed response body: {0}")]
    MalformedBody(String),

    /// The challenge solver could not produce a credential set.
    #[error("Failed to acquire credentials from {target_url}: {message}")]
    AcquisitionFailure { target_url: String, message: String },

    /// Writing an output row or file failed.
    #[error("Output error: {0}")]
    Output(#[from] csv::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The operator forced the run to stop without waiting for it.
    #[error("Harvest interrupted")]
    Interrupted,

    /// The blocking harvest task could not be joined.
    #[error("Harvest task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl From<serde_json::Error> for HarvesterError {
    fn from(e: serde_json::Error) -> Self {
        Self::MalformedBody(e.to_string())
    }
}

impl HarvesterError {
    /// Process exit code for a run that ended in this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Interrupted => crate::harvester::EXIT_CANCELLED,
            _ => 1,
        }
    }
}

/// Result type alias for harvester operations.
pub type Result<T> = std::result::Result<T, HarvesterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = HarvesterError::InvalidConfig("page size must be positive".to_string());
        assert_eq!(
            err.to_string(),
            "Invalid configuration: page size must be positive"
        );
    }

    #[test]
    fn test_acquisition_failure_display() {
        let err = HarvesterError::AcquisitionFailure {
            target_url: "https://example.org/consulta".to_string(),
            message: "solver exited with status 1".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Failed to acquire credentials from https://example.org/consulta: solver exited with status 1"
        );
    }

    #[test]
    fn test_json_error_becomes_malformed_body() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err = HarvesterError::from(json_err);
        assert!(matches!(err, HarvesterError::MalformedBody(_)));
        assert!(err.to_string().starts_with("Malformed response body"));
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(HarvesterError::Interrupted.exit_code(), 130);
        assert_eq!(
            HarvesterError::InvalidConfig("x".to_string()).exit_code(),
            1
        );
    }
}
