//! Error types for storage operations
//!
//! Every fallible call into a cache tier or a storage backend returns
//! [`StoreError`]. The tiered cache never surfaces tier-2/3 errors to its
//! callers; they are logged and counted, and the read degrades to a miss.

use std::time::Duration;
use thiserror::Error;

/// Main error type for storage operations
#[derive(Error, Debug)]
pub enum StoreError {
    /// Backend I/O failure (disk, network)
    #[error("Backend error: {0}")]
    Backend(String),

    /// Operation exceeded its time budget
    #[error("Operation timed out after {}ms: {operation}", budget.as_millis())]
    Timeout { budget: Duration, operation: String },

    /// Serialization/Deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A stored value decoded under a different schema tag than requested
    #[error("Schema mismatch: expected {expected}, found {found}")]
    SchemaMismatch { expected: String, found: String },

    /// Vector dimension disagreement between an embedding and an index
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Whether the error is a timeout (treated as a miss, eligible for one retry)
    pub fn is_timeout(&self) -> bool {
        matches!(self, StoreError::Timeout { .. })
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

/// Result type alias for storage operations
pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = StoreError::Backend("connection refused".to_string());
        assert_eq!(error.to_string(), "Backend error: connection refused");

        let timeout = StoreError::Timeout {
            budget: Duration::from_millis(250),
            operation: "tier2 get".to_string(),
        };
        assert!(timeout.to_string().contains("timed out after 250ms"));
        assert!(timeout.is_timeout());

        let mismatch = StoreError::SchemaMismatch {
            expected: "answer/v1".to_string(),
            found: "retrieval/v1".to_string(),
        };
        assert!(mismatch.to_string().contains("answer/v1"));
        assert!(!mismatch.is_timeout());
    }

    #[test]
    fn test_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let error: StoreError = json_err.into();
        assert!(matches!(error, StoreError::Serialization(_)));
    }
}
