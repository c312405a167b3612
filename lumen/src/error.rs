//! Error types for generation and answer synthesis

use std::time::Duration;
use thiserror::Error;

/// Failures of a generation backend, before or during token streaming
#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("backend returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("malformed stream: {0}")]
    MalformedStream(String),

    #[error("no generation backend available ({attempted} model(s) tried): {last_error}")]
    Unavailable { attempted: usize, last_error: String },

    #[error("generation timed out after {0:?}")]
    Timeout(Duration),

    #[error("generation aborted: {0}")]
    Aborted(String),
}

impl From<reqwest::Error> for GenerationError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            GenerationError::Status {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else {
            GenerationError::Transport(err.to_string())
        }
    }
}

/// Terminal error of a synthesized chunk stream
#[derive(Error, Debug)]
pub enum SynthesisError {
    #[error("generation failed: {0}")]
    Generation(#[from] GenerationError),

    #[error("failed to encode chunk: {0}")]
    Encoding(#[from] serde_json::Error),
}

impl SynthesisError {
    /// Short machine-readable code for the client-facing error frame
    pub fn code(&self) -> &'static str {
        match self {
            SynthesisError::Generation(GenerationError::Timeout(_)) => "generation_timeout",
            SynthesisError::Generation(GenerationError::Unavailable { .. }) => "backend_unavailable",
            SynthesisError::Generation(_) => "generation_failed",
            SynthesisError::Encoding(_) => "encoding_failed",
        }
    }
}

pub type Result<T> = std::result::Result<T, GenerationError>;
