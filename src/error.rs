//! Error types for the Calliope generation engine
//!
//! This module provides comprehensive error handling using thiserror for
//! structured error definitions and anyhow for error propagation.
//!
//! Quality rejections are not errors: an attempt that scores below its
//! effective threshold is a normal state-machine transition recorded in the
//! learning store, and budget exhaustion surfaces as
//! [`GateOutcome::Exhausted`](crate::types::GateOutcome), never as an `Err`.

use thiserror::Error;

/// Main error type for Calliope operations
#[derive(Error, Debug)]
pub enum CalliopeError {
    /// Configuration error (malformed file, missing section)
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Base parameter outside its declared valid range; rejected at load
    /// time, never clamped
    #[error("Parameter '{name}' = {value} outside valid range [{min}, {max}]")]
    InvalidParameter {
        name: String,
        value: f64,
        min: f64,
        max: f64,
    },

    /// Content type with no configured defaults
    #[error("Unknown content type: {0}")]
    UnknownContentType(String),

    /// Retryable transport fault (timeout, unreachable, rate limited)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Fatal generation service error (bad credentials, malformed request)
    #[error("Generation service error: {0}")]
    Generation(String),

    /// Zero evaluators produced a result; infrastructure fault, distinct
    /// from a low score
    #[error("No evaluators available to score the candidate")]
    EvaluationUnavailable,

    /// Learning store operation failed
    #[error("Learning store error: {0}")]
    Database(String),

    /// Item cancelled before reaching a terminal outcome
    #[error("Generation cancelled for item: {0}")]
    Cancelled(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl CalliopeError {
    /// Whether a transport-level retry may resolve this error
    ///
    /// Retryable faults are bounded by their own transport-retry budget and
    /// never consume a quality-attempt slot.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CalliopeError::Transport(_) | CalliopeError::EvaluationUnavailable
        )
    }
}

/// Result type alias for Calliope operations
pub type Result<T> = std::result::Result<T, CalliopeError>;

/// Convert anyhow::Error to CalliopeError
impl From<anyhow::Error> for CalliopeError {
    fn from(err: anyhow::Error) -> Self {
        CalliopeError::Other(err.to_string())
    }
}
