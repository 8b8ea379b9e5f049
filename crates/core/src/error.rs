//! Error types shared across the system

use thiserror::Error;

/// Base error type for the entire print pipeline
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PrintError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("queue is at maximum capacity")]
    QueueFull,

    #[error("printer unavailable: {0}")]
    UnavailablePrinter(String),

    #[error("circuit breaker open for printer '{0}'")]
    BreakerOpen(String),

    #[error("renderer unavailable: {0}")]
    RendererUnavailable(String),

    #[error("render timed out after {0} ms")]
    RenderTimeout(u64),

    #[error("render failed: {0}")]
    RenderFailed(String),

    #[error("spool failed: {0}")]
    SpoolFailed(String),

    #[error("processing deadline exceeded")]
    ProcessingTimeout,

    #[error("cancelled during shutdown")]
    Cancelled,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl PrintError {
    pub fn invalid_state_transition(from: &str, to: &str) -> Self {
        Self::InvalidStateTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Whether the queue may re-admit a job that failed with this error.
    ///
    /// Printer-unavailability, breaker rejections, hard deadlines and
    /// shutdown cancellations are never retried; transient render/spool
    /// failures are.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PrintError::RendererUnavailable(_)
                | PrintError::RenderTimeout(_)
                | PrintError::RenderFailed(_)
                | PrintError::SpoolFailed(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, PrintError>;
