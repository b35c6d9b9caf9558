// Error types for the pipeline

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors that can occur while extracting, transforming or routing messages
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Provider API error (HTTP transport, 5xx, malformed payload)
    #[error("Provider error: {0}")]
    Provider(String),

    /// Provider rate limit hit; not retried, the job parks until `reset_at`
    #[error("Rate limit reached (reset at {reset_at:?})")]
    RateLimited { reset_at: Option<DateTime<Utc>> },

    /// Queue publish/consume error
    #[error("Queue error: {0}")]
    Queue(String),

    /// Relational store error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Transform-stage error
    #[error("Transform error: {0}")]
    Transform(String),

    /// Payload is missing required fields; the record is skipped, never retried
    #[error("Bad data: {0}")]
    BadData(String),

    /// Message type with no registered transformer
    #[error("Unknown message type: {0}")]
    UnknownMessageType(String),

    /// A fetch loop exceeded its wall-clock budget
    #[error("Operation timed out after {seconds}s")]
    Timeout { seconds: u64 },

    /// Worker was asked to stop
    #[error("Cancelled")]
    Cancelled,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl PipelineError {
    /// Create a provider error
    pub fn provider(msg: impl Into<String>) -> Self {
        PipelineError::Provider(msg.into())
    }

    /// Create a queue error
    pub fn queue(msg: impl Into<String>) -> Self {
        PipelineError::Queue(msg.into())
    }

    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        PipelineError::Storage(msg.into())
    }

    /// Create a transform error
    pub fn transform(msg: impl Into<String>) -> Self {
        PipelineError::Transform(msg.into())
    }

    /// Create a bad-data error
    pub fn bad_data(msg: impl Into<String>) -> Self {
        PipelineError::BadData(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        PipelineError::Configuration(msg.into())
    }

    /// Whether a failed message should be retried before dead-lettering.
    ///
    /// Rate limits are handled by parking the job schedule, bad data and
    /// unknown types are dropped, everything infrastructural is retryable.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PipelineError::Provider(_)
                | PipelineError::Queue(_)
                | PipelineError::Storage(_)
                | PipelineError::Transform(_)
                | PipelineError::Timeout { .. }
                | PipelineError::Internal(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(PipelineError::provider("boom").is_transient());
        assert!(PipelineError::queue("down").is_transient());
        assert!(PipelineError::storage("lost").is_transient());
        // Transform failures can be ordering races (entity not committed yet)
        assert!(PipelineError::transform("work item not found").is_transient());
        assert!(PipelineError::Timeout { seconds: 1800 }.is_transient());

        assert!(!PipelineError::RateLimited { reset_at: None }.is_transient());
        assert!(!PipelineError::bad_data("missing key").is_transient());
        assert!(!PipelineError::UnknownMessageType("x".into()).is_transient());
        assert!(!PipelineError::Cancelled.is_transient());
    }

    #[test]
    fn test_display_strings() {
        let err = PipelineError::bad_data("issue without key");
        assert_eq!(err.to_string(), "Bad data: issue without key");
    }
}
