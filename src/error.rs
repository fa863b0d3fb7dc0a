//! Error types for the ticket enricher.

use std::time::Duration;

/// Top-level error type for the worker process.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Inference error: {0}")]
    Inference(#[from] InferenceError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Store call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },
}

impl DatabaseError {
    /// Connection, lock and timeout failures. Bad data stays bad.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Pool(_) | Self::Query(_) | Self::Timeout(_))
    }
}

/// Message queue transport errors.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Queue connection failed: {0}")]
    Connection(String),

    #[error("Queue {queue} setup failed: {reason}")]
    Setup { queue: String, reason: String },

    #[error("Consuming from {queue} failed: {reason}")]
    Consume { queue: String, reason: String },

    #[error("Ack of delivery {tag} failed: {reason}")]
    Ack { tag: u64, reason: String },

    #[error("Reject of delivery {tag} failed: {reason}")]
    Reject { tag: u64, reason: String },

    #[error("Subscription to {0} closed")]
    Closed(String),
}

/// Classification or embedding provider failures.
#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Provider {provider} timed out after {timeout:?}")]
    Timeout { provider: String, timeout: Duration },

    #[error("Embedding has {actual} dimensions, expected {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
}

impl InferenceError {
    /// Only transport failures. A malformed or mis-sized answer repeats.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RequestFailed { .. } | Self::Timeout { .. })
    }
}

/// Similarity search failure. Never fatal to a job.
#[derive(Debug, thiserror::Error)]
pub enum RecommendationError {
    #[error("Similarity search request failed: {0}")]
    RequestFailed(String),

    #[error("Invalid similarity search response: {0}")]
    InvalidResponse(String),

    #[error("Similarity search timed out after {0:?}")]
    Timeout(Duration),

    #[error("Similarity search store error: {0}")]
    Store(#[from] DatabaseError),
}

/// Errors that abort a single job.
///
/// Every variant ends in a negative acknowledgement of the delivery that
/// carried the job.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Malformed payload: {0}")]
    Decode(String),

    #[error("Invalid job: {0}")]
    Validation(String),

    #[error("Inference failed: {0}")]
    Inference(#[from] InferenceError),

    #[error("Persistence failed: {0}")]
    Persistence(#[from] DatabaseError),
}

impl PipelineError {
    /// Stable label for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Decode(_) => "decode_error",
            Self::Validation(_) => "validation_error",
            Self::Inference(_) => "inference_error",
            Self::Persistence(_) => "persistence_error",
        }
    }

    /// Whether redelivery could plausibly succeed.
    ///
    /// Payload problems and malformed provider answers are permanent.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Decode(_) | Self::Validation(_) => false,
            Self::Inference(e) => e.is_transient(),
            Self::Persistence(e) => e.is_transient(),
        }
    }
}

/// Result type alias for the worker.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_error_kinds() {
        assert_eq!(PipelineError::Decode("x".into()).kind(), "decode_error");
        assert_eq!(
            PipelineError::Validation("x".into()).kind(),
            "validation_error"
        );
        let inference = PipelineError::from(InferenceError::RequestFailed {
            provider: "classifier".into(),
            reason: "down".into(),
        });
        assert_eq!(inference.kind(), "inference_error");
        let persistence = PipelineError::from(DatabaseError::Query("locked".into()));
        assert_eq!(persistence.kind(), "persistence_error");
    }

    #[test]
    fn only_dependency_failures_are_transient() {
        assert!(!PipelineError::Decode("x".into()).is_transient());
        assert!(!PipelineError::Validation("x".into()).is_transient());
        assert!(PipelineError::from(DatabaseError::Timeout(Duration::from_secs(1))).is_transient());
        assert!(PipelineError::from(DatabaseError::Query("locked".into())).is_transient());
        assert!(
            PipelineError::from(InferenceError::RequestFailed {
                provider: "classifier".into(),
                reason: "connection refused".into(),
            })
            .is_transient()
        );
        assert!(
            PipelineError::from(InferenceError::Timeout {
                provider: "embedder".into(),
                timeout: Duration::from_secs(30),
            })
            .is_transient()
        );
    }

    #[test]
    fn malformed_answers_are_permanent() {
        assert!(
            !PipelineError::from(InferenceError::DimensionMismatch {
                expected: 384,
                actual: 3
            })
            .is_transient()
        );
        assert!(
            !PipelineError::from(InferenceError::InvalidResponse {
                provider: "classifier".into(),
                reason: "expected 3 scores, got 2".into(),
            })
            .is_transient()
        );
        assert!(
            !PipelineError::from(DatabaseError::Serialization("embedding".into())).is_transient()
        );
        assert!(
            !PipelineError::from(DatabaseError::NotFound {
                entity: "ticket".into(),
                id: "7".into(),
            })
            .is_transient()
        );
    }

    #[test]
    fn error_messages_carry_detail() {
        let err = PipelineError::Validation("missing description".into());
        assert_eq!(err.to_string(), "Invalid job: missing description");
        let top = Error::from(err);
        assert!(top.to_string().contains("missing description"));
    }
}
