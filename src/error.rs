use thiserror::Error;

/// Failures surfaced by the query path.
///
/// Language model failures are reported inside [`crate::models::Answer`] and never
/// leave `AnswerEngine::answer`; `LlmError` exists for the collaborator boundary and
/// for callers that talk to the model directly (health checks).
#[derive(Debug, Error)]
pub enum RagError {
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("embedding failed: {0}")]
    EmbeddingFailure(String),

    #[error("vector store failed: {0}")]
    StoreFailure(String),

    #[error("language model failed: {0}")]
    LlmError(String),

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl RagError {
    /// Caller errors are not worth retrying; everything else is an infrastructure
    /// failure the caller may retry with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::EmbeddingFailure(_) | Self::StoreFailure(_) | Self::LlmError(_))
    }
}

impl From<config::ConfigError> for RagError {
    fn from(e: config::ConfigError) -> Self {
        Self::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RagError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(!RagError::InvalidQuery("empty".into()).is_retryable());
        assert!(!RagError::DimensionMismatch { expected: 3, actual: 2 }.is_retryable());
        assert!(RagError::StoreFailure("down".into()).is_retryable());
        assert!(RagError::EmbeddingFailure("timeout".into()).is_retryable());
    }

    #[test]
    fn test_display_includes_detail() {
        let err = RagError::DimensionMismatch { expected: 384, actual: 768 };
        assert_eq!(err.to_string(), "embedding dimension mismatch: expected 384, got 768");
    }
}
