use thiserror::Error;

/// Errors produced by the limiter and its counter stores.
#[derive(Debug, Error)]
pub enum LimiterError {
    /// The counter store could not be reached or returned garbage.
    #[error("Counter store error: {0}")]
    Store(String),

    #[error("Wait for rate limit was cancelled")]
    Cancelled,

    #[error("Deadline exceeded while waiting for rate limit")]
    DeadlineExceeded,

    /// Limiter parameters are invalid. Raised at construction only.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl LimiterError {
    /// True for the terminal errors returned by the wait operations.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, LimiterError::Cancelled | LimiterError::DeadlineExceeded)
    }
}

impl From<redis::RedisError> for LimiterError {
    fn from(err: redis::RedisError) -> Self {
        LimiterError::Store(err.to_string())
    }
}

impl From<envconfig::Error> for LimiterError {
    fn from(err: envconfig::Error) -> Self {
        LimiterError::Configuration(err.to_string())
    }
}

impl From<validator::ValidationErrors> for LimiterError {
    fn from(err: validator::ValidationErrors) -> Self {
        LimiterError::Validation(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, LimiterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = LimiterError::Store("connection refused".to_string());
        assert_eq!(err.to_string(), "Counter store error: connection refused");

        let err = LimiterError::Validation("limit must be positive".to_string());
        assert_eq!(err.to_string(), "Validation error: limit must be positive");
    }

    #[test]
    fn test_cancellation_kinds() {
        assert!(LimiterError::Cancelled.is_cancellation());
        assert!(LimiterError::DeadlineExceeded.is_cancellation());
        assert!(!LimiterError::Store("boom".into()).is_cancellation());
    }
}
