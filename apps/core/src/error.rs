use std::io;
use thiserror::Error;

use crate::brain::LoadError;

/// Application-wide error type, consolidating all possible errors into a single enum.
#[derive(Debug, Error)]
pub enum AppError {
    /// The knowledge base could not be read or failed validation. Fatal at startup.
    #[error("Knowledge base error: {0}")]
    Load(#[from] LoadError),

    /// The incoming message is empty or too long. Recovered inside the pipeline.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A session stayed locked by another turn for longer than the configured bound.
    #[error("Session lock timed out: {0}")]
    SessionLockTimeout(String),

    /// Represents errors originating from the conversation log database.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Represents standard input/output errors.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Represents data validation errors (e.g., invalid input format).
    #[error("Validation error: {0}")]
    Validation(String),

    /// Represents configuration-related errors (e.g., unparsable environment variables).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Represents unexpected internal errors that indicate a bug.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<tokio::time::error::Elapsed> for AppError {
    fn from(err: tokio::time::error::Elapsed) -> Self {
        AppError::SessionLockTimeout(format!("Operation timed out: {}", err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Validation(format!("JSON error: {}", err))
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(format!("Validation errors: {}", err))
    }
}

impl From<chrono::ParseError> for AppError {
    fn from(err: chrono::ParseError) -> Self {
        AppError::Validation(format!("Date parse error: {}", err))
    }
}

impl AppError {
    /// Errors the pipeline absorbs and degrades to a handoff reply instead of surfacing.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, AppError::InvalidInput(_) | AppError::SessionLockTimeout(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_classification() {
        assert!(AppError::InvalidInput("empty".into()).is_recoverable());
        assert!(AppError::SessionLockTimeout("s1".into()).is_recoverable());
        assert!(!AppError::Config("bad".into()).is_recoverable());
        assert!(!AppError::Load(LoadError::EmptyKeywords("fees".into())).is_recoverable());
    }

    #[test]
    fn test_load_error_message_is_wrapped() {
        let err: AppError = LoadError::DuplicateTopic("fees".into()).into();
        assert!(err.to_string().contains("duplicate topic id 'fees'"));
    }
}
