//! Error types for Chatline

use thiserror::Error;

/// Engine error taxonomy
///
/// `NoAgentAvailable` and `EmptyQueue` are expected, recoverable capacity
/// conditions: the chat involved is always left in a valid, resumable state.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Chat not found")]
    ChatNotFound,

    #[error("User not found")]
    UserNotFound,

    #[error("No agent available")]
    NoAgentAvailable,

    #[error("Waiting queue is empty")]
    EmptyQueue,

    #[error("Chat is already assigned")]
    AlreadyAssigned,

    #[error("Chat has already ended")]
    ChatEnded,

    #[error("Database error: {0}")]
    Database(String),
}

impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!(error = ?err, "database error");
        CoreError::Database(err.to_string())
    }
}

/// Result type alias for engine operations
pub type CoreResult<T> = Result<T, CoreError>;
