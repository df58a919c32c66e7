//! Error types for the conversational pipeline.

use agentbrain_core::error::BrainError;

/// Errors that abort a turn.
///
/// Generation failures never appear here: each stage has a defined
/// substitute output, so only invalid input and store failures surface.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("message cannot be empty")]
    EmptyMessage,
    #[error("message exceeds maximum length of {0} characters")]
    MessageTooLong(usize),
    #[error("storage error: {0}")]
    StorageError(String),
}

impl From<BrainError> for ChatError {
    fn from(err: BrainError) -> Self {
        ChatError::StorageError(err.to_string())
    }
}
