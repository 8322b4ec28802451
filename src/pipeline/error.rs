//! Error types for pipeline handlers.

use std::error::Error;

/// Error type for message handlers.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// No handler registered for this topic.
    #[error("no handler for topic: {0}")]
    UnknownTopic(String),
    /// Payload decode / deserialization failed.
    #[error("decode failed: {0}")]
    DecodeFailed(String),
    /// Business logic rejected the message.
    #[error("rejected: {0}")]
    Rejected(String),
    /// Other error.
    #[error("handler error: {0}")]
    Other(Box<dyn Error + Send + Sync>),
}

impl From<serde_json::Error> for HandlerError {
    fn from(err: serde_json::Error) -> Self {
        HandlerError::DecodeFailed(err.to_string())
    }
}
