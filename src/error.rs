//! Error types shared by the gateway, the monitor, and the broker adapters.

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

/// An error value shared between the component that raised it and every
/// party observing it through an error signal.
///
/// Cloning a `SharedError` clones the `Arc`, so an observer receives the
/// exact value the handler produced.
pub type SharedError = Arc<dyn Error + Send + Sync>;

/// Error type for broker client operations (produce, consume, admin).
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    /// Connection to the broker failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    /// The broker rejected the request.
    #[error("request rejected: {0}")]
    Rejected(String),
    /// Timeout waiting for the broker.
    #[error("broker timeout")]
    Timeout,
    /// The administrative connection was already released.
    #[error("administrative connection disconnected")]
    Disconnected,
    /// Other error.
    #[error("broker error: {0}")]
    Other(Box<dyn Error + Send + Sync>),
}

/// Error type for `emit_message` / `emit_retryable_message`.
#[derive(Debug, thiserror::Error)]
pub enum EmitError {
    /// The produce call itself failed; no signal wait was attempted.
    #[error("transport error: {0}")]
    Transport(#[source] BrokerError),
    /// The downstream handler raised. Carries the value published on the
    /// error signal.
    #[error("handler error: {0}")]
    Handler(SharedError),
    /// An administrative call failed while waiting for offset convergence.
    #[error("admin error: {0}")]
    Admin(#[source] BrokerError),
    /// The payload has no `key` field to correlate on.
    #[error("message for topic {topic} has no `key` field")]
    MissingKey { topic: String },
    /// The payload could not be serialized.
    #[error("encode failed: {0}")]
    Encode(#[from] serde_json::Error),
    /// The optional convergence deadline elapsed before every consumer
    /// group caught up. Never produced unless a deadline was configured.
    #[error("consumer groups on {topic} did not converge within {waited:?}")]
    ConvergenceDeadline { topic: String, waited: Duration },
}

impl EmitError {
    /// The handler error carried by an error signal, if this is one.
    pub fn handler_error(&self) -> Option<&SharedError> {
        match self {
            EmitError::Handler(err) => Some(err),
            _ => None,
        }
    }
}
