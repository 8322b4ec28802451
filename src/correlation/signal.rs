//! Signal kinds and channel naming.

use std::fmt;

use crate::error::SharedError;

/// Payload delivered to subscribers. Success signals carry `None`; error
/// signals carry the handler's error.
pub type SignalPayload = Option<SharedError>;

/// The two signals a handler can raise for a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalKind {
    /// The handler finished the message.
    Success,
    /// The handler raised an error.
    Error,
}

impl SignalKind {
    /// Name of the channel carrying this signal for `key`.
    pub fn channel_name(self, key: &str) -> String {
        match self {
            SignalKind::Success => format!("awaitable emit {}", key),
            SignalKind::Error => format!("awaitable emit error {}", key),
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalKind::Success => write!(f, "success"),
            SignalKind::Error => write!(f, "error"),
        }
    }
}
