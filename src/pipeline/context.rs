//! Context passed to message handlers.
//!
//! Carries the decoded message and a handle to the pipeline's shared state.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;

use super::error::HandlerError;
use crate::broker::Delivery;

/// The context passed to every handler.
///
/// Owned, so async handlers can move it into their future.
pub struct Context<S> {
    topic: String,
    key: Option<String>,
    offset: i64,
    input: Value,
    headers: Vec<(String, String)>,
    state: Arc<S>,
}

impl<S> Context<S> {
    pub(crate) fn new(delivery: &Delivery, state: Arc<S>) -> Self {
        Self {
            topic: delivery.topic.clone(),
            key: delivery.key.clone(),
            offset: delivery.offset,
            input: delivery.json_value(),
            headers: delivery.headers.clone(),
            state,
        }
    }

    /// Deserialize the message value into a typed struct.
    pub fn input<T: DeserializeOwned>(&self) -> Result<T, HandlerError> {
        serde_json::from_value(self.input.clone())
            .map_err(|e| HandlerError::DecodeFailed(e.to_string()))
    }

    /// Get the raw JSON value.
    pub fn raw_input(&self) -> &Value {
        &self.input
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// The message key, if any.
    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub fn offset(&self) -> i64 {
        self.offset
    }

    /// First header named `name`.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Get the pipeline's shared state.
    pub fn state(&self) -> &Arc<S> {
        &self.state
    }

    /// Check if the value contains a field.
    pub fn has_field(&self, field: &str) -> bool {
        self.input.get(field).is_some()
    }

    /// Check if the value contains all specified fields.
    pub fn has_fields(&self, fields: &[&str]) -> bool {
        fields.iter().all(|f| self.has_field(f))
    }
}
