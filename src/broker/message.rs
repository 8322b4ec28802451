//! Message and offset types exchanged with the broker.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Offset reported when nothing has been produced or committed.
pub const NO_OFFSET: i64 = -1;

/// A message to be produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutboundMessage {
    /// Message key (the correlation key for awaited emissions).
    pub key: Option<String>,
    /// Serialized value.
    pub value: Vec<u8>,
    /// Message headers.
    pub headers: Vec<(String, String)>,
}

impl OutboundMessage {
    /// Create a message with the given key and value.
    pub fn new(key: Option<String>, value: Vec<u8>) -> Self {
        Self {
            key,
            value,
            headers: Vec::new(),
        }
    }

    /// Build a message from an emitted JSON object.
    ///
    /// - `key` becomes the message key (strings verbatim, other scalars via
    ///   their JSON text).
    /// - `value`, when present, is serialized as the message value;
    ///   otherwise the whole object is.
    /// - `headers`, when an object of strings, becomes the message headers.
    pub fn from_json(data: &Value) -> Result<Self, serde_json::Error> {
        let key = data.get("key").and_then(key_to_string);
        let value = match data.get("value") {
            Some(value) => serde_json::to_vec(value)?,
            None => serde_json::to_vec(data)?,
        };
        let headers = data
            .get("headers")
            .and_then(Value::as_object)
            .map(|headers| {
                headers
                    .iter()
                    .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            key,
            value,
            headers,
        })
    }

    /// Add a header to the message.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }
}

/// Render a JSON `key` field as a correlation key.
pub(crate) fn key_to_string(key: &Value) -> Option<String> {
    match key {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// A message read back from a topic.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Delivery {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<String>,
    pub value: Vec<u8>,
    pub headers: Vec<(String, String)>,
}

impl Delivery {
    /// Get the value as a string (if valid UTF-8).
    pub fn value_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.value).ok()
    }

    /// Parse the value as JSON. Falls back to a JSON string of the raw
    /// text, then to `null`.
    pub fn json_value(&self) -> Value {
        if let Ok(value) = serde_json::from_slice::<Value>(&self.value) {
            return value;
        }
        match self.value_str() {
            Some(s) => Value::String(s.to_string()),
            None => Value::Null,
        }
    }
}

/// Offset of one partition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionOffset {
    pub partition: i32,
    pub offset: i64,
}

/// Offsets of one topic's partitions, as committed by a consumer group.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicOffsets {
    pub topic: String,
    pub partitions: Vec<PartitionOffset>,
}

/// A consumer group known to the cluster.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConsumerGroup {
    pub group_id: String,
}

impl ConsumerGroup {
    pub fn new(group_id: impl Into<String>) -> Self {
        Self {
            group_id: group_id.into(),
        }
    }
}
