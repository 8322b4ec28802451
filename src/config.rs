use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Construction settings for `AwaitableEmit`.
///
/// Deserializable so a test harness can load it alongside its own broker
/// settings; every field has a default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmitConfig {
    /// How long to wait for a completion signal before resolving anyway.
    #[serde(default = "default_wait_timeout_ms")]
    pub wait_timeout_ms: u64,
    /// Broker addresses for the administrative client. Supplying them
    /// enables the offset convergence wait after `emit_message`.
    #[serde(default)]
    pub admin_brokers: Option<Vec<String>>,
    /// Client id used by the administrative client.
    #[serde(default = "default_client_id")]
    pub client_id: String,
    /// Delay between convergence polls.
    #[serde(default = "default_convergence_poll_interval_ms")]
    pub convergence_poll_interval_ms: u64,
    /// Optional upper bound on the convergence wait. Unset means wait
    /// until every consumer group catches up, however long that takes.
    #[serde(default)]
    pub convergence_deadline_ms: Option<u64>,
}

fn default_wait_timeout_ms() -> u64 {
    5000
}

fn default_client_id() -> String {
    "awaitable-emit".to_string()
}

fn default_convergence_poll_interval_ms() -> u64 {
    100
}

impl Default for EmitConfig {
    fn default() -> Self {
        Self {
            wait_timeout_ms: default_wait_timeout_ms(),
            admin_brokers: None,
            client_id: default_client_id(),
            convergence_poll_interval_ms: default_convergence_poll_interval_ms(),
            convergence_deadline_ms: None,
        }
    }
}

impl EmitConfig {
    /// Admin broker addresses joined with commas (rdkafka format). Empty
    /// when no admin brokers are configured.
    pub fn brokers_string(&self) -> String {
        self.admin_brokers
            .as_ref()
            .map(|brokers| brokers.join(","))
            .unwrap_or_default()
    }

    /// Check if the offset convergence wait is enabled.
    pub fn convergence_enabled(&self) -> bool {
        self.admin_brokers
            .as_ref()
            .is_some_and(|brokers| !brokers.is_empty())
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }

    pub fn convergence_poll_interval(&self) -> Duration {
        Duration::from_millis(self.convergence_poll_interval_ms)
    }

    pub fn convergence_deadline(&self) -> Option<Duration> {
        self.convergence_deadline_ms.map(Duration::from_millis)
    }
}
