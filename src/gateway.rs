//! Emission Gateway - produce a message, then wait until it was handled.
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use awaitable_emit::AwaitableEmit;
//! use serde_json::json;
//!
//! let broker = InMemoryBroker::new();
//! let producer = broker.clone();
//! let emitter = AwaitableEmit::builder(move || Arc::new(producer.clone()))
//!     .admin(Arc::new(broker.clone()))
//!     .build();
//!
//! // Wire `emitter.completion_hook()` into the handler pipeline, then:
//! emitter
//!     .emit_message("user-created", &json!({ "key": "42", "value": { "name": "Bob" } }))
//!     .await?;
//!
//! emitter.dispose().await?;
//! ```
//!
//! ## Ordering
//!
//! Signals are subscribed only after the producer acknowledged the write.
//! A handler fast enough to finish in between publishes to nobody, and the
//! call falls back to the timeout. Treat the timeout as the upper bound on
//! latency, not only as a safety net.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, warn};

use crate::broker::{BrokerAdmin, OutboundMessage, Producer};
use crate::config::EmitConfig;
use crate::correlation::{CorrelationBus, SignalKind, SignalPayload, Subscription};
use crate::error::{EmitError, SharedError};
use crate::hook::CompletionHook;
use crate::monitor::{ConvergenceReport, OffsetMonitor};

/// Returns the producer to emit through. Called once per emission, so the
/// producer may be created after the emitter.
pub type ProducerFactory = Arc<dyn Fn() -> Arc<dyn Producer> + Send + Sync>;

/// How an emission's wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The handler signalled completion.
    Signaled,
    /// No signal arrived before the wait timeout. Treated as success: the
    /// topic may simply have no completion hook wired.
    TimedOut,
}

/// Result of a successful emission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmitOutcome {
    pub resolution: Resolution,
    /// Present when offset convergence was awaited.
    pub convergence: Option<ConvergenceReport>,
}

/// Emits messages and waits for their handling to complete.
///
/// Cheap to share behind an `Arc`; concurrent emissions with distinct keys
/// are fully independent.
pub struct AwaitableEmit {
    get_producer: ProducerFactory,
    bus: CorrelationBus,
    wait: Duration,
    monitor: Option<OffsetMonitor>,
}

impl AwaitableEmit {
    /// Create an emitter in correlation-only mode with a 5 s wait.
    pub fn new<F>(get_producer: F) -> Self
    where
        F: Fn() -> Arc<dyn Producer> + Send + Sync + 'static,
    {
        Self::builder(get_producer).build()
    }

    /// Start building an emitter.
    pub fn builder<F>(get_producer: F) -> AwaitableEmitBuilder
    where
        F: Fn() -> Arc<dyn Producer> + Send + Sync + 'static,
    {
        AwaitableEmitBuilder::new(Arc::new(get_producer))
    }

    /// Create an emitter from `config`, connecting a Kafka admin client
    /// when admin brokers are configured.
    #[cfg(feature = "kafka")]
    pub fn from_config<F>(get_producer: F, config: &EmitConfig) -> Result<Self, EmitError>
    where
        F: Fn() -> Arc<dyn Producer> + Send + Sync + 'static,
    {
        let mut builder = Self::builder(get_producer).config(config);
        if config.convergence_enabled() {
            let admin =
                crate::broker::KafkaAdmin::with_config(config).map_err(EmitError::Admin)?;
            builder = builder.admin(Arc::new(admin));
        }
        Ok(builder.build())
    }

    /// A hook publishing completion signals this emitter waits on.
    ///
    /// Register it with the handler pipeline consuming the emitted topics.
    pub fn completion_hook(&self) -> Arc<CompletionHook> {
        Arc::new(CompletionHook::new(self.bus.clone()))
    }

    /// The correlation bus shared with completion hooks.
    pub fn correlation_bus(&self) -> &CorrelationBus {
        &self.bus
    }

    pub fn wait_timeout(&self) -> Duration {
        self.wait
    }

    /// Check if emissions also wait for consumer-group offset convergence.
    pub fn convergence_enabled(&self) -> bool {
        self.monitor.is_some()
    }

    /// Produce `data` onto `topic` and wait until it was handled.
    ///
    /// `data` must serialize to an object with a `key` field; the key
    /// correlates the message with its completion signal and must be unique
    /// among in-flight emissions.
    ///
    /// Resolves on the success signal or, failing that, after the wait
    /// timeout. Rejects with `EmitError::Handler` carrying the handler's
    /// error if the error signal fires first. With an administrative client
    /// configured, then waits until every consumer group reading `topic`
    /// has committed its latest offset.
    pub async fn emit_message<T>(&self, topic: &str, data: &T) -> Result<EmitOutcome, EmitError>
    where
        T: Serialize + ?Sized,
    {
        let key = self.produce(topic, data).await?;
        let resolution = self.await_signal(topic, &key, true).await?;

        let convergence = match &self.monitor {
            Some(monitor) => Some(monitor.wait_for_convergence(topic).await?),
            None => None,
        };

        Ok(EmitOutcome {
            resolution,
            convergence,
        })
    }

    /// Produce `data` onto `topic` and wait for the success signal or the
    /// timeout.
    ///
    /// Error signals are ignored, for handlers expected to retry past
    /// transient failures. Offset convergence is not awaited.
    pub async fn emit_retryable_message<T>(
        &self,
        topic: &str,
        data: &T,
    ) -> Result<EmitOutcome, EmitError>
    where
        T: Serialize + ?Sized,
    {
        let key = self.produce(topic, data).await?;
        let resolution = self.await_signal(topic, &key, false).await?;

        Ok(EmitOutcome {
            resolution,
            convergence: None,
        })
    }

    /// Release the administrative connection, if any. Idempotent.
    pub async fn dispose(&self) -> Result<(), EmitError> {
        if let Some(monitor) = &self.monitor {
            monitor.admin().disconnect().await.map_err(EmitError::Admin)?;
        }
        Ok(())
    }

    /// Produce the message and return its correlation key.
    async fn produce<T>(&self, topic: &str, data: &T) -> Result<String, EmitError>
    where
        T: Serialize + ?Sized,
    {
        let data = serde_json::to_value(data)?;
        let message = OutboundMessage::from_json(&data)?;
        let key = message.key.clone().ok_or_else(|| EmitError::MissingKey {
            topic: topic.to_string(),
        })?;

        let producer = (self.get_producer)();
        producer
            .produce(topic, message)
            .await
            .map_err(EmitError::Transport)?;

        debug!(topic, key = %key, "message produced, awaiting completion signal");
        Ok(key)
    }

    async fn await_signal(
        &self,
        topic: &str,
        key: &str,
        with_errors: bool,
    ) -> Result<Resolution, EmitError> {
        let success = self.bus.subscribe_once(key, SignalKind::Success);
        let failure = with_errors.then(|| self.bus.subscribe_once(key, SignalKind::Error));

        tokio::select! {
            _ = signaled(success) => {
                debug!(topic, key, "completion signal received");
                Ok(Resolution::Signaled)
            }
            payload = failed(failure) => {
                debug!(topic, key, "error signal received");
                Err(EmitError::Handler(payload))
            }
            _ = tokio::time::sleep(self.wait) => {
                warn!(topic, key, wait_ms = self.wait.as_millis() as u64, "no completion signal before timeout, resolving anyway");
                Ok(Resolution::TimedOut)
            }
        }
    }
}

/// Resolve with the signal's payload; never resolve if the bus went away.
async fn signaled(subscription: Subscription) -> SignalPayload {
    match subscription.await {
        Some(payload) => payload,
        None => std::future::pending().await,
    }
}

async fn failed(subscription: Option<Subscription>) -> SharedError {
    let Some(subscription) = subscription else {
        return std::future::pending().await;
    };
    match signaled(subscription).await {
        Some(err) => err,
        None => Arc::from(Box::<dyn std::error::Error + Send + Sync>::from(
            "handler signalled an error without a payload",
        )),
    }
}

/// Builder for `AwaitableEmit`.
pub struct AwaitableEmitBuilder {
    get_producer: ProducerFactory,
    bus: CorrelationBus,
    wait: Duration,
    admin: Option<Arc<dyn BrokerAdmin>>,
    poll_interval: Duration,
    deadline: Option<Duration>,
}

impl AwaitableEmitBuilder {
    fn new(get_producer: ProducerFactory) -> Self {
        let defaults = EmitConfig::default();
        Self {
            get_producer,
            bus: CorrelationBus::new(),
            wait: defaults.wait_timeout(),
            admin: None,
            poll_interval: defaults.convergence_poll_interval(),
            deadline: defaults.convergence_deadline(),
        }
    }

    /// Apply the timing settings of `config`.
    ///
    /// `admin_brokers` is not read here; supply the administrative client
    /// with `admin` (or use `AwaitableEmit::from_config` with Kafka).
    pub fn config(mut self, config: &EmitConfig) -> Self {
        self.wait = config.wait_timeout();
        self.poll_interval = config.convergence_poll_interval();
        self.deadline = config.convergence_deadline();
        self
    }

    /// How long to wait for a signal before resolving anyway.
    pub fn wait_timeout(mut self, wait: Duration) -> Self {
        self.wait = wait;
        self
    }

    /// Enable the offset convergence wait through `admin`.
    pub fn admin(mut self, admin: Arc<dyn BrokerAdmin>) -> Self {
        self.admin = Some(admin);
        self
    }

    /// Delay between convergence polls.
    pub fn convergence_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Bound the convergence wait. `None` waits indefinitely.
    pub fn convergence_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    /// Share an existing correlation bus, e.g. one a hook already uses.
    pub fn correlation_bus(mut self, bus: CorrelationBus) -> Self {
        self.bus = bus;
        self
    }

    pub fn build(self) -> AwaitableEmit {
        let monitor = self.admin.map(|admin| {
            OffsetMonitor::new(admin)
                .with_poll_interval(self.poll_interval)
                .with_deadline(self.deadline)
        });

        AwaitableEmit {
            get_producer: self.get_producer,
            bus: self.bus,
            wait: self.wait,
            monitor,
        }
    }
}
