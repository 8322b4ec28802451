//! In-memory broker for tests and single-process scenarios.
//!
//! Topics are single-partition append-only logs. Consumer groups record a
//! committed offset per topic. The broker implements `Producer` and
//! `BrokerAdmin`, and hands out `InMemoryConsumer`s for the pipeline
//! transport, so the whole emit → handle → commit → converge flow runs
//! without an external broker.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::time::Instant;

use super::client::{BrokerAdmin, Consumer, Producer};
use super::message::{
    ConsumerGroup, Delivery, OutboundMessage, PartitionOffset, TopicOffsets, NO_OFFSET,
};
use crate::error::BrokerError;

#[derive(Default)]
struct BrokerState {
    /// Topic name → partition 0 log.
    topics: HashMap<String, Vec<Delivery>>,
    /// Group id → topic → committed offset.
    groups: BTreeMap<String, HashMap<String, i64>>,
    /// Reasons for upcoming produce failures, consumed in order.
    produce_failures: VecDeque<String>,
    /// When set, every admin call fails with this reason.
    admin_failure: Option<String>,
    disconnected: bool,
}

/// In-memory broker.
///
/// Cloning creates another handle to the same broker.
///
/// ## Example
///
/// ```
/// use awaitable_emit::broker::{BrokerAdmin, InMemoryBroker, OutboundMessage, Producer};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let broker = InMemoryBroker::new();
/// broker
///     .produce("orders", OutboundMessage::new(Some("o-1".into()), b"{}".to_vec()))
///     .await
///     .unwrap();
///
/// let offsets = broker.fetch_topic_offsets("orders").await.unwrap();
/// assert_eq!(offsets[0].offset, 1);
/// # }
/// ```
#[derive(Clone, Default)]
pub struct InMemoryBroker {
    state: Arc<Mutex<BrokerState>>,
    appended: Arc<Notify>,
}

impl InMemoryBroker {
    /// Create a new, empty broker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a consumer reading `topic` for `group_id`.
    ///
    /// The group becomes known to the cluster immediately, with no committed
    /// offset. Reading starts at the group's committed offset, or at the
    /// beginning of the topic.
    pub fn consumer(&self, group_id: &str, topic: &str) -> InMemoryConsumer {
        let start = {
            let mut state = self.lock();
            let committed = state.groups.entry(group_id.to_string()).or_default();
            committed.get(topic).copied().unwrap_or(0).max(0)
        };

        InMemoryConsumer {
            broker: self.clone(),
            group_id: group_id.to_string(),
            topic: topic.to_string(),
            position: Arc::new(Mutex::new(start)),
        }
    }

    /// Register a consumer group without a consumer.
    pub fn register_group(&self, group_id: &str) {
        self.lock().groups.entry(group_id.to_string()).or_default();
    }

    /// Overwrite a group's committed offset on `topic`.
    pub fn set_committed_offset(&self, group_id: &str, topic: &str, offset: i64) {
        self.lock()
            .groups
            .entry(group_id.to_string())
            .or_default()
            .insert(topic.to_string(), offset);
    }

    /// Committed offset of `group_id` on `topic`, or `NO_OFFSET`.
    pub fn committed_offset(&self, group_id: &str, topic: &str) -> i64 {
        self.lock()
            .groups
            .get(group_id)
            .and_then(|topics| topics.get(topic))
            .copied()
            .unwrap_or(NO_OFFSET)
    }

    /// All messages produced onto `topic`.
    pub fn messages(&self, topic: &str) -> Vec<Delivery> {
        self.lock().topics.get(topic).cloned().unwrap_or_default()
    }

    /// Number of messages produced onto `topic`.
    pub fn len(&self, topic: &str) -> usize {
        self.lock().topics.get(topic).map_or(0, Vec::len)
    }

    /// Check if nothing was produced onto `topic`.
    pub fn is_empty(&self, topic: &str) -> bool {
        self.len(topic) == 0
    }

    /// Make the next `produce` call fail with `reason`.
    pub fn fail_next_produce(&self, reason: impl Into<String>) {
        self.lock().produce_failures.push_back(reason.into());
    }

    /// Make every admin call fail with `reason` until cleared.
    pub fn fail_admin(&self, reason: impl Into<String>) {
        self.lock().admin_failure = Some(reason.into());
    }

    /// Stop failing admin calls.
    pub fn clear_admin_failure(&self) {
        self.lock().admin_failure = None;
    }

    /// Check if `disconnect` was called.
    pub fn is_disconnected(&self) -> bool {
        self.lock().disconnected
    }

    fn admin_state(&self) -> Result<MutexGuard<'_, BrokerState>, BrokerError> {
        let state = self.lock();
        if let Some(reason) = &state.admin_failure {
            return Err(BrokerError::ConnectionFailed(reason.clone()));
        }
        if state.disconnected {
            return Err(BrokerError::Disconnected);
        }
        Ok(state)
    }

    fn lock(&self) -> MutexGuard<'_, BrokerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Producer for InMemoryBroker {
    async fn produce(&self, topic: &str, message: OutboundMessage) -> Result<(), BrokerError> {
        {
            let mut state = self.lock();
            if let Some(reason) = state.produce_failures.pop_front() {
                return Err(BrokerError::Rejected(reason));
            }

            let log = state.topics.entry(topic.to_string()).or_default();
            let offset = log.len() as i64;
            log.push(Delivery {
                topic: topic.to_string(),
                partition: 0,
                offset,
                key: message.key,
                value: message.value,
                headers: message.headers,
            });
        }

        self.appended.notify_waiters();
        Ok(())
    }
}

#[async_trait]
impl BrokerAdmin for InMemoryBroker {
    async fn fetch_topic_offsets(&self, topic: &str) -> Result<Vec<PartitionOffset>, BrokerError> {
        let state = self.admin_state()?;
        let offset = match state.topics.get(topic) {
            Some(log) if !log.is_empty() => log.len() as i64,
            _ => NO_OFFSET,
        };
        Ok(vec![PartitionOffset {
            partition: 0,
            offset,
        }])
    }

    async fn list_consumer_groups(&self) -> Result<Vec<ConsumerGroup>, BrokerError> {
        let state = self.admin_state()?;
        Ok(state.groups.keys().map(ConsumerGroup::new).collect())
    }

    async fn fetch_group_offsets(
        &self,
        group_id: &str,
        topic: &str,
    ) -> Result<Vec<TopicOffsets>, BrokerError> {
        let state = self.admin_state()?;
        let offset = state
            .groups
            .get(group_id)
            .and_then(|topics| topics.get(topic))
            .copied()
            .unwrap_or(NO_OFFSET);
        Ok(vec![TopicOffsets {
            topic: topic.to_string(),
            partitions: vec![PartitionOffset {
                partition: 0,
                offset,
            }],
        }])
    }

    async fn disconnect(&self) -> Result<(), BrokerError> {
        self.lock().disconnected = true;
        Ok(())
    }
}

/// Consumer handed out by `InMemoryBroker::consumer`.
///
/// Each consumer tracks its own read position; commits update the group's
/// committed offset on the broker.
#[derive(Clone)]
pub struct InMemoryConsumer {
    broker: InMemoryBroker,
    group_id: String,
    topic: String,
    position: Arc<Mutex<i64>>,
}

impl InMemoryConsumer {
    /// The group this consumer commits for.
    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    /// The topic this consumer reads.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Offset of the next message this consumer will read.
    pub fn position(&self) -> i64 {
        *self.position.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_delivery(&self) -> Option<Delivery> {
        let state = self.broker.lock();
        let mut position = self.position.lock().unwrap_or_else(PoisonError::into_inner);
        let delivery = state.topics.get(&self.topic)?.get(*position as usize)?.clone();
        *position += 1;
        Some(delivery)
    }
}

#[async_trait]
impl Consumer for InMemoryConsumer {
    async fn poll(&self, timeout: Duration) -> Result<Option<Delivery>, BrokerError> {
        let deadline = Instant::now() + timeout;

        loop {
            // Register interest before checking the log so an append between
            // the check and the wait is not missed.
            let appended = self.broker.appended.notified();
            tokio::pin!(appended);
            appended.as_mut().enable();

            if let Some(delivery) = self.next_delivery() {
                return Ok(Some(delivery));
            }

            if tokio::time::timeout_at(deadline, appended).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn commit(&self, delivery: &Delivery) -> Result<(), BrokerError> {
        self.broker
            .set_committed_offset(&self.group_id, &delivery.topic, delivery.offset + 1);
        Ok(())
    }
}
