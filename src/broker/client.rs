//! Broker client traits.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::message::{ConsumerGroup, Delivery, OutboundMessage, PartitionOffset, TopicOffsets};
use crate::error::BrokerError;

/// Produces messages onto topics.
///
/// `produce` resolves once the broker acknowledged the write (or failed to).
#[async_trait]
pub trait Producer: Send + Sync {
    /// Produce one message onto `topic`.
    async fn produce(&self, topic: &str, message: OutboundMessage) -> Result<(), BrokerError>;
}

#[async_trait]
impl<P: Producer + ?Sized> Producer for Arc<P> {
    async fn produce(&self, topic: &str, message: OutboundMessage) -> Result<(), BrokerError> {
        (**self).produce(topic, message).await
    }
}

/// Administrative view of the broker used for offset convergence.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BrokerAdmin: Send + Sync {
    /// Latest produced offset of every partition of `topic`.
    async fn fetch_topic_offsets(&self, topic: &str) -> Result<Vec<PartitionOffset>, BrokerError>;

    /// Every consumer group known to the cluster.
    async fn list_consumer_groups(&self) -> Result<Vec<ConsumerGroup>, BrokerError>;

    /// Committed offsets of `group_id` on `topic`.
    async fn fetch_group_offsets(
        &self,
        group_id: &str,
        topic: &str,
    ) -> Result<Vec<TopicOffsets>, BrokerError>;

    /// Release the administrative connection. Idempotent.
    async fn disconnect(&self) -> Result<(), BrokerError>;
}

/// Pull-based consumer of a single topic on behalf of a consumer group.
#[async_trait]
pub trait Consumer: Send + Sync {
    /// Wait up to `timeout` for the next message.
    async fn poll(&self, timeout: Duration) -> Result<Option<Delivery>, BrokerError>;

    /// Commit the group's read position past `delivery`.
    async fn commit(&self, delivery: &Delivery) -> Result<(), BrokerError>;
}
