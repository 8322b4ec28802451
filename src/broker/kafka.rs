//! Kafka adapters built on rdkafka. Enabled with the `kafka` feature.
//!
//! librdkafka's metadata, watermark, and offset-fetch calls block, so the
//! admin adapter runs them on tokio's blocking pool.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{BaseConsumer, CommitMode, Consumer as _, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::message::{Header, Headers, Message, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::{Offset, TopicPartitionList};

use super::client::{BrokerAdmin, Consumer, Producer};
use super::message::{
    ConsumerGroup, Delivery, OutboundMessage, PartitionOffset, TopicOffsets, NO_OFFSET,
};
use crate::config::EmitConfig;
use crate::error::BrokerError;

impl From<KafkaError> for BrokerError {
    fn from(err: KafkaError) -> Self {
        BrokerError::Other(Box::new(err))
    }
}

fn join_error(err: tokio::task::JoinError) -> BrokerError {
    BrokerError::Other(Box::new(err))
}

/// `Producer` backed by rdkafka's `FutureProducer`.
pub struct KafkaProducer {
    producer: FutureProducer,
    send_timeout: Duration,
}

impl KafkaProducer {
    /// Create a producer for a comma-separated broker list.
    pub fn new(brokers: &str, client_id: &str) -> Result<Self, BrokerError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("client.id", client_id)
            .set("message.timeout.ms", "30000")
            .create()
            .map_err(|e| BrokerError::ConnectionFailed(e.to_string()))?;
        Ok(Self {
            producer,
            send_timeout: Duration::from_secs(10),
        })
    }
}

#[async_trait]
impl Producer for KafkaProducer {
    async fn produce(&self, topic: &str, message: OutboundMessage) -> Result<(), BrokerError> {
        let headers = message
            .headers
            .iter()
            .fold(OwnedHeaders::new(), |headers, (key, value)| {
                headers.insert(Header {
                    key: key.as_str(),
                    value: Some(value.as_str()),
                })
            });

        let mut record: FutureRecord<'_, str, [u8]> = FutureRecord::to(topic)
            .payload(message.value.as_slice())
            .headers(headers);
        if let Some(key) = message.key.as_deref() {
            record = record.key(key);
        }

        self.producer
            .send(record, self.send_timeout)
            .await
            .map_err(|(err, _)| BrokerError::Rejected(err.to_string()))?;

        Ok(())
    }
}

/// `BrokerAdmin` backed by an rdkafka metadata client.
///
/// Committed offsets are fetched through one consumer per inspected group,
/// configured with that group's id and kept until `disconnect`. These
/// consumers never subscribe, so they do not join the group.
pub struct KafkaAdmin {
    brokers: String,
    client_id: String,
    timeout: Duration,
    client: Mutex<Option<Arc<BaseConsumer>>>,
    group_clients: Mutex<HashMap<String, Arc<BaseConsumer>>>,
}

impl KafkaAdmin {
    /// Connect an admin client to a comma-separated broker list.
    pub fn new(brokers: &str, client_id: &str) -> Result<Self, BrokerError> {
        let client: BaseConsumer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("client.id", client_id)
            .create()
            .map_err(|e| BrokerError::ConnectionFailed(e.to_string()))?;

        Ok(Self {
            brokers: brokers.to_string(),
            client_id: client_id.to_string(),
            timeout: Duration::from_secs(10),
            client: Mutex::new(Some(Arc::new(client))),
            group_clients: Mutex::new(HashMap::new()),
        })
    }

    /// Connect an admin client to the admin brokers of `config`.
    pub fn with_config(config: &EmitConfig) -> Result<Self, BrokerError> {
        Self::new(&config.brokers_string(), &config.client_id)
    }

    fn client(&self) -> Result<Arc<BaseConsumer>, BrokerError> {
        self.client
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(BrokerError::Disconnected)
    }

    /// The cached offset client for `group_id`, created on first use.
    fn group_client(&self, group_id: &str) -> Result<Arc<BaseConsumer>, BrokerError> {
        // Checked first so a disconnected admin never creates new clients.
        self.client()?;

        let mut clients = self
            .group_clients
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(client) = clients.get(group_id) {
            return Ok(Arc::clone(client));
        }

        let client: BaseConsumer = ClientConfig::new()
            .set("bootstrap.servers", &self.brokers)
            .set("client.id", &self.client_id)
            .set("group.id", group_id)
            .set("enable.auto.commit", "false")
            .create()
            .map_err(|e| BrokerError::ConnectionFailed(e.to_string()))?;
        let client = Arc::new(client);
        clients.insert(group_id.to_string(), Arc::clone(&client));
        Ok(client)
    }

    #[cfg(test)]
    fn cached_groups(&self) -> usize {
        self.group_clients
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn partitions(client: &BaseConsumer, topic: &str, timeout: Duration) -> Result<Vec<i32>, BrokerError> {
        let metadata = client.fetch_metadata(Some(topic), timeout)?;
        Ok(metadata
            .topics()
            .iter()
            .filter(|t| t.name() == topic)
            .flat_map(|t| t.partitions().iter().map(|p| p.id()))
            .collect())
    }
}

#[async_trait]
impl BrokerAdmin for KafkaAdmin {
    async fn fetch_topic_offsets(&self, topic: &str) -> Result<Vec<PartitionOffset>, BrokerError> {
        let client = self.client()?;
        let topic = topic.to_string();
        let timeout = self.timeout;

        tokio::task::spawn_blocking(move || {
            let mut offsets = Vec::new();
            for partition in Self::partitions(&client, &topic, timeout)? {
                let (_low, high) = client.fetch_watermarks(&topic, partition, timeout)?;
                offsets.push(PartitionOffset {
                    partition,
                    offset: high,
                });
            }
            offsets.sort_by_key(|p| p.partition);
            Ok(offsets)
        })
        .await
        .map_err(join_error)?
    }

    async fn list_consumer_groups(&self) -> Result<Vec<ConsumerGroup>, BrokerError> {
        let client = self.client()?;
        let timeout = self.timeout;

        tokio::task::spawn_blocking(move || {
            let groups = client.fetch_group_list(None, timeout)?;
            Ok(groups
                .groups()
                .iter()
                .map(|g| ConsumerGroup::new(g.name()))
                .collect())
        })
        .await
        .map_err(join_error)?
    }

    /// Committed offset of `group_id` on partition 0 of `topic`, the only
    /// partition convergence compares.
    async fn fetch_group_offsets(
        &self,
        group_id: &str,
        topic: &str,
    ) -> Result<Vec<TopicOffsets>, BrokerError> {
        let group_client = self.group_client(group_id)?;
        let topic = topic.to_string();
        let timeout = self.timeout;

        tokio::task::spawn_blocking(move || {
            let mut tpl = TopicPartitionList::new();
            tpl.add_partition(&topic, 0);
            let committed = group_client.committed_offsets(tpl, timeout)?;

            let offsets: Vec<PartitionOffset> = committed
                .elements_for_topic(&topic)
                .iter()
                .map(|elem| PartitionOffset {
                    partition: elem.partition(),
                    offset: match elem.offset() {
                        Offset::Offset(offset) => offset,
                        _ => NO_OFFSET,
                    },
                })
                .collect();

            Ok(vec![TopicOffsets {
                topic,
                partitions: offsets,
            }])
        })
        .await
        .map_err(join_error)?
    }

    async fn disconnect(&self) -> Result<(), BrokerError> {
        self.client
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.group_clients
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        Ok(())
    }
}

/// `Consumer` backed by rdkafka's `StreamConsumer` with manual commits.
pub struct KafkaConsumer {
    consumer: StreamConsumer,
}

impl KafkaConsumer {
    /// Subscribe `group_id` to `topics`.
    pub fn new(brokers: &str, group_id: &str, topics: &[&str]) -> Result<Self, BrokerError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("group.id", group_id)
            .set("enable.auto.commit", "false")
            .set("session.timeout.ms", "30000")
            .set("auto.offset.reset", "earliest")
            .create()
            .map_err(|e| BrokerError::ConnectionFailed(e.to_string()))?;

        consumer
            .subscribe(topics)
            .map_err(|e| BrokerError::ConnectionFailed(e.to_string()))?;

        Ok(Self { consumer })
    }
}

#[async_trait]
impl Consumer for KafkaConsumer {
    async fn poll(&self, timeout: Duration) -> Result<Option<Delivery>, BrokerError> {
        let msg = match tokio::time::timeout(timeout, self.consumer.recv()).await {
            Ok(received) => received?,
            Err(_) => return Ok(None),
        };

        let headers = msg
            .headers()
            .map(|headers| {
                headers
                    .iter()
                    .filter_map(|h| {
                        let value = std::str::from_utf8(h.value?).ok()?;
                        Some((h.key.to_string(), value.to_string()))
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(Some(Delivery {
            topic: msg.topic().to_string(),
            partition: msg.partition(),
            offset: msg.offset(),
            key: msg
                .key()
                .and_then(|k| std::str::from_utf8(k).ok())
                .map(str::to_string),
            value: msg.payload().unwrap_or_default().to_vec(),
            headers,
        }))
    }

    async fn commit(&self, delivery: &Delivery) -> Result<(), BrokerError> {
        let mut tpl = TopicPartitionList::new();
        tpl.add_partition_offset(
            &delivery.topic,
            delivery.partition,
            Offset::Offset(delivery.offset + 1),
        )?;

        self.consumer.commit(&tpl, CommitMode::Sync)?;
        Ok(())
    }
}
