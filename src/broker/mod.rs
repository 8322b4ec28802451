//! Broker client - the collaborator the gateway produces through and the
//! monitor observes.
//!
//! ```text
//! ┌────────────────┐   produce()    ┌──────────────────────────────┐
//! │ AwaitableEmit  │ ─────────────▶ │ Producer                     │
//! └────────────────┘                │  InMemoryBroker / KafkaProducer
//! ┌────────────────┐   offsets      ├──────────────────────────────┤
//! │ OffsetMonitor  │ ─────────────▶ │ BrokerAdmin                  │
//! └────────────────┘                │  InMemoryBroker / KafkaAdmin │
//! ┌────────────────┐   poll/commit  ├──────────────────────────────┤
//! │ pipeline       │ ─────────────▶ │ Consumer                     │
//! └────────────────┘                │  InMemoryConsumer / KafkaConsumer
//!                                   └──────────────────────────────┘
//! ```
//!
//! Offsets follow Kafka conventions: a topic's offset is its high watermark
//! (the offset the next message will get) and a group's committed offset is
//! the next offset it will read. `NO_OFFSET` (`-1`) means "nothing recorded".

mod client;
mod message;

#[cfg(feature = "in-memory")]
mod in_memory;
#[cfg(feature = "kafka")]
mod kafka;

#[cfg(test)]
pub use client::MockBrokerAdmin;
pub use client::{BrokerAdmin, Consumer, Producer};
pub use message::{ConsumerGroup, Delivery, OutboundMessage, PartitionOffset, TopicOffsets, NO_OFFSET};

#[cfg(feature = "in-memory")]
pub use in_memory::{InMemoryBroker, InMemoryConsumer};
#[cfg(feature = "kafka")]
pub use kafka::{KafkaAdmin, KafkaConsumer, KafkaProducer};
