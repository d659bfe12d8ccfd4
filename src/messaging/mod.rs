//! # Messaging Module
//!
//! Topic-addressed, key-partitioned publish/subscribe with manual offset
//! commits. Consumers decide when a message counts as handled.
//!
//! ## Backends
//! - In-memory broker for tests and single-process deployments
//! - Kafka producer/consumer (feature `kafka`)

pub mod backoff;
pub mod consistent_hash;
pub mod in_memory;
#[cfg(feature = "kafka")]
pub mod kafka_consumer;
#[cfg(feature = "kafka")]
pub mod kafka_producer;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use backoff::Backoff;
pub use consistent_hash::ConsistentHashPartitioner;
pub use in_memory::{InMemoryBroker, InMemoryConsumer, InMemoryProducer};
#[cfg(feature = "kafka")]
pub use kafka_consumer::KafkaConfirmConsumer;
#[cfg(feature = "kafka")]
pub use kafka_producer::KafkaConfirmProducer;

/// Errors raised by a broker backend.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("broker unavailable: {0}")]
    Unavailable(String),

    #[error("send to {topic} timed out after {timeout:?}")]
    Timeout { topic: String, timeout: Duration },

    #[error("consumer is not subscribed")]
    NotSubscribed,

    #[error("commit rejected: {0}")]
    Commit(String),

    #[error("kafka error: {0}")]
    Backend(String),
}

/// Where a published message landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub partition: i32,
    pub offset: i64,
}

/// A message handed to a consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<String>,
    pub payload: Vec<u8>,
}

/// Publishes keyed messages. Shared by all request handlers of a service.
#[async_trait]
pub trait MessageProducer: Send + Sync {
    /// Send one message and wait until the broker acknowledged it.
    async fn send(&self, topic: &str, key: &str, payload: &[u8]) -> Result<Delivery, BrokerError>;

    /// Wait for in-flight messages before releasing the connection.
    async fn flush(&self, timeout: Duration) -> Result<(), BrokerError>;
}

/// A consumer-group member. Owned by exactly one poll loop.
#[async_trait]
pub trait MessageConsumer: Send {
    /// Join the group for `topic`.
    async fn subscribe(&mut self, topic: &str) -> Result<(), BrokerError>;

    /// Fetch the next message, or `None` when `timeout` elapses first.
    async fn poll(&mut self, timeout: Duration) -> Result<Option<Envelope>, BrokerError>;

    /// Record `envelope` (and everything before it on its partition) as handled.
    async fn commit(&mut self, envelope: &Envelope) -> Result<(), BrokerError>;
}
