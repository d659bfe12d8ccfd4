//! Kafka consumer for confirmation messages.
//!
//! Auto-commit is disabled; the poll loop commits the exact offset of each
//! message once it is handled, so a crash before the commit redelivers it.

use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::{Offset, TopicPartitionList};
use tracing::info;

use super::{BrokerError, Envelope, MessageConsumer};
use crate::types::BrokerSettings;

/// Consumer-group member on one confirmation topic
pub struct KafkaConfirmConsumer {
    consumer: StreamConsumer,
    group_id: String,
    subscribed: bool,
}

impl KafkaConfirmConsumer {
    pub fn new(settings: &BrokerSettings, group_id: &str) -> Result<Self, BrokerError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &settings.bootstrap_servers)
            .set("group.id", group_id)
            .set("client.id", &settings.client_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .set("allow.auto.create.topics", "true")
            .set("session.timeout.ms", settings.session_timeout_ms.to_string())
            .create()?;

        info!(
            bootstrap = %settings.bootstrap_servers,
            group = %group_id,
            "Kafka consumer created"
        );

        Ok(Self {
            consumer,
            group_id: group_id.to_string(),
            subscribed: false,
        })
    }
}

#[async_trait]
impl MessageConsumer for KafkaConfirmConsumer {
    async fn subscribe(&mut self, topic: &str) -> Result<(), BrokerError> {
        self.consumer.subscribe(&[topic])?;
        self.subscribed = true;
        info!(topic = %topic, group = %self.group_id, "Subscribed to topic");
        Ok(())
    }

    async fn poll(&mut self, timeout: Duration) -> Result<Option<Envelope>, BrokerError> {
        if !self.subscribed {
            return Err(BrokerError::NotSubscribed);
        }

        match tokio::time::timeout(timeout, self.consumer.recv()).await {
            Err(_) => Ok(None),
            Ok(Err(e)) => Err(e.into()),
            Ok(Ok(message)) => Ok(Some(Envelope {
                topic: message.topic().to_string(),
                partition: message.partition(),
                offset: message.offset(),
                key: message
                    .key()
                    .map(|k| String::from_utf8_lossy(k).into_owned()),
                payload: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
            })),
        }
    }

    async fn commit(&mut self, envelope: &Envelope) -> Result<(), BrokerError> {
        let mut offsets = TopicPartitionList::new();
        offsets.add_partition_offset(
            &envelope.topic,
            envelope.partition,
            Offset::Offset(envelope.offset + 1),
        )?;
        self.consumer
            .commit(&offsets, CommitMode::Sync)
            .map_err(|e| BrokerError::Commit(e.to_string()))
    }
}
