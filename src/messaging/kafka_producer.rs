//! Kafka producer for confirmation messages.
//!
//! One instance is created at service start and shared by every request
//! handler. Sends wait for acknowledgement from all in-sync replicas.

use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::error::KafkaError;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use tracing::{error, info};

use super::{BrokerError, Delivery, MessageProducer};
use crate::types::BrokerSettings;

impl From<KafkaError> for BrokerError {
    fn from(e: KafkaError) -> Self {
        BrokerError::Backend(e.to_string())
    }
}

/// Kafka producer for the requests and responses topics
pub struct KafkaConfirmProducer {
    producer: FutureProducer,
    send_timeout: Duration,
}

impl KafkaConfirmProducer {
    pub fn new(settings: &BrokerSettings) -> Result<Self, BrokerError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &settings.bootstrap_servers)
            .set("client.id", &settings.client_id)
            .set("acks", &settings.acks)
            .set("enable.idempotence", "true")
            .set("message.timeout.ms", settings.send_timeout_ms.to_string())
            .create()?;

        info!(
            bootstrap = %settings.bootstrap_servers,
            client_id = %settings.client_id,
            acks = %settings.acks,
            "Kafka producer created"
        );

        Ok(Self {
            producer,
            send_timeout: settings.send_timeout(),
        })
    }
}

#[async_trait]
impl MessageProducer for KafkaConfirmProducer {
    async fn send(&self, topic: &str, key: &str, payload: &[u8]) -> Result<Delivery, BrokerError> {
        let record = FutureRecord::to(topic).key(key).payload(payload);

        match self.producer.send(record, self.send_timeout).await {
            Ok((partition, offset)) => Ok(Delivery { partition, offset }),
            Err((e, _)) => {
                error!(topic = %topic, key = %key, error = %e, "Kafka delivery failed");
                Err(e.into())
            }
        }
    }

    async fn flush(&self, timeout: Duration) -> Result<(), BrokerError> {
        self.producer.flush(timeout)?;
        Ok(())
    }
}
