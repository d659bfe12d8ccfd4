//! Confirmation request publisher (catalog side).

use std::sync::Arc;

use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::ConfirmError;
use crate::messaging::{Delivery, MessageProducer};
use crate::outbox::Outbox;
use crate::types::ConfirmRequest;

/// What happened to a confirmation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Acknowledged by the broker
    Sent(Delivery),
    /// Broker unreachable; stored in the outbox under this record id
    Deferred(Uuid),
}

/// Turns "item created with a confirming user" into a request message.
///
/// Must only be called after the item is durably stored.
pub struct ConfirmationPublisher {
    producer: Arc<dyn MessageProducer>,
    topic: String,
    outbox: Option<Arc<Outbox>>,
}

impl ConfirmationPublisher {
    pub fn new(producer: Arc<dyn MessageProducer>, topic: impl Into<String>) -> Self {
        Self {
            producer,
            topic: topic.into(),
            outbox: None,
        }
    }

    /// Keep requests the broker rejects in `outbox` for later delivery.
    pub fn with_outbox(mut self, outbox: Arc<Outbox>) -> Self {
        self.outbox = Some(outbox);
        self
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Publish one request keyed by `object_id`.
    #[instrument(skip(self), fields(topic = %self.topic))]
    pub async fn publish_confirm_request(
        &self,
        object_id: &str,
        user_id: &str,
    ) -> Result<PublishOutcome, ConfirmError> {
        if object_id.trim().is_empty() {
            return Err(ConfirmError::InvalidRequest("objectId must not be empty"));
        }
        if user_id.trim().is_empty() {
            return Err(ConfirmError::InvalidRequest("userId must not be empty"));
        }

        let payload = serde_json::to_string(&ConfirmRequest::new(object_id, user_id))?;

        match self.producer.send(&self.topic, object_id, payload.as_bytes()).await {
            Ok(delivery) => {
                info!(
                    object_id = %object_id,
                    user_id = %user_id,
                    partition = delivery.partition,
                    offset = delivery.offset,
                    "Sent confirm request"
                );
                Ok(PublishOutcome::Sent(delivery))
            }
            Err(e) => match &self.outbox {
                Some(outbox) => {
                    let record = outbox.enqueue(&self.topic, object_id, payload).await?;
                    warn!(
                        object_id = %object_id,
                        outbox_id = %record.id,
                        error = %e,
                        "Confirm request deferred to outbox"
                    );
                    Ok(PublishOutcome::Deferred(record.id))
                }
                None => Err(e.into()),
            },
        }
    }
}
