//! Request consumer / counter updater (user service side).

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, instrument, warn};

use super::consumer::MessageHandler;
use super::{decode, Clock, HandleError};
use crate::messaging::{Envelope, MessageProducer};
use crate::store::{IncrementOutcome, UserStore};
use crate::types::{ConfirmRequest, ConfirmResponse};

/// Records a confirmation against the user and answers the catalog.
///
/// The response is published before the handler returns, and the loop
/// commits the request only after that, so a crash in between redelivers
/// the request instead of losing the response.
pub struct CounterUpdater {
    users: Arc<dyn UserStore>,
    producer: Arc<dyn MessageProducer>,
    responses_topic: String,
    dedupe_requests: bool,
    clock: Arc<dyn Clock>,
}

impl CounterUpdater {
    pub fn new(
        users: Arc<dyn UserStore>,
        producer: Arc<dyn MessageProducer>,
        responses_topic: impl Into<String>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            users,
            producer,
            responses_topic: responses_topic.into(),
            dedupe_requests: true,
            clock,
        }
    }

    /// With dedupe off every delivery increments the counter, so a
    /// redelivered request is counted twice.
    pub fn with_dedupe(mut self, dedupe_requests: bool) -> Self {
        self.dedupe_requests = dedupe_requests;
        self
    }
}

#[async_trait]
impl MessageHandler for CounterUpdater {
    fn name(&self) -> &'static str {
        "confirm-requests"
    }

    #[instrument(skip_all, fields(partition = envelope.partition, offset = envelope.offset))]
    async fn handle(&self, envelope: &Envelope) -> Result<(), HandleError> {
        let request: ConfirmRequest = decode(&envelope.payload)?;
        if request.object_id.trim().is_empty() || request.user_id.trim().is_empty() {
            return Err(HandleError::Decode("request with empty objectId or userId".to_string()));
        }

        let now = self.clock.now();
        let dedupe_key = self.dedupe_requests.then(|| request.dedupe_key());
        let outcome = self
            .users
            .increment_registered_objects(&request.user_id, dedupe_key.as_deref(), now)
            .await?;

        let confirmed_at = match outcome {
            IncrementOutcome::Applied => {
                info!(
                    user_id = %request.user_id,
                    object_id = %request.object_id,
                    "Incremented registered objects"
                );
                now
            }
            IncrementOutcome::AlreadyApplied { first_applied_at } => {
                info!(
                    user_id = %request.user_id,
                    object_id = %request.object_id,
                    "Duplicate confirm request, counter unchanged"
                );
                first_applied_at
            }
            IncrementOutcome::UserNotFound => {
                warn!(
                    user_id = %request.user_id,
                    object_id = %request.object_id,
                    "User not found, skipping increment"
                );
                now
            }
        };

        let response = ConfirmResponse::new(&request.object_id, confirmed_at);
        let payload = serde_json::to_vec(&response)
            .map_err(|e| HandleError::Transient(format!("failed to encode response: {}", e)))?;
        let delivery = self
            .producer
            .send(&self.responses_topic, &request.object_id, &payload)
            .await?;

        info!(
            object_id = %request.object_id,
            partition = delivery.partition,
            offset = delivery.offset,
            "Sent confirmation response"
        );
        Ok(())
    }
}
