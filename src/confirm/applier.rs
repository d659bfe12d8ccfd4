//! Response consumer / confirmation applier (catalog side).

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, instrument, warn};

use super::consumer::MessageHandler;
use super::{decode, HandleError};
use crate::messaging::Envelope;
use crate::store::ItemStore;
use crate::types::ConfirmResponse;

/// Writes confirmation fields onto the originating item.
///
/// Only the two confirmation fields are written, in one store operation.
/// Applying the same response twice assigns the same values, so duplicate
/// deliveries are harmless.
pub struct ConfirmationApplier {
    items: Arc<dyn ItemStore>,
}

impl ConfirmationApplier {
    pub fn new(items: Arc<dyn ItemStore>) -> Self {
        Self { items }
    }
}

#[async_trait]
impl MessageHandler for ConfirmationApplier {
    fn name(&self) -> &'static str {
        "confirm-responses"
    }

    #[instrument(skip_all, fields(partition = envelope.partition, offset = envelope.offset))]
    async fn handle(&self, envelope: &Envelope) -> Result<(), HandleError> {
        let response: ConfirmResponse = decode(&envelope.payload)?;
        if response.object_id.trim().is_empty() {
            return Err(HandleError::Decode("response with empty objectId".to_string()));
        }

        let info = response.confirmation_info();
        let applied = self
            .items
            .set_confirmation(&response.object_id, &response.confirmation_time, &info)
            .await?;

        if applied {
            info!(
                object_id = %response.object_id,
                confirmation_time = %response.confirmation_time,
                "Updated item with confirmation time"
            );
        } else {
            warn!(object_id = %response.object_id, "Item not found, discarding confirmation");
        }
        Ok(())
    }
}
