use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use super::ServiceError;
use crate::confirm::{ConfirmationPublisher, PublishOutcome};
use crate::store::ItemStore;
use crate::types::{CatalogItem, ItemInput};

/// Catalog item operations.
///
/// Creating an item that names a confirming user publishes a confirmation
/// request once the item is stored. Publishing problems are logged and
/// never fail the creation.
pub struct CatalogService {
    items: Arc<dyn ItemStore>,
    publisher: Option<Arc<ConfirmationPublisher>>,
}

impl CatalogService {
    pub fn new(items: Arc<dyn ItemStore>, publisher: Option<Arc<ConfirmationPublisher>>) -> Self {
        Self { items, publisher }
    }

    pub async fn create_item(&self, input: ItemInput) -> Result<CatalogItem, ServiceError> {
        let item = CatalogItem::from_input(Uuid::new_v4().to_string(), input);
        self.items.insert_item(item.clone()).await?;
        info!(item_id = %item.id, country = %item.country, year = item.year, "Item created");

        self.on_item_created(&item).await;
        Ok(item)
    }

    async fn on_item_created(&self, item: &CatalogItem) {
        let Some(user_id) = item.confirmer() else {
            return;
        };
        let Some(publisher) = &self.publisher else {
            warn!(item_id = %item.id, "No confirmation publisher configured, request not sent");
            return;
        };

        match publisher.publish_confirm_request(&item.id, user_id).await {
            Ok(PublishOutcome::Sent(_)) => {}
            Ok(PublishOutcome::Deferred(outbox_id)) => {
                info!(item_id = %item.id, outbox_id = %outbox_id, "Confirmation request queued");
            }
            Err(e) => {
                warn!(item_id = %item.id, user_id = %user_id, error = %e, "Confirmation request not sent");
            }
        }
    }

    /// Replace the descriptive fields in one store write.
    ///
    /// `confirmedByUserId` is fixed at creation: the confirmation request
    /// has already gone out for that user, so a different value in `input`
    /// is ignored. The confirmation fields belong to the protocol.
    pub async fn update_item(
        &self,
        id: &str,
        input: ItemInput,
    ) -> Result<Option<CatalogItem>, ServiceError> {
        let requested = input.confirmed_by_user_id.clone();
        let Some(item) = self.items.update_item(id, input).await? else {
            return Ok(None);
        };

        if requested.is_some() && requested != item.confirmed_by_user_id {
            warn!(item_id = %id, "Confirming user cannot be changed, keeping the stored one");
        }
        info!(item_id = %id, "Item updated");
        Ok(Some(item))
    }

    pub async fn delete_item(&self, id: &str) -> Result<bool, ServiceError> {
        let deleted = self.items.delete_item(id).await?;
        if deleted {
            info!(item_id = %id, "Item deleted");
        }
        Ok(deleted)
    }

    pub async fn get_item(&self, id: &str) -> Result<Option<CatalogItem>, ServiceError> {
        Ok(self.items.get_item_by_id(id).await?)
    }

    pub async fn list_items(&self) -> Result<Vec<CatalogItem>, ServiceError> {
        Ok(self.items.list_items().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::confirm::{ConfirmationApplier, MessageHandler};
    use crate::messaging::{Envelope, InMemoryBroker};
    use crate::store::{InMemoryItemStore, StoreError};
    use crate::types::{ConfirmRequest, ConfirmResponse};
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    const TOPIC: &str = "objects.confirm.requests";

    fn input(confirmer: Option<&str>) -> ItemInput {
        ItemInput {
            country: "Peru".to_string(),
            year: 1935,
            currency: "sol".to_string(),
            value: 1.0,
            price: 4.0,
            confirmed_by_user_id: confirmer.map(str::to_string),
        }
    }

    fn service(broker: &InMemoryBroker) -> (CatalogService, Arc<InMemoryItemStore>) {
        let items = Arc::new(InMemoryItemStore::new());
        let publisher = ConfirmationPublisher::new(Arc::new(broker.producer()), TOPIC);
        let service = CatalogService::new(
            Arc::clone(&items) as Arc<dyn ItemStore>,
            Some(Arc::new(publisher)),
        );
        (service, items)
    }

    #[tokio::test]
    async fn test_create_with_confirmer_publishes_request() {
        let broker = InMemoryBroker::new(2);
        let (service, items) = service(&broker);

        let item = service.create_item(input(Some("U1"))).await.unwrap();

        assert!(items.get_item_by_id(&item.id).await.unwrap().is_some());
        let messages = broker.messages(TOPIC);
        assert_eq!(messages.len(), 1);
        let request: ConfirmRequest = serde_json::from_slice(&messages[0].payload).unwrap();
        assert_eq!(request, ConfirmRequest::new(item.id.clone(), "U1"));
    }

    #[tokio::test]
    async fn test_create_without_confirmer_publishes_nothing() {
        let broker = InMemoryBroker::new(2);
        let (service, _) = service(&broker);

        service.create_item(input(None)).await.unwrap();
        service.create_item(input(Some("   "))).await.unwrap();

        assert!(broker.messages(TOPIC).is_empty());
    }

    #[tokio::test]
    async fn test_create_survives_unreachable_broker() {
        let broker = InMemoryBroker::new(2);
        broker.set_available(false);
        let (service, items) = service(&broker);

        let item = service.create_item(input(Some("U1"))).await.unwrap();

        let stored = items.get_item_by_id(&item.id).await.unwrap().unwrap();
        assert!(!stored.is_confirmed());
    }

    #[tokio::test]
    async fn test_create_fails_when_store_is_down() {
        let broker = InMemoryBroker::new(2);
        let (service, items) = service(&broker);
        items.set_offline(true);

        let result = service.create_item(input(Some("U1"))).await;
        assert!(matches!(result, Err(ServiceError::Store(_))));
        assert!(broker.messages(TOPIC).is_empty());
    }

    #[tokio::test]
    async fn test_update_preserves_confirmation() {
        let broker = InMemoryBroker::new(2);
        let (service, items) = service(&broker);
        let item = service.create_item(input(Some("U1"))).await.unwrap();
        items
            .set_confirmation(&item.id, "2024-01-01T00:00:00Z", "Confirmed 2024-01-01T00:00:00Z")
            .await
            .unwrap();

        let mut changed = input(Some("U2"));
        changed.price = 9.5;
        let updated = service.update_item(&item.id, changed).await.unwrap().unwrap();

        assert_eq!(updated.price, 9.5);
        assert_eq!(updated.confirmed_by_user_id.as_deref(), Some("U1"));
        assert_eq!(updated.confirmation_time.as_deref(), Some("2024-01-01T00:00:00Z"));
        assert_eq!(
            updated.confirmation_info.as_deref(),
            Some("Confirmed 2024-01-01T00:00:00Z")
        );
        assert!(service.update_item("missing", input(None)).await.unwrap().is_none());
    }

    /// Applies a confirmation response right before each update reaches
    /// the inner store.
    struct ConfirmsDuringUpdate {
        inner: Arc<InMemoryItemStore>,
        applier: ConfirmationApplier,
    }

    #[async_trait::async_trait]
    impl ItemStore for ConfirmsDuringUpdate {
        async fn insert_item(&self, item: CatalogItem) -> Result<(), StoreError> {
            self.inner.insert_item(item).await
        }

        async fn get_item_by_id(&self, id: &str) -> Result<Option<CatalogItem>, StoreError> {
            self.inner.get_item_by_id(id).await
        }

        async fn list_items(&self) -> Result<Vec<CatalogItem>, StoreError> {
            self.inner.list_items().await
        }

        async fn update_item(
            &self,
            id: &str,
            input: ItemInput,
        ) -> Result<Option<CatalogItem>, StoreError> {
            let response = ConfirmResponse::new(id, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
            let envelope = Envelope {
                topic: "objects.confirm.responses".to_string(),
                partition: 0,
                offset: 0,
                key: Some(id.to_string()),
                payload: serde_json::to_vec(&response).unwrap(),
            };
            self.applier.handle(&envelope).await.unwrap();
            self.inner.update_item(id, input).await
        }

        async fn set_confirmation(&self, id: &str, time: &str, info: &str) -> Result<bool, StoreError> {
            self.inner.set_confirmation(id, time, info).await
        }

        async fn delete_item(&self, id: &str) -> Result<bool, StoreError> {
            self.inner.delete_item(id).await
        }
    }

    #[tokio::test]
    async fn test_confirmation_applied_during_update_survives() {
        let inner = Arc::new(InMemoryItemStore::new());
        let store = ConfirmsDuringUpdate {
            inner: Arc::clone(&inner),
            applier: ConfirmationApplier::new(Arc::clone(&inner) as Arc<dyn ItemStore>),
        };
        let service = CatalogService::new(Arc::new(store), None);
        let item = service.create_item(input(Some("U1"))).await.unwrap();

        let mut changed = input(Some("U1"));
        changed.price = 9.5;
        let updated = service.update_item(&item.id, changed).await.unwrap().unwrap();

        assert_eq!(updated.price, 9.5);
        assert_eq!(updated.confirmation_time.as_deref(), Some("2024-01-01T00:00:00Z"));
        let stored = inner.get_item_by_id(&item.id).await.unwrap().unwrap();
        assert_eq!(stored, updated);
    }

    #[tokio::test]
    async fn test_delete_and_list() {
        let broker = InMemoryBroker::new(2);
        let (service, _) = service(&broker);
        let a = service.create_item(input(None)).await.unwrap();
        service.create_item(input(None)).await.unwrap();

        assert_eq!(service.list_items().await.unwrap().len(), 2);
        assert!(service.delete_item(&a.id).await.unwrap());
        assert!(!service.delete_item(&a.id).await.unwrap());
        assert!(service.get_item(&a.id).await.unwrap().is_none());
        assert_eq!(service.list_items().await.unwrap().len(), 1);
    }
}
