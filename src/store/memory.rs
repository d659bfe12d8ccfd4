//! In-memory item and user stores.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{IncrementOutcome, ItemStore, StoreError, UserStore};
use crate::types::{CatalogItem, ItemInput, User};

fn check_online(offline: &AtomicBool) -> Result<(), StoreError> {
    if offline.load(Ordering::SeqCst) {
        Err(StoreError::Unavailable("in-memory store is offline".to_string()))
    } else {
        Ok(())
    }
}

/// Items keyed by id.
#[derive(Default)]
pub struct InMemoryItemStore {
    items: RwLock<HashMap<String, CatalogItem>>,
    offline: AtomicBool,
}

impl InMemoryItemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every operation fail with [`StoreError::Unavailable`].
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }
}

#[async_trait]
impl ItemStore for InMemoryItemStore {
    async fn insert_item(&self, item: CatalogItem) -> Result<(), StoreError> {
        check_online(&self.offline)?;
        let mut items = self.items.write().await;
        if items.contains_key(&item.id) {
            return Err(StoreError::Conflict(item.id));
        }
        items.insert(item.id.clone(), item);
        Ok(())
    }

    async fn get_item_by_id(&self, id: &str) -> Result<Option<CatalogItem>, StoreError> {
        check_online(&self.offline)?;
        Ok(self.items.read().await.get(id).cloned())
    }

    async fn list_items(&self) -> Result<Vec<CatalogItem>, StoreError> {
        check_online(&self.offline)?;
        let mut items: Vec<CatalogItem> = self.items.read().await.values().cloned().collect();
        items.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(items)
    }

    async fn update_item(
        &self,
        id: &str,
        input: ItemInput,
    ) -> Result<Option<CatalogItem>, StoreError> {
        check_online(&self.offline)?;
        let mut items = self.items.write().await;
        let Some(item) = items.get_mut(id) else {
            return Ok(None);
        };
        item.country = input.country;
        item.year = input.year;
        item.currency = input.currency;
        item.value = input.value;
        item.price = input.price;
        Ok(Some(item.clone()))
    }

    async fn set_confirmation(&self, id: &str, time: &str, info: &str) -> Result<bool, StoreError> {
        check_online(&self.offline)?;
        let mut items = self.items.write().await;
        let Some(item) = items.get_mut(id) else {
            return Ok(false);
        };
        item.confirmation_time = Some(time.to_string());
        item.confirmation_info = Some(info.to_string());
        Ok(true)
    }

    async fn delete_item(&self, id: &str) -> Result<bool, StoreError> {
        check_online(&self.offline)?;
        Ok(self.items.write().await.remove(id).is_some())
    }
}

#[derive(Default)]
struct UserTable {
    users: HashMap<String, User>,
    /// Dedupe keys whose increment was applied, per user, with the time applied.
    /// Never pruned here; a durable store would expire keys after the
    /// broker's retention period.
    applied: HashMap<String, HashMap<String, DateTime<Utc>>>,
}

/// Users keyed by id, with per-user applied dedupe keys.
#[derive(Default)]
pub struct InMemoryUserStore {
    table: RwLock<UserTable>,
    offline: AtomicBool,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every operation fail with [`StoreError::Unavailable`].
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn insert_user(&self, user: User) -> Result<(), StoreError> {
        check_online(&self.offline)?;
        let mut table = self.table.write().await;
        if table.users.contains_key(&user.id) {
            return Err(StoreError::Conflict(user.id));
        }
        table.users.insert(user.id.clone(), user);
        Ok(())
    }

    async fn get_user(&self, id: &str) -> Result<Option<User>, StoreError> {
        check_online(&self.offline)?;
        Ok(self.table.read().await.users.get(id).cloned())
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        check_online(&self.offline)?;
        let mut users: Vec<User> = self.table.read().await.users.values().cloned().collect();
        users.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(users)
    }

    async fn increment_registered_objects(
        &self,
        user_id: &str,
        dedupe_key: Option<&str>,
        applied_at: DateTime<Utc>,
    ) -> Result<IncrementOutcome, StoreError> {
        check_online(&self.offline)?;
        let mut table = self.table.write().await;
        let UserTable { users, applied } = &mut *table;

        let Some(user) = users.get_mut(user_id) else {
            return Ok(IncrementOutcome::UserNotFound);
        };

        if let Some(key) = dedupe_key {
            let keys = applied.entry(user_id.to_string()).or_default();
            if let Some(first_applied_at) = keys.get(key) {
                return Ok(IncrementOutcome::AlreadyApplied {
                    first_applied_at: *first_applied_at,
                });
            }
            keys.insert(key.to_string(), applied_at);
        }

        user.registered_objects += 1;
        Ok(IncrementOutcome::Applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, hour, 0, 0).unwrap()
    }

    fn user(id: &str) -> User {
        User {
            id: id.to_string(),
            name: "Ann".to_string(),
            email: "ann@example.com".to_string(),
            registered_objects: 0,
        }
    }

    #[tokio::test]
    async fn test_increment_without_dedupe_counts_every_call() {
        let store = InMemoryUserStore::new();
        store.insert_user(user("U1")).await.unwrap();

        for _ in 0..2 {
            let outcome = store.increment_registered_objects("U1", None, at(0)).await.unwrap();
            assert_eq!(outcome, IncrementOutcome::Applied);
        }
        assert_eq!(store.get_user("U1").await.unwrap().unwrap().registered_objects, 2);
    }

    #[tokio::test]
    async fn test_increment_with_dedupe_key_applies_once() {
        let store = InMemoryUserStore::new();
        store.insert_user(user("U1")).await.unwrap();

        let first = store.increment_registered_objects("U1", Some("c1:U1"), at(0)).await.unwrap();
        let second = store.increment_registered_objects("U1", Some("c1:U1"), at(1)).await.unwrap();
        let other = store.increment_registered_objects("U1", Some("c2:U1"), at(2)).await.unwrap();

        assert_eq!(first, IncrementOutcome::Applied);
        assert_eq!(
            second,
            IncrementOutcome::AlreadyApplied {
                first_applied_at: at(0)
            }
        );
        assert_eq!(other, IncrementOutcome::Applied);
        assert_eq!(store.get_user("U1").await.unwrap().unwrap().registered_objects, 2);
    }

    #[tokio::test]
    async fn test_increment_unknown_user() {
        let store = InMemoryUserStore::new();
        let outcome = store
            .increment_registered_objects("nobody", Some("c1:nobody"), at(0))
            .await
            .unwrap();
        assert_eq!(outcome, IncrementOutcome::UserNotFound);
        assert_eq!(outcome.matched_count(), 0);
    }

    #[tokio::test]
    async fn test_offline_store_errors() {
        let store = InMemoryUserStore::new();
        store.set_offline(true);
        assert!(matches!(
            store.increment_registered_objects("U1", None, at(0)).await,
            Err(StoreError::Unavailable(_))
        ));
    }

    fn coin(id: &str) -> CatalogItem {
        CatalogItem {
            id: id.to_string(),
            country: "Peru".to_string(),
            year: 1935,
            currency: "sol".to_string(),
            value: 1.0,
            price: 4.0,
            confirmed_by_user_id: Some("U1".to_string()),
            confirmation_time: None,
            confirmation_info: None,
        }
    }

    fn input(price: f64, confirmer: Option<&str>) -> ItemInput {
        ItemInput {
            country: "Peru".to_string(),
            year: 1935,
            currency: "sol".to_string(),
            value: 1.0,
            price,
            confirmed_by_user_id: confirmer.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_item_update_requires_existing() {
        let store = InMemoryItemStore::new();
        let item = coin("c1");

        assert!(store.update_item("c1", input(5.0, None)).await.unwrap().is_none());
        assert!(!store.set_confirmation("c1", "t", "Confirmed t").await.unwrap());
        store.insert_item(item.clone()).await.unwrap();
        assert!(matches!(
            store.insert_item(item.clone()).await,
            Err(StoreError::Conflict(_))
        ));
        assert!(store.update_item("c1", input(5.0, None)).await.unwrap().is_some());
        assert!(store.delete_item("c1").await.unwrap());
        assert!(store.get_item_by_id("c1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_and_confirmation_touch_separate_fields() {
        let store = InMemoryItemStore::new();
        store.insert_item(coin("c1")).await.unwrap();

        let time = "2024-01-01T00:00:00Z";
        let info = "Confirmed 2024-01-01T00:00:00Z";
        assert!(store.set_confirmation("c1", time, info).await.unwrap());
        let updated = store
            .update_item("c1", input(9.5, Some("U2")))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(updated.price, 9.5);
        assert_eq!(updated.confirmed_by_user_id.as_deref(), Some("U1"));
        assert_eq!(updated.confirmation_time.as_deref(), Some(time));
        assert_eq!(updated.confirmation_info.as_deref(), Some(info));
        assert_eq!(store.get_item_by_id("c1").await.unwrap(), Some(updated));
    }
}
