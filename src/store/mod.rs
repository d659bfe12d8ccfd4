//! Record stores the confirmation protocol reads and writes.
//!
//! The document database is an external collaborator; the protocol only
//! needs lookup/replace by id for items and an atomic counter increment for
//! users. In-memory implementations back tests and single-process runs.

mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::types::{CatalogItem, ItemInput, User};

pub use memory::{InMemoryItemStore, InMemoryUserStore};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("record {0} already exists")]
    Conflict(String),
}

/// Result of a counter increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncrementOutcome {
    /// The counter was incremented
    Applied,
    /// The dedupe key was already applied at `first_applied_at`; nothing changed
    AlreadyApplied { first_applied_at: DateTime<Utc> },
    /// No user matched the id
    UserNotFound,
}

impl IncrementOutcome {
    /// Matched-document count, as a document store would report it.
    pub fn matched_count(&self) -> u64 {
        match self {
            IncrementOutcome::Applied | IncrementOutcome::AlreadyApplied { .. } => 1,
            IncrementOutcome::UserNotFound => 0,
        }
    }
}

/// Catalog items keyed by id.
///
/// The caller-owned fields and the confirmation fields are written by
/// separate single-document operations, so an item update and an applied
/// confirmation never overwrite each other.
#[async_trait]
pub trait ItemStore: Send + Sync {
    async fn insert_item(&self, item: CatalogItem) -> Result<(), StoreError>;

    async fn get_item_by_id(&self, id: &str) -> Result<Option<CatalogItem>, StoreError>;

    async fn list_items(&self) -> Result<Vec<CatalogItem>, StoreError>;

    /// Replace the descriptive fields of `id` with `input`. The confirming
    /// user and the confirmation fields are left as stored. Returns the
    /// updated item, or `None` when it does not exist.
    async fn update_item(
        &self,
        id: &str,
        input: ItemInput,
    ) -> Result<Option<CatalogItem>, StoreError>;

    /// Set `confirmationTime` and `confirmationInfo` of `id`, touching
    /// nothing else. Returns `false` when the item does not exist.
    async fn set_confirmation(&self, id: &str, time: &str, info: &str) -> Result<bool, StoreError>;

    async fn delete_item(&self, id: &str) -> Result<bool, StoreError>;
}

/// Users and their confirmation counter.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn insert_user(&self, user: User) -> Result<(), StoreError>;

    async fn get_user(&self, id: &str) -> Result<Option<User>, StoreError>;

    async fn list_users(&self) -> Result<Vec<User>, StoreError>;

    /// Atomically add one to `registered_objects` of `user_id`.
    ///
    /// With a `dedupe_key` the increment and the record of the key (stamped
    /// with `applied_at`) are one atomic step, and a key that was already
    /// applied leaves the counter untouched.
    async fn increment_registered_objects(
        &self,
        user_id: &str,
        dedupe_key: Option<&str>,
        applied_at: DateTime<Utc>,
    ) -> Result<IncrementOutcome, StoreError>;
}
