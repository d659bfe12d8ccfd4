//! Local durable retry queue for messages the broker did not accept.
//!
//! A publish that fails is written here as one JSON file per record and
//! re-sent by [`OutboxRelay`] once the broker is reachable again.

mod relay;
mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub use relay::{OutboxRelay, RelayPass};
pub use store::Outbox;

#[derive(Debug, Error)]
pub enum OutboxError {
    #[error("outbox i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("outbox record encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// A message waiting to be (re)published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboxRecord {
    pub id: Uuid,
    pub topic: String,
    pub key: String,
    pub payload: String,
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    pub last_error: Option<String>,
}

impl OutboxRecord {
    pub fn new(topic: &str, key: &str, payload: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            topic: topic.to_string(),
            key: key.to_string(),
            payload,
            attempts: 0,
            created_at: Utc::now(),
            last_error: None,
        }
    }
}
