//! Wire messages exchanged between the catalog and user services.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Asks the user service to record that `user_id` confirmed `object_id`.
///
/// Keyed by `object_id` on the requests topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmRequest {
    #[serde(alias = "ObjectId")]
    pub object_id: String,
    #[serde(alias = "UserId")]
    pub user_id: String,
}

impl ConfirmRequest {
    pub fn new(object_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            object_id: object_id.into(),
            user_id: user_id.into(),
        }
    }

    /// Identity of the request used to deduplicate redeliveries.
    pub fn dedupe_key(&self) -> String {
        format!("{}:{}", self.object_id, self.user_id)
    }
}

/// Tells the catalog service that the confirmation for `object_id` was recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmResponse {
    #[serde(alias = "ObjectId")]
    pub object_id: String,
    /// ISO-8601 timestamp
    #[serde(alias = "ConfirmationTime")]
    pub confirmation_time: String,
}

impl ConfirmResponse {
    pub fn new(object_id: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            object_id: object_id.into(),
            confirmation_time: format_confirmation_time(at),
        }
    }

    /// Human-readable note stored next to the confirmation time.
    pub fn confirmation_info(&self) -> String {
        format!("Confirmed {}", self.confirmation_time)
    }
}

/// Formats a timestamp the way it travels on the wire (`2024-01-01T00:00:00Z`).
pub fn format_confirmation_time(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}
