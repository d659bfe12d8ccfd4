//! Catalog item and user records.

use serde::{Deserialize, Serialize};

/// A coin in the catalog.
///
/// `confirmation_time` and `confirmation_info` are written only by the
/// confirmation applier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogItem {
    pub id: String,
    pub country: String,
    pub year: i32,
    pub currency: String,
    pub value: f64,
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmed_by_user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmation_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmation_info: Option<String>,
}

impl CatalogItem {
    /// Build an unconfirmed item from caller input.
    pub fn from_input(id: String, input: ItemInput) -> Self {
        Self {
            id,
            country: input.country,
            year: input.year,
            currency: input.currency,
            value: input.value,
            price: input.price,
            confirmed_by_user_id: input.confirmed_by_user_id,
            confirmation_time: None,
            confirmation_info: None,
        }
    }

    /// The confirming user, if one was named.
    pub fn confirmer(&self) -> Option<&str> {
        self.confirmed_by_user_id
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
    }

    pub fn is_confirmed(&self) -> bool {
        self.confirmation_time.is_some()
    }
}

/// Caller-supplied fields for creating or replacing an item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemInput {
    pub country: String,
    pub year: i32,
    pub currency: String,
    pub value: f64,
    pub price: f64,
    #[serde(default)]
    pub confirmed_by_user_id: Option<String>,
}

/// A user known to the user service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub registered_objects: u64,
}

/// Caller-supplied fields for creating a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInput {
    pub name: String,
    pub email: String,
}
