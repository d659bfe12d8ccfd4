//! Core types for the confirmation protocol and its host services.

mod config;
mod item;
mod messages;

pub use config::{
    BrokerBackend, BrokerSettings, ConsumerSettings, IdempotencySettings, OutboxSettings,
    RetrySettings, ServiceRole, ServiceSettings, Settings, TopicSettings,
};
pub use item::{CatalogItem, ItemInput, User, UserInput};
pub use messages::{format_confirmation_time, ConfirmRequest, ConfirmResponse};
