//! Cross-service confirmation protocol.
//!
//! ```text
//! catalog: create item ──publish──▶ requests ──▶ user service: CounterUpdater
//!                                                    │ increment user counter
//! catalog: ConfirmationApplier ◀── responses ◀──publish┘
//!          set confirmation fields
//! ```
//!
//! Requests and responses are keyed by the item id, so both halves of one
//! item's exchange stay on a single partition each.

mod applier;
mod consumer;
mod counter;
mod publisher;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::messaging::BrokerError;
use crate::outbox::OutboxError;
use crate::store::StoreError;

pub use applier::ConfirmationApplier;
pub use consumer::{ConsumerHandle, ConsumerLoop, ConsumerState, DeadLetter, MessageHandler};
pub use counter::CounterUpdater;
pub use publisher::{ConfirmationPublisher, PublishOutcome};

/// Errors surfaced by the request publisher.
#[derive(Debug, Error)]
pub enum ConfirmError {
    #[error("invalid confirmation request: {0}")]
    InvalidRequest(&'static str),

    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error(transparent)]
    Outbox(#[from] OutboxError),

    #[error("failed to encode message: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Failure of one message handler invocation.
#[derive(Debug, Error)]
pub enum HandleError {
    /// The message can never be processed; it is discarded (or dead-lettered).
    #[error("poison message: {0}")]
    Decode(String),

    /// Retrying the same message later can succeed.
    #[error("transient failure: {0}")]
    Transient(String),
}

impl From<StoreError> for HandleError {
    fn from(e: StoreError) -> Self {
        HandleError::Transient(e.to_string())
    }
}

impl From<BrokerError> for HandleError {
    fn from(e: BrokerError) -> Self {
        HandleError::Transient(e.to_string())
    }
}

/// Decode a wire message, classifying failures as poison.
pub(crate) fn decode<T: DeserializeOwned>(payload: &[u8]) -> Result<T, HandleError> {
    serde_json::from_slice(payload).map_err(|e| HandleError::Decode(e.to_string()))
}

/// Source of confirmation timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Always returns the same instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

pub fn system_clock() -> Arc<dyn Clock> {
    Arc::new(SystemClock)
}
