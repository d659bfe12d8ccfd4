//! Coin Confirm Library
//!
//! Cross-service confirmation protocol for the coin catalog: the catalog
//! publishes a confirmation request when an item names a confirming user,
//! the user service counts it and answers, and the catalog stamps the item
//! with the confirmation time.

pub mod api;
pub mod confirm;
pub mod messaging;
pub mod outbox;
pub mod service;
pub mod shutdown;
pub mod store;
pub mod types;

pub use confirm::{
    ConfirmationApplier, ConfirmationPublisher, ConsumerLoop, ConsumerState, CounterUpdater,
    PublishOutcome,
};
pub use messaging::{InMemoryBroker, MessageConsumer, MessageProducer};
pub use shutdown::{Shutdown, ShutdownListener};
pub use types::{CatalogItem, ConfirmRequest, ConfirmResponse, Settings, User};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::confirm::*;
    pub use crate::messaging::{Envelope, MessageConsumer, MessageProducer};
    pub use crate::store::{ItemStore, UserStore};
    pub use crate::types::*;
}

/// Default partition count for the in-memory broker
pub const DEFAULT_PARTITIONS: usize = 6;

/// Default consumer poll timeout in milliseconds
pub const DEFAULT_POLL_TIMEOUT_MS: u64 = 1_000;

/// Default wait before consumers subscribe, in milliseconds
pub const DEFAULT_STARTUP_DELAY_MS: u64 = 5_000;
