//! Service configuration.
//!
//! Values come from built-in defaults, an optional `confirm.toml` file and
//! `CONFIRM_*` environment variables, in that order of precedence (lowest
//! first). Nested keys use a double underscore, for example
//! `CONFIRM_BROKER__BOOTSTRAP_SERVERS=kafka:9092`.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{DEFAULT_PARTITIONS, DEFAULT_POLL_TIMEOUT_MS, DEFAULT_STARTUP_DELAY_MS};

/// Which half (or both halves) of the protocol this process hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceRole {
    /// Catalog service: request publisher and response consumer
    Catalog,
    /// User service: request consumer and counter updater
    Users,
    /// Both services in one process (in-memory broker demos)
    All,
}

impl ServiceRole {
    pub fn hosts_catalog(&self) -> bool {
        matches!(self, ServiceRole::Catalog | ServiceRole::All)
    }

    pub fn hosts_users(&self) -> bool {
        matches!(self, ServiceRole::Users | ServiceRole::All)
    }
}

/// Broker implementation backing the message handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrokerBackend {
    Memory,
    Kafka,
}

/// Top-level settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub service: ServiceSettings,
    pub broker: BrokerSettings,
    pub topics: TopicSettings,
    pub consumers: ConsumerSettings,
    pub retry: RetrySettings,
    pub outbox: OutboxSettings,
    pub idempotency: IdempotencySettings,
}

impl Settings {
    /// Load settings from `confirm.toml` (optional) and the environment.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(None)
    }

    /// Load settings, reading the given file instead of `confirm.toml`.
    pub fn load_from(file: Option<&str>) -> anyhow::Result<Self> {
        let file = file.unwrap_or("confirm");
        let settings = config::Config::builder()
            .add_source(config::File::with_name(file).required(false))
            .add_source(
                config::Environment::with_prefix("CONFIRM")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    pub role: ServiceRole,
    pub port: u16,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            role: ServiceRole::All,
            port: 3020,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerSettings {
    pub backend: BrokerBackend,
    pub bootstrap_servers: String,
    pub client_id: String,
    /// Partitions per topic for the in-memory broker
    pub partitions: usize,
    /// Producer acknowledgement level; `all` waits for every in-sync replica
    pub acks: String,
    pub send_timeout_ms: u64,
    pub session_timeout_ms: u32,
}

impl BrokerSettings {
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            backend: BrokerBackend::Memory,
            bootstrap_servers: "localhost:9092".to_string(),
            client_id: "coin-confirm".to_string(),
            partitions: DEFAULT_PARTITIONS,
            acks: "all".to_string(),
            send_timeout_ms: 10_000,
            session_timeout_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TopicSettings {
    pub requests: String,
    pub responses: String,
    /// Poison messages are forwarded here when set, otherwise discarded
    pub dead_letter: Option<String>,
}

impl Default for TopicSettings {
    fn default() -> Self {
        Self {
            requests: "objects.confirm.requests".to_string(),
            responses: "objects.confirm.responses".to_string(),
            dead_letter: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsumerSettings {
    /// Group of the user-service request consumer
    pub request_group: String,
    /// Group of the catalog-service response consumer
    pub response_group: String,
    pub startup_delay_ms: u64,
    pub poll_timeout_ms: u64,
}

impl ConsumerSettings {
    pub fn startup_delay(&self) -> Duration {
        Duration::from_millis(self.startup_delay_ms)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }
}

impl Default for ConsumerSettings {
    fn default() -> Self {
        Self {
            request_group: "storeofcoins-users-consumer".to_string(),
            response_group: "storeofcoins-objects-consumer".to_string(),
            startup_delay_ms: DEFAULT_STARTUP_DELAY_MS,
            poll_timeout_ms: DEFAULT_POLL_TIMEOUT_MS,
        }
    }
}

/// Capped exponential backoff used by every retry loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub multiplier: u32,
    /// Scale each delay by a random factor in [0.5, 1.0]
    pub jitter: bool,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            initial_backoff_ms: 500,
            max_backoff_ms: 30_000,
            multiplier: 2,
            jitter: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutboxSettings {
    pub enabled: bool,
    pub directory: PathBuf,
    pub relay_interval_ms: u64,
}

impl OutboxSettings {
    pub fn relay_interval(&self) -> Duration {
        Duration::from_millis(self.relay_interval_ms)
    }
}

impl Default for OutboxSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: PathBuf::from("data/outbox"),
            relay_interval_ms: 2_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdempotencySettings {
    /// Apply at most one counter increment per (objectId, userId)
    pub dedupe_requests: bool,
}

impl Default for IdempotencySettings {
    fn default() -> Self {
        Self {
            dedupe_requests: true,
        }
    }
}
