//! Coin Confirm - Main Entry Point
//!
//! Hosts the catalog side, the user side, or both, depending on the
//! configured role.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use coin_confirm::api::{self, handlers::AppState};
use coin_confirm::confirm::{
    system_clock, ConfirmationApplier, ConfirmationPublisher, ConsumerHandle, ConsumerLoop,
    CounterUpdater, DeadLetter, MessageHandler,
};
use coin_confirm::messaging::{InMemoryBroker, MessageProducer};
use coin_confirm::outbox::{Outbox, OutboxRelay};
use coin_confirm::service::{CatalogService, UserService};
use coin_confirm::shutdown::{Shutdown, ShutdownListener};
use coin_confirm::store::{InMemoryItemStore, InMemoryUserStore};
use coin_confirm::types::{BrokerBackend, Settings};

#[cfg(feature = "kafka")]
use coin_confirm::messaging::{KafkaConfirmConsumer, KafkaConfirmProducer};

/// Broker handles, built once at startup.
enum Brokers {
    Memory(InMemoryBroker),
    #[cfg(feature = "kafka")]
    Kafka,
}

impl Brokers {
    fn new(settings: &Settings) -> Result<Self> {
        match settings.broker.backend {
            BrokerBackend::Memory => Ok(Brokers::Memory(InMemoryBroker::new(settings.broker.partitions))),
            #[cfg(feature = "kafka")]
            BrokerBackend::Kafka => Ok(Brokers::Kafka),
            #[cfg(not(feature = "kafka"))]
            BrokerBackend::Kafka => anyhow::bail!("kafka backend requested but built without the `kafka` feature"),
        }
    }

    #[cfg_attr(not(feature = "kafka"), allow(unused_variables))]
    fn producer(&self, settings: &Settings) -> Result<Arc<dyn MessageProducer>> {
        match self {
            Brokers::Memory(broker) => Ok(Arc::new(broker.producer())),
            #[cfg(feature = "kafka")]
            Brokers::Kafka => Ok(Arc::new(KafkaConfirmProducer::new(&settings.broker)?)),
        }
    }

    fn spawn_consumer<H: MessageHandler + 'static>(
        &self,
        settings: &Settings,
        group: &str,
        topic: &str,
        handler: H,
        dead_letter: Option<DeadLetter>,
        shutdown: ShutdownListener,
    ) -> Result<ConsumerHandle> {
        let handle = match self {
            Brokers::Memory(broker) => {
                ConsumerLoop::new(broker.consumer(group), handler, topic, &settings.retry)
                    .with_startup_delay(settings.consumers.startup_delay())
                    .with_poll_timeout(settings.consumers.poll_timeout())
                    .with_dead_letter(dead_letter)
                    .spawn(shutdown)
            }
            #[cfg(feature = "kafka")]
            Brokers::Kafka => {
                let consumer = KafkaConfirmConsumer::new(&settings.broker, group)?;
                ConsumerLoop::new(consumer, handler, topic, &settings.retry)
                    .with_startup_delay(settings.consumers.startup_delay())
                    .with_poll_timeout(settings.consumers.poll_timeout())
                    .with_dead_letter(dead_letter)
                    .spawn(shutdown)
            }
        };
        Ok(handle)
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "coin_confirm=info,tower_http=debug".into()),
    );
    let registry = tracing_subscriber::registry().with(filter);

    if std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json")) {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let settings = Settings::load()?;
    let role = settings.service.role;

    info!("Starting Coin Confirm v{}", env!("CARGO_PKG_VERSION"));
    info!(role = ?role, backend = ?settings.broker.backend, "Loaded configuration");

    let shutdown = Shutdown::new();
    let brokers = Brokers::new(&settings)?;
    let producer = brokers.producer(&settings)?;
    let dead_letter = settings.topics.dead_letter.clone().map(|topic| DeadLetter {
        producer: Arc::clone(&producer),
        topic,
    });

    let mut consumers: Vec<ConsumerHandle> = Vec::new();
    let mut relay: Option<JoinHandle<()>> = None;

    let catalog = if role.hosts_catalog() {
        let items = Arc::new(InMemoryItemStore::new());
        let mut publisher = ConfirmationPublisher::new(Arc::clone(&producer), &settings.topics.requests);

        if settings.outbox.enabled {
            let outbox = Arc::new(Outbox::open(&settings.outbox.directory).await?);
            publisher = publisher.with_outbox(Arc::clone(&outbox));
            relay = Some(
                OutboxRelay::new(
                    outbox,
                    Arc::clone(&producer),
                    settings.outbox.relay_interval(),
                    &settings.retry,
                )
                .spawn(shutdown.listener()),
            );
        }

        consumers.push(brokers.spawn_consumer(
            &settings,
            &settings.consumers.response_group,
            &settings.topics.responses,
            ConfirmationApplier::new(items.clone()),
            dead_letter.clone(),
            shutdown.listener(),
        )?);

        Some(CatalogService::new(items, Some(Arc::new(publisher))))
    } else {
        None
    };

    let users = if role.hosts_users() {
        let store = Arc::new(InMemoryUserStore::new());
        let counter = CounterUpdater::new(
            store.clone(),
            Arc::clone(&producer),
            &settings.topics.responses,
            system_clock(),
        )
        .with_dedupe(settings.idempotency.dedupe_requests);

        consumers.push(brokers.spawn_consumer(
            &settings,
            &settings.consumers.request_group,
            &settings.topics.requests,
            counter,
            dead_letter.clone(),
            shutdown.listener(),
        )?);

        Some(UserService::new(store))
    } else {
        None
    };

    let state = Arc::new(AppState {
        role,
        catalog,
        users,
    });
    let app = api::router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], settings.service.port));
    info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let mut signal = shutdown.listener();
    let trigger = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    if let Err(e) = result {
                        warn!(error = %e, "Failed to listen for Ctrl-C");
                    }
                    info!("Shutdown requested");
                    trigger.trigger();
                }
                _ = signal.triggered() => {}
            }
        })
        .await?;

    shutdown.trigger();
    for consumer in consumers {
        consumer.join().await;
    }
    if let Some(relay) = relay {
        if let Err(e) = relay.await {
            warn!(error = %e, "Outbox relay task aborted");
        }
    }
    if let Err(e) = producer.flush(settings.broker.send_timeout()).await {
        warn!(error = %e, "Producer flush failed");
    }

    info!("Coin Confirm stopped");
    Ok(())
}
