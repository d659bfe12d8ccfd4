//! Background task re-sending outbox records.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::{Outbox, OutboxError};
use crate::messaging::{Backoff, MessageProducer};
use crate::shutdown::ShutdownListener;
use crate::types::RetrySettings;

/// Result of one relay pass over the outbox.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RelayPass {
    pub sent: usize,
    pub remaining: usize,
    /// The pass stopped on a failed send
    pub failed: bool,
}

pub struct OutboxRelay {
    outbox: Arc<Outbox>,
    producer: Arc<dyn MessageProducer>,
    interval: Duration,
    backoff: Backoff,
}

impl OutboxRelay {
    pub fn new(
        outbox: Arc<Outbox>,
        producer: Arc<dyn MessageProducer>,
        interval: Duration,
        retry: &RetrySettings,
    ) -> Self {
        Self {
            outbox,
            producer,
            interval,
            backoff: Backoff::new(retry),
        }
    }

    /// Send pending records oldest first. Stops at the first failed send so
    /// records keep their order and an unreachable broker is not hammered.
    pub async fn drain_once(&self) -> Result<RelayPass, OutboxError> {
        let pending = self.outbox.pending().await?;
        let mut pass = RelayPass {
            remaining: pending.len(),
            ..Default::default()
        };

        for record in pending {
            match self
                .producer
                .send(&record.topic, &record.key, record.payload.as_bytes())
                .await
            {
                Ok(delivery) => {
                    self.outbox.remove(record.id).await?;
                    pass.sent += 1;
                    pass.remaining -= 1;
                    info!(
                        id = %record.id,
                        key = %record.key,
                        topic = %record.topic,
                        partition = delivery.partition,
                        offset = delivery.offset,
                        attempts = record.attempts + 1,
                        "Outbox record published"
                    );
                }
                Err(e) => {
                    warn!(id = %record.id, key = %record.key, error = %e, "Outbox publish failed");
                    self.outbox.mark_attempt_failed(&record, &e.to_string()).await?;
                    pass.failed = true;
                    break;
                }
            }
        }

        Ok(pass)
    }

    /// Drain periodically until shutdown.
    pub async fn run(mut self, mut shutdown: ShutdownListener) {
        info!(dir = %self.outbox.dir().display(), "Outbox relay started");

        while !shutdown.is_triggered() {
            let delay = match self.drain_once().await {
                Ok(pass) if !pass.failed => {
                    self.backoff.reset();
                    self.interval
                }
                Ok(_) => self.backoff.next_delay(),
                Err(e) => {
                    error!(error = %e, "Outbox relay pass failed");
                    self.backoff.next_delay()
                }
            };

            if !shutdown.sleep(delay).await {
                break;
            }
        }

        info!("Outbox relay stopped");
    }

    pub fn spawn(self, shutdown: ShutdownListener) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::InMemoryBroker;
    use crate::shutdown::Shutdown;

    fn retry() -> RetrySettings {
        RetrySettings {
            initial_backoff_ms: 10,
            max_backoff_ms: 50,
            multiplier: 2,
            jitter: false,
        }
    }

    #[tokio::test]
    async fn test_drain_publishes_and_removes() {
        let dir = tempfile::tempdir().unwrap();
        let outbox = Arc::new(Outbox::open(dir.path()).await.unwrap());
        outbox.enqueue("requests", "c1", "a".to_string()).await.unwrap();
        outbox.enqueue("requests", "c2", "b".to_string()).await.unwrap();

        let broker = InMemoryBroker::new(2);
        let relay = OutboxRelay::new(
            Arc::clone(&outbox),
            Arc::new(broker.producer()),
            Duration::from_millis(10),
            &retry(),
        );

        let pass = relay.drain_once().await.unwrap();
        assert_eq!(pass, RelayPass { sent: 2, remaining: 0, failed: false });
        assert!(outbox.is_empty().await.unwrap());
        assert_eq!(broker.messages("requests").len(), 2);
    }

    #[tokio::test]
    async fn test_drain_stops_on_failure_and_keeps_record() {
        let dir = tempfile::tempdir().unwrap();
        let outbox = Arc::new(Outbox::open(dir.path()).await.unwrap());
        outbox.enqueue("requests", "c1", "a".to_string()).await.unwrap();

        let broker = InMemoryBroker::new(2);
        broker.set_available(false);
        let relay = OutboxRelay::new(
            Arc::clone(&outbox),
            Arc::new(broker.producer()),
            Duration::from_millis(10),
            &retry(),
        );

        let pass = relay.drain_once().await.unwrap();
        assert!(pass.failed);
        assert_eq!(pass.remaining, 1);

        let pending = outbox.pending().await.unwrap();
        assert_eq!(pending[0].attempts, 1);
        assert!(pending[0].last_error.is_some());
    }

    #[tokio::test]
    async fn test_run_recovers_when_broker_returns() {
        let dir = tempfile::tempdir().unwrap();
        let outbox = Arc::new(Outbox::open(dir.path()).await.unwrap());
        outbox.enqueue("requests", "c1", "a".to_string()).await.unwrap();

        let broker = InMemoryBroker::new(2);
        broker.set_available(false);

        let shutdown = Shutdown::new();
        let relay = OutboxRelay::new(
            Arc::clone(&outbox),
            Arc::new(broker.producer()),
            Duration::from_millis(5),
            &retry(),
        );
        let handle = relay.spawn(shutdown.listener());

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(broker.messages("requests").is_empty());

        broker.set_available(true);
        for _ in 0..200 {
            if outbox.is_empty().await.unwrap() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(outbox.is_empty().await.unwrap());
        assert_eq!(broker.messages("requests").len(), 1);

        shutdown.trigger();
        handle.await.unwrap();
    }
}
