//! Long-lived poll loop shared by both confirmation consumers.
//!
//! State machine: `Idle → Subscribing → Polling ⇄ Processing → Stopped`.
//!
//! - messages are handled strictly one at a time; the next poll happens only
//!   after the current message is committed or discarded
//! - transient handler failures retry the same message with capped
//!   exponential backoff
//! - poll failures back off and resume polling
//! - poison messages are dead-lettered (if configured), then committed
//! - a subscribe failure stops this loop only
//! - shutdown is observed at every poll boundary and during backoff; a
//!   message interrupted by shutdown is left uncommitted for redelivery

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::HandleError;
use crate::messaging::{Backoff, Envelope, MessageConsumer, MessageProducer};
use crate::shutdown::ShutdownListener;
use crate::types::RetrySettings;

/// Lifecycle of a consumer loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    Idle,
    Subscribing,
    Polling,
    Processing,
    Stopped,
}

/// Processes one message. Referential misses are `Ok`.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    fn name(&self) -> &'static str;

    async fn handle(&self, envelope: &Envelope) -> Result<(), HandleError>;
}

/// Destination for poison messages.
#[derive(Clone)]
pub struct DeadLetter {
    pub producer: Arc<dyn MessageProducer>,
    pub topic: String,
}

pub struct ConsumerLoop<C, H> {
    consumer: C,
    handler: H,
    topic: String,
    startup_delay: Duration,
    poll_timeout: Duration,
    backoff: Backoff,
    dead_letter: Option<DeadLetter>,
    state: watch::Sender<ConsumerState>,
}

impl<C, H> ConsumerLoop<C, H>
where
    C: MessageConsumer + 'static,
    H: MessageHandler + 'static,
{
    pub fn new(consumer: C, handler: H, topic: impl Into<String>, retry: &RetrySettings) -> Self {
        let (state, _) = watch::channel(ConsumerState::Idle);
        Self {
            consumer,
            handler,
            topic: topic.into(),
            startup_delay: Duration::ZERO,
            poll_timeout: Duration::from_millis(crate::DEFAULT_POLL_TIMEOUT_MS),
            backoff: Backoff::new(retry),
            dead_letter: None,
            state,
        }
    }

    /// Wait this long before the first subscribe attempt.
    pub fn with_startup_delay(mut self, delay: Duration) -> Self {
        self.startup_delay = delay;
        self
    }

    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    pub fn with_dead_letter(mut self, dead_letter: Option<DeadLetter>) -> Self {
        self.dead_letter = dead_letter;
        self
    }

    fn set_state(&self, next: ConsumerState) {
        self.state.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }

    pub fn spawn(self, shutdown: ShutdownListener) -> ConsumerHandle {
        let state = self.state.subscribe();
        let name = self.handler.name();
        let task = tokio::spawn(self.run(shutdown));
        ConsumerHandle { name, state, task }
    }

    pub async fn run(mut self, mut shutdown: ShutdownListener) {
        let name = self.handler.name();

        if !self.startup_delay.is_zero() {
            debug!(consumer = name, delay = ?self.startup_delay, "Waiting before subscribe");
            if !shutdown.sleep(self.startup_delay).await {
                self.set_state(ConsumerState::Stopped);
                return;
            }
        }

        self.set_state(ConsumerState::Subscribing);
        if let Err(e) = self.consumer.subscribe(&self.topic).await {
            error!(consumer = name, topic = %self.topic, error = %e, "Failed to subscribe, consumer stopped");
            self.set_state(ConsumerState::Stopped);
            return;
        }
        info!(consumer = name, topic = %self.topic, "Consumer subscribed");

        while !shutdown.is_triggered() {
            self.set_state(ConsumerState::Polling);
            let polled = match self.consumer.poll(self.poll_timeout).await {
                Ok(polled) => polled,
                Err(e) => {
                    let delay = self.backoff.next_delay();
                    warn!(consumer = name, error = %e, retry_in = ?delay, "Poll failed");
                    if !shutdown.sleep(delay).await {
                        break;
                    }
                    continue;
                }
            };
            self.backoff.reset();
            let Some(envelope) = polled else {
                continue;
            };

            self.set_state(ConsumerState::Processing);
            if !self.process(&envelope, &mut shutdown).await {
                break;
            }
        }

        self.set_state(ConsumerState::Stopped);
        info!(consumer = name, "Consumer stopped");
    }

    /// Handle one message until it is done. Returns `false` when shutdown
    /// interrupted the retries, leaving the message uncommitted.
    async fn process(&mut self, envelope: &Envelope, shutdown: &mut ShutdownListener) -> bool {
        let name = self.handler.name();

        loop {
            let result = AssertUnwindSafe(self.handler.handle(envelope))
                .catch_unwind()
                .await
                .unwrap_or_else(|_| Err(HandleError::Decode("handler panicked".to_string())));

            let retry_reason = match result {
                Ok(()) => break,
                Err(HandleError::Decode(reason)) => {
                    error!(
                        consumer = name,
                        topic = %envelope.topic,
                        partition = envelope.partition,
                        offset = envelope.offset,
                        error = %reason,
                        "Discarding poison message"
                    );
                    match send_to_dead_letter(self.dead_letter.as_ref(), envelope).await {
                        Ok(()) => break,
                        Err(e) => e,
                    }
                }
                Err(HandleError::Transient(reason)) => reason,
            };

            let delay = self.backoff.next_delay();
            warn!(
                consumer = name,
                partition = envelope.partition,
                offset = envelope.offset,
                error = %retry_reason,
                retry_in = ?delay,
                "Message handling failed, retrying"
            );
            if !shutdown.sleep(delay).await {
                return false;
            }
        }
        self.backoff.reset();

        if let Err(e) = self.consumer.commit(envelope).await {
            // The message is delivered again later.
            warn!(
                consumer = name,
                partition = envelope.partition,
                offset = envelope.offset,
                error = %e,
                "Offset commit failed"
            );
        }
        true
    }
}

async fn send_to_dead_letter(
    dead_letter: Option<&DeadLetter>,
    envelope: &Envelope,
) -> Result<(), String> {
    let Some(dead_letter) = dead_letter else {
        return Ok(());
    };
    let key = envelope.key.as_deref().unwrap_or_default();
    dead_letter
        .producer
        .send(&dead_letter.topic, key, &envelope.payload)
        .await
        .map(|_| ())
        .map_err(|e| e.to_string())
}

/// Running consumer loop.
pub struct ConsumerHandle {
    name: &'static str,
    state: watch::Receiver<ConsumerState>,
    task: JoinHandle<()>,
}

impl ConsumerHandle {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn state(&self) -> ConsumerState {
        *self.state.borrow()
    }

    /// Resolves once the loop reaches `target` (or the loop is gone).
    pub async fn wait_for(&mut self, target: ConsumerState) -> ConsumerState {
        let reached = self.state.wait_for(|s| *s == target).await.map(|s| *s);
        reached.unwrap_or_else(|_| self.state())
    }

    /// Wait for the task to finish after shutdown was triggered.
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            error!(consumer = self.name, error = %e, "Consumer task aborted");
        }
    }
}
