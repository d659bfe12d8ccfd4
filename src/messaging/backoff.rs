//! Capped exponential backoff with jitter.
//!
//! Shared by the consumer loops and the outbox relay. The delay doubles (by
//! default) after every consecutive failure up to a ceiling and resets on
//! the first success.

use std::time::Duration;

use crate::types::RetrySettings;

#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    multiplier: u32,
    jitter: bool,
    attempt: u32,
}

impl Backoff {
    pub fn new(settings: &RetrySettings) -> Self {
        Self {
            initial: Duration::from_millis(settings.initial_backoff_ms.max(1)),
            max: Duration::from_millis(settings.max_backoff_ms.max(settings.initial_backoff_ms)),
            multiplier: settings.multiplier.max(1),
            jitter: settings.jitter,
            attempt: 0,
        }
    }

    /// Delay to wait before the next attempt; advances the failure count.
    pub fn next_delay(&mut self) -> Duration {
        let factor = self.multiplier.saturating_pow(self.attempt);
        let delay = self.initial.saturating_mul(factor).min(self.max);
        self.attempt = self.attempt.saturating_add(1);

        if self.jitter {
            // 50-100% of the delay
            let jitter_factor = 0.5 + rand::random::<f64>() * 0.5;
            delay.mul_f64(jitter_factor)
        } else {
            delay
        }
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Consecutive failures since the last reset.
    pub fn attempts(&self) -> u32 {
        self.attempt
    }
}
