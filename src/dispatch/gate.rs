use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::GateError;
use crate::retry::{Sleeper, TokioSleeper};

/// Fixed-interval gate shared by concurrent workers.
///
/// Each `acquire` reserves the next free slot, spaced `interval` after the
/// previous one, then waits for it. A slot further away than `max_wait` is
/// refused without being reserved.
pub struct RateGate {
    interval: Duration,
    max_wait: Duration,
    sleeper: Arc<dyn Sleeper>,
    next_slot: Mutex<Option<Instant>>,
}

impl RateGate {
    pub fn new(interval: Duration, max_wait: Duration) -> Self {
        Self {
            interval,
            max_wait,
            sleeper: Arc::new(TokioSleeper),
            next_slot: Mutex::new(None),
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Waits for the next slot and returns how long that took.
    pub async fn acquire(&self) -> Result<Duration, GateError> {
        let wait = {
            let mut next = self.next_slot.lock().await;
            let now = Instant::now();
            let slot = match *next {
                Some(slot) if slot > now => slot,
                _ => now,
            };
            let wait = slot.saturating_duration_since(now);
            if wait > self.max_wait {
                return Err(GateError::Saturated {
                    wait_ms: wait.as_millis(),
                    max_wait_ms: self.max_wait.as_millis(),
                });
            }
            *next = Some(slot + self.interval);
            wait
        };

        if !wait.is_zero() {
            self.sleeper.sleep(wait).await;
        }
        Ok(wait)
    }
}

impl std::fmt::Debug for RateGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateGate")
            .field("interval", &self.interval)
            .field("max_wait", &self.max_wait)
            .finish()
    }
}
