//! Suspension points for backoff, pacing and polling delays.
//!
//! Every wait in the crate goes through a [`Sleeper`] so the delay contract can
//! be checked without real time passing.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Sleeps on the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Fake clock: records each requested delay and returns immediately.
#[derive(Debug, Clone, Default)]
pub struct RecordingSleeper {
    calls: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays requested so far, in call order.
    pub fn calls(&self) -> Vec<Duration> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    pub fn total(&self) -> Duration {
        self.calls().iter().sum()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(duration);
        }
        tokio::task::yield_now().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn recording_sleeper_records_in_order() {
        let sleeper = RecordingSleeper::new();
        sleeper.sleep(Duration::from_millis(100)).await;
        sleeper.sleep(Duration::from_millis(200)).await;

        assert_eq!(
            sleeper.calls(),
            vec![Duration::from_millis(100), Duration::from_millis(200)]
        );
        assert_eq!(sleeper.total(), Duration::from_millis(300));
    }

    #[tokio::test]
    async fn clones_share_the_log() {
        let sleeper = RecordingSleeper::new();
        let clone = sleeper.clone();
        clone.sleep(Duration::from_secs(1)).await;
        assert_eq!(sleeper.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn tokio_sleeper_advances_time() {
        let start = tokio::time::Instant::now();
        TokioSleeper.sleep(Duration::from_secs(5)).await;
        assert!(start.elapsed() >= Duration::from_secs(5));
    }
}
