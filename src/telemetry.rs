//! Operation-level telemetry emitted by the executor and dispatcher.
//!
//! Observers receive [`DispatchEvent`]s as they happen. [`TracingObserver`]
//! forwards them to `tracing`; [`CollectingObserver`] keeps them in memory.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;

use crate::error::ErrorClass;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DispatchEvent {
    BatchStarted {
        total: usize,
        concurrency: usize,
    },
    AttemptStarted {
        index: usize,
        attempt: u32,
        max_attempts: u32,
    },
    /// A failed attempt. `next_delay` is `None` when no further attempt follows.
    AttemptFailed {
        index: usize,
        attempt: u32,
        class: ErrorClass,
        status_code: u16,
        message: String,
        next_delay: Option<Duration>,
    },
    /// The failure class is marked non-retryable by the policy.
    RetryAbandoned {
        index: usize,
        attempt: u32,
        class: ErrorClass,
    },
    /// Attempts remained but the sequence stopped early (cancellation or a
    /// saturated rate gate). The last failure stands as the result.
    RetryInterrupted {
        index: usize,
        attempt: u32,
        class: ErrorClass,
        reason: String,
    },
    ItemCompleted {
        index: usize,
        ok: bool,
        attempts: u32,
        latency: Duration,
    },
    ItemSkipped {
        index: usize,
        reason: String,
    },
    BatchFinished {
        total: usize,
        successful: usize,
        cancelled: bool,
        elapsed: Duration,
    },
}

pub trait DispatchObserver: Send + Sync {
    fn on_event(&self, event: &DispatchEvent);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpObserver;

impl DispatchObserver for NoOpObserver {
    fn on_event(&self, _event: &DispatchEvent) {}
}

/// Logs events with `tracing`.
///
/// Attempt starts are DEBUG, failed attempts WARN, exhaustion ERROR.
#[derive(Debug, Clone)]
pub struct TracingObserver {
    operation: String,
}

impl TracingObserver {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
        }
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }
}

impl Default for TracingObserver {
    fn default() -> Self {
        Self::new("dispatch")
    }
}

impl DispatchObserver for TracingObserver {
    fn on_event(&self, event: &DispatchEvent) {
        let op = self.operation.as_str();
        match event {
            DispatchEvent::BatchStarted { total, concurrency } => {
                tracing::info!(operation = op, total, concurrency, "batch started");
            }
            DispatchEvent::AttemptStarted {
                index,
                attempt,
                max_attempts,
            } => {
                tracing::debug!(operation = op, index, attempt, max_attempts, "starting attempt");
            }
            DispatchEvent::AttemptFailed {
                index,
                attempt,
                class,
                status_code,
                message,
                next_delay: Some(delay),
            } => {
                tracing::warn!(
                    operation = op,
                    index,
                    attempt,
                    class = %class,
                    status_code,
                    error = %message,
                    delay_ms = delay.as_millis() as u64,
                    "attempt failed, will retry"
                );
            }
            DispatchEvent::AttemptFailed {
                index,
                attempt,
                class,
                status_code,
                message,
                next_delay: None,
            } => {
                tracing::error!(
                    operation = op,
                    index,
                    attempts = attempt,
                    class = %class,
                    status_code,
                    error = %message,
                    "all attempts exhausted"
                );
            }
            DispatchEvent::RetryAbandoned {
                index,
                attempt,
                class,
            } => {
                tracing::warn!(
                    operation = op,
                    index,
                    attempt,
                    class = %class,
                    "not retrying non-retryable failure"
                );
            }
            DispatchEvent::RetryInterrupted {
                index,
                attempt,
                class,
                reason,
            } => {
                tracing::warn!(
                    operation = op,
                    index,
                    attempt,
                    class = %class,
                    reason = %reason,
                    "retries interrupted"
                );
            }
            DispatchEvent::ItemCompleted {
                index,
                ok,
                attempts,
                latency,
            } => {
                if *ok && *attempts > 1 {
                    tracing::info!(
                        operation = op,
                        index,
                        attempts,
                        latency_ms = latency.as_millis() as u64,
                        "succeeded after retry"
                    );
                } else {
                    tracing::debug!(
                        operation = op,
                        index,
                        ok,
                        attempts,
                        latency_ms = latency.as_millis() as u64,
                        "item completed"
                    );
                }
            }
            DispatchEvent::ItemSkipped { index, reason } => {
                tracing::warn!(operation = op, index, reason = %reason, "item skipped");
            }
            DispatchEvent::BatchFinished {
                total,
                successful,
                cancelled,
                elapsed,
            } => {
                tracing::info!(
                    operation = op,
                    total,
                    successful,
                    cancelled,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "batch finished"
                );
            }
        }
    }
}

/// Keeps every event in memory, in emission order.
#[derive(Debug, Default)]
pub struct CollectingObserver {
    events: Mutex<Vec<DispatchEvent>>,
}

impl CollectingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<DispatchEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn count(&self, pred: impl Fn(&DispatchEvent) -> bool) -> usize {
        self.events().iter().filter(|e| pred(e)).count()
    }
}

impl DispatchObserver for CollectingObserver {
    fn on_event(&self, event: &DispatchEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

impl<T: DispatchObserver + ?Sized> DispatchObserver for Arc<T> {
    fn on_event(&self, event: &DispatchEvent) {
        (**self).on_event(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collecting_observer_keeps_order() {
        let observer = CollectingObserver::new();
        observer.on_event(&DispatchEvent::BatchStarted {
            total: 2,
            concurrency: 1,
        });
        observer.on_event(&DispatchEvent::ItemSkipped {
            index: 0,
            reason: "cancelled".into(),
        });

        let events = observer.events();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], DispatchEvent::BatchStarted { total: 2, .. }));
        assert_eq!(
            observer.count(|e| matches!(e, DispatchEvent::ItemSkipped { .. })),
            1
        );
    }

    #[test]
    fn tracing_observer_handles_every_event() {
        let observer = TracingObserver::new("test");
        assert_eq!(observer.operation(), "test");
        assert_eq!(TracingObserver::default().operation(), "dispatch");

        let events = [
            DispatchEvent::BatchStarted {
                total: 1,
                concurrency: 1,
            },
            DispatchEvent::AttemptStarted {
                index: 0,
                attempt: 1,
                max_attempts: 2,
            },
            DispatchEvent::AttemptFailed {
                index: 0,
                attempt: 1,
                class: ErrorClass::ServerFault,
                status_code: 500,
                message: "internal".into(),
                next_delay: Some(Duration::from_millis(10)),
            },
            DispatchEvent::AttemptFailed {
                index: 0,
                attempt: 2,
                class: ErrorClass::ServerFault,
                status_code: 500,
                message: "internal".into(),
                next_delay: None,
            },
            DispatchEvent::RetryInterrupted {
                index: 0,
                attempt: 1,
                class: ErrorClass::ServerFault,
                reason: "cancelled before execution".into(),
            },
            DispatchEvent::ItemCompleted {
                index: 0,
                ok: false,
                attempts: 2,
                latency: Duration::from_millis(3),
            },
            DispatchEvent::BatchFinished {
                total: 1,
                successful: 0,
                cancelled: false,
                elapsed: Duration::from_millis(20),
            },
        ];
        for event in &events {
            observer.on_event(event);
        }
    }

    #[test]
    fn event_serializes_with_tag() {
        let json = serde_json::to_value(DispatchEvent::ItemSkipped {
            index: 4,
            reason: "cancelled".into(),
        })
        .unwrap();
        assert_eq!(json["event"], "item_skipped");
        assert_eq!(json["index"], 4);
    }
}
