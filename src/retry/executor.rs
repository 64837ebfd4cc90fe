use std::sync::Arc;

use chrono::Utc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::policy::RetryPolicy;
use super::sleeper::{Sleeper, TokioSleeper};
use crate::dispatch::RateGate;
use crate::error::{ConfigError, ErrorClass};
use crate::operation::{CANCELLED_REASON, InvocationContext, OperationDescriptor, OperationResult};
use crate::telemetry::{DispatchEvent, DispatchObserver, NoOpObserver};

/// Runs one operation with bounded retries and exponential backoff.
///
/// Never returns an error for operation failures: the final attempt's
/// outcome always comes back as an [`OperationResult`].
#[derive(Clone)]
pub struct RetryExecutor {
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
    observer: Arc<dyn DispatchObserver>,
    cancel: CancellationToken,
    gate: Option<Arc<RateGate>>,
}

impl RetryExecutor {
    /// Validates the policy up front; a zero-attempt policy is rejected here.
    pub fn new(policy: RetryPolicy) -> Result<Self, ConfigError> {
        policy.validate()?;
        Ok(Self {
            policy,
            sleeper: Arc::new(TokioSleeper),
            observer: Arc::new(NoOpObserver),
            cancel: CancellationToken::new(),
            gate: None,
        })
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn DispatchObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Gate every attempt, retries included, on a shared [`RateGate`].
    pub fn with_rate_gate(mut self, gate: Arc<RateGate>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn is_gated(&self) -> bool {
        self.gate.is_some()
    }

    /// Run `descriptor` at batch position `index` until it succeeds, a
    /// non-retryable failure occurs, the attempt budget runs out, or
    /// cancellation is requested between attempts.
    ///
    /// With a rate gate attached every attempt, retries included, waits for
    /// a gate slot first. If the first attempt never gets to run the result
    /// is a skipped one (`attempt == 0`).
    pub async fn execute(&self, descriptor: &OperationDescriptor, index: usize) -> OperationResult {
        let started = Instant::now();
        let max_attempts = self.policy.max_attempts;
        let mut attempt = 1;
        let mut previous: Option<(OperationResult, ErrorClass)> = None;

        loop {
            if let Err(reason) = self.admit().await {
                return match previous {
                    None => self.skip(index, descriptor, &reason),
                    Some((mut result, class)) => {
                        result.elapsed = started.elapsed();
                        self.interrupt(result, class, reason)
                    }
                };
            }

            let ctx = InvocationContext::new(descriptor.id.clone(), index, attempt);
            self.observer.on_event(&DispatchEvent::AttemptStarted {
                index,
                attempt,
                max_attempts,
            });

            let call_started = Instant::now();
            let (ok, status_code, message, retry_after) =
                match descriptor.operation.invoke(&ctx).await {
                    Ok(outcome) if outcome.ok => (true, outcome.status_code, None, None),
                    Ok(outcome) => {
                        let message = if outcome.message.is_empty() {
                            format!("operation reported failure (status {})", outcome.status_code)
                        } else {
                            outcome.message
                        };
                        (false, outcome.status_code, Some(message), outcome.retry_after)
                    }
                    Err(err) => (false, err.status_code(), Some(err.to_string()), None),
                };
            let latency = call_started.elapsed();

            let result = OperationResult {
                index,
                operation_id: descriptor.id.clone(),
                ok,
                status_code,
                error_message: message,
                latency,
                elapsed: started.elapsed(),
                attempt,
                timestamp: Utc::now(),
                metadata: descriptor.metadata.clone(),
            };

            if ok {
                return self.finish(result);
            }

            let message = result.error_message.clone().unwrap_or_default();
            let class = ErrorClass::classify(status_code, &message);

            if !self.policy.is_retryable(class) {
                self.observer.on_event(&DispatchEvent::RetryAbandoned {
                    index,
                    attempt,
                    class,
                });
                return self.finish(result);
            }

            if attempt < max_attempts && self.cancel.is_cancelled() {
                return self.interrupt(result, class, CANCELLED_REASON.to_string());
            }

            let next_delay = (attempt < max_attempts)
                .then(|| self.policy.delay_with_hint(attempt, retry_after));
            self.observer.on_event(&DispatchEvent::AttemptFailed {
                index,
                attempt,
                class,
                status_code,
                message,
                next_delay,
            });

            let Some(delay) = next_delay else {
                return self.finish(result);
            };

            let interrupted = tokio::select! {
                _ = self.sleeper.sleep(delay) => false,
                _ = self.cancel.cancelled() => true,
            };
            if interrupted {
                let mut result = result;
                result.elapsed = started.elapsed();
                return self.interrupt(result, class, CANCELLED_REASON.to_string());
            }

            previous = Some((result, class));
            attempt += 1;
        }
    }

    /// Clears an attempt to start: not cancelled, and holding a gate slot
    /// when a gate is attached. `Err` carries the reason it may not run.
    async fn admit(&self) -> Result<(), String> {
        if self.cancel.is_cancelled() {
            return Err(CANCELLED_REASON.to_string());
        }
        let Some(gate) = &self.gate else {
            return Ok(());
        };

        tokio::select! {
            acquired = gate.acquire() => acquired.map_err(|err| err.to_string())?,
            _ = self.cancel.cancelled() => return Err(CANCELLED_REASON.to_string()),
        };
        if self.cancel.is_cancelled() {
            return Err(CANCELLED_REASON.to_string());
        }
        Ok(())
    }

    fn skip(&self, index: usize, descriptor: &OperationDescriptor, reason: &str) -> OperationResult {
        self.observer.on_event(&DispatchEvent::ItemSkipped {
            index,
            reason: reason.to_string(),
        });
        OperationResult::skipped(index, descriptor, reason)
    }

    /// Ends a retry sequence early; the last failure stands as the result.
    fn interrupt(&self, result: OperationResult, class: ErrorClass, reason: String) -> OperationResult {
        self.observer.on_event(&DispatchEvent::RetryInterrupted {
            index: result.index,
            attempt: result.attempt,
            class,
            reason,
        });
        self.finish(result)
    }

    fn finish(&self, result: OperationResult) -> OperationResult {
        self.observer.on_event(&DispatchEvent::ItemCompleted {
            index: result.index,
            ok: result.ok,
            attempts: result.attempt,
            latency: result.latency,
        });
        result
    }
}
