use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::gate::RateGate;
use crate::aggregate::{AggregatedReport, ResultAggregator};
use crate::config::RelayConfig;
use crate::error::ConfigError;
use crate::operation::{CANCELLED_REASON, OperationDescriptor, OperationResult};
use crate::retry::{RetryExecutor, RetryPolicy, Sleeper, TokioSleeper};
use crate::telemetry::{DispatchEvent, DispatchObserver, TracingObserver};

const PANICKED_REASON: &str = "operation task panicked";

/// Results of one dispatch call, index-aligned with the submitted descriptors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchOutcome {
    pub results: Vec<OperationResult>,
    /// True if cancellation was requested before every item ran.
    pub cancelled: bool,
    pub elapsed: Duration,
}

/// Raw results plus their aggregated report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub results: Vec<OperationResult>,
    pub report: AggregatedReport,
    pub cancelled: bool,
}

/// Runs an ordered batch of operations with pacing and per-item retries.
///
/// One failed item never aborts the batch: `dispatch` always returns exactly
/// one result per descriptor, with `results[i]` belonging to `descriptors[i]`.
///
/// Pacing: without a shared gate, a sequential batch sleeps
/// `inter_item_delay` between items. In bounded mode, or whenever a gate was
/// supplied with [`DispatcherBuilder::rate_gate`], every attempt (retries
/// included) takes a slot on the gate instead.
pub struct PacedBatchDispatcher {
    executor: RetryExecutor,
    inter_item_delay: Duration,
    concurrency: usize,
    sleeper: Arc<dyn Sleeper>,
    observer: Arc<dyn DispatchObserver>,
    cancel: CancellationToken,
}

pub struct DispatcherBuilder {
    policy: RetryPolicy,
    inter_item_delay: Duration,
    concurrency: usize,
    gate_max_wait: Duration,
    gate: Option<Arc<RateGate>>,
    sleeper: Arc<dyn Sleeper>,
    observer: Arc<dyn DispatchObserver>,
    cancel: CancellationToken,
}

impl Default for DispatcherBuilder {
    fn default() -> Self {
        Self {
            policy: RetryPolicy::default(),
            inter_item_delay: Duration::from_secs(1),
            concurrency: 1,
            gate_max_wait: Duration::from_secs(60),
            gate: None,
            sleeper: Arc::new(TokioSleeper),
            observer: Arc::new(TracingObserver::default()),
            cancel: CancellationToken::new(),
        }
    }
}

impl DispatcherBuilder {
    pub fn policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn inter_item_delay(mut self, delay: Duration) -> Self {
        self.inter_item_delay = delay;
        self
    }

    /// Number of workers. 1 keeps the batch strictly sequential.
    pub fn concurrency(mut self, workers: usize) -> Self {
        self.concurrency = workers;
        self
    }

    /// Longest a worker may wait for a gate slot before the item fails.
    pub fn gate_max_wait(mut self, max_wait: Duration) -> Self {
        self.gate_max_wait = max_wait;
        self
    }

    /// Share one gate between dispatchers that hit the same remote ceiling.
    /// Applies in sequential mode too, replacing the inter-item sleep.
    pub fn rate_gate(mut self, gate: Arc<RateGate>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn observer(mut self, observer: Arc<dyn DispatchObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn build(self) -> Result<PacedBatchDispatcher, ConfigError> {
        if self.concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        let mut executor = RetryExecutor::new(self.policy)?
            .with_sleeper(self.sleeper.clone())
            .with_observer(self.observer.clone())
            .with_cancellation(self.cancel.clone());

        let gate = match self.gate {
            Some(gate) => Some(gate),
            None if self.concurrency > 1 => Some(Arc::new(
                RateGate::new(self.inter_item_delay, self.gate_max_wait)
                    .with_sleeper(self.sleeper.clone()),
            )),
            None => None,
        };
        if let Some(gate) = gate {
            executor = executor.with_rate_gate(gate);
        }

        Ok(PacedBatchDispatcher {
            executor,
            inter_item_delay: self.inter_item_delay,
            concurrency: self.concurrency,
            sleeper: self.sleeper,
            observer: self.observer,
            cancel: self.cancel,
        })
    }
}

impl PacedBatchDispatcher {
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::default()
    }

    /// Builder preloaded with the retry, pacing and concurrency settings of `config`.
    pub fn builder_from_config(config: &RelayConfig) -> Result<DispatcherBuilder, ConfigError> {
        config.validate()?;
        Ok(DispatcherBuilder::default()
            .policy(config.retry_policy())
            .inter_item_delay(config.inter_item_delay())
            .concurrency(config.concurrency)
            .gate_max_wait(config.gate_max_wait()))
    }

    pub fn policy(&self) -> &RetryPolicy {
        self.executor.policy()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run every descriptor and return one result per descriptor, in order.
    pub async fn dispatch(&self, descriptors: &[OperationDescriptor]) -> DispatchOutcome {
        let started = Instant::now();
        self.observer.on_event(&DispatchEvent::BatchStarted {
            total: descriptors.len(),
            concurrency: self.concurrency,
        });

        let results = if self.concurrency <= 1 {
            self.dispatch_sequential(descriptors).await
        } else {
            self.dispatch_concurrent(descriptors).await
        };

        let cancelled = results.iter().any(|r| {
            r.was_skipped() && r.error_message.as_deref() == Some(CANCELLED_REASON)
        });
        let elapsed = started.elapsed();
        self.observer.on_event(&DispatchEvent::BatchFinished {
            total: results.len(),
            successful: results.iter().filter(|r| r.ok).count(),
            cancelled,
            elapsed,
        });

        DispatchOutcome {
            results,
            cancelled,
            elapsed,
        }
    }

    /// Dispatch, then aggregate the results.
    pub async fn run_batch(&self, descriptors: &[OperationDescriptor]) -> BatchReport {
        let outcome = self.dispatch(descriptors).await;
        let report = ResultAggregator::aggregate(&outcome.results);
        BatchReport {
            results: outcome.results,
            report,
            cancelled: outcome.cancelled,
        }
    }

    async fn dispatch_sequential(&self, descriptors: &[OperationDescriptor]) -> Vec<OperationResult> {
        let mut results = Vec::with_capacity(descriptors.len());

        for (index, descriptor) in descriptors.iter().enumerate() {
            if self.cancel.is_cancelled() {
                results.push(self.skip(index, descriptor, CANCELLED_REASON));
                continue;
            }

            if index > 0 && !self.executor.is_gated() && !self.inter_item_delay.is_zero() {
                let interrupted = tokio::select! {
                    _ = self.sleeper.sleep(self.inter_item_delay) => false,
                    _ = self.cancel.cancelled() => true,
                };
                if interrupted {
                    results.push(self.skip(index, descriptor, CANCELLED_REASON));
                    continue;
                }
            }

            results.push(self.executor.execute(descriptor, index).await);
        }

        results
    }

    async fn dispatch_concurrent(&self, descriptors: &[OperationDescriptor]) -> Vec<OperationResult> {
        let permits = Arc::new(Semaphore::new(self.concurrency));
        let mut workers = JoinSet::new();

        for (index, descriptor) in descriptors.iter().cloned().enumerate() {
            let Ok(permit) = permits.clone().acquire_owned().await else {
                break;
            };
            let executor = self.executor.clone();
            workers.spawn(async move {
                let _permit = permit;
                (index, executor.execute(&descriptor, index).await)
            });
        }

        let mut slots: Vec<Option<OperationResult>> = vec![None; descriptors.len()];
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok((index, result)) => slots[index] = Some(result),
                Err(err) => {
                    tracing::error!(error = %err, "dispatch worker failed");
                }
            }
        }

        slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.unwrap_or_else(|| self.skip(index, &descriptors[index], PANICKED_REASON))
            })
            .collect()
    }

    fn skip(&self, index: usize, descriptor: &OperationDescriptor, reason: &str) -> OperationResult {
        self.observer.on_event(&DispatchEvent::ItemSkipped {
            index,
            reason: reason.to_string(),
        });
        OperationResult::skipped(index, descriptor, reason)
    }
}
