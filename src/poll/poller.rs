use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::session::{PollControl, PollSession, PollState};
use crate::error::ConfigError;
use crate::operation::{InvocationContext, Metadata, OperationResult, StateFetch};
use crate::retry::{Sleeper, TokioSleeper};

/// One tick of a poll session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PollAttempt<S> {
    pub attempt: u32,
    pub timestamp: DateTime<Utc>,
    /// Whether the fetch itself succeeded, regardless of the predicate.
    pub ok: bool,
    pub state: Option<S>,
    pub status_code: u16,
    pub error: Option<String>,
    pub latency: Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PollOutcome<S> {
    pub session_id: String,
    pub final_state: PollState,
    pub attempts_used: u32,
    pub elapsed: Duration,
    pub history: Vec<PollAttempt<S>>,
    /// The stop signal that ended the session, if any.
    pub control: Option<PollControl>,
}

impl<S> PollOutcome<S> {
    pub fn succeeded(&self) -> bool {
        self.final_state == PollState::Succeeded
    }

    /// Most recent successfully fetched state.
    pub fn last_state(&self) -> Option<&S> {
        self.history.iter().rev().find_map(|a| a.state.as_ref())
    }

    /// Converts the history into results for health reporting with
    /// [`ResultAggregator`](crate::ResultAggregator). A tick counts as ok
    /// when its fetch succeeded.
    pub fn to_operation_results(&self) -> Vec<OperationResult>
    where
        S: Serialize,
    {
        self.history
            .iter()
            .enumerate()
            .map(|(index, tick)| {
                let mut metadata = Metadata::new();
                metadata.insert("poll_attempt".into(), tick.attempt.into());
                if let Some(state) = tick.state.as_ref().and_then(|s| serde_json::to_value(s).ok()) {
                    metadata.insert("state".into(), state);
                }
                OperationResult {
                    index,
                    operation_id: self.session_id.clone(),
                    ok: tick.ok,
                    status_code: tick.status_code,
                    error_message: tick.error.clone(),
                    latency: tick.latency,
                    elapsed: tick.latency,
                    attempt: 1,
                    timestamp: tick.timestamp,
                    metadata,
                }
            })
            .collect()
    }
}

/// Polls a remote resource until a target state, a stop signal or budget exhaustion.
#[derive(Clone)]
pub struct StatePoller {
    sleeper: Arc<dyn Sleeper>,
    cancel: CancellationToken,
}

impl Default for StatePoller {
    fn default() -> Self {
        Self {
            sleeper: Arc::new(TokioSleeper),
            cancel: CancellationToken::new(),
        }
    }
}

impl StatePoller {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run `session` against `fetch`.
    ///
    /// Fails only when the session's budget is invalid. Fetch errors are
    /// recorded in the history and polling continues within the budget.
    pub async fn poll<F>(
        &self,
        fetch: &F,
        mut session: PollSession<F::State>,
    ) -> Result<PollOutcome<F::State>, ConfigError>
    where
        F: StateFetch + ?Sized,
    {
        session.validate()?;

        let session_id = Uuid::new_v4().to_string();
        let started = Instant::now();
        let no_payload = serde_json::Value::Null;
        let mut history: Vec<PollAttempt<F::State>> = Vec::new();
        let mut attempt = 0;

        let (final_state, control) = loop {
            if self.cancel.is_cancelled() {
                break (PollState::Cancelled, Some(PollControl::Cancel));
            }
            attempt += 1;

            let ctx = InvocationContext::new(session_id.clone(), 0, attempt);
            let tick_started = Instant::now();
            let fetched = fetch.fetch(&ctx).await;
            let latency = tick_started.elapsed();

            let (state, raw) = match &fetched {
                Ok(snapshot) => (Some(&snapshot.state), &snapshot.raw),
                Err(_) => (None, &no_payload),
            };
            history.push(match &fetched {
                Ok(snapshot) => PollAttempt {
                    attempt,
                    timestamp: Utc::now(),
                    ok: true,
                    state: Some(snapshot.state.clone()),
                    status_code: snapshot.status_code,
                    error: None,
                    latency,
                },
                Err(err) => PollAttempt {
                    attempt,
                    timestamp: Utc::now(),
                    ok: false,
                    state: None,
                    status_code: err.status_code(),
                    error: Some(err.to_string()),
                    latency,
                },
            });
            tracing::debug!(session = %session_id, attempt, state = ?state, "poll tick");

            if state.is_some_and(|s| (session.target)(s)) {
                break (PollState::Succeeded, None);
            }

            if let Some(stop) = session.stop.as_mut() {
                let signal = stop(state, attempt, raw);
                if signal != PollControl::Continue {
                    break (PollState::Cancelled, Some(signal));
                }
            }

            let elapsed = started.elapsed();
            if session.budget.is_exhausted(attempt, elapsed) {
                break (PollState::TimedOut, None);
            }

            let wait = session
                .budget
                .remaining(elapsed)
                .map_or(session.interval, |left| session.interval.min(left));
            let interrupted = tokio::select! {
                _ = self.sleeper.sleep(wait) => false,
                _ = self.cancel.cancelled() => true,
            };
            if interrupted {
                break (PollState::Cancelled, Some(PollControl::Cancel));
            }
        };

        let outcome = PollOutcome {
            session_id,
            final_state,
            attempts_used: attempt,
            elapsed: started.elapsed(),
            history,
            control,
        };
        tracing::info!(
            session = %outcome.session_id,
            final_state = %outcome.final_state,
            attempts = outcome.attempts_used,
            elapsed_ms = outcome.elapsed.as_millis() as u64,
            "poll session finished"
        );
        Ok(outcome)
    }
}
