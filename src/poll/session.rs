use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// How long a poll session may run. There is no unbounded variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollBudget {
    MaxAttempts(u32),
    Deadline(Duration),
    /// Whichever runs out first.
    Both { max_attempts: u32, deadline: Duration },
}

impl PollBudget {
    /// Builds a budget from optional parts; at least one must be present.
    pub fn from_parts(
        max_attempts: Option<u32>,
        deadline: Option<Duration>,
    ) -> Result<Self, ConfigError> {
        let budget = match (max_attempts, deadline) {
            (Some(max_attempts), Some(deadline)) => PollBudget::Both {
                max_attempts,
                deadline,
            },
            (Some(max_attempts), None) => PollBudget::MaxAttempts(max_attempts),
            (None, Some(deadline)) => PollBudget::Deadline(deadline),
            (None, None) => return Err(ConfigError::MissingPollBudget),
        };
        budget.validate()?;
        Ok(budget)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts() == Some(0) {
            return Err(ConfigError::ZeroAttempts);
        }
        if self.deadline().is_some_and(|d| d.is_zero()) {
            return Err(ConfigError::ZeroDeadline);
        }
        Ok(())
    }

    pub fn max_attempts(&self) -> Option<u32> {
        match self {
            PollBudget::MaxAttempts(n) | PollBudget::Both { max_attempts: n, .. } => Some(*n),
            PollBudget::Deadline(_) => None,
        }
    }

    pub fn deadline(&self) -> Option<Duration> {
        match self {
            PollBudget::Deadline(d) | PollBudget::Both { deadline: d, .. } => Some(*d),
            PollBudget::MaxAttempts(_) => None,
        }
    }

    pub fn is_exhausted(&self, attempts: u32, elapsed: Duration) -> bool {
        self.max_attempts().is_some_and(|max| attempts >= max)
            || self.deadline().is_some_and(|d| elapsed >= d)
    }

    /// Time left before the deadline, if there is one.
    pub fn remaining(&self, elapsed: Duration) -> Option<Duration> {
        self.deadline().map(|d| d.saturating_sub(elapsed))
    }
}

/// Signal returned by a stop callback after each unsuccessful tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollControl {
    Continue,
    /// The caller no longer needs the target state.
    Stop,
    /// The caller aborts the session.
    Cancel,
}

/// Poll session state machine. `Polling` is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollState {
    Polling,
    Succeeded,
    Cancelled,
    TimedOut,
}

impl PollState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PollState::Polling)
    }
}

impl fmt::Display for PollState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PollState::Polling => write!(f, "POLLING"),
            PollState::Succeeded => write!(f, "SUCCEEDED"),
            PollState::Cancelled => write!(f, "CANCELLED"),
            PollState::TimedOut => write!(f, "TIMED_OUT"),
        }
    }
}

pub type TargetPredicate<S> = Box<dyn Fn(&S) -> bool + Send + Sync>;

/// Receives the fetched state (`None` when the fetch failed), the 1-based
/// attempt number and the raw response.
pub type StopCallback<S> =
    Box<dyn FnMut(Option<&S>, u32, &serde_json::Value) -> PollControl + Send>;

/// One polling request against a single resource.
pub struct PollSession<S> {
    pub interval: Duration,
    pub budget: PollBudget,
    pub(crate) target: TargetPredicate<S>,
    pub(crate) stop: Option<StopCallback<S>>,
}

impl<S> PollSession<S> {
    pub fn new(
        interval: Duration,
        budget: PollBudget,
        target: impl Fn(&S) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            interval,
            budget,
            target: Box::new(target),
            stop: None,
        }
    }

    /// Session that succeeds once the fetched state equals `expected`.
    pub fn until_eq(interval: Duration, budget: PollBudget, expected: S) -> Self
    where
        S: PartialEq + Send + Sync + 'static,
    {
        Self::new(interval, budget, move |state| *state == expected)
    }

    pub fn with_stop_callback(
        mut self,
        callback: impl FnMut(Option<&S>, u32, &serde_json::Value) -> PollControl + Send + 'static,
    ) -> Self {
        self.stop = Some(Box::new(callback));
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.budget.validate()
    }
}

impl<S> fmt::Debug for PollSession<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PollSession")
            .field("interval", &self.interval)
            .field("budget", &self.budget)
            .field("stop_callback", &self.stop.is_some())
            .finish()
    }
}
