//! Polling a remote resource until it reaches a target state.

mod poller;
mod session;

pub use poller::{PollAttempt, PollOutcome, StatePoller};
pub use session::{PollBudget, PollControl, PollSession, PollState, StopCallback, TargetPredicate};
