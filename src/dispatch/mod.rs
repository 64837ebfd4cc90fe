//! Ordered batch execution with pacing, retries and optional bounded concurrency.

mod dispatcher;
mod gate;

pub use dispatcher::{BatchReport, DispatchOutcome, DispatcherBuilder, PacedBatchDispatcher};
pub use gate::RateGate;
