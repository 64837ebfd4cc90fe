//! Resilient execution of remote API operations.
//!
//! - [`PacedBatchDispatcher`] runs an ordered batch with per-item retries,
//!   pacing between items and optional bounded concurrency.
//! - [`StatePoller`] waits for a remote resource to reach a target state
//!   within an attempt or time budget.
//! - [`ResultAggregator`] turns results into an [`AggregatedReport`] with an
//!   error taxonomy, recommendations and a performance grade.
//!
//! The core only sees the [`RemoteOperation`] and [`StateFetch`] traits; the
//! [`http`] module provides reqwest-backed implementations.

pub mod aggregate;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod http;
pub mod operation;
pub mod poll;
pub mod retry;
pub mod telemetry;

pub use aggregate::{
    AggregatedReport, PerformanceGrade, Recommendation, ResultAggregator, ThroughputScore,
    ThroughputStats,
};
pub use config::RelayConfig;
pub use dispatch::{BatchReport, DispatchOutcome, DispatcherBuilder, PacedBatchDispatcher, RateGate};
pub use error::{ConfigError, ErrorClass, GateError, OperationError};
pub use http::{HttpClient, HttpOperation, HttpStateFetch};
pub use operation::{
    FnOperation, FnStateFetch, InvocationContext, OperationDescriptor, OperationOutcome,
    OperationResult, RemoteOperation, StateFetch, StateSnapshot,
};
pub use poll::{PollBudget, PollControl, PollOutcome, PollSession, PollState, StatePoller};
pub use retry::{RetryExecutor, RetryPolicy, Sleeper, TokioSleeper};
pub use telemetry::{DispatchEvent, DispatchObserver, TracingObserver};
