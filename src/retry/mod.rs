//! Bounded retries with exponential backoff.
//!
//! [`RetryExecutor`] drives a single [`OperationDescriptor`](crate::OperationDescriptor)
//! through up to `max_attempts` invocations, waiting
//! [`RetryPolicy::delay_for_attempt`] between failures via a [`Sleeper`].

mod executor;
mod policy;
mod sleeper;

pub use executor::RetryExecutor;
pub use policy::RetryPolicy;
pub use sleeper::{RecordingSleeper, Sleeper, TokioSleeper};
