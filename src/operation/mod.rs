pub mod capability;
pub mod types;

pub use capability::{
    FnOperation, FnStateFetch, InvocationContext, OperationOutcome, RemoteOperation, StateFetch,
    StateSnapshot,
};
pub use types::{Metadata, OperationDescriptor, OperationResult};

pub(crate) use types::CANCELLED_REASON;
