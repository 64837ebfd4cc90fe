//! Capabilities consumed by the core.
//!
//! [`RemoteOperation`] and [`StateFetch`] are black boxes supplied by wrapper
//! code (message send, instance create, connection state, ...). The core only
//! observes whether they succeeded, their status code and how long they took.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::OperationError;

/// Per-call context handed to a capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationContext {
    pub operation_id: String,
    /// Position of the descriptor in its batch (0 for poll sessions).
    pub index: usize,
    /// 1-based attempt (or poll tick) number.
    pub attempt: u32,
}

impl InvocationContext {
    pub fn new(operation_id: impl Into<String>, index: usize, attempt: u32) -> Self {
        Self {
            operation_id: operation_id.into(),
            index,
            attempt,
        }
    }
}

/// What a remote operation reports back for one call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationOutcome {
    pub ok: bool,
    pub status_code: u16,
    pub message: String,
    /// Opaque response body. Never inspected by the core.
    pub payload: serde_json::Value,
    /// Server-requested wait before the next call (e.g. `Retry-After`).
    #[serde(default)]
    pub retry_after: Option<Duration>,
}

impl OperationOutcome {
    pub fn success(status_code: u16, payload: serde_json::Value) -> Self {
        Self {
            ok: true,
            status_code,
            message: String::new(),
            payload,
            retry_after: None,
        }
    }

    pub fn failure(status_code: u16, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            status_code,
            message: message.into(),
            payload: serde_json::Value::Null,
            retry_after: None,
        }
    }

    pub fn with_retry_after(mut self, retry_after: Option<Duration>) -> Self {
        self.retry_after = retry_after;
        self
    }
}

/// A remote call the dispatcher can invoke repeatedly.
///
/// `Ok` with `ok == false` is a protocol-level failure (e.g. HTTP 500);
/// `Err` is a transport failure. Both are retried per policy.
#[async_trait]
pub trait RemoteOperation: Send + Sync {
    async fn invoke(&self, ctx: &InvocationContext) -> Result<OperationOutcome, OperationError>;
}

/// One observation of a remote resource's state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot<S> {
    pub state: S,
    pub raw: serde_json::Value,
    pub status_code: u16,
}

impl<S> StateSnapshot<S> {
    pub fn new(state: S, raw: serde_json::Value) -> Self {
        Self {
            state,
            raw,
            status_code: 200,
        }
    }
}

/// Fetches the current state of a long-lived remote resource.
#[async_trait]
pub trait StateFetch: Send + Sync {
    type State: Clone + PartialEq + fmt::Debug + Send + Sync;

    async fn fetch(
        &self,
        ctx: &InvocationContext,
    ) -> Result<StateSnapshot<Self::State>, OperationError>;
}

/// Adapts an async closure into a [`RemoteOperation`].
pub struct FnOperation<F> {
    f: F,
}

impl<F> FnOperation<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> RemoteOperation for FnOperation<F>
where
    F: Fn(InvocationContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<OperationOutcome, OperationError>> + Send + 'static,
{
    async fn invoke(&self, ctx: &InvocationContext) -> Result<OperationOutcome, OperationError> {
        (self.f)(ctx.clone()).await
    }
}

/// Adapts an async closure into a [`StateFetch`].
pub struct FnStateFetch<F, S> {
    f: F,
    _state: std::marker::PhantomData<fn() -> S>,
}

impl<F, S> FnStateFetch<F, S> {
    pub fn new(f: F) -> Self {
        Self {
            f,
            _state: std::marker::PhantomData,
        }
    }
}

#[async_trait]
impl<F, Fut, S> StateFetch for FnStateFetch<F, S>
where
    F: Fn(InvocationContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<StateSnapshot<S>, OperationError>> + Send + 'static,
    S: Clone + PartialEq + fmt::Debug + Send + Sync + 'static,
{
    type State = S;

    async fn fetch(&self, ctx: &InvocationContext) -> Result<StateSnapshot<S>, OperationError> {
        (self.f)(ctx.clone()).await
    }
}
