use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;

use super::client::HttpClient;
use crate::error::OperationError;
use crate::operation::{
    InvocationContext, OperationOutcome, RemoteOperation, StateFetch, StateSnapshot,
};

const DEFAULT_STATE_POINTER: &str = "/instance/state";
const UNKNOWN_STATE: &str = "unknown";

/// One HTTP call usable as a batch item. 2xx is success; any other status is
/// reported as a failed outcome so the retry policy can classify it.
#[derive(Debug, Clone)]
pub struct HttpOperation {
    client: HttpClient,
    method: Method,
    endpoint: String,
    body: Option<Value>,
}

impl HttpOperation {
    pub fn new(client: HttpClient, method: Method, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            method,
            endpoint: endpoint.into(),
            body: None,
        }
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

#[async_trait]
impl RemoteOperation for HttpOperation {
    async fn invoke(&self, _ctx: &InvocationContext) -> Result<OperationOutcome, OperationError> {
        let response = self
            .client
            .request(self.method.clone(), &self.endpoint, self.body.as_ref())
            .await?;

        if response.is_success() {
            return Ok(OperationOutcome::success(response.status, response.body));
        }
        let mut outcome =
            OperationOutcome::failure(response.status, error_message(response.status, &response.body))
                .with_retry_after(response.rate_limit.retry_after);
        outcome.payload = response.body;
        Ok(outcome)
    }
}

/// Reads a string state out of a JSON document on every fetch.
#[derive(Debug, Clone)]
pub struct HttpStateFetch {
    client: HttpClient,
    endpoint: String,
    pointer: String,
}

impl HttpStateFetch {
    pub fn new(client: HttpClient, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            pointer: DEFAULT_STATE_POINTER.to_string(),
        }
    }

    /// JSON pointer to the state field. Defaults to `/instance/state`.
    pub fn with_pointer(mut self, pointer: impl Into<String>) -> Self {
        self.pointer = pointer.into();
        self
    }
}

#[async_trait]
impl StateFetch for HttpStateFetch {
    type State = String;

    async fn fetch(&self, _ctx: &InvocationContext) -> Result<StateSnapshot<String>, OperationError> {
        let response = self.client.request(Method::GET, &self.endpoint, None).await?;
        if !response.is_success() {
            return Err(OperationError::Status {
                status: response.status,
                message: error_message(response.status, &response.body),
            });
        }

        let state = response
            .body
            .pointer(&self.pointer)
            .and_then(Value::as_str)
            .unwrap_or(UNKNOWN_STATE)
            .to_string();
        Ok(StateSnapshot {
            state,
            raw: response.body,
            status_code: response.status,
        })
    }
}

/// Best-effort error text from an error body: `response.message`, `message`
/// or `error`, with arrays joined by `"; "`.
fn error_message(status: u16, body: &Value) -> String {
    let text = |value: &Value| match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Array(items) if !items.is_empty() => Some(
            items
                .iter()
                .map(|item| match item {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect::<Vec<_>>()
                .join("; "),
        ),
        _ => None,
    };

    ["/response/message", "/message", "/error"]
        .iter()
        .find_map(|pointer| body.pointer(pointer).and_then(text))
        .or_else(|| text(body))
        .unwrap_or_else(|| format!("HTTP {status}"))
}
