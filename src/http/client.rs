use std::time::Duration;

use reqwest::header::HeaderMap;
use reqwest::{Client, Method};
use serde_json::Value;

use super::adapters::{HttpOperation, HttpStateFetch};
use crate::config::RelayConfig;
use crate::error::OperationError;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Rate-limit headers of a response. Absent or unparsable headers are `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RateLimitInfo {
    pub limit: Option<u64>,
    pub remaining: Option<u64>,
    pub reset: Option<u64>,
    /// `Retry-After` in delay-seconds form.
    pub retry_after: Option<Duration>,
}

impl RateLimitInfo {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let number = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
        };
        Self {
            limit: number("x-ratelimit-limit"),
            remaining: number("x-ratelimit-remaining"),
            reset: number("x-ratelimit-reset"),
            retry_after: number("retry-after").map(Duration::from_secs),
        }
    }
}

/// Status and decoded body of a completed request.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    /// JSON body; a non-JSON body is kept as a string, an empty one as null.
    pub body: Value,
    pub rate_limit: RateLimitInfo,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_rate_limited(&self) -> bool {
        self.status == 429
    }
}

/// Thin JSON client that authenticates with an `apikey` header.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl HttpClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self, OperationError> {
        Self::with_timeouts(
            base_url,
            api_key,
            DEFAULT_CONNECT_TIMEOUT,
            DEFAULT_REQUEST_TIMEOUT,
        )
    }

    pub fn from_config(config: &RelayConfig) -> Result<Self, OperationError> {
        Self::with_timeouts(
            config.base_url.clone(),
            config.api_key.clone(),
            config.connect_timeout(),
            config.request_timeout(),
        )
    }

    pub fn with_timeouts(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> Result<Self, OperationError> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'))
    }

    /// Sends one request. Any HTTP status is returned as `Ok`; only
    /// transport failures (no response at all) are errors.
    ///
    /// For GET the body is sent as query parameters, otherwise as JSON.
    pub async fn request(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&Value>,
    ) -> Result<HttpResponse, OperationError> {
        let url = self.url(endpoint);
        let mut request = self
            .client
            .request(method.clone(), &url)
            .header("apikey", &self.api_key)
            .header("content-type", "application/json");
        if let Some(body) = body {
            request = if method == Method::GET {
                request.query(body)
            } else {
                request.json(body)
            };
        }

        tracing::debug!(%method, %url, "sending request");
        let response = request.send().await.map_err(|err| {
            if err.is_timeout() {
                OperationError::Timeout
            } else {
                OperationError::Http(err)
            }
        })?;

        let status = response.status().as_u16();
        let rate_limit = RateLimitInfo::from_headers(response.headers());
        let text = response.text().await?;
        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text))
        };
        tracing::debug!(%url, status, "response received");

        Ok(HttpResponse {
            status,
            body,
            rate_limit,
        })
    }

    pub fn operation(&self, method: Method, endpoint: impl Into<String>) -> HttpOperation {
        HttpOperation::new(self.clone(), method, endpoint)
    }

    pub fn state_fetch(&self, endpoint: impl Into<String>) -> HttpStateFetch {
        HttpStateFetch::new(self.clone(), endpoint)
    }

    /// Connection state of a messaging instance, read from `instance.state`.
    pub fn connection_state(&self, instance: &str) -> HttpStateFetch {
        self.state_fetch(format!("instance/connectionState/{instance}"))
    }
}
