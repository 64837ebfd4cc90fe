//! Error types and the failure taxonomy.
//!
//! [`ConfigError`] is the only fatal condition and is raised before anything
//! runs. Remote operation failures never surface as errors; they are
//! classified into an [`ErrorClass`] and reported on the result.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Invalid settings, detected before any remote call.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("max_attempts must be at least 1")]
    ZeroAttempts,

    #[error("backoff multiplier must be a finite value >= 1 (got {0})")]
    InvalidMultiplier(f64),

    #[error("max_delay ({max_ms}ms) is smaller than base_delay ({base_ms}ms)")]
    MaxDelayBelowBase { base_ms: u128, max_ms: u128 },

    #[error("concurrency must be at least 1")]
    ZeroConcurrency,

    #[error("poll budget requires a max attempt count or a deadline")]
    MissingPollBudget,

    #[error("poll deadline must be greater than zero")]
    ZeroDeadline,

    #[error("config error: {0}")]
    Invalid(String),
}

/// Transport failure inside a remote operation.
///
/// Becomes an [`OperationResult`](crate::OperationResult) with `status_code`
/// 0, or the HTTP status when there is one.
#[derive(Debug, Error)]
pub enum OperationError {
    #[error("connection failed: {0}")]
    Transport(String),

    #[error("request timed out")]
    Timeout,

    #[error("API returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("network error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("failed to parse response: {0}")]
    Parse(String),
}

impl OperationError {
    /// HTTP status carried by the error, 0 when there is none.
    pub fn status_code(&self) -> u16 {
        match self {
            OperationError::Status { status, .. } => *status,
            OperationError::Http(err) => err.status().map(|s| s.as_u16()).unwrap_or(0),
            _ => 0,
        }
    }
}

/// Failure to reserve a slot on the [`RateGate`](crate::RateGate).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GateError {
    #[error("rate gate saturated: next slot in {wait_ms}ms exceeds the {max_wait_ms}ms bound")]
    Saturated { wait_ms: u128, max_wait_ms: u128 },
}

/// Failure bucket used for reports and retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Connection, DNS or timeout failure.
    Network,
    /// 401/403.
    Authentication,
    /// 404/410.
    NotFound,
    /// Other 4xx, malformed input.
    Validation,
    /// 429.
    RateLimited,
    /// 5xx.
    ServerFault,
    Unknown,
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorClass::Network => write!(f, "Network"),
            ErrorClass::Authentication => write!(f, "Authentication"),
            ErrorClass::NotFound => write!(f, "NotFound"),
            ErrorClass::Validation => write!(f, "Validation"),
            ErrorClass::RateLimited => write!(f, "RateLimited"),
            ErrorClass::ServerFault => write!(f, "ServerFault"),
            ErrorClass::Unknown => write!(f, "Unknown"),
        }
    }
}

impl ErrorClass {
    /// Status code first, message keywords as fallback.
    pub fn classify(status_code: u16, message: &str) -> Self {
        Self::from_status(status_code).unwrap_or_else(|| Self::from_message(message))
    }

    /// `None` when the status alone does not decide.
    pub fn from_status(status_code: u16) -> Option<Self> {
        match status_code {
            401 | 403 => Some(ErrorClass::Authentication),
            404 | 410 => Some(ErrorClass::NotFound),
            408 => Some(ErrorClass::Network),
            429 => Some(ErrorClass::RateLimited),
            400..=499 => Some(ErrorClass::Validation),
            500..=599 => Some(ErrorClass::ServerFault),
            _ => None,
        }
    }

    /// Case-insensitive keyword match on the error message.
    pub fn from_message(message: &str) -> Self {
        let lower = message.to_lowercase();
        let has = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));

        if has(&["network", "connection", "timed out", "timeout", "dns"]) {
            ErrorClass::Network
        } else if has(&["unauthorized", "forbidden", "auth"]) {
            ErrorClass::Authentication
        } else if has(&["not found"]) {
            ErrorClass::NotFound
        } else if has(&["validation", "invalid", "malformed"]) {
            ErrorClass::Validation
        } else if has(&["rate", "limit", "too many"]) {
            ErrorClass::RateLimited
        } else if has(&["server error", "internal", "unavailable", "bad gateway"]) {
            ErrorClass::ServerFault
        } else {
            ErrorClass::Unknown
        }
    }
}
