use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::capability::RemoteOperation;
use crate::error::ErrorClass;

/// Message on results of items that never ran because of cancellation.
pub(crate) const CANCELLED_REASON: &str = "cancelled before execution";

/// Caller metadata echoed back on every result. Ordered for deterministic output.
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// One unit of work submitted to the dispatcher.
#[derive(Clone)]
pub struct OperationDescriptor {
    pub id: String,
    pub operation: Arc<dyn RemoteOperation>,
    pub metadata: Metadata,
}

impl OperationDescriptor {
    pub fn new(operation: Arc<dyn RemoteOperation>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            operation,
            metadata: Metadata::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

impl fmt::Debug for OperationDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationDescriptor")
            .field("id", &self.id)
            .field("operation", &"<remote operation>")
            .field("metadata", &self.metadata)
            .finish()
    }
}

/// Final outcome of one descriptor's attempt sequence.
///
/// Exactly one is produced per descriptor, never one per retry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationResult {
    /// Position in the original batch.
    pub index: usize,
    pub operation_id: String,
    pub ok: bool,
    /// HTTP status of the final attempt; 0 when no response was received.
    pub status_code: u16,
    pub error_message: Option<String>,
    /// Duration of the final attempt.
    pub latency: Duration,
    /// Whole attempt sequence, backoff waits included.
    pub elapsed: Duration,
    /// 1-based count of attempts made; 0 if the item never ran.
    pub attempt: u32,
    pub timestamp: DateTime<Utc>,
    pub metadata: Metadata,
}

impl OperationResult {
    pub(crate) fn skipped(index: usize, descriptor: &OperationDescriptor, reason: &str) -> Self {
        Self {
            index,
            operation_id: descriptor.id.clone(),
            ok: false,
            status_code: 0,
            error_message: Some(reason.to_string()),
            latency: Duration::ZERO,
            elapsed: Duration::ZERO,
            attempt: 0,
            timestamp: Utc::now(),
            metadata: descriptor.metadata.clone(),
        }
    }

    /// Taxonomy bucket of a failed result; `None` on success.
    pub fn error_class(&self) -> Option<ErrorClass> {
        if self.ok {
            return None;
        }
        Some(ErrorClass::classify(
            self.status_code,
            self.error_message.as_deref().unwrap_or_default(),
        ))
    }

    /// True if the item never got to run (cancelled or gate-rejected).
    pub fn was_skipped(&self) -> bool {
        self.attempt == 0
    }
}
