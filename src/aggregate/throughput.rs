use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThroughputScore {
    High,
    Medium,
    Low,
    #[serde(rename = "N/A")]
    NotAvailable,
}

impl ThroughputScore {
    /// Above 30 operations a minute is high, above 10 medium.
    pub fn from_rate(operations_per_minute: f64) -> Self {
        if operations_per_minute > 30.0 {
            ThroughputScore::High
        } else if operations_per_minute > 10.0 {
            ThroughputScore::Medium
        } else {
            ThroughputScore::Low
        }
    }
}

impl fmt::Display for ThroughputScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ThroughputScore::High => "High",
            ThroughputScore::Medium => "Medium",
            ThroughputScore::Low => "Low",
            ThroughputScore::NotAvailable => "N/A",
        };
        write!(f, "{s}")
    }
}

/// Pace of the batch derived from per-item wall time, retries and backoff included.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThroughputStats {
    /// 60 divided by the mean item time in seconds; 0 when that mean is 0.
    pub operations_per_minute: f64,
    /// Sum of the item times.
    pub total_time_ms: u64,
    pub score: ThroughputScore,
}

impl Default for ThroughputStats {
    fn default() -> Self {
        Self {
            operations_per_minute: 0.0,
            total_time_ms: 0,
            score: ThroughputScore::NotAvailable,
        }
    }
}

impl ThroughputStats {
    pub fn from_timings(timings: &[Duration]) -> Self {
        if timings.is_empty() {
            return Self::default();
        }
        let total: Duration = timings.iter().sum();
        let avg_secs = total.as_secs_f64() / timings.len() as f64;
        let operations_per_minute = if avg_secs > 0.0 {
            super::round2(60.0 / avg_secs)
        } else {
            0.0
        };
        Self {
            operations_per_minute,
            total_time_ms: total.as_millis() as u64,
            score: ThroughputScore::from_rate(operations_per_minute),
        }
    }
}
