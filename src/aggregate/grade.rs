use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Letter grade over success rate and average latency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PerformanceGrade {
    #[serde(rename = "A+")]
    APlus,
    A,
    #[serde(rename = "B+")]
    BPlus,
    B,
    C,
    D,
}

/// (min success rate %, max avg latency in seconds), both exclusive.
const THRESHOLDS: [(PerformanceGrade, f64, f64); 5] = [
    (PerformanceGrade::APlus, 95.0, 1.0),
    (PerformanceGrade::A, 90.0, 2.0),
    (PerformanceGrade::BPlus, 85.0, 3.0),
    (PerformanceGrade::B, 80.0, 5.0),
    (PerformanceGrade::C, 70.0, 10.0),
];

impl PerformanceGrade {
    /// Highest grade whose bounds are both strictly met; ties fall to the lower grade.
    pub fn from_stats(success_rate_percent: f64, avg_latency: Duration) -> Self {
        let secs = avg_latency.as_secs_f64();
        THRESHOLDS
            .iter()
            .find(|(_, min_rate, max_secs)| success_rate_percent > *min_rate && secs < *max_secs)
            .map(|(grade, _, _)| *grade)
            .unwrap_or(PerformanceGrade::D)
    }
}

impl fmt::Display for PerformanceGrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PerformanceGrade::APlus => "A+",
            PerformanceGrade::A => "A",
            PerformanceGrade::BPlus => "B+",
            PerformanceGrade::B => "B",
            PerformanceGrade::C => "C",
            PerformanceGrade::D => "D",
        };
        write!(f, "{s}")
    }
}
