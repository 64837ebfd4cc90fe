use std::fmt;

use serde::{Deserialize, Serialize};

/// Follow-up hint derived from a batch's results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    /// Success rate below 50%.
    LowSuccessRate,
    /// Success rate below 80%.
    TuneRetryPolicy,
    /// At least one rate-limited failure.
    IncreaseInterItemDelay,
    /// At least one authentication failure.
    CheckCredentials,
}

impl Recommendation {
    pub fn message(&self) -> &'static str {
        match self {
            Recommendation::LowSuccessRate => {
                "low success rate: review the operation configuration and connectivity"
            }
            Recommendation::TuneRetryPolicy => {
                "moderate success rate: consider more attempts or a longer backoff"
            }
            Recommendation::IncreaseInterItemDelay => {
                "rate limit detected: increase the delay between items"
            }
            Recommendation::CheckCredentials => {
                "authentication failures detected: check the API key"
            }
        }
    }
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}
