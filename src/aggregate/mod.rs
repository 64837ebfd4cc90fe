//! Batch health reporting: error breakdowns, latency, grade and recommendations.

mod grade;
mod recommendation;
mod throughput;

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ErrorClass;
use crate::operation::OperationResult;

pub use grade::PerformanceGrade;
pub use recommendation::Recommendation;
pub use throughput::{ThroughputScore, ThroughputStats};

/// Latency of executed items, in milliseconds. Items that never ran are excluded.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LatencyStats {
    pub avg_ms: f64,
    pub min_ms: u64,
    pub max_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureSummary {
    pub index: usize,
    pub operation_id: String,
    pub class: ErrorClass,
    pub status_code: u16,
    pub message: String,
    pub attempts: u32,
}

/// Summary of one batch. Contains no wall-clock fields, so aggregating the
/// same results twice serializes to the same bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedReport {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub success_rate_percent: f64,
    pub error_rate_percent: f64,
    pub error_breakdown_by_class: BTreeMap<ErrorClass, usize>,
    pub error_breakdown_by_code: BTreeMap<u16, usize>,
    pub most_common_error_class: Option<ErrorClass>,
    pub recommendations: Vec<Recommendation>,
    pub performance_grade: PerformanceGrade,
    pub latency: LatencyStats,
    pub throughput: ThroughputStats,
    pub total_attempts: u64,
    pub failures: Vec<FailureSummary>,
}

impl AggregatedReport {
    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

pub struct ResultAggregator;

impl ResultAggregator {
    pub fn aggregate(results: &[OperationResult]) -> AggregatedReport {
        let total = results.len();
        let successful = results.iter().filter(|r| r.ok).count();
        let failed = total - successful;
        // Grading and advice use the exact rate; only the reported fields are rounded.
        let (success_rate, error_rate) = if total == 0 {
            (0.0, 0.0)
        } else {
            (
                successful as f64 * 100.0 / total as f64,
                failed as f64 * 100.0 / total as f64,
            )
        };

        let mut by_class: BTreeMap<ErrorClass, usize> = BTreeMap::new();
        let mut by_code: BTreeMap<u16, usize> = BTreeMap::new();
        let mut failures = Vec::new();
        for (result, class) in results
            .iter()
            .filter_map(|r| r.error_class().map(|class| (r, class)))
        {
            *by_class.entry(class).or_default() += 1;
            *by_code.entry(result.status_code).or_default() += 1;
            failures.push(FailureSummary {
                index: result.index,
                operation_id: result.operation_id.clone(),
                class,
                status_code: result.status_code,
                message: result.error_message.clone().unwrap_or_default(),
                attempts: result.attempt,
            });
        }

        let executed: Vec<&OperationResult> = results.iter().filter(|r| !r.was_skipped()).collect();
        let latencies: Vec<Duration> = executed.iter().map(|r| r.latency).collect();
        let timings: Vec<Duration> = executed.iter().map(|r| r.elapsed).collect();
        let performance_grade = if total == 0 {
            PerformanceGrade::D
        } else {
            PerformanceGrade::from_stats(success_rate, mean(&latencies))
        };
        let recommendations = recommend(total, success_rate, &by_class);

        AggregatedReport {
            total,
            successful,
            failed,
            success_rate_percent: round2(success_rate),
            error_rate_percent: round2(error_rate),
            most_common_error_class: most_common(&by_class),
            error_breakdown_by_class: by_class,
            error_breakdown_by_code: by_code,
            recommendations,
            performance_grade,
            latency: latency_stats(&latencies),
            throughput: ThroughputStats::from_timings(&timings),
            total_attempts: results.iter().map(|r| u64::from(r.attempt)).sum(),
            failures,
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn mean(durations: &[Duration]) -> Duration {
    if durations.is_empty() {
        return Duration::ZERO;
    }
    durations.iter().sum::<Duration>() / durations.len() as u32
}

fn latency_stats(executed: &[Duration]) -> LatencyStats {
    if executed.is_empty() {
        return LatencyStats::default();
    }

    let millis = |d: &Duration| d.as_millis() as u64;
    let sum: Duration = executed.iter().sum();
    LatencyStats {
        avg_ms: round2(sum.as_secs_f64() * 1000.0 / executed.len() as f64),
        min_ms: executed.iter().map(millis).min().unwrap_or_default(),
        max_ms: executed.iter().map(millis).max().unwrap_or_default(),
    }
}

/// Highest count wins; ties go to the class that sorts first.
fn most_common(by_class: &BTreeMap<ErrorClass, usize>) -> Option<ErrorClass> {
    by_class
        .iter()
        .fold(None, |best: Option<(ErrorClass, usize)>, (class, count)| match best {
            Some((_, best_count)) if best_count >= *count => best,
            _ => Some((*class, *count)),
        })
        .map(|(class, _)| class)
}

fn recommend(
    total: usize,
    success_rate_percent: f64,
    by_class: &BTreeMap<ErrorClass, usize>,
) -> Vec<Recommendation> {
    let mut out = Vec::new();
    if total > 0 {
        if success_rate_percent < 50.0 {
            out.push(Recommendation::LowSuccessRate);
        } else if success_rate_percent < 80.0 {
            out.push(Recommendation::TuneRetryPolicy);
        }
    }
    if by_class.contains_key(&ErrorClass::RateLimited) {
        out.push(Recommendation::IncreaseInterItemDelay);
    }
    if by_class.contains_key(&ErrorClass::Authentication) {
        out.push(Recommendation::CheckCredentials);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::Metadata;
    use chrono::Utc;

    fn result(index: usize, status: u16, latency_ms: u64) -> OperationResult {
        let ok = (200..300).contains(&status);
        OperationResult {
            index,
            operation_id: format!("op-{index}"),
            ok,
            status_code: status,
            error_message: (!ok).then(|| format!("status {status}")),
            latency: Duration::from_millis(latency_ms),
            elapsed: Duration::from_millis(latency_ms),
            attempt: 1,
            timestamp: Utc::now(),
            metadata: Metadata::new(),
        }
    }

    #[test]
    fn empty_input_yields_a_zeroed_report() {
        let report = ResultAggregator::aggregate(&[]);

        assert_eq!(report.total, 0);
        assert_eq!(report.success_rate_percent, 0.0);
        assert!(report.error_breakdown_by_class.is_empty());
        assert!(report.recommendations.is_empty());
        assert_eq!(report.performance_grade, PerformanceGrade::D);
        assert_eq!(report.latency, LatencyStats::default());
        assert_eq!(report.most_common_error_class, None);
        assert_eq!(report.error_rate_percent, 0.0);
        assert_eq!(report.throughput.score, ThroughputScore::NotAvailable);
    }

    #[test]
    fn rate_limited_batch_recommends_more_spacing() {
        let results: Vec<_> = (0..10)
            .map(|i| result(i, if i == 3 || i == 7 { 429 } else { 200 }, 300))
            .collect();

        let report = ResultAggregator::aggregate(&results);

        assert_eq!(report.successful, 8);
        assert_eq!(report.failed, 2);
        assert_eq!(report.success_rate_percent, 80.0);
        assert_eq!(
            report.error_breakdown_by_class,
            BTreeMap::from([(ErrorClass::RateLimited, 2)])
        );
        assert_eq!(report.error_breakdown_by_code, BTreeMap::from([(429, 2)]));
        // 80% is not below the tuning threshold.
        assert_eq!(
            report.recommendations,
            vec![Recommendation::IncreaseInterItemDelay]
        );
        assert_eq!(report.performance_grade, PerformanceGrade::C);
        assert_eq!(report.most_common_error_class, Some(ErrorClass::RateLimited));
        let failed: Vec<_> = report.failures.iter().map(|f| f.index).collect();
        assert_eq!(failed, vec![3, 7]);
    }

    #[test]
    fn server_faults_only_trigger_rate_based_advice() {
        let results: Vec<_> = (0..5)
            .map(|i| result(i, if i % 2 == 1 { 500 } else { 200 }, 100))
            .collect();

        let report = ResultAggregator::aggregate(&results);

        assert_eq!(report.success_rate_percent, 60.0);
        assert_eq!(report.recommendations, vec![Recommendation::TuneRetryPolicy]);
        assert_eq!(
            report.error_breakdown_by_class.get(&ErrorClass::ServerFault),
            Some(&2)
        );
    }

    #[test]
    fn low_success_with_auth_failures() {
        let results = vec![
            result(0, 401, 50),
            result(1, 403, 50),
            result(2, 429, 50),
            result(3, 200, 50),
        ];

        let report = ResultAggregator::aggregate(&results);

        assert_eq!(report.success_rate_percent, 25.0);
        assert_eq!(
            report.recommendations,
            vec![
                Recommendation::LowSuccessRate,
                Recommendation::IncreaseInterItemDelay,
                Recommendation::CheckCredentials,
            ]
        );
        assert_eq!(report.most_common_error_class, Some(ErrorClass::Authentication));
        assert_eq!(report.performance_grade, PerformanceGrade::D);
    }

    #[test]
    fn status_zero_failures_classify_by_message() {
        let mut failed = result(0, 0, 10);
        failed.error_message = Some("connection failed: dns error".into());

        let report = ResultAggregator::aggregate(&[failed, result(1, 200, 10)]);

        assert_eq!(
            report.error_breakdown_by_class,
            BTreeMap::from([(ErrorClass::Network, 1)])
        );
        assert_eq!(report.error_breakdown_by_code, BTreeMap::from([(0, 1)]));
    }

    #[test]
    fn rate_is_rounded_to_two_decimals() {
        let results = vec![result(0, 200, 10), result(1, 200, 10), result(2, 500, 10)];
        assert_eq!(ResultAggregator::aggregate(&results).success_rate_percent, 66.67);
    }

    #[test]
    fn latency_ignores_items_that_never_ran() {
        let mut skipped = result(2, 0, 0);
        skipped.attempt = 0;
        skipped.error_message = Some("cancelled before execution".into());
        let mut retried = result(1, 200, 300);
        retried.attempt = 3;
        let results = vec![result(0, 200, 100), retried, skipped];

        let report = ResultAggregator::aggregate(&results);

        assert_eq!(
            report.latency,
            LatencyStats {
                avg_ms: 200.0,
                min_ms: 100,
                max_ms: 300
            }
        );
        assert_eq!(report.total_attempts, 4);
    }

    #[test]
    fn grade_uses_the_unrounded_rate() {
        // 95.0025% rounds to 95.0 for display but is still above the A+ floor.
        let results: Vec<_> = (0..40_000)
            .map(|i| result(i, if i < 38_001 { 200 } else { 500 }, 100))
            .collect();

        let report = ResultAggregator::aggregate(&results);

        assert_eq!(report.success_rate_percent, 95.0);
        assert_eq!(report.error_rate_percent, 5.0);
        assert_eq!(report.performance_grade, PerformanceGrade::APlus);
    }

    #[test]
    fn error_rate_and_throughput_are_reported() {
        let mut slow = result(1, 500, 1000);
        slow.elapsed = Duration::from_millis(5000);
        let mut skipped = result(2, 0, 0);
        skipped.attempt = 0;
        skipped.error_message = Some("cancelled before execution".into());
        let results = vec![result(0, 200, 1000), slow, skipped, result(3, 200, 1000)];

        let report = ResultAggregator::aggregate(&results);

        assert_eq!(report.error_rate_percent, 50.0);
        // (1s + 5s + 1s) / 3 items that ran.
        assert_eq!(report.throughput.total_time_ms, 7000);
        assert_eq!(report.throughput.operations_per_minute, 25.71);
        assert_eq!(report.throughput.score, ThroughputScore::Medium);
    }

    #[test]
    fn aggregation_is_deterministic() {
        let results: Vec<_> = (0..6)
            .map(|i| result(i, [200, 404, 500, 429, 200, 401][i], 20 * i as u64))
            .collect();

        let first = serde_json::to_string(&ResultAggregator::aggregate(&results)).unwrap();
        let second = serde_json::to_string(&ResultAggregator::aggregate(&results)).unwrap();

        assert_eq!(first, second);
        let parsed: AggregatedReport = serde_json::from_str(&first).unwrap();
        assert_eq!(parsed.error_breakdown_by_class.len(), 4);
        assert_eq!(parsed.error_breakdown_by_code.get(&404), Some(&1));
        assert_eq!(parsed.performance_grade, PerformanceGrade::D);
    }
}
