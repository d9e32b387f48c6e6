use serde::Serialize;
use std::collections::BTreeMap;

use crate::models::CounsellorKind;
use crate::runner::ReplicationOutcome;
use crate::state::ReplicationResult;

/// Two-sided 95% normal quantile.
const Z_95: f64 = 1.959_963_984_540_054;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MetricSummary {
    pub mean: f64,
    pub std_dev: f64,
    pub ci95_low: f64,
    pub ci95_high: f64,
    pub p05: f64,
    pub p50: f64,
    pub p95: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Summary {
    pub requested: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub failed_indices: Vec<usize>,
    pub mean_wait: Option<MetricSummary>,
    pub abandonment_rate: Option<MetricSummary>,
    pub served: Option<MetricSummary>,
    pub abandoned: Option<MetricSummary>,
    pub utilization: BTreeMap<CounsellorKind, MetricSummary>,
}

/// Reduces replication outcomes to summary statistics. The result does not
/// depend on the order of `outcomes`.
pub fn aggregate(outcomes: &[ReplicationOutcome]) -> Summary {
    let mut failed_indices = Vec::new();
    let mut cancelled = 0;
    let mut results = Vec::with_capacity(outcomes.len());
    for outcome in outcomes {
        match outcome {
            ReplicationOutcome::Completed(result) => results.push(result),
            ReplicationOutcome::Failed { index, .. } => failed_indices.push(*index),
            ReplicationOutcome::Cancelled { .. } => cancelled += 1,
        }
    }
    failed_indices.sort_unstable();

    let mut utilization: BTreeMap<CounsellorKind, Vec<f64>> = BTreeMap::new();
    for result in &results {
        for (kind, value) in &result.utilization {
            utilization.entry(*kind).or_default().push(*value);
        }
    }

    Summary {
        requested: outcomes.len(),
        succeeded: results.len(),
        failed: failed_indices.len(),
        cancelled,
        mean_wait: metric(&results, |result| result.mean_wait),
        abandonment_rate: metric(&results, |result| result.abandonment_rate),
        served: metric(&results, |result| result.n_served as f64),
        abandoned: metric(&results, |result| result.n_abandoned as f64),
        utilization: utilization
            .into_iter()
            .filter_map(|(kind, values)| summarize(&values).map(|summary| (kind, summary)))
            .collect(),
        failed_indices,
    }
}

fn metric(
    results: &[&ReplicationResult],
    pick: fn(&ReplicationResult) -> f64,
) -> Option<MetricSummary> {
    let values: Vec<f64> = results.iter().map(|result| pick(result)).collect();
    summarize(&values)
}

/// Mean, sample standard deviation, normal 95% interval of the mean and
/// nearest-rank percentile bands. `None` when there are no values.
pub fn summarize(values: &[f64]) -> Option<MetricSummary> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let n = sorted.len() as f64;
    let mean = sorted.iter().sum::<f64>() / n;
    let std_dev = if sorted.len() < 2 {
        0.0
    } else {
        let sum_sq = sorted.iter().map(|value| (value - mean).powi(2)).sum::<f64>();
        (sum_sq / (n - 1.0)).sqrt()
    };
    let half_width = Z_95 * std_dev / n.sqrt();
    Some(MetricSummary {
        mean,
        std_dev,
        ci95_low: mean - half_width,
        ci95_high: mean + half_width,
        p05: nearest_rank_percentile(&sorted, 5.0),
        p50: nearest_rank_percentile(&sorted, 50.0),
        p95: nearest_rank_percentile(&sorted, 95.0),
    })
}

/// Nearest-rank percentile of an ascending slice.
pub fn nearest_rank_percentile(sorted: &[f64], percentile: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = ((percentile / 100.0) * sorted.len() as f64).ceil() as usize;
    let idx = rank.saturating_sub(1).min(sorted.len() - 1);
    sorted[idx]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(replication: usize, mean_wait: f64, served: u64) -> ReplicationResult {
        ReplicationResult {
            replication,
            seed: replication as u64,
            arrivals: served,
            declined_terms: 0,
            entered_queue: served,
            n_served: served,
            n_completed: served,
            n_abandoned: 0,
            n_abandoned_after_transfer: 0,
            n_transferred: 0,
            n_valid_chats: served,
            n_cases_closed: 0,
            waiting_at_end: 0,
            in_service_at_end: 0,
            mean_wait,
            mean_abandon_wait: 0.0,
            abandonment_rate: 0.0,
            max_queue_length: 1,
            utilization: BTreeMap::from([(CounsellorKind::Paid, 0.5)]),
            utilization_by_role: BTreeMap::new(),
            served_by_status: BTreeMap::new(),
        }
    }

    #[test]
    fn percentile_uses_nearest_rank() {
        let sorted = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0];
        assert_eq!(nearest_rank_percentile(&sorted, 5.0), 1.0);
        assert_eq!(nearest_rank_percentile(&sorted, 50.0), 5.0);
        assert_eq!(nearest_rank_percentile(&sorted, 95.0), 10.0);
    }

    #[test]
    fn summarize_reports_spread_and_interval() {
        let summary = summarize(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
        assert_eq!(summary.mean, 5.0);
        assert!((summary.std_dev - 2.138_089_935).abs() < 1e-6);
        assert!(summary.ci95_low < 5.0 && summary.ci95_high > 5.0);
        assert_eq!(summary.p50, 4.0);
    }

    #[test]
    fn aggregation_ignores_order_and_counts_failures() {
        let outcomes = vec![
            ReplicationOutcome::Completed(result(0, 1.5, 10)),
            ReplicationOutcome::Failed {
                index: 1,
                reason: "boom".to_string(),
            },
            ReplicationOutcome::Completed(result(2, 0.25, 12)),
            ReplicationOutcome::Completed(result(3, 3.0, 7)),
            ReplicationOutcome::Cancelled { index: 4 },
        ];
        let mut reversed = outcomes.clone();
        reversed.reverse();

        let forward = aggregate(&outcomes);
        assert_eq!(forward, aggregate(&reversed));
        assert_eq!(forward.requested, 5);
        assert_eq!(forward.succeeded, 3);
        assert_eq!(forward.failed, 1);
        assert_eq!(forward.cancelled, 1);
        assert_eq!(forward.failed_indices, vec![1]);
        assert_eq!(forward.served.as_ref().unwrap().mean, 29.0 / 3.0);
        assert_eq!(forward.utilization[&CounsellorKind::Paid].mean, 0.5);
    }

    #[test]
    fn no_successes_means_no_metrics() {
        let summary = aggregate(&[ReplicationOutcome::Cancelled { index: 0 }]);
        assert_eq!(summary.succeeded, 0);
        assert!(summary.mean_wait.is_none());
        assert!(summary.utilization.is_empty());
    }
}
