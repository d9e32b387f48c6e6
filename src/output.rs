use std::fmt::Write;

use crate::models::{ArrivalConfig, DeskConfig, MINUTES_PER_DAY};
use crate::roster::Roster;
use crate::runner::{ReplicationOutcome, RunReport};
use crate::summary::{MetricSummary, Summary};

pub trait Formatter {
    fn write(&self, report: &RunReport) -> String;
}

/// One line per replication followed by the summary.
pub struct HumanFormatter;
/// Summary only.
pub struct SummaryFormatter;
pub struct JsonFormatter;

impl Formatter for HumanFormatter {
    fn write(&self, report: &RunReport) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Replications:");
        for outcome in &report.outcomes {
            match outcome {
                ReplicationOutcome::Completed(result) => {
                    let _ = writeln!(
                        out,
                        "#{}: served {}, abandoned {}, mean wait {:.2} min, abandonment {:.2}%, max queue {}",
                        result.replication,
                        result.n_served,
                        result.n_abandoned,
                        result.mean_wait,
                        result.abandonment_rate * 100.0,
                        result.max_queue_length
                    );
                }
                ReplicationOutcome::Failed { index, reason } => {
                    let _ = writeln!(out, "#{}: failed ({})", index, reason);
                }
                ReplicationOutcome::Cancelled { index } => {
                    let _ = writeln!(out, "#{}: cancelled", index);
                }
            }
        }
        write_summary(&mut out, report.base_seed, &report.summary);
        out
    }
}

impl Formatter for SummaryFormatter {
    fn write(&self, report: &RunReport) -> String {
        let mut out = String::new();
        write_summary(&mut out, report.base_seed, &report.summary);
        out
    }
}

impl Formatter for JsonFormatter {
    fn write(&self, report: &RunReport) -> String {
        match serde_json::to_string_pretty(report) {
            Ok(mut json) => {
                json.push('\n');
                json
            }
            Err(err) => format!("{{\"error\": \"{}\"}}\n", err),
        }
    }
}

/// Validated configuration: run parameters, then the shift instances of
/// the first simulated day.
pub fn describe_config(config: &DeskConfig, roster: &Roster) -> String {
    let mut out = String::new();
    let (start, end) = roster.window();
    let replications = &config.replications;
    let _ = writeln!(out, "Window: minute {}..{}", start, end);
    let arrivals = match &config.arrivals {
        ArrivalConfig::Poisson { .. } => "poisson",
        ArrivalConfig::Thinning { .. } => "thinning",
        ArrivalConfig::Interarrivals { .. } => "interarrivals",
        ArrivalConfig::Recorded { .. } => "recorded",
    };
    let _ = writeln!(out, "Arrivals: {}", arrivals);
    let _ = writeln!(
        out,
        "Replications: {} (base seed {})",
        replications.count, replications.base_seed
    );
    let _ = writeln!(
        out,
        "Policy: cutoff {} min, shift end {}",
        config.policy.cutoff_minutes, config.policy.shift_end
    );
    let _ = writeln!(out, "Roster:");
    for instance in roster
        .instances()
        .iter()
        .filter(|instance| instance.start < start + MINUTES_PER_DAY)
    {
        let breaks: Vec<String> = instance
            .breaks
            .iter()
            .map(|window| format!("{}..{}", window.start, window.end))
            .collect();
        let _ = writeln!(
            out,
            "- {} {} {}..{} (breaks: {})",
            instance.label(),
            instance.role,
            instance.start,
            instance.end,
            if breaks.is_empty() {
                "none".to_string()
            } else {
                breaks.join(", ")
            }
        );
    }
    out
}

fn write_summary(out: &mut String, base_seed: u64, summary: &Summary) {
    let _ = writeln!(out, "Summary:");
    let _ = writeln!(out, "base_seed: {}", base_seed);
    let _ = writeln!(
        out,
        "succeeded: {} of {} (failed: {}, cancelled: {})",
        summary.succeeded, summary.requested, summary.failed, summary.cancelled
    );
    if !summary.failed_indices.is_empty() {
        let indices: Vec<String> = summary
            .failed_indices
            .iter()
            .map(|index| index.to_string())
            .collect();
        let _ = writeln!(out, "failed replications: {}", indices.join(", "));
    }
    write_metric(out, "mean_wait_min", summary.mean_wait.as_ref(), 1.0);
    write_metric(out, "abandonment_pct", summary.abandonment_rate.as_ref(), 100.0);
    write_metric(out, "served", summary.served.as_ref(), 1.0);
    write_metric(out, "abandoned", summary.abandoned.as_ref(), 1.0);
    for (kind, metric) in &summary.utilization {
        let label = format!("utilization_pct[{}]", kind);
        write_metric(out, &label, Some(metric), 100.0);
    }
}

fn write_metric(out: &mut String, label: &str, metric: Option<&MetricSummary>, scale: f64) {
    match metric {
        Some(metric) => {
            let _ = writeln!(
                out,
                "{}: mean {:.2} (95% CI {:.2}..{:.2}), p5 {:.2}, p50 {:.2}, p95 {:.2}",
                label,
                metric.mean * scale,
                metric.ci95_low * scale,
                metric.ci95_high * scale,
                metric.p05 * scale,
                metric.p50 * scale,
                metric.p95 * scale
            );
        }
        None => {
            let _ = writeln!(out, "{}: n/a", label);
        }
    }
}
