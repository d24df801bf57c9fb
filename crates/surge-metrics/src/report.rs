//! End-of-run report
//!
//! A [`RunReport`] bundles the final snapshot with the threshold verdicts.
//! It serializes to JSON for machines and prints a plain table for humans;
//! the process exit code comes from [`RunReport::exit_code`].

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::aggregator::MetricsSnapshot;
use crate::threshold::ThresholdVerdict;

/// Machine-readable summary of a completed (or cancelled) run
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunReport {
    /// Wall time the run actually took
    pub duration: Duration,
    /// True when the run was cut short; metrics cover the partial run
    pub cancelled: bool,
    pub snapshot: MetricsSnapshot,
    pub thresholds: Vec<ThresholdVerdict>,
    /// True iff every threshold held
    pub passed: bool,
}

impl RunReport {
    pub fn new(
        duration: Duration,
        cancelled: bool,
        snapshot: MetricsSnapshot,
        thresholds: Vec<ThresholdVerdict>,
    ) -> Self {
        let passed = thresholds.iter().all(|v| v.passed);
        Self {
            duration,
            cancelled,
            snapshot,
            thresholds,
            passed,
        }
    }

    /// 0 when all thresholds passed, 1 otherwise
    pub fn exit_code(&self) -> i32 {
        if self.passed {
            0
        } else {
            1
        }
    }

    /// Print the human-readable run summary to stdout
    pub fn print(&self) {
        let secs = self.duration.as_secs_f64();
        println!();
        println!("run summary ({secs:.1}s{})", if self.cancelled { ", cancelled" } else { "" });
        println!("{}", "─".repeat(72));

        for (name, stats) in &self.snapshot.scenarios {
            println!("scenario {name}");
            println!(
                "  iterations: {} ({} failed, {} dropped)",
                stats.iterations, stats.failed_iterations, stats.dropped_iterations
            );
            println!(
                "  http_reqs:  {} ({} failed)",
                stats.http_reqs, stats.http_failed
            );
            if let Some(t) = &stats.http_req_duration {
                println!(
                    "  http_req_duration: p50={:.1}ms p90={:.1}ms p95={:.1}ms p99={:.1}ms max={:.1}ms",
                    t.p50_us as f64 / 1000.0,
                    t.p90_us as f64 / 1000.0,
                    t.p95_us as f64 / 1000.0,
                    t.p99_us as f64 / 1000.0,
                    t.max_us as f64 / 1000.0,
                );
            }
            let checks = stats.check_totals();
            if checks.total() > 0 {
                println!(
                    "  checks: {}/{} passed ({:.1}%)",
                    checks.passes,
                    checks.total(),
                    checks.rate().unwrap_or(0.0) * 100.0
                );
            }
        }

        if !self.thresholds.is_empty() {
            println!("{}", "─".repeat(72));
            println!("thresholds");
            for v in &self.thresholds {
                let mark = if v.passed { "PASS" } else { "FAIL" };
                println!("  [{mark}] {} ({})", v.source, v.observed_text());
            }
        }

        println!("{}", "─".repeat(72));
        println!("result: {}", if self.passed { "PASS" } else { "FAIL" });
        println!();
    }
}
