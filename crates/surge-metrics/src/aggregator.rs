//! Streaming metrics aggregation
//!
//! The aggregator is the only cross-worker shared mutable state in a run.
//! All mutation is append-only and safe under concurrent writers; latency
//! percentiles come from per-scenario HDR histograms, so p50/p90/p95/p99
//! queries never sort the full sample set.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use hdrhistogram::Histogram;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::sample::{CheckSample, RequestSample};

/// Trend metric: per-request latency
pub const HTTP_REQ_DURATION: &str = "http_req_duration";
/// Trend metric: whole-iteration latency
pub const ITERATION_DURATION: &str = "iteration_duration";
/// Rate metric: share of requests that failed
pub const HTTP_REQ_FAILED: &str = "http_req_failed";
/// Rate metric: share of checks that passed
pub const CHECKS: &str = "checks";
/// Counter metric: completed iterations
pub const ITERATIONS: &str = "iterations";
/// Counter metric: work items dropped by a saturated open-loop pool
pub const DROPPED_ITERATIONS: &str = "dropped_iterations";
/// Counter metric: HTTP requests issued
pub const HTTP_REQS: &str = "http_reqs";

// 1µs to 60s at 3 significant figures, same range requests are clamped to
fn new_histogram() -> Histogram<u64> {
    Histogram::new_with_bounds(1, 60_000_000, 3).expect("static histogram bounds")
}

fn record_us(hist: &mut Histogram<u64>, duration: Duration) {
    let us = (duration.as_micros() as u64).max(1);
    if let Err(e) = hist.record(us.min(60_000_000)) {
        warn!("failed to record latency sample: {e}");
    }
}

#[derive(Default)]
struct ScenarioState {
    http: Option<Histogram<u64>>,
    iteration: Option<Histogram<u64>>,
    http_reqs: u64,
    http_failed: u64,
    iterations: u64,
    failed_iterations: u64,
    dropped_iterations: u64,
    checks: BTreeMap<String, CheckStats>,
}

/// Thread-safe append-only sink for all samples a run produces
pub struct MetricsAggregator {
    started_at: DateTime<Utc>,
    scenarios: RwLock<BTreeMap<String, ScenarioState>>,
}

impl MetricsAggregator {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            scenarios: RwLock::new(BTreeMap::new()),
        }
    }

    /// Append one request outcome
    pub fn record_request(&self, sample: &RequestSample) {
        let mut scenarios = self.scenarios.write();
        let state = scenarios.entry(sample.scenario.clone()).or_default();
        state.http_reqs += 1;
        if sample.failed() {
            state.http_failed += 1;
        }
        record_us(state.http.get_or_insert_with(new_histogram), sample.duration);
    }

    /// Append one check outcome
    pub fn record_check(&self, check: &CheckSample) {
        let mut scenarios = self.scenarios.write();
        let state = scenarios.entry(check.scenario.clone()).or_default();
        let stats = state.checks.entry(check.name.clone()).or_default();
        if check.passed {
            stats.passes += 1;
        } else {
            stats.fails += 1;
        }
    }

    /// Append one completed iteration with its total duration
    pub fn record_iteration(&self, scenario: &str, duration: Duration, ok: bool) {
        let mut scenarios = self.scenarios.write();
        let state = scenarios.entry(scenario.to_string()).or_default();
        state.iterations += 1;
        if !ok {
            state.failed_iterations += 1;
        }
        record_us(state.iteration.get_or_insert_with(new_histogram), duration);
    }

    /// Count a work item the pool could not place
    pub fn record_dropped(&self, scenario: &str) {
        let mut scenarios = self.scenarios.write();
        scenarios
            .entry(scenario.to_string())
            .or_default()
            .dropped_iterations += 1;
    }

    /// Make sure a scenario shows up in the snapshot even if it never
    /// produced a sample
    pub fn touch_scenario(&self, scenario: &str) {
        self.scenarios.write().entry(scenario.to_string()).or_default();
    }

    /// Immutable point-in-time view for reporting and threshold evaluation
    pub fn snapshot(&self) -> MetricsSnapshot {
        let scenarios = self.scenarios.read();
        let per_scenario: BTreeMap<String, ScenarioStats> = scenarios
            .iter()
            .map(|(name, state)| {
                (
                    name.clone(),
                    ScenarioStats {
                        iterations: state.iterations,
                        failed_iterations: state.failed_iterations,
                        dropped_iterations: state.dropped_iterations,
                        http_reqs: state.http_reqs,
                        http_failed: state.http_failed,
                        http_req_duration: state.http.as_ref().map(TrendStats::from_histogram),
                        iteration_duration: state
                            .iteration
                            .as_ref()
                            .map(TrendStats::from_histogram),
                        checks: state.checks.clone(),
                    },
                )
            })
            .collect();

        MetricsSnapshot {
            started_at: self.started_at,
            taken_at: Utc::now(),
            scenarios: per_scenario,
        }
    }
}

impl Default for MetricsAggregator {
    fn default() -> Self {
        Self::new()
    }
}

/// Latency distribution summary in microseconds
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrendStats {
    pub count: u64,
    pub min_us: u64,
    pub max_us: u64,
    pub mean_us: f64,
    pub p50_us: u64,
    pub p90_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
}

impl TrendStats {
    fn from_histogram(hist: &Histogram<u64>) -> Self {
        Self {
            count: hist.len(),
            min_us: hist.min(),
            max_us: hist.max(),
            mean_us: hist.mean(),
            p50_us: hist.value_at_quantile(0.50),
            p90_us: hist.value_at_quantile(0.90),
            p95_us: hist.value_at_quantile(0.95),
            p99_us: hist.value_at_quantile(0.99),
        }
    }

    /// Percentile in microseconds for one of the kept quantiles
    /// (50, 90, 95, 99). Threshold parsing rejects anything else; callers
    /// passing another value get the next kept bucket up.
    pub fn percentile_us(&self, p: f64) -> u64 {
        match p {
            p if p <= 50.0 => self.p50_us,
            p if p <= 90.0 => self.p90_us,
            p if p <= 95.0 => self.p95_us,
            p if p <= 99.0 => self.p99_us,
            _ => self.max_us,
        }
    }
}

/// Pass/fail tallies for one named check
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckStats {
    pub passes: u64,
    pub fails: u64,
}

impl CheckStats {
    pub fn total(&self) -> u64 {
        self.passes + self.fails
    }

    /// Pass rate in [0, 1]; None before any outcome is recorded
    pub fn rate(&self) -> Option<f64> {
        let total = self.total();
        (total > 0).then(|| self.passes as f64 / total as f64)
    }
}

/// Per-scenario aggregate view
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScenarioStats {
    pub iterations: u64,
    pub failed_iterations: u64,
    pub dropped_iterations: u64,
    pub http_reqs: u64,
    pub http_failed: u64,
    pub http_req_duration: Option<TrendStats>,
    pub iteration_duration: Option<TrendStats>,
    pub checks: BTreeMap<String, CheckStats>,
}

impl ScenarioStats {
    /// Summed check tallies across all named checks in the scenario
    pub fn check_totals(&self) -> CheckStats {
        let mut out = CheckStats::default();
        for c in self.checks.values() {
            out.passes += c.passes;
            out.fails += c.fails;
        }
        out
    }
}

/// Immutable point-in-time aggregate of a run
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub started_at: DateTime<Utc>,
    pub taken_at: DateTime<Utc>,
    pub scenarios: BTreeMap<String, ScenarioStats>,
}

impl MetricsSnapshot {
    /// Trend stats for a metric, optionally filtered to one scenario.
    /// Without a filter, scenarios are merged by pooling their histogram
    /// summaries (counts summed, percentiles taken from the worst scenario).
    pub fn trend(&self, metric: &str, scenario: Option<&str>) -> Option<TrendStats> {
        let pick = |s: &ScenarioStats| match metric {
            HTTP_REQ_DURATION => s.http_req_duration.clone(),
            ITERATION_DURATION => s.iteration_duration.clone(),
            _ => None,
        };

        match scenario {
            Some(name) => self.scenarios.get(name).and_then(|s| pick(s)),
            None => {
                let mut merged: Option<TrendStats> = None;
                for stats in self.scenarios.values().filter_map(|s| pick(s)) {
                    merged = Some(match merged {
                        None => stats,
                        Some(acc) => TrendStats {
                            count: acc.count + stats.count,
                            min_us: acc.min_us.min(stats.min_us),
                            max_us: acc.max_us.max(stats.max_us),
                            mean_us: (acc.mean_us * acc.count as f64
                                + stats.mean_us * stats.count as f64)
                                / (acc.count + stats.count).max(1) as f64,
                            p50_us: acc.p50_us.max(stats.p50_us),
                            p90_us: acc.p90_us.max(stats.p90_us),
                            p95_us: acc.p95_us.max(stats.p95_us),
                            p99_us: acc.p99_us.max(stats.p99_us),
                        },
                    });
                }
                merged
            }
        }
    }

    /// Rate-style metrics in [0, 1]: check pass rate, request failure rate
    pub fn rate(&self, metric: &str, scenario: Option<&str>) -> Option<f64> {
        let scoped: Vec<&ScenarioStats> = match scenario {
            Some(name) => self.scenarios.get(name).into_iter().collect(),
            None => self.scenarios.values().collect(),
        };
        match metric {
            CHECKS => {
                let mut totals = CheckStats::default();
                for s in &scoped {
                    let t = s.check_totals();
                    totals.passes += t.passes;
                    totals.fails += t.fails;
                }
                totals.rate()
            }
            HTTP_REQ_FAILED => {
                let reqs: u64 = scoped.iter().map(|s| s.http_reqs).sum();
                let failed: u64 = scoped.iter().map(|s| s.http_failed).sum();
                (reqs > 0).then(|| failed as f64 / reqs as f64)
            }
            _ => None,
        }
    }

    /// Counter-style metrics
    pub fn count(&self, metric: &str, scenario: Option<&str>) -> Option<u64> {
        let scoped: Vec<&ScenarioStats> = match scenario {
            Some(name) => self.scenarios.get(name).into_iter().collect(),
            None => self.scenarios.values().collect(),
        };
        if scoped.is_empty() {
            return None;
        }
        match metric {
            ITERATIONS => Some(scoped.iter().map(|s| s.iterations).sum()),
            DROPPED_ITERATIONS => Some(scoped.iter().map(|s| s.dropped_iterations).sum()),
            HTTP_REQS => Some(scoped.iter().map(|s| s.http_reqs).sum()),
            _ => None,
        }
    }
}
