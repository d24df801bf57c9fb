//! # surge-metrics
//!
//! Metrics side of the surge harness:
//! - [`RequestSample`] / [`CheckSample`] - append-only outcomes emitted by
//!   workers
//! - [`MetricsAggregator`] - concurrent sink with streaming HDR-histogram
//!   percentiles per scenario
//! - [`Threshold`] parsing and deterministic evaluation over a
//!   [`MetricsSnapshot`]
//! - [`RunReport`] - the machine- and human-readable end-of-run summary

pub mod aggregator;
pub mod report;
pub mod sample;
pub mod threshold;

pub use aggregator::{
    CheckStats, MetricsAggregator, MetricsSnapshot, ScenarioStats, TrendStats, CHECKS,
    DROPPED_ITERATIONS, HTTP_REQS, HTTP_REQ_DURATION, HTTP_REQ_FAILED, ITERATIONS,
    ITERATION_DURATION,
};
pub use report::RunReport;
pub use sample::{CheckSample, RequestSample};
pub use threshold::{evaluate, parse_thresholds, Aggregation, Comparator, Threshold, ThresholdVerdict};
