//! Threshold expressions: parsing and evaluation
//!
//! Plans declare thresholds in the selector syntax operators already use:
//!
//! ```toml
//! [thresholds]
//! "http_req_duration{scenario:steady}" = ["p(99)<1500"]
//! "checks" = ["rate>0.99"]
//! ```
//!
//! Trend bounds are milliseconds; rate bounds are fractions in [0, 1];
//! count bounds are plain totals. Evaluation is a pure function of a
//! snapshot, so re-evaluating the same snapshot always yields the same
//! verdicts.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use surge_core::{Result, SurgeError};

use crate::aggregator::{
    MetricsSnapshot, CHECKS, DROPPED_ITERATIONS, HTTP_REQS, HTTP_REQ_DURATION, HTTP_REQ_FAILED,
    ITERATIONS, ITERATION_DURATION,
};

/// What family of values a metric yields
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MetricKind {
    /// Latency distribution: supports p(q), avg, min, max, count
    Trend,
    /// Fraction in [0, 1]: supports rate
    Rate,
    /// Monotonic total: supports count
    Counter,
}

fn metric_kind(name: &str) -> Option<MetricKind> {
    match name {
        HTTP_REQ_DURATION | ITERATION_DURATION => Some(MetricKind::Trend),
        CHECKS | HTTP_REQ_FAILED => Some(MetricKind::Rate),
        ITERATIONS | DROPPED_ITERATIONS | HTTP_REQS => Some(MetricKind::Counter),
        _ => None,
    }
}

/// One parsed pass/fail condition
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Threshold {
    /// Metric the condition reads
    pub metric: String,
    /// Optional scenario filter from `{scenario:name}`
    pub scenario: Option<String>,
    /// Aggregation applied to the metric
    pub agg: Aggregation,
    /// Comparison against the bound
    pub op: Comparator,
    /// Right-hand bound (ms for trends, fraction for rates, total for counters)
    pub bound: f64,
    /// Original `selector: expression` text, for reporting
    pub source: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    /// `p(99)` style percentile; quantile must be one of 50, 90, 95, 99
    #[serde(rename = "percentile")]
    Percentile(f64),
    Avg,
    Min,
    Max,
    Count,
    Rate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparator {
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "==")]
    Eq,
}

impl Comparator {
    fn holds(self, observed: f64, bound: f64) -> bool {
        match self {
            Self::Lt => observed < bound,
            Self::Le => observed <= bound,
            Self::Gt => observed > bound,
            Self::Ge => observed >= bound,
            Self::Eq => (observed - bound).abs() < f64::EPSILON,
        }
    }

}

/// Parse every threshold declared in a plan's `[thresholds]` table
pub fn parse_thresholds(table: &BTreeMap<String, Vec<String>>) -> Result<Vec<Threshold>> {
    let mut out = Vec::new();
    for (selector, exprs) in table {
        let (metric, scenario) = parse_selector(selector)?;
        let kind = metric_kind(&metric).ok_or_else(|| SurgeError::InvalidThreshold {
            expr: selector.clone(),
            reason: format!("unknown metric {metric:?}"),
        })?;
        for expr in exprs {
            out.push(parse_expression(selector, &metric, scenario.as_deref(), kind, expr)?);
        }
    }
    Ok(out)
}

/// `http_req_duration{scenario:steady}` -> ("http_req_duration", Some("steady"))
fn parse_selector(selector: &str) -> Result<(String, Option<String>)> {
    let bad = |reason: &str| SurgeError::InvalidThreshold {
        expr: selector.to_string(),
        reason: reason.to_string(),
    };

    let s = selector.trim();
    let Some(open) = s.find('{') else {
        if s.is_empty() {
            return Err(bad("empty selector"));
        }
        return Ok((s.to_string(), None));
    };

    if !s.ends_with('}') {
        return Err(bad("unterminated tag filter"));
    }
    let metric = s[..open].trim();
    if metric.is_empty() {
        return Err(bad("missing metric name"));
    }
    let filter = &s[open + 1..s.len() - 1];
    let (key, value) = filter
        .split_once(':')
        .ok_or_else(|| bad("tag filter must be key:value"))?;
    if key.trim() != "scenario" {
        return Err(bad("only scenario tag filters are supported"));
    }
    let value = value.trim();
    if value.is_empty() {
        return Err(bad("empty scenario name in tag filter"));
    }
    Ok((metric.to_string(), Some(value.to_string())))
}

/// `p(99)<1500` -> percentile aggregation, Lt comparator, bound 1500
fn parse_expression(
    selector: &str,
    metric: &str,
    scenario: Option<&str>,
    kind: MetricKind,
    expr: &str,
) -> Result<Threshold> {
    let bad = |reason: String| SurgeError::InvalidThreshold {
        expr: format!("{selector}: {expr}"),
        reason,
    };

    let s: String = expr.chars().filter(|c| !c.is_whitespace()).collect();

    // longest operators first so "<=" never parses as "<"
    let (op_at, op, op_len) = ["<=", ">=", "==", "<", ">"]
        .iter()
        .find_map(|sym| s.find(sym).map(|at| (at, *sym, sym.len())))
        .ok_or_else(|| bad("missing comparison operator".to_string()))?;

    let agg_text = &s[..op_at];
    let bound_text = &s[op_at + op_len..];

    let agg = parse_aggregation(agg_text).map_err(&bad)?;
    let allowed = match kind {
        MetricKind::Trend => !matches!(agg, Aggregation::Rate),
        MetricKind::Rate => matches!(agg, Aggregation::Rate),
        MetricKind::Counter => matches!(agg, Aggregation::Count),
    };
    if !allowed {
        return Err(bad(format!(
            "aggregation {agg_text:?} does not apply to metric {metric:?}"
        )));
    }

    let bound: f64 = bound_text
        .parse()
        .map_err(|_| bad(format!("invalid bound {bound_text:?}")))?;
    if !bound.is_finite() {
        return Err(bad("bound must be finite".to_string()));
    }

    let op = match op {
        "<" => Comparator::Lt,
        "<=" => Comparator::Le,
        ">" => Comparator::Gt,
        ">=" => Comparator::Ge,
        _ => Comparator::Eq,
    };

    Ok(Threshold {
        metric: metric.to_string(),
        scenario: scenario.map(str::to_string),
        agg,
        op,
        bound,
        source: format!("{selector}: {expr}"),
    })
}

fn parse_aggregation(text: &str) -> std::result::Result<Aggregation, String> {
    match text {
        "avg" => Ok(Aggregation::Avg),
        "min" => Ok(Aggregation::Min),
        "max" => Ok(Aggregation::Max),
        "count" => Ok(Aggregation::Count),
        "rate" => Ok(Aggregation::Rate),
        _ => {
            let inner = text
                .strip_prefix("p(")
                .and_then(|t| t.strip_suffix(')'))
                .ok_or_else(|| format!("unknown aggregation {text:?}"))?;
            let q: f64 = inner
                .parse()
                .map_err(|_| format!("invalid percentile {inner:?}"))?;
            // snapshots keep exactly these quantiles; anything else would
            // be judged against a different statistic than requested
            if ![50.0, 90.0, 95.0, 99.0].contains(&q) {
                return Err(format!("unsupported percentile {q} (use 50, 90, 95, or 99)"));
            }
            Ok(Aggregation::Percentile(q))
        }
    }
}

/// Outcome of one threshold against one snapshot
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ThresholdVerdict {
    pub source: String,
    /// Observed value in the bound's unit; None when no samples matched
    pub observed: Option<f64>,
    pub bound: f64,
    pub passed: bool,
}

impl ThresholdVerdict {
    /// Human-readable observed value for report lines
    pub fn observed_text(&self) -> String {
        match self.observed {
            Some(v) => format!("observed {v:.3}"),
            None => "no samples".to_string(),
        }
    }
}

/// Evaluate every threshold against a snapshot. Deterministic: the same
/// snapshot always produces the same verdicts.
pub fn evaluate(thresholds: &[Threshold], snapshot: &MetricsSnapshot) -> Vec<ThresholdVerdict> {
    thresholds
        .iter()
        .map(|t| {
            let observed = observe(t, snapshot);
            ThresholdVerdict {
                source: t.source.clone(),
                observed,
                bound: t.bound,
                // a threshold over an empty selection holds vacuously;
                // empty runs are reported through iteration counts instead
                passed: observed.map_or(true, |v| t.op.holds(v, t.bound)),
            }
        })
        .collect()
}

fn observe(t: &Threshold, snapshot: &MetricsSnapshot) -> Option<f64> {
    let scenario = t.scenario.as_deref();
    match t.agg {
        Aggregation::Rate => snapshot.rate(&t.metric, scenario),
        Aggregation::Count => match metric_kind(&t.metric) {
            Some(MetricKind::Trend) => snapshot
                .trend(&t.metric, scenario)
                .map(|s| s.count as f64),
            _ => snapshot.count(&t.metric, scenario).map(|c| c as f64),
        },
        Aggregation::Avg | Aggregation::Min | Aggregation::Max | Aggregation::Percentile(_) => {
            let stats = snapshot.trend(&t.metric, scenario)?;
            let us = match t.agg {
                Aggregation::Avg => stats.mean_us,
                Aggregation::Min => stats.min_us as f64,
                Aggregation::Max => stats.max_us as f64,
                Aggregation::Percentile(q) => stats.percentile_us(q) as f64,
                _ => unreachable!(),
            };
            // trend bounds are written in milliseconds
            Some(us / 1000.0)
        }
    }
}
