//! Sample value types produced by workers
//!
//! Samples are append-only: once handed to the aggregator they are never
//! mutated. Timestamps are wall-clock and carry no ordering guarantee -
//! the aggregator must not assume arrival order reflects causal order.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of one HTTP call made inside an iteration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RequestSample {
    /// Scenario that drove the iteration this call belongs to
    pub scenario: String,
    /// HTTP method
    pub method: String,
    /// Request path relative to the base URL
    pub path: String,
    /// Response status; 0 means the request never got a response
    pub status: u16,
    /// Wall time from send to last header (body drain included when read)
    pub duration: Duration,
    /// Wall-clock completion time
    pub timestamp: DateTime<Utc>,
    /// Scenario tags plus any per-request extras
    pub tags: BTreeMap<String, String>,
}

impl RequestSample {
    /// Transport errors and HTTP error statuses both count as failed
    pub fn failed(&self) -> bool {
        self.status == 0 || self.status >= 400
    }
}

/// Outcome of one named inline assertion
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CheckSample {
    pub scenario: String,
    pub name: String,
    pub passed: bool,
    pub timestamp: DateTime<Utc>,
}
