//! The iteration capability: externally supplied units of work
//!
//! Test authors implement [`Iteration`] and register it by name; scenarios
//! reference it through their `exec` field. The harness treats iterations
//! as opaque: they run, produce samples and check outcomes, and may fail.
//! A failure is recorded and never aborts other iterations.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use surge_core::Result;
use surge_metrics::{CheckSample, RequestSample};

/// What one iteration run hands back to the harness
#[derive(Debug, Default)]
pub struct IterationOutput {
    pub samples: Vec<RequestSample>,
    pub checks: Vec<CheckSample>,
}

impl IterationOutput {
    /// Record a named inline assertion, k6 `check` style
    pub fn check(&mut self, ctx: &IterationContext, name: &str, passed: bool) {
        self.checks.push(CheckSample {
            scenario: ctx.scenario.clone(),
            name: name.to_string(),
            passed,
            timestamp: Utc::now(),
        });
    }
}

/// Per-scenario environment an iteration runs against
#[derive(Clone)]
pub struct IterationContext {
    /// Scenario driving this iteration
    pub scenario: String,
    /// Shared HTTP client (connection pool spans the whole run)
    pub client: reqwest::Client,
    /// Base URL request paths resolve against
    pub base_url: String,
    /// Scenario tags stamped on every sample
    pub tags: BTreeMap<String, String>,
    /// Skip buffering response bodies
    pub discard_response_bodies: bool,
}

/// An externally supplied unit of work the scheduler invokes
#[async_trait]
pub trait Iteration: Send + Sync {
    /// Registry name scenarios use in their `exec` field
    fn name(&self) -> &str;

    /// Run once, returning the samples produced or a failure
    async fn run(&self, ctx: &IterationContext) -> Result<IterationOutput>;
}

/// Iteration functions available to a run, keyed by `exec` name
pub type IterationRegistry = BTreeMap<String, Arc<dyn Iteration>>;
