//! Run orchestration
//!
//! A [`Runner`] takes a validated plan, fans every scenario out as its own
//! scheduler task against one shared [`RunContext`], waits for all of them,
//! then snapshots the aggregator, evaluates thresholds, and builds the
//! [`RunReport`]. Cancellation (signal or caller) produces a clean partial
//! report instead of an abort.

use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{info, warn};

use surge_core::{Result, RunContext, RunPlan, SurgeError};
use surge_metrics::{evaluate, parse_thresholds, MetricsAggregator, RunReport, Threshold};

use crate::flows::builtin_iterations;
use crate::iteration::{Iteration, IterationContext, IterationRegistry};
use crate::scheduler::{run_scenario, ScenarioRun};

/// Executes one traffic plan
pub struct Runner {
    plan: RunPlan,
    registry: IterationRegistry,
    metrics: Arc<MetricsAggregator>,
    ctx: RunContext,
}

impl Runner {
    /// Build a runner with the built-in iteration functions registered
    pub fn new(plan: RunPlan) -> Self {
        Self {
            plan,
            registry: builtin_iterations(),
            metrics: Arc::new(MetricsAggregator::new()),
            ctx: RunContext::new(),
        }
    }

    /// Register (or override) an iteration function by its name
    pub fn register<I: Iteration + 'static>(&mut self, iteration: I) {
        self.registry
            .insert(iteration.name().to_string(), Arc::new(iteration));
    }

    /// Handle for external cancellation (signal handlers, watchdogs)
    pub fn context(&self) -> &RunContext {
        &self.ctx
    }

    /// Fail-fast plan validation; returns the parsed thresholds
    pub fn validate(&self) -> Result<Vec<Threshold>> {
        let known: BTreeSet<String> = self.registry.keys().cloned().collect();
        self.plan.validate(&known)?;
        parse_thresholds(&self.plan.thresholds)
    }

    /// Run the whole plan to completion or cancellation
    pub async fn run(&self) -> Result<RunReport> {
        let thresholds = self.validate()?;

        let client = reqwest::Client::builder()
            .timeout(self.plan.request_timeout)
            .build()
            .map_err(|e| SurgeError::ClientSetup(e.to_string()))?;

        info!(
            scenarios = self.plan.scenarios.len(),
            base_url = %self.plan.base_url,
            "run starting"
        );
        let started = Instant::now();

        let mut schedulers = JoinSet::new();
        for (name, config) in &self.plan.scenarios {
            self.metrics.touch_scenario(name);
            let iteration = self.registry.get(&config.exec).cloned().ok_or_else(|| {
                SurgeError::UnknownIteration {
                    scenario: name.clone(),
                    exec: config.exec.clone(),
                }
            })?;

            schedulers.spawn(run_scenario(ScenarioRun {
                name: name.clone(),
                config: config.clone(),
                iteration,
                ictx: IterationContext {
                    scenario: name.clone(),
                    client: client.clone(),
                    base_url: self.plan.base_url.clone(),
                    tags: config.tags.clone(),
                    discard_response_bodies: self.plan.discard_response_bodies,
                },
                ctx: self.ctx.clone(),
                metrics: self.metrics.clone(),
            }));
        }

        while let Some(joined) = schedulers.join_next().await {
            if let Err(e) = joined {
                warn!("scenario scheduler aborted: {e}");
            }
        }

        let cancelled = self.ctx.is_cancelled();
        let snapshot = self.metrics.snapshot();
        let verdicts = evaluate(&thresholds, &snapshot);
        let report = RunReport::new(started.elapsed(), cancelled, snapshot, verdicts);
        info!(
            passed = report.passed,
            cancelled,
            "run finished in {:.1}s",
            report.duration.as_secs_f64()
        );
        Ok(report)
    }
}
