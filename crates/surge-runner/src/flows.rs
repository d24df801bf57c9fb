//! Built-in iterations for the student/class management API
//!
//! Two request flows ship with the harness: a write path that creates and
//! updates a student record, and a read path that lists students and
//! classes. [`student_api_plan`] bundles them into the stock three-scenario
//! traffic plan.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use surge_core::{
    Executor, Result, RunPlan, SaturationPolicy, ScenarioConfig, Stage,
};

use crate::iteration::{Iteration, IterationContext, IterationOutput, IterationRegistry};

/// POST a new student, then PUT an update, then think for 0-2s
pub struct CreateAndUpdateFlow;

#[async_trait]
impl Iteration for CreateAndUpdateFlow {
    fn name(&self) -> &str {
        "create_and_update"
    }

    async fn run(&self, ctx: &IterationContext) -> Result<IterationOutput> {
        let mut out = IterationOutput::default();

        let new_student = json!({
            "firstName": "FirstName",
            "lastName": "LastName",
            "sex": "NG",
        });
        let status = ctx.post_json("/api/students", &new_student, &mut out).await;
        out.check(ctx, "status is 200", status == 200);

        let updated_student = json!({
            "firstName": "FirstNameUpdated",
            "lastName": "LastNameUpdated",
            "sex": "NG",
        });
        let status = ctx
            .put_json("/api/students/1", &updated_student, &mut out)
            .await;
        out.check(ctx, "status is 200", status == 200);

        // think time between closed-loop iterations
        let pause = Duration::from_secs_f64(rand::random::<f64>() * 2.0);
        tokio::time::sleep(pause).await;

        Ok(out)
    }
}

/// GET the student list, then the class list
pub struct FetchFlow;

#[async_trait]
impl Iteration for FetchFlow {
    fn name(&self) -> &str {
        "fetch"
    }

    async fn run(&self, ctx: &IterationContext) -> Result<IterationOutput> {
        let mut out = IterationOutput::default();

        let status = ctx.get("/api/students", &mut out).await;
        out.check(ctx, "status is 200", status == 200);

        let status = ctx.get("/api/classes", &mut out).await;
        out.check(ctx, "status is 200", status == 200);

        Ok(out)
    }
}

/// All iterations that ship with the harness
pub fn builtin_iterations() -> IterationRegistry {
    let flows: [Arc<dyn Iteration>; 2] = [Arc::new(CreateAndUpdateFlow), Arc::new(FetchFlow)];
    flows
        .into_iter()
        .map(|f| (f.name().to_string(), f))
        .collect()
}

/// The stock student-API plan: 50 constant VUs on the write path, a
/// 90-per-minute paced read path, and a ramping read path that starts 30s in.
pub fn student_api_plan(base_url: &str) -> RunPlan {
    let tag = |v: &str| BTreeMap::from([("test_type".to_string(), v.to_string())]);

    let scenarios = BTreeMap::from([
        (
            "constant_vus_test".to_string(),
            ScenarioConfig {
                executor: Executor::ConstantVus {
                    vus: 50,
                    duration: Duration::from_secs(300),
                },
                start_time: Duration::ZERO,
                // do not wait for iterations to finish at the deadline
                graceful_stop: Duration::ZERO,
                tags: tag("constant_vus_test"),
                exec: "create_and_update".to_string(),
            },
        ),
        (
            "constant_arrival_rate_test".to_string(),
            ScenarioConfig {
                executor: Executor::ConstantArrivalRate {
                    rate: 90,
                    time_unit: Duration::from_secs(60),
                    duration: Duration::from_secs(300),
                    pre_allocated_vus: 10,
                    max_vus: None,
                    on_saturation: SaturationPolicy::Drop,
                },
                start_time: Duration::ZERO,
                graceful_stop: surge_core::DEFAULT_GRACEFUL_STOP,
                tags: tag("constant_arrival_rate_test"),
                exec: "fetch".to_string(),
            },
        ),
        (
            "ramping_arrival_rate_test".to_string(),
            ScenarioConfig {
                executor: Executor::RampingArrivalRate {
                    start_rate: 50,
                    time_unit: Duration::from_secs(1),
                    stages: vec![
                        Stage { target: 100, duration: Duration::from_secs(30) },
                        Stage { target: 100, duration: Duration::from_secs(210) },
                        Stage { target: 0, duration: Duration::from_secs(30) },
                    ],
                    pre_allocated_vus: 50,
                    max_vus: Some(100),
                    on_saturation: SaturationPolicy::Drop,
                },
                start_time: Duration::from_secs(30),
                graceful_stop: surge_core::DEFAULT_GRACEFUL_STOP,
                tags: tag("ramping_arrival_rate_test"),
                exec: "fetch".to_string(),
            },
        ),
    ]);

    let thresholds = BTreeMap::from([
        (
            "http_req_duration{scenario:constant_vus_test}".to_string(),
            vec!["p(99)<1500".to_string()],
        ),
        (
            "http_req_duration{scenario:constant_arrival_rate_test}".to_string(),
            vec!["p(99)<1500".to_string()],
        ),
        (
            "http_req_duration{scenario:ramping_arrival_rate_test}".to_string(),
            vec!["p(99)<1500".to_string()],
        ),
    ]);

    RunPlan {
        base_url: base_url.to_string(),
        discard_response_bodies: true,
        request_timeout: Duration::from_secs(30),
        scenarios,
        thresholds,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use surge_metrics::parse_thresholds;

    #[test]
    fn test_builtin_registry_names() {
        let registry = builtin_iterations();
        assert!(registry.contains_key("create_and_update"));
        assert!(registry.contains_key("fetch"));
    }

    #[test]
    fn test_student_api_plan_is_valid() {
        let plan = student_api_plan("http://localhost:3000");
        let known = builtin_iterations().keys().cloned().collect();
        plan.validate(&known).unwrap();

        let thresholds = parse_thresholds(&plan.thresholds).unwrap();
        assert_eq!(thresholds.len(), 3);

        let ramp = &plan.scenarios["ramping_arrival_rate_test"];
        assert_eq!(ramp.start_time, Duration::from_secs(30));
        assert_eq!(ramp.executor.total_duration(), Duration::from_secs(270));
        assert!(plan.discard_response_bodies);
    }
}
