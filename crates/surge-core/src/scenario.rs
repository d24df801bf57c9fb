//! Traffic plan model: scenarios, executors, stages
//!
//! A [`RunPlan`] is the declarative input to a run: a named set of
//! [`ScenarioConfig`]s plus global options and threshold expressions.
//! Executors are a tagged enum so each traffic shape carries only its own
//! parameters. Plans are immutable once a run starts; [`RunPlan::validate`]
//! rejects bad plans before any traffic is generated.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::duration;
use crate::error::{Result, SurgeError};

/// Default graceful-stop window applied when a scenario does not set one
pub const DEFAULT_GRACEFUL_STOP: Duration = Duration::from_secs(30);

/// A complete traffic plan for one run
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunPlan {
    /// Base URL all built-in iterations resolve paths against
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Drop response bodies after reading headers (saves memory on large GETs)
    #[serde(default)]
    pub discard_response_bodies: bool,

    /// Per-request timeout
    #[serde(default = "default_request_timeout", with = "duration")]
    pub request_timeout: Duration,

    /// Scenarios keyed by name; all run concurrently against one run clock
    pub scenarios: BTreeMap<String, ScenarioConfig>,

    /// Threshold expressions keyed by metric selector,
    /// e.g. `"http_req_duration{scenario:spike}" = ["p(99)<1500"]`
    #[serde(default)]
    pub thresholds: BTreeMap<String, Vec<String>>,
}

fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

/// One scenario: an executor plus scheduling and tagging options
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScenarioConfig {
    /// Traffic shape and its parameters
    #[serde(flatten)]
    pub executor: Executor,

    /// Offset from run start before this scenario emits anything
    #[serde(default, with = "duration")]
    pub start_time: Duration,

    /// How long to wait for in-flight iterations at the deadline.
    /// Zero abandons them immediately.
    #[serde(default = "default_graceful_stop", with = "duration")]
    pub graceful_stop: Duration,

    /// Extra tags stamped on every sample this scenario produces
    #[serde(default)]
    pub tags: BTreeMap<String, String>,

    /// Name of the iteration function this scenario drives
    pub exec: String,
}

fn default_graceful_stop() -> Duration {
    DEFAULT_GRACEFUL_STOP
}

/// Traffic shape. Closed-loop keeps N workers looping; open-loop shapes
/// emit work at a target arrival rate regardless of completion latency.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "executor", rename_all = "kebab-case")]
pub enum Executor {
    /// Closed-loop: exactly `vus` workers iterate back-to-back for `duration`
    ConstantVus {
        vus: u32,
        #[serde(with = "duration")]
        duration: Duration,
    },

    /// Open-loop: `rate` iteration starts per `time_unit` for `duration`
    ConstantArrivalRate {
        rate: u32,
        #[serde(default = "default_time_unit", with = "duration")]
        time_unit: Duration,
        #[serde(with = "duration")]
        duration: Duration,
        #[serde(default = "default_pre_allocated_vus")]
        pre_allocated_vus: u32,
        /// Hard cap on pool growth; defaults to `pre_allocated_vus`
        #[serde(default)]
        max_vus: Option<u32>,
        #[serde(default)]
        on_saturation: SaturationPolicy,
    },

    /// Open-loop: rate ramps piecewise-linearly from `start_rate` through
    /// each stage's target
    RampingArrivalRate {
        start_rate: u32,
        #[serde(default = "default_time_unit", with = "duration")]
        time_unit: Duration,
        stages: Vec<Stage>,
        #[serde(default = "default_pre_allocated_vus")]
        pre_allocated_vus: u32,
        #[serde(default)]
        max_vus: Option<u32>,
        #[serde(default)]
        on_saturation: SaturationPolicy,
    },
}

fn default_time_unit() -> Duration {
    Duration::from_secs(1)
}

fn default_pre_allocated_vus() -> u32 {
    1
}

/// One leg of a ramp: interpolate linearly to `target` over `duration`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    pub target: u32,
    #[serde(with = "duration")]
    pub duration: Duration,
}

/// What an open-loop scheduler does when every worker slot is busy and the
/// pool is already at `max_vus`
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SaturationPolicy {
    /// Drop the work item and count it in `dropped_iterations`
    #[default]
    Drop,
    /// Wait for a slot, letting the achieved rate fall below target
    Block,
}

impl Executor {
    /// Executor kind as it appears in plan files
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ConstantVus { .. } => "constant-vus",
            Self::ConstantArrivalRate { .. } => "constant-arrival-rate",
            Self::RampingArrivalRate { .. } => "ramping-arrival-rate",
        }
    }

    /// Total emission window for this executor
    pub fn total_duration(&self) -> Duration {
        match self {
            Self::ConstantVus { duration, .. } | Self::ConstantArrivalRate { duration, .. } => {
                *duration
            }
            Self::RampingArrivalRate { stages, .. } => {
                stages.iter().map(|s| s.duration).sum()
            }
        }
    }
}

/// Piecewise-linear target rate (iterations per `time_unit`) at `elapsed`
/// into a ramp that starts at `start_rate` and walks through `stages`.
/// Past the final stage the last target holds.
pub fn rate_at(start_rate: u32, stages: &[Stage], elapsed: Duration) -> f64 {
    let mut from = start_rate as f64;
    let mut offset = Duration::ZERO;

    for stage in stages {
        let end = offset + stage.duration;
        if elapsed < end {
            let span = stage.duration.as_secs_f64();
            let progress = if span > 0.0 {
                (elapsed - offset).as_secs_f64() / span
            } else {
                1.0
            };
            return from + (stage.target as f64 - from) * progress;
        }
        from = stage.target as f64;
        offset = end;
    }
    from
}

impl ScenarioConfig {
    fn validate(&self, name: &str) -> Result<()> {
        let invalid = |reason: &str| SurgeError::InvalidExecutor {
            scenario: name.to_string(),
            reason: reason.to_string(),
        };

        match &self.executor {
            Executor::ConstantVus { vus, duration } => {
                if *vus == 0 {
                    return Err(invalid("vus must be at least 1"));
                }
                if duration.is_zero() {
                    return Err(invalid("duration must be non-zero"));
                }
            }
            Executor::ConstantArrivalRate {
                rate,
                time_unit,
                duration,
                pre_allocated_vus,
                max_vus,
                ..
            } => {
                if *rate == 0 {
                    return Err(invalid("rate must be at least 1"));
                }
                if time_unit.is_zero() {
                    return Err(invalid("time_unit must be non-zero"));
                }
                if duration.is_zero() {
                    return Err(invalid("duration must be non-zero"));
                }
                validate_pool(*pre_allocated_vus, *max_vus).map_err(|r| invalid(&r))?;
            }
            Executor::RampingArrivalRate {
                time_unit,
                stages,
                pre_allocated_vus,
                max_vus,
                ..
            } => {
                if time_unit.is_zero() {
                    return Err(invalid("time_unit must be non-zero"));
                }
                if stages.is_empty() {
                    return Err(invalid("stages must not be empty"));
                }
                if stages.iter().any(|s| s.duration.is_zero()) {
                    return Err(invalid("every stage duration must be non-zero"));
                }
                validate_pool(*pre_allocated_vus, *max_vus).map_err(|r| invalid(&r))?;
            }
        }
        Ok(())
    }
}

fn validate_pool(pre_allocated: u32, max: Option<u32>) -> std::result::Result<(), String> {
    if pre_allocated == 0 {
        return Err("pre_allocated_vus must be at least 1".to_string());
    }
    if let Some(max) = max {
        if max < pre_allocated {
            return Err(format!(
                "max_vus ({max}) must be >= pre_allocated_vus ({pre_allocated})"
            ));
        }
    }
    Ok(())
}

impl RunPlan {
    /// Validate the whole plan against the set of registered iteration
    /// function names. Fails fast, before any traffic is generated.
    pub fn validate(&self, known_execs: &BTreeSet<String>) -> Result<()> {
        if self.scenarios.is_empty() {
            return Err(SurgeError::EmptyPlan);
        }
        for (name, scenario) in &self.scenarios {
            scenario.validate(name)?;
            if !known_execs.contains(&scenario.exec) {
                return Err(SurgeError::UnknownIteration {
                    scenario: name.clone(),
                    exec: scenario.exec.clone(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn exec_set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn constant_vus(vus: u32, duration: Duration) -> ScenarioConfig {
        ScenarioConfig {
            executor: Executor::ConstantVus { vus, duration },
            start_time: Duration::ZERO,
            graceful_stop: Duration::ZERO,
            tags: BTreeMap::new(),
            exec: "noop".to_string(),
        }
    }

    fn plan_with(name: &str, scenario: ScenarioConfig) -> RunPlan {
        RunPlan {
            base_url: "http://localhost:8080".to_string(),
            discard_response_bodies: false,
            request_timeout: Duration::from_secs(30),
            scenarios: BTreeMap::from([(name.to_string(), scenario)]),
            thresholds: BTreeMap::new(),
        }
    }

    #[test]
    fn test_plan_toml_roundtrip() {
        let text = r#"
            base_url = "http://localhost:3000"
            discard_response_bodies = true

            [scenarios.steady]
            executor = "constant-vus"
            vus = 50
            duration = "5m"
            graceful_stop = "0s"
            exec = "create_and_update"
            tags = { test_type = "steady" }

            [scenarios.paced]
            executor = "constant-arrival-rate"
            rate = 90
            time_unit = "1m"
            duration = "5m"
            pre_allocated_vus = 10
            exec = "fetch"

            [scenarios.ramp]
            executor = "ramping-arrival-rate"
            start_time = "30s"
            start_rate = 50
            pre_allocated_vus = 50
            max_vus = 100
            exec = "fetch"
            stages = [
                { target = 100, duration = "30s" },
                { target = 100, duration = "3m30s" },
                { target = 0, duration = "30s" },
            ]

            [thresholds]
            "http_req_duration{scenario:steady}" = ["p(99)<1500"]
        "#;

        let plan: RunPlan = toml::from_str(text).unwrap();
        assert_eq!(plan.scenarios.len(), 3);
        assert!(plan.discard_response_bodies);

        let steady = &plan.scenarios["steady"];
        assert_eq!(steady.executor.kind(), "constant-vus");
        assert_eq!(steady.graceful_stop, Duration::ZERO);
        assert_eq!(steady.tags["test_type"], "steady");

        let paced = &plan.scenarios["paced"];
        match &paced.executor {
            Executor::ConstantArrivalRate {
                rate,
                time_unit,
                pre_allocated_vus,
                max_vus,
                on_saturation,
                ..
            } => {
                assert_eq!(*rate, 90);
                assert_eq!(*time_unit, Duration::from_secs(60));
                assert_eq!(*pre_allocated_vus, 10);
                assert_eq!(*max_vus, None);
                assert_eq!(*on_saturation, SaturationPolicy::Drop);
            }
            other => panic!("wrong executor: {other:?}"),
        }

        let ramp = &plan.scenarios["ramp"];
        assert_eq!(ramp.start_time, Duration::from_secs(30));
        assert_eq!(ramp.executor.total_duration(), Duration::from_secs(270));

        // defaults fill in
        assert_eq!(paced.graceful_stop, DEFAULT_GRACEFUL_STOP);

        plan.validate(&exec_set(&["create_and_update", "fetch"]))
            .unwrap();

        // survives a serialize/deserialize cycle
        let json = serde_json::to_string(&plan).unwrap();
        let back: RunPlan = serde_json::from_str(&json).unwrap();
        assert_eq!(back.scenarios["ramp"].executor.total_duration(), Duration::from_secs(270));
    }

    #[test]
    fn test_validate_rejects_unknown_exec() {
        let plan = plan_with("s", constant_vus(1, Duration::from_secs(1)));
        let err = plan.validate(&exec_set(&["other"])).unwrap_err();
        assert!(matches!(err, SurgeError::UnknownIteration { .. }));
    }

    #[test]
    fn test_validate_rejects_zero_vus_and_duration() {
        let plan = plan_with("s", constant_vus(0, Duration::from_secs(1)));
        assert!(plan.validate(&exec_set(&["noop"])).is_err());

        let plan = plan_with("s", constant_vus(1, Duration::ZERO));
        assert!(plan.validate(&exec_set(&["noop"])).is_err());
    }

    #[test]
    fn test_validate_rejects_bad_pool_and_stages() {
        let mut sc = constant_vus(1, Duration::from_secs(1));
        sc.executor = Executor::RampingArrivalRate {
            start_rate: 10,
            time_unit: Duration::from_secs(1),
            stages: vec![],
            pre_allocated_vus: 1,
            max_vus: None,
            on_saturation: SaturationPolicy::Drop,
        };
        assert!(plan_with("s", sc.clone()).validate(&exec_set(&["noop"])).is_err());

        sc.executor = Executor::ConstantArrivalRate {
            rate: 10,
            time_unit: Duration::from_secs(1),
            duration: Duration::from_secs(1),
            pre_allocated_vus: 10,
            max_vus: Some(5),
            on_saturation: SaturationPolicy::Drop,
        };
        assert!(plan_with("s", sc).validate(&exec_set(&["noop"])).is_err());
    }

    #[test]
    fn test_validate_rejects_empty_plan() {
        let plan = RunPlan {
            base_url: String::new(),
            discard_response_bodies: false,
            request_timeout: Duration::from_secs(30),
            scenarios: BTreeMap::new(),
            thresholds: BTreeMap::new(),
        };
        assert!(matches!(
            plan.validate(&BTreeSet::new()),
            Err(SurgeError::EmptyPlan)
        ));
    }

    #[test]
    fn test_rate_at_matches_source_ramp() {
        // 50 -> 100 over 30s, hold 100 for 3m30s, 100 -> 0 over 30s
        let stages = [
            Stage { target: 100, duration: Duration::from_secs(30) },
            Stage { target: 100, duration: Duration::from_secs(210) },
            Stage { target: 0, duration: Duration::from_secs(30) },
        ];

        assert_eq!(rate_at(50, &stages, Duration::ZERO), 50.0);
        // 15s into the first leg: halfway from 50 to 100
        assert_eq!(rate_at(50, &stages, Duration::from_secs(15)), 75.0);
        assert_eq!(rate_at(50, &stages, Duration::from_secs(30)), 100.0);
        // inside the hold
        assert_eq!(rate_at(50, &stages, Duration::from_secs(120)), 100.0);
        // halfway down the final leg
        assert_eq!(rate_at(50, &stages, Duration::from_secs(255)), 50.0);
        // past the end, last target holds
        assert_eq!(rate_at(50, &stages, Duration::from_secs(400)), 0.0);
    }

    proptest! {
        #[test]
        fn prop_rate_at_stays_within_hull(
            start in 0u32..500,
            targets in proptest::collection::vec(0u32..500, 1..6),
            at_ms in 0u64..600_000,
        ) {
            let stages: Vec<Stage> = targets
                .iter()
                .map(|t| Stage { target: *t, duration: Duration::from_secs(30) })
                .collect();
            let lo = targets.iter().copied().min().unwrap().min(start) as f64;
            let hi = targets.iter().copied().max().unwrap().max(start) as f64;
            let r = rate_at(start, &stages, Duration::from_millis(at_ms));
            prop_assert!(r >= lo && r <= hi);
        }

        #[test]
        fn prop_rate_at_stage_boundaries_hits_targets(
            start in 0u32..500,
            targets in proptest::collection::vec(0u32..500, 1..6),
        ) {
            let stages: Vec<Stage> = targets
                .iter()
                .map(|t| Stage { target: *t, duration: Duration::from_secs(10) })
                .collect();
            let mut elapsed = Duration::ZERO;
            for (stage, t) in stages.iter().zip(&targets) {
                elapsed += stage.duration;
                let r = rate_at(start, &stages, elapsed);
                // boundary falls at the start of the next leg, whose `from`
                // equals this target, so interpolation is exact there
                prop_assert!((r - *t as f64).abs() < 1e-9);
            }
        }
    }
}
