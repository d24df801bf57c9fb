//! Scenario schedulers
//!
//! One scheduler task per scenario, all against the shared run clock.
//! Closed-loop (constant-vus) keeps exactly N workers iterating
//! back-to-back; open-loop (constant/ramping arrival rate) emits work
//! items at the instantaneous target rate regardless of completion
//! latency, claiming slots from an elastic [`WorkerSlots`] pool.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio::time::{sleep, sleep_until, timeout, Instant};
use tracing::{debug, info};

use surge_core::{rate_at, Executor, RunContext, SaturationPolicy, ScenarioConfig};
use surge_metrics::MetricsAggregator;

use crate::iteration::{Iteration, IterationContext};
use crate::worker::{run_iteration, WorkItem, WorkerSlots};

/// Everything one scenario's scheduler needs, owned so it can be spawned
pub(crate) struct ScenarioRun {
    pub name: String,
    pub config: ScenarioConfig,
    pub iteration: Arc<dyn Iteration>,
    pub ictx: IterationContext,
    pub ctx: RunContext,
    pub metrics: Arc<MetricsAggregator>,
}

/// Drive one scenario to completion or cancellation
pub(crate) async fn run_scenario(run: ScenarioRun) {
    // honor the start offset relative to run start
    if !run.config.start_time.is_zero() {
        tokio::select! {
            _ = sleep(run.config.start_time) => {}
            _ = run.ctx.cancelled() => return,
        }
    }

    info!(
        scenario = %run.name,
        executor = run.config.executor.kind(),
        "scenario starting"
    );

    match run.config.executor.clone() {
        Executor::ConstantVus { vus, duration } => {
            constant_vus(&run, vus, duration).await;
        }
        Executor::ConstantArrivalRate {
            rate,
            time_unit,
            duration,
            pre_allocated_vus,
            max_vus,
            on_saturation,
        } => {
            let per_sec = rate as f64 / time_unit.as_secs_f64();
            open_loop(
                &run,
                move |_elapsed| per_sec,
                duration,
                pre_allocated_vus,
                max_vus.unwrap_or(pre_allocated_vus),
                on_saturation,
            )
            .await;
        }
        Executor::RampingArrivalRate {
            start_rate,
            time_unit,
            stages,
            pre_allocated_vus,
            max_vus,
            on_saturation,
        } => {
            let unit = time_unit.as_secs_f64();
            let total: Duration = stages.iter().map(|s| s.duration).sum();
            let rate_fn = move |elapsed: Duration| rate_at(start_rate, &stages, elapsed) / unit;
            open_loop(
                &run,
                rate_fn,
                total,
                pre_allocated_vus,
                max_vus.unwrap_or(pre_allocated_vus),
                on_saturation,
            )
            .await;
        }
    }

    info!(scenario = %run.name, "scenario finished");
}

/// Closed-loop executor: exactly `vus` workers iterate until the deadline.
/// Concurrent iterations never exceed `vus`.
async fn constant_vus(run: &ScenarioRun, vus: u32, duration: Duration) {
    let deadline = Instant::now() + duration;
    let mut workers = JoinSet::new();

    for _ in 0..vus {
        let iteration = run.iteration.clone();
        let ictx = run.ictx.clone();
        let metrics = run.metrics.clone();
        let ctx = run.ctx.clone();
        workers.spawn(async move {
            while Instant::now() < deadline && !ctx.is_cancelled() {
                run_iteration(&iteration, &ictx, &metrics).await;
            }
        });
    }

    tokio::select! {
        _ = sleep_until(deadline) => {}
        _ = run.ctx.cancelled() => {}
    }
    drain(workers, run.config.graceful_stop).await;
}

/// Open-loop executor: emit work items at `rate_fn(elapsed)` per second for
/// `total`, independent of how fast iterations complete.
async fn open_loop(
    run: &ScenarioRun,
    rate_fn: impl Fn(Duration) -> f64,
    total: Duration,
    pre_allocated: u32,
    max: u32,
    on_saturation: SaturationPolicy,
) {
    let slots = Arc::new(WorkerSlots::new(pre_allocated, max));
    let started = Instant::now();
    let mut in_flight = JoinSet::new();
    let mut seq: u64 = 0;

    loop {
        let elapsed = started.elapsed();
        if elapsed >= total || run.ctx.is_cancelled() {
            break;
        }

        let rate = rate_fn(elapsed);
        if rate <= f64::EPSILON {
            // rate is momentarily zero (e.g. a ramp-down tail): re-check soon
            let tick = Duration::from_millis(100).min(total - elapsed);
            tokio::select! {
                _ = sleep(tick) => {}
                _ = run.ctx.cancelled() => break,
            }
            continue;
        }

        let item = WorkItem {
            scenario: run.name.clone(),
            seq,
        };
        seq += 1;

        let permit = match slots.try_claim() {
            Some(permit) => Some(permit),
            None => match on_saturation {
                SaturationPolicy::Drop => {
                    debug!(scenario = %run.name, seq = item.seq, "pool saturated, dropping item");
                    run.metrics.record_dropped(&run.name);
                    None
                }
                SaturationPolicy::Block => tokio::select! {
                    permit = slots.claim() => Some(permit),
                    _ = run.ctx.cancelled() => break,
                },
            },
        };

        if let Some(permit) = permit {
            let iteration = run.iteration.clone();
            let ictx = run.ictx.clone();
            let metrics = run.metrics.clone();
            in_flight.spawn(async move {
                let _permit = permit;
                let _item = item;
                run_iteration(&iteration, &ictx, &metrics).await;
            });
        }

        // reap finished iterations so the set stays small
        while in_flight.try_join_next().is_some() {}

        // pace to the instantaneous target
        let next = Instant::now() + Duration::from_secs_f64(1.0 / rate);
        tokio::select! {
            _ = sleep_until(next) => {}
            _ = run.ctx.cancelled() => break,
        }
    }

    drain(in_flight, run.config.graceful_stop).await;
}

/// Wait out in-flight iterations up to the grace period, then abort the
/// rest. A zero grace abandons them immediately.
async fn drain(mut tasks: JoinSet<()>, graceful_stop: Duration) {
    if !graceful_stop.is_zero() {
        let _ = timeout(graceful_stop, async {
            while tasks.join_next().await.is_some() {}
        })
        .await;
    }
    tasks.abort_all();
    while tasks.join_next().await.is_some() {}
}
