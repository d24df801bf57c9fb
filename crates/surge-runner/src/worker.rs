//! Worker pool: bounded, elastically growing execution slots
//!
//! Open-loop schedulers claim a slot per work item. The pool starts at the
//! scenario's pre-allocated size and grows on demand up to `max_vus`; past
//! that the scheduler's saturation policy decides between dropping the item
//! and waiting. [`run_iteration`] is the single crossing point between an
//! iteration and the harness: panics and errors stop here.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tracing::{debug, warn};

use surge_metrics::MetricsAggregator;

use crate::iteration::{Iteration, IterationContext};

/// A scheduled invocation of an iteration function. Created by a scheduler,
/// moved into exactly one worker task, and dropped there.
#[derive(Debug)]
pub struct WorkItem {
    pub scenario: String,
    pub seq: u64,
}

/// Slot pool for one open-loop scenario
pub struct WorkerSlots {
    slots: Arc<Semaphore>,
    allocated: AtomicU32,
    max: u32,
}

impl WorkerSlots {
    pub fn new(pre_allocated: u32, max: u32) -> Self {
        Self {
            slots: Arc::new(Semaphore::new(pre_allocated as usize)),
            allocated: AtomicU32::new(pre_allocated),
            max: max.max(pre_allocated),
        }
    }

    /// Claim a free slot, growing the pool if it is below its cap.
    /// None means the pool is saturated at `max`.
    pub fn try_claim(&self) -> Option<OwnedSemaphorePermit> {
        loop {
            if let Ok(permit) = self.slots.clone().try_acquire_owned() {
                return Some(permit);
            }

            let current = self.allocated.load(Ordering::Acquire);
            if current >= self.max {
                // a permit added by a concurrent grower may still be free
                return self.slots.clone().try_acquire_owned().ok();
            }
            if self
                .allocated
                .compare_exchange(current, current + 1, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                debug!(allocated = current + 1, "growing worker pool");
                self.slots.add_permits(1);
            }
            // a concurrent claimant may take the new permit first; growth
            // is bounded by `max`, so retrying terminates
        }
    }

    /// Wait for a slot (Block saturation policy)
    pub async fn claim(&self) -> OwnedSemaphorePermit {
        if let Some(permit) = self.try_claim() {
            return permit;
        }
        self.slots
            .clone()
            .acquire_owned()
            .await
            .expect("worker slot semaphore closed")
    }

    /// Current pool size, pre-allocated plus growth
    pub fn allocated(&self) -> u32 {
        self.allocated.load(Ordering::Acquire)
    }
}

/// Execute one iteration to completion and feed its outcome into the
/// aggregator. Nothing an iteration does - error or panic - escapes.
pub(crate) async fn run_iteration(
    iteration: &Arc<dyn Iteration>,
    ctx: &IterationContext,
    metrics: &Arc<MetricsAggregator>,
) {
    let started = Instant::now();
    match AssertUnwindSafe(iteration.run(ctx)).catch_unwind().await {
        Ok(Ok(output)) => {
            for sample in &output.samples {
                metrics.record_request(sample);
            }
            for check in &output.checks {
                metrics.record_check(check);
            }
            metrics.record_iteration(&ctx.scenario, started.elapsed(), true);
        }
        Ok(Err(e)) => {
            debug!(scenario = %ctx.scenario, "iteration failed: {e}");
            metrics.record_iteration(&ctx.scenario, started.elapsed(), false);
        }
        Err(_) => {
            warn!(scenario = %ctx.scenario, "iteration panicked");
            metrics.record_iteration(&ctx.scenario, started.elapsed(), false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iteration::IterationOutput;
    use async_trait::async_trait;
    use std::collections::BTreeMap;

    #[test]
    fn test_slots_grow_to_max_then_saturate() {
        let pool = WorkerSlots::new(2, 4);

        let a = pool.try_claim().unwrap();
        let b = pool.try_claim().unwrap();
        assert_eq!(pool.allocated(), 2);

        // next claims grow the pool
        let c = pool.try_claim().unwrap();
        let d = pool.try_claim().unwrap();
        assert_eq!(pool.allocated(), 4);

        // at max: saturated
        assert!(pool.try_claim().is_none());

        drop(a);
        assert!(pool.try_claim().is_some());
        drop(b);
        drop(c);
        drop(d);
    }

    #[test]
    fn test_max_below_pre_allocated_is_clamped() {
        let pool = WorkerSlots::new(5, 1);
        let permits: Vec<_> = (0..5).map(|_| pool.try_claim().unwrap()).collect();
        assert!(pool.try_claim().is_none());
        assert_eq!(pool.allocated(), 5);
        drop(permits);
    }

    #[test]
    fn test_concurrent_claims_fill_the_pool_without_spurious_drops() {
        // every claimant must get a slot while the pool is below max, even
        // when another thread takes the permit it just added
        let pool = Arc::new(WorkerSlots::new(1, 64));
        let handles: Vec<_> = (0..64)
            .map(|_| {
                let pool = pool.clone();
                std::thread::spawn(move || pool.try_claim())
            })
            .collect();

        let permits: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(
            permits.iter().all(|p| p.is_some()),
            "a claim failed while the pool had spare capacity"
        );
        assert_eq!(pool.allocated(), 64);
    }

    #[tokio::test]
    async fn test_blocking_claim_waits_for_release() {
        let pool = Arc::new(WorkerSlots::new(1, 1));
        let held = pool.try_claim().unwrap();

        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move {
                let _permit = pool.claim().await;
            })
        };

        drop(held);
        waiter.await.unwrap();
    }

    struct PanickyIteration;

    #[async_trait]
    impl Iteration for PanickyIteration {
        fn name(&self) -> &str {
            "panicky"
        }

        async fn run(&self, _ctx: &IterationContext) -> surge_core::Result<IterationOutput> {
            panic!("iteration blew up");
        }
    }

    #[tokio::test]
    async fn test_panic_stays_inside_pool_boundary() {
        let iteration: Arc<dyn Iteration> = Arc::new(PanickyIteration);
        let metrics = Arc::new(MetricsAggregator::new());
        let ctx = IterationContext {
            scenario: "s".to_string(),
            client: reqwest::Client::new(),
            base_url: "http://localhost:1".to_string(),
            tags: BTreeMap::new(),
            discard_response_bodies: false,
        };

        run_iteration(&iteration, &ctx, &metrics).await;

        let snap = metrics.snapshot();
        assert_eq!(snap.scenarios["s"].iterations, 1);
        assert_eq!(snap.scenarios["s"].failed_iterations, 1);
    }
}
