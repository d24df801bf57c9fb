//! # surge-runner
//!
//! Execution side of the surge harness:
//! - [`Iteration`] - the capability trait test authors implement; built-in
//!   student-API flows ship in [`flows`]
//! - schedulers for the three executor shapes (constant-vus,
//!   constant-arrival-rate, ramping-arrival-rate)
//! - an elastic worker pool with configurable saturation behavior
//! - [`Runner`] - fans scenarios out against one run clock and produces
//!   the final [`surge_metrics::RunReport`]

pub mod flows;
mod http;
pub mod iteration;
pub mod runner;
mod scheduler;
pub mod worker;

pub use flows::{builtin_iterations, student_api_plan, CreateAndUpdateFlow, FetchFlow};
pub use iteration::{Iteration, IterationContext, IterationOutput, IterationRegistry};
pub use runner::Runner;
pub use worker::{WorkItem, WorkerSlots};
