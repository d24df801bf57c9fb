//! # surge-core
//!
//! Core data model for the surge load-generation harness:
//! - [`RunPlan`] / [`ScenarioConfig`] - declarative traffic plans with a
//!   tagged [`Executor`] enum (constant-vus, constant-arrival-rate,
//!   ramping-arrival-rate)
//! - [`Stage`] sequences and piecewise-linear rate interpolation
//! - [`RunContext`] - the shared run clock and cancellation signal
//! - plan-syntax durations (`"5m"`, `"3m30s"`) and fail-fast validation

pub mod context;
pub mod duration;
pub mod error;
pub mod scenario;

pub use context::RunContext;
pub use error::{Result, SurgeError};
pub use scenario::{
    rate_at, Executor, RunPlan, SaturationPolicy, ScenarioConfig, Stage, DEFAULT_GRACEFUL_STOP,
};
