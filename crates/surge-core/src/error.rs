//! Error types for surge plan validation and run control

use thiserror::Error;

/// Result type alias for surge operations
pub type Result<T> = std::result::Result<T, SurgeError>;

/// Errors that can occur while validating a traffic plan or driving a run
#[derive(Error, Debug, Clone)]
pub enum SurgeError {
    // === Plan validation ===
    /// A duration string could not be parsed ("30s", "5m", "3m30s", ...)
    #[error("Invalid duration {0:?} (expected forms like \"30s\", \"5m\", \"3m30s\")")]
    InvalidDuration(String),

    /// An executor's parameters are inconsistent or degenerate
    #[error("Scenario {scenario:?}: {reason}")]
    InvalidExecutor { scenario: String, reason: String },

    /// A scenario names an iteration function that is not registered
    #[error("Scenario {scenario:?} references unknown iteration function {exec:?}")]
    UnknownIteration { scenario: String, exec: String },

    /// A threshold expression could not be parsed
    #[error("Invalid threshold expression {expr:?}: {reason}")]
    InvalidThreshold { expr: String, reason: String },

    /// The plan contains no scenarios
    #[error("Traffic plan declares no scenarios")]
    EmptyPlan,

    /// Plan file could not be read or decoded
    #[error("Plan file error: {0}")]
    PlanFile(String),

    // === Run control ===
    /// An iteration function reported a failure
    #[error("Iteration failed: {0}")]
    Iteration(String),

    /// The HTTP client could not be constructed
    #[error("HTTP client setup failed: {0}")]
    ClientSetup(String),
}

impl SurgeError {
    /// Whether the error indicates a bad plan rather than a runtime fault
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Self::InvalidDuration(_)
                | Self::InvalidExecutor { .. }
                | Self::UnknownIteration { .. }
                | Self::InvalidThreshold { .. }
                | Self::EmptyPlan
                | Self::PlanFile(_)
        )
    }
}
