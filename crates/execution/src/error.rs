//! Execution errors.

use stageplan_decision::DecisionError;
use stageplan_order::{Key, OrderError};

/// Result type for execution operations.
pub type Result<T> = std::result::Result<T, ExecutionError>;

/// Failure reported by a single stage.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct StageError {
    message: String,
}

impl StageError {
    /// Create a stage error with a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The error message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Errors that can occur while planning or running stages.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ExecutionError {
    /// The case plan is not a valid order
    #[error(transparent)]
    Order(#[from] OrderError),

    /// Picking the case plan failed
    #[error(transparent)]
    Decision(#[from] DecisionError),

    /// A stage failed
    #[error("Stage {key} failed: {source}")]
    StageFailed {
        /// Key the stage is registered under
        key: Key,
        /// What the stage reported
        source: StageError,
    },

    /// Stages were skipped because a key they depend on failed
    #[error("Stages of {key} skipped: {dependency} failed")]
    DependencyFailed {
        /// Key whose stages were skipped
        key: Key,
        /// Failed dependency
        dependency: Key,
        /// Failure of the dependency
        source: Box<ExecutionError>,
    },

    /// The task running a key could not complete
    #[error("Task for {key} did not complete: {message}")]
    TaskAborted {
        /// Key the task was running
        key: Key,
        /// Runtime message
        message: String,
    },

    /// No operation is registered under the name
    #[error("Unknown operation: {0}")]
    UnknownOperation(String),
}

impl ExecutionError {
    /// The first failure that caused this one.
    pub fn root_cause(&self) -> &ExecutionError {
        match self {
            ExecutionError::DependencyFailed { source, .. } => source.root_cause(),
            other => other,
        }
    }
}
