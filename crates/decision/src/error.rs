//! Errors raised while building and evaluating deciders.

use stageplan_core::Value;
use std::fmt;

/// Result type for decision operations.
pub type Result<T> = std::result::Result<T, DecisionError>;

/// Errors raised by a variable while it is being evaluated.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum VariableError {
    /// The variable's own function failed
    #[error("variable {variable} failed: {message}")]
    Failed {
        /// Failing variable
        variable: String,
        /// What went wrong
        message: String,
    },

    /// A dependency produced a value of the wrong shape
    #[error("variable {variable} expected a {expected} value but got {actual}")]
    TypeMismatch {
        /// Variable that received the value
        variable: String,
        /// Expected shape
        expected: &'static str,
        /// Shape actually received
        actual: &'static str,
    },

    /// A regex pattern could not be compiled
    #[error("invalid pattern /{pattern}/: {message}")]
    InvalidPattern {
        /// Rejected pattern
        pattern: String,
        /// Regex compiler message
        message: String,
    },

    /// A variable evaluated from assumptions tried to read the input
    #[error("unexpected input dependency for variable {variable}")]
    UnexpectedInput {
        /// Variable being evaluated
        variable: String,
    },

    /// A variable evaluated from assumptions read a variable with no assumed value
    #[error("unexpected dependency on {dependency} for {variable}")]
    UnexpectedDependency {
        /// Variable being evaluated
        variable: String,
        /// Dependency without an assumed value
        dependency: String,
    },
}

/// One variable that a single rule requires to have several values.
#[derive(Debug, Clone, PartialEq)]
pub struct Contradiction {
    /// Display name of the variable
    pub variable: String,
    /// All values the rule asked for, in the order they were given
    pub values: Vec<Value>,
}

impl fmt::Display for Contradiction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "variable {} is expected to be both ", self.variable)?;
        for (i, value) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, " and ")?;
            }
            write!(f, "{}", value)?;
        }
        Ok(())
    }
}

fn describe_contradictions(contradictions: &[Contradiction]) -> String {
    let subject = if contradictions.len() > 1 {
        "some variables"
    } else {
        "a variable"
    };
    let details: Vec<String> = contradictions.iter().map(|c| c.to_string()).collect();
    format!(
        "Contradicting conditions are provided for {}: {}",
        subject,
        details.join("; ")
    )
}

/// Errors that can occur while building or running a decider.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DecisionError {
    /// A rule requires one variable to have different values
    #[error("{}", describe_contradictions(.0))]
    ContradictingConditions(Vec<Contradiction>),

    /// A variable failed during evaluation
    #[error(transparent)]
    Variable(#[from] VariableError),

    /// A meta variable could not be computed from the values assumed on a tree path
    #[error("cannot evaluate {variable} from assumed values: {source}")]
    AssumptionViolated {
        /// Meta variable
        variable: String,
        /// Why it could not be evaluated
        #[source]
        source: VariableError,
    },

    /// The compiled tree grew past the configured ceiling
    #[error("decision tree exceeds {limit} nodes")]
    TreeTooLarge {
        /// Configured node ceiling
        limit: usize,
    },

    /// The decision factory could not produce an output
    #[error("decision output failed: {0}")]
    Output(String),

    /// Parameters were requested from a path the expression does not match
    #[error("path {path} doesn't match {expression}")]
    PathMismatch {
        /// Path from the context
        path: String,
        /// Expression the path was matched against
        expression: String,
    },
}
