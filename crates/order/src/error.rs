//! Errors raised by dependency orders.

use crate::key::Key;

/// Result type for order operations.
pub type Result<T> = std::result::Result<T, OrderError>;

/// Errors that can occur while editing or reading an order.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OrderError {
    /// The key source cannot be turned into a key
    #[error("Illegal key source {0:?}")]
    InvalidKey(String),

    /// The value is already attached to the key
    #[error("Value is already registered for key {0}")]
    DuplicateValue(Key),

    /// The item or link was unregistered before
    #[error("{0} is already unregistered")]
    AlreadyRemoved(String),

    /// The order contains a loop through the listed keys
    #[error("Found a loop containing: {}", describe_cycle(.0))]
    CycleDetected(Vec<Key>),
}

fn describe_cycle(keys: &[Key]) -> String {
    keys.iter()
        .map(|k| format!("\"{}\"", k))
        .collect::<Vec<_>>()
        .join(", ")
}
