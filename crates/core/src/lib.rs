//! stageplan core types.
//!
//! This crate defines the small set of value types shared by the decision
//! engine, the dependency order and the plan executors.

#![warn(missing_docs)]

mod id;
mod value;

pub use id::KeyId;
pub use value::Value;
