//! Dependency orders.
//!
//! An [`Order`] keeps values under keys and links between keys, and lists
//! the values so that every link is respected. Orders can also be folded
//! over in dependency order with [`Order::visit`].

#![warn(missing_docs)]

pub mod error;
pub mod key;
pub mod order;
pub mod sequence;

pub use error::{OrderError, Result};
pub use key::{IntoKey, Key};
pub use order::{ItemToken, LinkToken, Order, RegistrationToken};
pub use sequence::{KeyedItemBuilder, SequenceBuilder};
