//! Order keys and key parsing.

use crate::error::{OrderError, Result};
use regex::Regex;
use stageplan_core::KeyId;
use std::fmt;
use std::sync::OnceLock;

/// Key of a node in an [`Order`](crate::Order).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Key {
    /// Fresh key generated for values registered without one
    Unique(KeyId),
    /// Named key
    Constant(String),
    /// Runs before the wrapped key
    Pre(Box<Key>),
    /// Runs after the wrapped key
    Post(Box<Key>),
}

fn pre_key_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^pre[-: ](.+)$").expect("pre key pattern is valid"))
}

fn post_key_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^post[-: ](.+)$").expect("post key pattern is valid"))
}

impl Key {
    /// Generate a fresh unique key.
    pub fn unique() -> Self {
        Key::Unique(KeyId::new())
    }

    /// A constant key.
    pub fn constant(name: impl Into<String>) -> Self {
        Key::Constant(name.into())
    }

    /// The key running right before this one.
    pub fn pre(self) -> Self {
        Key::Pre(Box::new(self))
    }

    /// The key running right after this one.
    pub fn post(self) -> Self {
        Key::Post(Box::new(self))
    }

    /// Parse a string key.
    ///
    /// `pre:X` / `post:X` (also with `-` or a space as separator, any case)
    /// denote keys running before/after `X`; prefixes nest. Anything else
    /// non-blank is a constant key.
    ///
    /// The separator is required: `prebar` is the constant key `prebar`, not
    /// a key running before `bar`.
    pub fn parse(source: &str) -> Result<Self> {
        if source.trim().is_empty() {
            return Err(OrderError::InvalidKey(source.to_string()));
        }

        if let Some(captures) = pre_key_re().captures(source) {
            return Ok(Key::parse(&captures[1])?.pre());
        }

        if let Some(captures) = post_key_re().captures(source) {
            return Ok(Key::parse(&captures[1])?.post());
        }

        Ok(Key::Constant(source.to_string()))
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Unique(id) => write!(f, "#{}", id),
            Key::Constant(name) => write!(f, "{}", name),
            Key::Pre(key) => write!(f, "pre:{}", key),
            Key::Post(key) => write!(f, "post:{}", key),
        }
    }
}

/// Anything an order can turn into a [`Key`].
pub trait IntoKey {
    /// Convert into a key.
    fn into_key(self) -> Result<Key>;
}

impl IntoKey for Key {
    fn into_key(self) -> Result<Key> {
        Ok(self)
    }
}

impl IntoKey for &Key {
    fn into_key(self) -> Result<Key> {
        Ok(self.clone())
    }
}

impl IntoKey for &str {
    fn into_key(self) -> Result<Key> {
        Key::parse(self)
    }
}

impl IntoKey for String {
    fn into_key(self) -> Result<Key> {
        Key::parse(&self)
    }
}

impl IntoKey for &String {
    fn into_key(self) -> Result<Key> {
        Key::parse(self)
    }
}
