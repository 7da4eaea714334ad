//! Builders that describe orders as nested sequences.

use crate::error::Result;
use crate::key::{IntoKey, Key};
use crate::order::{Order, RegistrationToken};

#[derive(Clone, Copy, PartialEq)]
enum Mode {
    Sequential,
    Parallel,
}

/// Registers values so that each runs after the previous step.
///
/// Steps of a [`par`](Self::par) block all start after the same keys, and
/// whatever follows the block runs after every one of them. Steps of an
/// [`independently`](Self::independently) block start from nothing and do
/// not hold back later steps.
pub struct SequenceBuilder<'o, V> {
    order: &'o mut Order<V>,
    mode: Mode,
    start: Vec<Key>,
    frontier: Vec<Key>,
    tokens: Vec<RegistrationToken>,
}

impl<'o, V: PartialEq> SequenceBuilder<'o, V> {
    /// Start an empty sequence in `order`.
    pub fn new(order: &'o mut Order<V>) -> Self {
        Self::starting_after(order, Vec::new())
    }

    /// Start a sequence whose first step runs after `keys`.
    pub fn starting_after(order: &'o mut Order<V>, keys: Vec<Key>) -> Self {
        Self {
            order,
            mode: Mode::Sequential,
            start: keys.clone(),
            frontier: keys,
            tokens: Vec::new(),
        }
    }

    /// Add a value under a fresh key.
    pub fn add(&mut self, value: V) -> Result<&mut Self> {
        self.add_keyed(Key::unique(), value)
    }

    /// Add a value under `key`.
    pub fn add_keyed(&mut self, key: impl IntoKey, value: V) -> Result<&mut Self> {
        let key = key.into_key()?;
        let token = self.order.register(key.clone(), value)?;
        self.tokens.push(token.into());
        self.step_to(key);
        Ok(self)
    }

    /// Add a step that waits for `key` without registering a value.
    pub fn expect(&mut self, key: impl IntoKey) -> Result<&mut Self> {
        let key = key.into_key()?;
        self.order.expect(&key);
        self.step_to(key);
        Ok(self)
    }

    /// Nested sequential block.
    pub fn seq<F>(&mut self, block: F) -> Result<&mut Self>
    where
        F: FnOnce(&mut SequenceBuilder<'_, V>) -> Result<()>,
    {
        let start = self.predecessors();
        let ends = self.nested(Mode::Sequential, start, block)?;
        self.advance(ends);
        Ok(self)
    }

    /// Nested block whose steps run side by side.
    pub fn par<F>(&mut self, block: F) -> Result<&mut Self>
    where
        F: FnOnce(&mut SequenceBuilder<'_, V>) -> Result<()>,
    {
        let start = self.predecessors();
        let ends = self.nested(Mode::Parallel, start, block)?;
        self.advance(ends);
        Ok(self)
    }

    /// Nested sequential block detached from the surrounding steps.
    pub fn independently<F>(&mut self, block: F) -> Result<&mut Self>
    where
        F: FnOnce(&mut SequenceBuilder<'_, V>) -> Result<()>,
    {
        self.nested(Mode::Sequential, Vec::new(), block)?;
        Ok(self)
    }

    /// Keys that whatever follows this builder has to run after.
    pub fn ends(&self) -> Vec<Key> {
        match self.mode {
            Mode::Parallel if self.frontier.is_empty() => self.start.clone(),
            _ => self.frontier.clone(),
        }
    }

    /// Everything registered so far, links included.
    pub fn finish(self) -> Vec<RegistrationToken> {
        self.tokens
    }

    fn nested<F>(&mut self, mode: Mode, start: Vec<Key>, block: F) -> Result<Vec<Key>>
    where
        F: FnOnce(&mut SequenceBuilder<'_, V>) -> Result<()>,
    {
        let mut child = SequenceBuilder {
            order: &mut *self.order,
            mode,
            start: start.clone(),
            frontier: if mode == Mode::Sequential { start } else { Vec::new() },
            tokens: Vec::new(),
        };

        let outcome = block(&mut child);
        let ends = child.ends();
        self.tokens.append(&mut child.tokens);
        outcome?;

        Ok(ends)
    }

    fn predecessors(&self) -> Vec<Key> {
        match self.mode {
            Mode::Sequential => self.frontier.clone(),
            Mode::Parallel => self.start.clone(),
        }
    }

    fn step_to(&mut self, key: Key) {
        for predecessor in self.predecessors() {
            let token = self.order.link(&predecessor, &key);
            self.tokens.push(token.into());
        }
        self.advance(vec![key]);
    }

    fn advance(&mut self, ends: Vec<Key>) {
        match self.mode {
            Mode::Sequential => self.frontier = ends,
            Mode::Parallel => {
                for key in ends {
                    if !self.frontier.contains(&key) {
                        self.frontier.push(key);
                    }
                }
            }
        }
    }
}

/// Registers one value under a key together with links to other keys.
pub struct KeyedItemBuilder<'o, V> {
    order: &'o mut Order<V>,
    key: Key,
    tokens: Vec<RegistrationToken>,
}

impl<'o, V: PartialEq> KeyedItemBuilder<'o, V> {
    pub(crate) fn new(order: &'o mut Order<V>, key: Key) -> Self {
        Self {
            order,
            key,
            tokens: Vec::new(),
        }
    }

    /// Run before `key`.
    pub fn before(mut self, key: impl IntoKey) -> Result<Self> {
        let key = key.into_key()?;
        let token = self.order.link(&self.key, &key);
        self.tokens.push(token.into());
        Ok(self)
    }

    /// Run after `key`.
    pub fn after(mut self, key: impl IntoKey) -> Result<Self> {
        let key = key.into_key()?;
        let token = self.order.link(&key, &self.key);
        self.tokens.push(token.into());
        Ok(self)
    }

    /// Register the value, returning tokens for it and its links.
    pub fn exec(mut self, value: V) -> Result<Vec<RegistrationToken>> {
        let token = self.order.register(self.key.clone(), value)?;
        self.tokens.push(token.into());
        Ok(self.tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear<F>(block: F) -> Vec<&'static str>
    where
        F: FnOnce(&mut SequenceBuilder<'_, &'static str>) -> Result<()>,
    {
        let mut order = Order::new();
        let mut builder = order.sequence();
        block(&mut builder).unwrap();
        order.to_linear_list().unwrap()
    }

    #[test]
    fn test_sequential_items() {
        let list = linear(|s| {
            s.add("foo")?.add_keyed("kBar", "bar")?.seq(|s| {
                s.add("baz")?.add("buz")?;
                Ok(())
            })?;
            Ok(())
        });

        assert_eq!(list, vec!["foo", "bar", "baz", "buz"]);
    }

    #[test]
    fn test_parallel_blocks() {
        let list = linear(|s| {
            s.add("foo")?;
            s.par(|p| {
                p.seq(|s| {
                    s.expect("kbar")?.add("postbar")?;
                    Ok(())
                })?;
                p.seq(|s| {
                    s.add("prebar")?.add_keyed("kbar", "bar")?;
                    Ok(())
                })?;
                Ok(())
            })?;
            s.add("baz")?;
            Ok(())
        });

        assert_eq!(list, vec!["foo", "prebar", "bar", "postbar", "baz"]);
    }

    #[test]
    fn test_independent_subsequences() {
        let list = linear(|s| {
            s.add_keyed("kbar", "bar")?;
            s.independently(|s| {
                s.add("foo")?.expect("kbar")?;
                Ok(())
            })?;
            s.add("baz")?;
            Ok(())
        });

        assert_eq!(list, vec!["foo", "bar", "baz"]);
    }

    #[test]
    fn test_empty_par_keeps_frontier() {
        let list = linear(|s| {
            s.add("a")?;
            s.par(|_| Ok(()))?;
            s.add("b")?;
            Ok(())
        });

        assert_eq!(list, vec!["a", "b"]);
    }

    #[test]
    fn test_par_steps_share_start() {
        let mut order = Order::new();
        let mut builder = order.sequence();
        builder.add_keyed("a", "a").unwrap();
        builder
            .par(|p| {
                p.add_keyed("b", "b")?.add_keyed("c", "c")?;
                Ok(())
            })
            .unwrap();
        builder.add_keyed("d", "d").unwrap();

        let d = Key::constant("d");
        let mut deps: Vec<String> = order.dependencies(&d).iter().map(|k| k.to_string()).collect();
        deps.sort();
        assert_eq!(deps, vec!["b", "c"]);
        assert_eq!(
            order.dependencies(&Key::constant("c")),
            vec![&Key::constant("a")]
        );
    }

    #[test]
    fn test_tokens_undo_the_sequence() {
        let mut order = Order::new();
        order.put("keep", "keep").unwrap();

        let mut builder = order.sequence();
        builder.add("x").unwrap().add("y").unwrap();
        let tokens = builder.finish();
        assert_eq!(tokens.len(), 3);

        for token in tokens {
            order.unregister(token).unwrap();
        }
        assert_eq!(order.to_linear_list().unwrap(), vec!["keep"]);
    }

    #[test]
    fn test_failing_block_reports_error() {
        let mut order = Order::new();
        let mut builder = order.sequence();
        let result = builder.seq(|s| {
            s.add_keyed("k", "v")?.add_keyed("k", "v")?;
            Ok(())
        });

        assert!(result.is_err());
    }
}
