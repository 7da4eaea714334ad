//! Keyed dependency order.
//!
//! Values are attached to keys, and links between keys say which key runs
//! first. A `pre:X` key always runs before `X` and a `post:X` key always
//! runs after it; these links are created together with the node.

use crate::error::{OrderError, Result};
use crate::key::{IntoKey, Key};
use crate::sequence::{KeyedItemBuilder, SequenceBuilder};
use std::collections::HashMap;
use std::sync::OnceLock;
use tracing::debug;

/// Handle to a value registered in an [`Order`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ItemToken {
    id: usize,
    key: Key,
}

impl ItemToken {
    /// Key the value was registered under.
    pub fn key(&self) -> &Key {
        &self.key
    }
}

/// Handle to a link created in an [`Order`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LinkToken {
    id: usize,
    from: Key,
    to: Key,
}

impl LinkToken {
    /// Key that runs first.
    pub fn from(&self) -> &Key {
        &self.from
    }

    /// Key that runs after [`from`](Self::from).
    pub fn to(&self) -> &Key {
        &self.to
    }
}

/// Anything that can be unregistered from an order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RegistrationToken {
    /// A registered value
    Item(ItemToken),
    /// A link between two keys
    Link(LinkToken),
}

impl From<ItemToken> for RegistrationToken {
    fn from(token: ItemToken) -> Self {
        RegistrationToken::Item(token)
    }
}

impl From<LinkToken> for RegistrationToken {
    fn from(token: LinkToken) -> Self {
        RegistrationToken::Link(token)
    }
}

#[derive(Debug, Clone)]
struct Node<V> {
    key: Key,
    values: Vec<V>,
    item_ids: Vec<usize>,
    inbound: Vec<usize>,
}

#[derive(Debug, Clone, Copy)]
struct Link {
    from: usize,
    to: usize,
}

#[derive(Clone, Copy, PartialEq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

struct Frame {
    node: usize,
    dependencies: Vec<usize>,
    next: usize,
}

/// Keyed directed graph of values.
///
/// Tokens are only meaningful for the order that issued them.
#[derive(Debug, Clone)]
pub struct Order<V> {
    nodes: Vec<Node<V>>,
    index: HashMap<Key, usize>,
    links: Vec<Option<Link>>,
    items: Vec<Option<usize>>,
    linear: OnceLock<Vec<usize>>,
}

impl<V> Order<V> {
    /// Create an empty order.
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            index: HashMap::new(),
            links: Vec::new(),
            items: Vec::new(),
            linear: OnceLock::new(),
        }
    }

    /// Turn a key source into a key.
    pub fn parse_key(&self, source: impl IntoKey) -> Result<Key> {
        source.into_key()
    }

    /// Attach `value` to `key`, creating the node when needed.
    pub fn register(&mut self, key: impl IntoKey, value: V) -> Result<ItemToken>
    where
        V: PartialEq,
    {
        let key = key.into_key()?;
        let node = self.node_for(&key);

        if self.nodes[node].values.contains(&value) {
            return Err(OrderError::DuplicateValue(key));
        }

        let id = self.items.len();
        self.items.push(Some(node));
        self.nodes[node].values.push(value);
        self.nodes[node].item_ids.push(id);
        self.invalidate();

        Ok(ItemToken { id, key })
    }

    /// Attach `value` to a freshly generated key.
    pub fn register_unique(&mut self, value: V) -> ItemToken {
        let key = Key::unique();
        let node = self.node_for(&key);
        let id = self.items.len();
        self.items.push(Some(node));
        self.nodes[node].values.push(value);
        self.nodes[node].item_ids.push(id);
        self.invalidate();

        ItemToken { id, key }
    }

    /// Require `from` to run before `to`.
    pub fn link(&mut self, from: &Key, to: &Key) -> LinkToken {
        let from_node = self.node_for(from);
        let to_node = self.node_for(to);
        let id = self.add_link(from_node, to_node);

        LinkToken {
            id,
            from: from.clone(),
            to: to.clone(),
        }
    }

    /// Make sure a node exists for `key` without attaching anything.
    pub fn expect(&mut self, key: &Key) {
        self.node_for(key);
    }

    /// Remove a previously registered value or link.
    pub fn unregister(&mut self, token: impl Into<RegistrationToken>) -> Result<()> {
        match token.into() {
            RegistrationToken::Item(token) => self.unregister_item(&token),
            RegistrationToken::Link(token) => self.unlink(&token),
        }
    }

    fn unregister_item(&mut self, token: &ItemToken) -> Result<()> {
        let node = self
            .items
            .get_mut(token.id)
            .and_then(Option::take)
            .ok_or_else(|| OrderError::AlreadyRemoved(format!("Item under {}", token.key)))?;

        let node = &mut self.nodes[node];
        if let Some(position) = node.item_ids.iter().position(|&id| id == token.id) {
            node.item_ids.remove(position);
            node.values.remove(position);
        }
        self.invalidate();

        Ok(())
    }

    fn unlink(&mut self, token: &LinkToken) -> Result<()> {
        let link = self
            .links
            .get_mut(token.id)
            .and_then(Option::take)
            .ok_or_else(|| {
                OrderError::AlreadyRemoved(format!("Link from {} to {}", token.from, token.to))
            })?;

        self.nodes[link.to].inbound.retain(|&id| id != token.id);
        self.invalidate();

        Ok(())
    }

    /// Register `value` under a string key.
    pub fn put(&mut self, key: impl IntoKey, value: V) -> Result<ItemToken>
    where
        V: PartialEq,
    {
        self.register(key, value)
    }

    /// Link two keys given as sources.
    pub fn connect(&mut self, from: impl IntoKey, to: impl IntoKey) -> Result<LinkToken> {
        let from = from.into_key()?;
        let to = to.into_key()?;
        Ok(self.link(&from, &to))
    }

    /// Start describing a value registered under `key` together with its links.
    pub fn item(&mut self, key: impl IntoKey) -> Result<KeyedItemBuilder<'_, V>>
    where
        V: PartialEq,
    {
        let key = key.into_key()?;
        Ok(KeyedItemBuilder::new(self, key))
    }

    /// Start a sequence of values running one after another.
    pub fn sequence(&mut self) -> SequenceBuilder<'_, V>
    where
        V: PartialEq,
    {
        SequenceBuilder::new(self)
    }

    /// Check that the order has no loops.
    pub fn validate(&self) -> Result<()> {
        self.linearize().map(|_| ())
    }

    /// All values in an order satisfying every link.
    pub fn to_linear_list(&self) -> Result<Vec<V>>
    where
        V: Clone,
    {
        Ok(self
            .linear_entries()?
            .into_iter()
            .flat_map(|(_, values)| values.iter().cloned())
            .collect())
    }

    /// Keys with their values, in an order satisfying every link.
    pub fn linear_entries(&self) -> Result<Vec<(&Key, &[V])>> {
        let order = self.linearize()?;
        Ok(order
            .iter()
            .map(|&node| (&self.nodes[node].key, self.nodes[node].values.as_slice()))
            .collect())
    }

    /// Fold over the nodes in dependency order.
    ///
    /// `fold` receives each key, its values and the results computed for the
    /// distinct keys it depends on. Results of keys nothing depends on are
    /// returned.
    pub fn visit<T, F>(&self, mut fold: F) -> Result<Vec<T>>
    where
        T: Clone,
        F: FnMut(&Key, &[V], Vec<T>) -> T,
    {
        let order = self.linearize()?;
        let mut results: Vec<Option<T>> = vec![None; self.nodes.len()];

        for &node in order {
            let dependencies = self
                .dependencies_of(node)
                .into_iter()
                .filter_map(|dep| results[dep].clone())
                .collect();
            let node_ref = &self.nodes[node];
            results[node] = Some(fold(&node_ref.key, &node_ref.values, dependencies));
        }

        let dependents = self.has_dependents();
        Ok(results
            .into_iter()
            .enumerate()
            .filter(|(node, _)| !dependents[*node])
            .filter_map(|(_, result)| result)
            .collect())
    }

    /// Keys of all nodes, in creation order.
    pub fn keys(&self) -> impl Iterator<Item = &Key> {
        self.nodes.iter().map(|n| &n.key)
    }

    /// Whether a node exists for `key`.
    pub fn contains_key(&self, key: &Key) -> bool {
        self.index.contains_key(key)
    }

    /// Values attached to `key`.
    pub fn values(&self, key: &Key) -> &[V] {
        self.index
            .get(key)
            .map(|&node| self.nodes[node].values.as_slice())
            .unwrap_or(&[])
    }

    /// Keys that `key` directly depends on.
    pub fn dependencies(&self, key: &Key) -> Vec<&Key> {
        self.index
            .get(key)
            .map(|&node| {
                self.dependencies_of(node)
                    .into_iter()
                    .map(|dep| &self.nodes[dep].key)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of registered values.
    pub fn len(&self) -> usize {
        self.nodes.iter().map(|n| n.values.len()).sum()
    }

    /// Whether no value is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn node_for(&mut self, key: &Key) -> usize {
        if let Some(&node) = self.index.get(key) {
            return node;
        }

        let node = self.nodes.len();
        self.nodes.push(Node {
            key: key.clone(),
            values: Vec::new(),
            item_ids: Vec::new(),
            inbound: Vec::new(),
        });
        self.index.insert(key.clone(), node);
        self.invalidate();

        match key {
            Key::Pre(base) => {
                let base = self.node_for(base);
                self.add_link(node, base);
            }
            Key::Post(base) => {
                let base = self.node_for(base);
                self.add_link(base, node);
            }
            Key::Unique(_) | Key::Constant(_) => {}
        }

        node
    }

    fn add_link(&mut self, from: usize, to: usize) -> usize {
        let id = self.links.len();
        self.links.push(Some(Link { from, to }));
        self.nodes[to].inbound.push(id);
        self.invalidate();
        id
    }

    fn dependencies_of(&self, node: usize) -> Vec<usize> {
        let mut deps: Vec<usize> = Vec::new();
        for &link in &self.nodes[node].inbound {
            if let Some(link) = self.links[link] {
                if !deps.contains(&link.from) {
                    deps.push(link.from);
                }
            }
        }
        deps
    }

    fn has_dependents(&self) -> Vec<bool> {
        let mut dependents = vec![false; self.nodes.len()];
        for link in self.links.iter().flatten() {
            dependents[link.from] = true;
        }
        dependents
    }

    fn invalidate(&mut self) {
        self.linear = OnceLock::new();
    }

    fn linearize(&self) -> Result<&[usize]> {
        if let Some(order) = self.linear.get() {
            return Ok(order.as_slice());
        }

        let mut marks = vec![Mark::Unvisited; self.nodes.len()];
        let mut order = Vec::with_capacity(self.nodes.len());

        for node in 0..self.nodes.len() {
            if let Err(cycle) = self.place(node, &mut marks, &mut order) {
                debug!(cycle = ?cycle, "Order contains a loop");
                return Err(OrderError::CycleDetected(cycle));
            }
        }

        debug!(nodes = order.len(), "Linearized order");
        Ok(self.linear.get_or_init(|| order).as_slice())
    }

    /// Depth-first placement of `root` and everything it depends on.
    ///
    /// On a loop, returns its keys from the innermost node back to the one
    /// that closes it.
    fn place(
        &self,
        root: usize,
        marks: &mut [Mark],
        order: &mut Vec<usize>,
    ) -> std::result::Result<(), Vec<Key>> {
        if marks[root] != Mark::Unvisited {
            return Ok(());
        }

        marks[root] = Mark::InProgress;
        let mut stack = vec![Frame {
            node: root,
            dependencies: self.dependencies_of(root),
            next: 0,
        }];

        while let Some(frame) = stack.last_mut() {
            let Some(&dep) = frame.dependencies.get(frame.next) else {
                marks[frame.node] = Mark::Done;
                order.push(frame.node);
                stack.pop();
                continue;
            };
            frame.next += 1;

            match marks[dep] {
                Mark::Done => {}
                Mark::InProgress => {
                    let mut keys = Vec::new();
                    for frame in stack.iter().rev() {
                        keys.push(self.nodes[frame.node].key.clone());
                        if frame.node == dep {
                            break;
                        }
                    }
                    return Err(keys);
                }
                Mark::Unvisited => {
                    marks[dep] = Mark::InProgress;
                    stack.push(Frame {
                        node: dep,
                        dependencies: self.dependencies_of(dep),
                        next: 0,
                    });
                }
            }
        }

        Ok(())
    }
}

impl<V> Default for Order<V> {
    fn default() -> Self {
        Self::new()
    }
}
