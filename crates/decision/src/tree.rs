//! Compiled decision trees.

use crate::context::{DecisionContext, LiveContext};
use crate::error::Result;
use crate::factory::DecisionFactory;
use crate::variable::Variable;
use stageplan_core::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

/// A function from input to output built from a set of rules.
///
/// Think of it as a `switch` over several input variables that can select
/// several results at once.
pub trait Decider<I>: Send + Sync {
    /// Decider output
    type Output;

    /// Decide for `input`.
    ///
    /// Fails only when evaluating a variable (or generating the output)
    /// fails; an empty item set is a valid decision.
    fn decide(&self, input: &I) -> Result<Self::Output>;
}

pub(crate) struct TreeNode<I, T, V> {
    /// `None` for leaves
    pub(crate) variable: Option<Variable<I>>,
    pub(crate) items: Vec<T>,
    pub(crate) children: Vec<(Value, usize)>,
    pub(crate) child_index: HashMap<Value, usize>,
    pub(crate) default_child: Option<usize>,
    pub(crate) parent: Option<usize>,
    pub(crate) invariant: OnceLock<V>,
}

impl<I, T, V> TreeNode<I, T, V> {
    pub(crate) fn new(parent: Option<usize>, variable: Option<Variable<I>>, items: Vec<T>) -> Self {
        Self {
            variable,
            items,
            children: Vec::new(),
            child_index: HashMap::new(),
            default_child: None,
            parent,
            invariant: OnceLock::new(),
        }
    }

    pub(crate) fn add_child(&mut self, value: Value, child: usize) {
        self.child_index.insert(value.clone(), child);
        self.children.push((value, child));
    }
}

/// Decider walking a tree compiled by
/// [`DeciderBuilder::build`](crate::DeciderBuilder::build).
///
/// Nodes live in an arena and refer to each other by index.
pub struct TreeDecider<I, T, F: DecisionFactory<I, T>> {
    pub(crate) nodes: Vec<TreeNode<I, T, F::Invariant>>,
    pub(crate) factory: F,
}

impl<I, T: Clone, F: DecisionFactory<I, T>> TreeDecider<I, T, F> {
    const ROOT: usize = 0;

    /// Number of nodes in the compiled tree.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Depth of the compiled tree (a single leaf has depth 1).
    pub fn depth(&self) -> usize {
        (0..self.nodes.len())
            .map(|mut index| {
                let mut depth = 1;
                while let Some(parent) = self.nodes[index].parent {
                    depth += 1;
                    index = parent;
                }
                depth
            })
            .max()
            .unwrap_or(0)
    }

    /// Invariant for the items accumulated from the root down to `index`.
    fn invariant(&self, index: usize) -> &F::Invariant {
        self.nodes[index].invariant.get_or_init(|| {
            let mut path = Vec::new();
            let mut current = Some(index);
            while let Some(i) = current {
                path.push(i);
                current = self.nodes[i].parent;
            }

            let items: Vec<T> = path
                .iter()
                .rev()
                .flat_map(|&i| self.nodes[i].items.iter().cloned())
                .collect();

            tracing::debug!(node = index, items = items.len(), "Computing decision invariant");
            self.factory.init_invariant(&items)
        })
    }

    fn print(&self, f: &mut fmt::Formatter<'_>, index: usize, offset: &str) -> fmt::Result
    where
        T: fmt::Debug,
    {
        let node = &self.nodes[index];
        match &node.variable {
            Some(variable) => writeln!(f, "{}* by {}", offset, variable)?,
            None => writeln!(f, "{}* leaf", offset)?,
        }
        for item in &node.items {
            writeln!(f, "{}- {:?}", offset, item)?;
        }
        let nested = format!("{}\t", offset);
        for (value, child) in &node.children {
            writeln!(f, "{}+ when {}", offset, value)?;
            self.print(f, *child, &nested)?;
        }
        if let Some(child) = node.default_child {
            writeln!(f, "{}+ else", offset)?;
            self.print(f, child, &nested)?;
        }
        Ok(())
    }
}

impl<I, T, F> Decider<I> for TreeDecider<I, T, F>
where
    T: Clone + Send + Sync,
    F: DecisionFactory<I, T>,
{
    type Output = F::Output;

    fn decide(&self, input: &I) -> Result<F::Output> {
        let context = LiveContext::new(input);
        let mut current = Self::ROOT;

        loop {
            let node = &self.nodes[current];
            let Some(variable) = &node.variable else {
                break;
            };

            let value = context.get(variable)?;
            match node.child_index.get(&value).copied().or(node.default_child) {
                Some(next) => current = next,
                None => break,
            }
        }

        let invariant = self.invariant(current);
        self.factory.generate_output(invariant, &context)
    }
}

impl<I, T, F> fmt::Display for TreeDecider<I, T, F>
where
    T: Clone + fmt::Debug,
    F: DecisionFactory<I, T>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.print(f, Self::ROOT, "")
    }
}
