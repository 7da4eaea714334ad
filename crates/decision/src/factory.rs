//! Conversion of chosen items into decider output.

use crate::context::DecisionContext;
use crate::error::Result;

/// Turns the items chosen by a decider into its output.
///
/// The conversion runs in two steps:
///
/// 1. A *decision invariant* is computed from the chosen items only. The
///    tree decider computes it once per leaf and reuses it for every input
///    that ends in the same leaf.
/// 2. The output is produced from the invariant and the live decision
///    context.
///
/// Expensive work that depends only on the item set belongs in step 1.
pub trait DecisionFactory<I, T>: Send + Sync {
    /// Value cached per set of chosen items
    type Invariant: Send + Sync;
    /// Decider output
    type Output;

    /// Compute the decision invariant.
    fn init_invariant(&self, items: &[T]) -> Self::Invariant;

    /// Produce the output for one decision.
    fn generate_output(
        &self,
        invariant: &Self::Invariant,
        context: &dyn DecisionContext<I>,
    ) -> Result<Self::Output>;
}

/// Factory whose output depends on the chosen items only.
///
/// The output is computed once per leaf and cloned for every decision.
pub struct ContextIndependentFactory<F> {
    convert: F,
}

impl<F> ContextIndependentFactory<F> {
    /// Wrap a conversion from chosen items to output.
    pub fn new(convert: F) -> Self {
        Self { convert }
    }
}

impl<I, T, O, F> DecisionFactory<I, T> for ContextIndependentFactory<F>
where
    F: Fn(&[T]) -> O + Send + Sync,
    O: Clone + Send + Sync,
{
    type Invariant = O;
    type Output = O;

    fn init_invariant(&self, items: &[T]) -> O {
        (self.convert)(items)
    }

    fn generate_output(&self, invariant: &O, _context: &dyn DecisionContext<I>) -> Result<O> {
        Ok(invariant.clone())
    }
}
