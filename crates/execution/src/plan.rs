//! Operation plans: deciders choosing an order of stages.

use stageplan_decision::{DecisionContext, DecisionError, DecisionFactory, TreeDecider};
use stageplan_order::{Order, OrderError, SequenceBuilder};
use std::sync::Arc;
use tracing::debug;

/// Edits the order of stages for the inputs a rule applies to.
pub type PlanPatch<S> = Arc<dyn Fn(&mut Order<S>) -> Result<(), OrderError> + Send + Sync>;

/// Validated order of stages chosen for one input.
pub type CasePlan<S> = Arc<Order<S>>;

/// Decider producing a case plan for every context.
pub type OperationPlan<C, S> = TreeDecider<C, PlanPatch<S>, PlanFactory>;

/// Wrap a function editing an order into a plan patch.
pub fn patch<S, F>(edit: F) -> PlanPatch<S>
where
    F: Fn(&mut Order<S>) -> Result<(), OrderError> + Send + Sync + 'static,
{
    Arc::new(edit)
}

/// Plan patch adding a sequence of stages.
pub fn sequence_patch<S, F>(block: F) -> PlanPatch<S>
where
    S: PartialEq + 'static,
    F: Fn(&mut SequenceBuilder<'_, S>) -> Result<(), OrderError> + Send + Sync + 'static,
{
    Arc::new(move |order: &mut Order<S>| {
        let mut sequence = order.sequence();
        block(&mut sequence)
    })
}

/// Builds the case plan for every decision tree leaf.
///
/// Patches are applied to a fresh order in the order the decider collected
/// them, and the result is validated once. A leaf whose patches fail or
/// produce a loop fails every decision that ends there.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlanFactory;

impl<C, S> DecisionFactory<C, PlanPatch<S>> for PlanFactory
where
    S: Send + Sync + 'static,
{
    type Invariant = Result<CasePlan<S>, OrderError>;
    type Output = CasePlan<S>;

    fn init_invariant(&self, patches: &[PlanPatch<S>]) -> Self::Invariant {
        let mut order = Order::new();
        for patch in patches {
            patch(&mut order)?;
        }
        order.validate()?;

        debug!(patches = patches.len(), stages = order.len(), "Built case plan");
        Ok(Arc::new(order))
    }

    fn generate_output(
        &self,
        invariant: &Self::Invariant,
        _context: &dyn DecisionContext<C>,
    ) -> stageplan_decision::Result<CasePlan<S>> {
        invariant
            .clone()
            .map_err(|e| DecisionError::Output(e.to_string()))
    }
}
