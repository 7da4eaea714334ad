//! Plan executor interface.

use crate::error::Result;
use crate::plan::CasePlan;
use async_trait::async_trait;
use stageplan_decision::Decider;
use stageplan_order::Order;
use std::sync::Arc;

/// Merges the contexts produced by two branches that ran side by side.
pub type Reducer<C> = Arc<dyn Fn(C, C) -> C + Send + Sync>;

/// Runs the stages of a plan against a context.
#[async_trait]
pub trait PlanExecutor<C, S>: Send + Sync
where
    C: Send + 'static,
    S: Send + Sync + 'static,
{
    /// Run every stage of `order` and return the resulting context.
    async fn execute_case(&self, order: &Order<S>, context: C) -> Result<C>;

    /// Pick the case plan for `context` and run it.
    async fn execute(
        &self,
        plan: &dyn Decider<C, Output = CasePlan<S>>,
        context: C,
    ) -> Result<C> {
        let case = plan.decide(&context)?;
        self.execute_case(&case, context).await
    }
}
