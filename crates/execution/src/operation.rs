//! Operations: entry points running a plan.

use crate::error::Result;
use crate::executor::PlanExecutor;
use crate::plan::CasePlan;
use async_trait::async_trait;
use stageplan_decision::Decider;
use std::sync::Arc;

/// Something that turns an input context into an output context.
#[async_trait]
pub trait Operation<C>: Send + Sync {
    /// Run the operation.
    async fn execute(&self, input: C) -> Result<C>;
}

/// Operation running a plan through an executor.
pub struct PlannedOperation<C, S> {
    plan: Arc<dyn Decider<C, Output = CasePlan<S>>>,
    executor: Arc<dyn PlanExecutor<C, S>>,
}

impl<C, S> PlannedOperation<C, S>
where
    C: Send + 'static,
    S: Send + Sync + 'static,
{
    /// Combine a plan with the executor running it.
    pub fn new(
        plan: Arc<dyn Decider<C, Output = CasePlan<S>>>,
        executor: Arc<dyn PlanExecutor<C, S>>,
    ) -> Self {
        Self { plan, executor }
    }
}

#[async_trait]
impl<C, S> Operation<C> for PlannedOperation<C, S>
where
    C: Send + 'static,
    S: Send + Sync + 'static,
{
    async fn execute(&self, input: C) -> Result<C> {
        self.executor.execute(self.plan.as_ref(), input).await
    }
}
