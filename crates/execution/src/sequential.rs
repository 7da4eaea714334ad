//! Sequential plan execution.

use crate::error::{ExecutionError, Result};
use crate::executor::PlanExecutor;
use crate::stage::StageRunner;
use async_trait::async_trait;
use stageplan_order::Order;
use tracing::{debug, warn};

/// Runs stages one at a time in the linear order of the plan.
///
/// Each stage receives the context returned by the previous one; the first
/// stage receives the input context.
pub struct SequentialExecutor<R> {
    runner: R,
}

impl<R> SequentialExecutor<R> {
    /// Create an executor running stages through `runner`.
    pub fn new(runner: R) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl<C, S, R> PlanExecutor<C, S> for SequentialExecutor<R>
where
    C: Send + 'static,
    S: Send + Sync + 'static,
    R: StageRunner<S, C>,
{
    async fn execute_case(&self, order: &Order<S>, context: C) -> Result<C> {
        let entries = order.linear_entries()?;
        let mut context = context;

        for (key, stages) in entries {
            for stage in stages {
                debug!(key = %key, "Running stage");
                context = self.runner.run(stage, context).await.map_err(|source| {
                    warn!(key = %key, error = %source, "Stage failed");
                    ExecutionError::StageFailed {
                        key: key.clone(),
                        source,
                    }
                })?;
            }
        }

        Ok(context)
    }
}
