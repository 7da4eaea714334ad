//! Incremental editing of operation plans.

use crate::error::Result;
use crate::executor::PlanExecutor;
use crate::operation::{Operation, PlannedOperation};
use crate::plan::{patch, sequence_patch, PlanFactory, PlanPatch};
use stageplan_decision::{Condition, Conditions, DeciderBuilder, DeciderConfig};
use stageplan_order::{Order, OrderError, SequenceBuilder};
use std::sync::Arc;
use tracing::info;

/// Accumulates conditional plan patches for one operation.
///
/// Patches take effect for callers only after [`flush`](Self::flush)
/// rebuilds the operation.
pub struct OperationEditor<C, S> {
    name: String,
    builder: DeciderBuilder<C, PlanPatch<S>>,
    executor: Arc<dyn PlanExecutor<C, S>>,
}

impl<C, S> OperationEditor<C, S>
where
    C: Send + 'static,
    S: PartialEq + Send + Sync + 'static,
{
    /// Create an editor for an operation without rules.
    pub fn new(name: impl Into<String>, executor: Arc<dyn PlanExecutor<C, S>>) -> Self {
        Self {
            name: name.into(),
            builder: DeciderBuilder::new(),
            executor,
        }
    }

    /// Set the decider configuration used on flush.
    pub fn with_config(mut self, config: DeciderConfig) -> Self {
        self.builder = self.builder.with_config(config);
        self
    }

    /// Operation name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of patches added so far.
    pub fn patch_count(&self) -> usize {
        self.builder.rule_count()
    }

    /// Apply `edit` to the case plans of inputs matching `conditions`.
    pub fn apply_conditional_patch<F>(
        &mut self,
        conditions: impl IntoIterator<Item = Condition<C>>,
        edit: F,
    ) -> Result<()>
    where
        F: Fn(&mut Order<S>) -> std::result::Result<(), OrderError> + Send + Sync + 'static,
    {
        self.builder.add_rule(conditions, patch(edit))?;
        Ok(())
    }

    /// Add a sequence of stages for inputs matching `conditions`.
    pub fn add<F>(&mut self, conditions: Conditions<C>, block: F) -> Result<()>
    where
        F: Fn(&mut SequenceBuilder<'_, S>) -> std::result::Result<(), OrderError>
            + Send
            + Sync
            + 'static,
    {
        self.builder.add(sequence_patch(block), conditions)?;
        Ok(())
    }

    /// Add a sequence of stages for every input.
    pub fn always_add<F>(&mut self, block: F) -> Result<()>
    where
        F: Fn(&mut SequenceBuilder<'_, S>) -> std::result::Result<(), OrderError>
            + Send
            + Sync
            + 'static,
    {
        self.add(Conditions::new(), block)
    }

    /// Build the operation from every patch added so far.
    pub fn flush(&self) -> Result<Arc<dyn Operation<C>>> {
        let plan = self.builder.build(PlanFactory)?;

        info!(
            operation = %self.name,
            patches = self.builder.rule_count(),
            nodes = plan.node_count(),
            "Rebuilt operation plan"
        );

        Ok(Arc::new(PlannedOperation::new(
            Arc::new(plan),
            self.executor.clone(),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExecutionError;
    use crate::sequential::SequentialExecutor;
    use crate::stage::{CallStage, Stage};
    use stageplan_decision::{Value, Variable};

    type Ctx = Vec<String>;

    fn push(name: &'static str) -> Stage<Ctx> {
        Stage::sync(name, move |log: &mut Ctx| {
            log.push(name.to_string());
            Ok(())
        })
    }

    fn editor() -> OperationEditor<Ctx, Stage<Ctx>> {
        OperationEditor::new("log", Arc::new(SequentialExecutor::new(CallStage)))
    }

    fn starts_with_admin() -> Variable<Ctx> {
        Variable::primary("admin", |ctx: &Ctx| {
            Value::from(ctx.first().map_or(false, |s| s == "admin"))
        })
    }

    #[tokio::test]
    async fn test_flush_builds_operation() {
        let mut editor = editor();
        editor
            .always_add(|s| {
                s.add_keyed("greet", push("hello"))?;
                Ok(())
            })
            .unwrap();
        editor
            .add(Conditions::new().expect(&starts_with_admin(), true), |s| {
                s.expect("greet")?.add(push("sudo"))?;
                Ok(())
            })
            .unwrap();

        let operation = editor.flush().unwrap();

        assert_eq!(operation.execute(Vec::new()).await.unwrap(), vec!["hello"]);
        assert_eq!(
            operation.execute(vec!["admin".to_string()]).await.unwrap(),
            vec!["admin", "hello", "sudo"]
        );
    }

    #[tokio::test]
    async fn test_patches_apply_after_flush_only() {
        let mut editor = editor();
        let empty = editor.flush().unwrap();

        editor
            .apply_conditional_patch(Vec::new(), |order: &mut Order<Stage<Ctx>>| {
                order.put("only", push("only"))?;
                Ok(())
            })
            .unwrap();
        assert_eq!(editor.patch_count(), 1);

        assert!(empty.execute(Vec::new()).await.unwrap().is_empty());
        let rebuilt = editor.flush().unwrap();
        assert_eq!(rebuilt.execute(Vec::new()).await.unwrap(), vec!["only"]);
    }

    #[tokio::test]
    async fn test_broken_patch_fails_execution() {
        let mut editor = editor();
        editor
            .always_add(|s| {
                let stage = push("twice");
                s.add_keyed("k", stage.clone())?.add_keyed("k", stage)?;
                Ok(())
            })
            .unwrap();
        let operation = editor.flush().unwrap();

        let err = operation.execute(Vec::new()).await.unwrap_err();
        assert!(matches!(err, ExecutionError::Decision(_)));
    }
}
