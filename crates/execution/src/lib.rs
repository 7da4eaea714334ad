//! Plan execution.
//!
//! An operation plan is a decider whose items are patches to an order of
//! stages. For each context the plan picks its case plan, and an executor
//! runs the stages against the context, one at a time or with independent
//! branches running concurrently.

#![warn(missing_docs)]

pub mod concurrent;
pub mod config;
pub mod editor;
pub mod error;
pub mod executor;
pub mod operation;
pub mod plan;
pub mod registry;
pub mod sequential;
pub mod stage;

pub use concurrent::ConcurrentExecutor;
pub use config::{ExecutionMode, ExecutorConfig};
pub use editor::OperationEditor;
pub use error::{ExecutionError, Result, StageError};
pub use executor::{PlanExecutor, Reducer};
pub use operation::{Operation, PlannedOperation};
pub use plan::{patch, sequence_patch, CasePlan, OperationPlan, PlanFactory, PlanPatch};
pub use registry::OperationRegistry;
pub use sequential::SequentialExecutor;
pub use stage::{CallStage, Stage, StageFuture, StageRunner};

#[cfg(test)]
mod tests {
    use super::*;
    use stageplan_decision::{Conditions, DeciderBuilder, Value, Variable};
    use std::sync::Arc;
    use tokio::runtime::Handle;

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Ticket {
        priority: bool,
        steps: Vec<String>,
    }

    fn step(name: &'static str) -> Stage<Ticket> {
        Stage::sync(name, move |ticket: &mut Ticket| {
            ticket.steps.push(name.to_string());
            Ok(())
        })
    }

    #[tokio::test]
    async fn test_plan_executed_through_decider() {
        let priority = Variable::primary("priority", |t: &Ticket| Value::from(t.priority));

        let mut builder: DeciderBuilder<Ticket, PlanPatch<Stage<Ticket>>> = DeciderBuilder::new();
        builder
            .add(
                sequence_patch(|s| {
                    s.add_keyed("triage", step("triage"))?
                        .add_keyed("resolve", step("resolve"))?;
                    Ok(())
                }),
                Conditions::new(),
            )
            .unwrap();
        builder
            .add(
                sequence_patch(|s| {
                    s.add_keyed("pre:resolve", step("page on-call"))?;
                    Ok(())
                }),
                Conditions::new().expect(&priority, true),
            )
            .unwrap();
        let plan: OperationPlan<Ticket, Stage<Ticket>> = builder.build(PlanFactory).unwrap();

        let executor = ExecutorConfig::new().build(
            |mut a: Ticket, b: Ticket| {
                a.steps.extend(b.steps);
                a
            },
            Handle::current(),
        );

        let normal = executor.execute(&plan, Ticket::default()).await.unwrap();
        assert_eq!(normal.steps, vec!["triage", "resolve"]);

        let urgent = Ticket {
            priority: true,
            steps: Vec::new(),
        };
        let urgent = executor.execute(&plan, urgent).await.unwrap();
        assert_eq!(urgent.steps, vec!["triage", "page on-call", "resolve"]);

        let operation = PlannedOperation::new(Arc::new(plan), executor);
        let again = operation.execute(Ticket::default()).await.unwrap();
        assert_eq!(again, normal);
    }
}
