//! Decision engine.
//!
//! Rules are conjunctions of `(variable, value)` conditions attached to
//! items. A [`DeciderBuilder`] compiles them into a decision tree, so that
//! deciding for an input costs time proportional to the tree depth rather
//! than to the number of rules.

#![warn(missing_docs)]

pub mod builder;
pub mod context;
pub mod error;
pub mod factory;
pub mod path;
pub mod rule;
pub mod tree;
pub mod variable;

pub use builder::{DeciderBuilder, DeciderConfig};
pub use context::{DecisionContext, LiveContext};
pub use error::{Contradiction, DecisionError, Result, VariableError};
pub use factory::{ContextIndependentFactory, DecisionFactory};
pub use path::{parse_path, PathExpression};
pub use rule::{Condition, Conditions};
pub use tree::{Decider, TreeDecider};
pub use variable::Variable;

pub use stageplan_core::Value;

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::collections::HashMap;

    type Input = HashMap<&'static str, &'static str>;

    fn field(name: &'static str) -> Variable<Input> {
        Variable::primary(name, move |input: &Input| Value::from(input.get(name).copied()))
    }

    #[test]
    fn test_end_to_end_item_selection() {
        let a = field("a");
        let b = field("b");
        let mut builder = DeciderBuilder::new();
        builder.add_rule(vec![Condition::new(a.clone(), "1")], "A1").unwrap();
        builder.add_rule(vec![Condition::new(a.clone(), "2")], "A2").unwrap();
        builder.add_rule(vec![Condition::new(b.clone(), "1")], "B1").unwrap();

        let decider = builder
            .build(ContextIndependentFactory::new(|items: &[&'static str]| {
                items.iter().copied().collect::<BTreeSet<_>>()
            }))
            .unwrap();

        let both: Input = [("a", "1"), ("b", "1")].into_iter().collect();
        assert_eq!(decider.decide(&both).unwrap(), BTreeSet::from(["A1", "B1"]));

        assert!(decider.decide(&Input::new()).unwrap().is_empty());

        let other: Input = [("a", "2"), ("b", "1")].into_iter().collect();
        assert_eq!(decider.decide(&other).unwrap(), BTreeSet::from(["A2", "B1"]));
    }

    #[test]
    fn test_variable_failure_propagates() {
        let strict = Variable::try_primary("strict", |input: &Input| {
            input
                .get("x")
                .map(|v| Value::from(*v))
                .ok_or_else(|| VariableError::Failed {
                    variable: "strict".to_string(),
                    message: "x is required".to_string(),
                })
        });
        let mut builder = DeciderBuilder::new();
        builder.add("x1", Conditions::new().expect(&strict, "1")).unwrap();
        let decider = builder
            .build(ContextIndependentFactory::new(|items: &[&'static str]| items.len()))
            .unwrap();

        let err = decider.decide(&Input::new()).unwrap_err();
        assert!(matches!(err, DecisionError::Variable(VariableError::Failed { .. })));
    }
}
