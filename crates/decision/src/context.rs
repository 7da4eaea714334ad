//! Read access to decider input and variable values.

use crate::error::VariableError;
use crate::variable::Variable;
use stageplan_core::Value;
use std::cell::RefCell;
use std::collections::HashMap;

/// The only way variables observe the decider input and each other.
pub trait DecisionContext<I> {
    /// Decider input for the current decision.
    fn input(&self) -> Result<&I, VariableError>;

    /// Value of `variable` for the current decision.
    fn get(&self, variable: &Variable<I>) -> Result<Value, VariableError>;
}

/// Context of a running decision.
///
/// Each variable is evaluated at most once per context.
pub struct LiveContext<'a, I> {
    input: &'a I,
    resolved: RefCell<HashMap<Variable<I>, Value>>,
}

impl<'a, I> LiveContext<'a, I> {
    /// Create a context for `input`.
    pub fn new(input: &'a I) -> Self {
        Self {
            input,
            resolved: RefCell::new(HashMap::new()),
        }
    }

    /// Number of variables evaluated so far.
    pub fn resolved_count(&self) -> usize {
        self.resolved.borrow().len()
    }
}

impl<'a, I> DecisionContext<I> for LiveContext<'a, I> {
    fn input(&self) -> Result<&I, VariableError> {
        Ok(self.input)
    }

    fn get(&self, variable: &Variable<I>) -> Result<Value, VariableError> {
        if let Some(value) = self.resolved.borrow().get(variable) {
            return Ok(value.clone());
        }

        let value = variable.evaluate(self)?;
        self.resolved
            .borrow_mut()
            .insert(variable.clone(), value.clone());
        Ok(value)
    }
}

/// Context evaluating a meta variable purely from values assumed on a
/// decision tree path. Any access outside the assumptions is an error.
pub(crate) struct AssumedContext<'a, I> {
    target: &'a Variable<I>,
    assumptions: &'a HashMap<Variable<I>, Value>,
}

impl<'a, I> AssumedContext<'a, I> {
    pub(crate) fn new(target: &'a Variable<I>, assumptions: &'a HashMap<Variable<I>, Value>) -> Self {
        Self {
            target,
            assumptions,
        }
    }
}

impl<'a, I> DecisionContext<I> for AssumedContext<'a, I> {
    fn input(&self) -> Result<&I, VariableError> {
        Err(VariableError::UnexpectedInput {
            variable: self.target.to_string(),
        })
    }

    fn get(&self, variable: &Variable<I>) -> Result<Value, VariableError> {
        self.assumptions
            .get(variable)
            .cloned()
            .ok_or_else(|| VariableError::UnexpectedDependency {
                variable: self.target.to_string(),
                dependency: variable.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_live_context_memoizes() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let len = Variable::primary("len", move |input: &String| {
            counter.fetch_add(1, Ordering::SeqCst);
            Value::from(input.len())
        });
        let long = len.matches("long", |v| v.as_int().unwrap_or(0) > 3);

        let input = "hello".to_string();
        let ctx = LiveContext::new(&input);

        assert_eq!(ctx.get(&long), Ok(Value::Bool(true)));
        assert_eq!(ctx.get(&len), Ok(Value::Int(5)));
        assert_eq!(ctx.get(&long), Ok(Value::Bool(true)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(ctx.resolved_count(), 2);
    }

    #[test]
    fn test_assumed_context_rejects_input() {
        let len = Variable::primary("len", |input: &String| Value::from(input.len()));
        let assumptions = HashMap::new();
        let ctx = AssumedContext::new(&len, &assumptions);

        assert_eq!(
            len.evaluate(&ctx),
            Err(VariableError::UnexpectedInput {
                variable: "len".to_string()
            })
        );
    }

    #[test]
    fn test_assumed_context_reads_assumptions() {
        let len = Variable::primary("len", |input: &String| Value::from(input.len()));
        let long = len.matches("long", |v| v.as_int().unwrap_or(0) > 3);
        let other = Variable::primary("other", |_: &String| Value::Null);

        let mut assumptions = HashMap::new();
        assumptions.insert(len.clone(), Value::Int(10));
        let ctx = AssumedContext::new(&long, &assumptions);

        assert_eq!(long.evaluate(&ctx), Ok(Value::Bool(true)));
        assert!(matches!(
            ctx.get(&other),
            Err(VariableError::UnexpectedDependency { .. })
        ));
    }
}
