//! Conditions and rules.

use crate::error::{Contradiction, DecisionError, Result};
use crate::variable::Variable;
use stageplan_core::Value;

/// A single constraint: `variable` must have `value`.
pub struct Condition<I> {
    /// Constrained variable
    pub variable: Variable<I>,
    /// Required value
    pub value: Value,
}

impl<I> Condition<I> {
    /// Create a condition.
    pub fn new(variable: Variable<I>, value: impl Into<Value>) -> Self {
        Self {
            variable,
            value: value.into(),
        }
    }
}

impl<I> Clone for Condition<I> {
    fn clone(&self) -> Self {
        Self {
            variable: self.variable.clone(),
            value: self.value.clone(),
        }
    }
}

impl<I> std::fmt::Debug for Condition<I> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} == {}", self.variable, self.value)
    }
}

/// Builder for a conjunction of conditions.
pub struct Conditions<I> {
    conditions: Vec<Condition<I>>,
}

impl<I: 'static> Conditions<I> {
    /// Create an empty set of conditions (always satisfied).
    pub fn new() -> Self {
        Self {
            conditions: Vec::new(),
        }
    }

    /// Require `variable` to equal `value`.
    pub fn expect(mut self, variable: &Variable<I>, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition::new(variable.clone(), value));
        self
    }

    /// Require `predicate` to hold for the value of `variable`.
    pub fn expect_that<F>(self, variable: &Variable<I>, label: &str, predicate: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        self.expect(&variable.matches(label, predicate), true)
    }

    /// Require `predicate` not to hold for the value of `variable`.
    pub fn expect_not<F>(self, variable: &Variable<I>, label: &str, predicate: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        self.expect(&variable.matches(label, predicate), false)
    }

    /// Append already built conditions.
    pub fn extend(mut self, conditions: impl IntoIterator<Item = Condition<I>>) -> Self {
        self.conditions.extend(conditions);
        self
    }

    /// Number of conditions.
    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    /// Whether there are no conditions.
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }
}

impl<I: 'static> Default for Conditions<I> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I> IntoIterator for Conditions<I> {
    type Item = Condition<I>;
    type IntoIter = std::vec::IntoIter<Condition<I>>;

    fn into_iter(self) -> Self::IntoIter {
        self.conditions.into_iter()
    }
}

/// A rule as kept by the decider builder: unique conditions plus an item.
pub(crate) struct Rule<I, T> {
    pub(crate) conditions: Vec<(Variable<I>, Value)>,
    pub(crate) item: T,
}

impl<I, T> Rule<I, T> {
    /// Collect conditions, dropping identical duplicates and rejecting
    /// contradictions.
    pub(crate) fn new(conditions: impl IntoIterator<Item = Condition<I>>, item: T) -> Result<Self> {
        let mut unique: Vec<(Variable<I>, Value)> = Vec::new();
        let mut contradictions: Vec<(Variable<I>, Vec<Value>)> = Vec::new();

        for condition in conditions {
            let existing = unique
                .iter()
                .find(|(variable, _)| *variable == condition.variable)
                .map(|(_, value)| value.clone());

            match existing {
                None => unique.push((condition.variable, condition.value)),
                Some(value) if value == condition.value => {}
                Some(value) => {
                    match contradictions
                        .iter_mut()
                        .find(|(variable, _)| *variable == condition.variable)
                    {
                        Some((_, values)) => {
                            if !values.contains(&condition.value) {
                                values.push(condition.value);
                            }
                        }
                        None => contradictions.push((condition.variable, vec![value, condition.value])),
                    }
                }
            }
        }

        if !contradictions.is_empty() {
            return Err(DecisionError::ContradictingConditions(
                contradictions
                    .into_iter()
                    .map(|(variable, values)| Contradiction {
                        variable: variable.to_string(),
                        values,
                    })
                    .collect(),
            ));
        }

        Ok(Self {
            conditions: unique,
            item,
        })
    }

    /// Remove the condition on `variable`, returning the value it required.
    pub(crate) fn take(&mut self, variable: &Variable<I>) -> Option<Value> {
        let position = self.conditions.iter().position(|(v, _)| v == variable)?;
        Some(self.conditions.remove(position).1)
    }
}

impl<I, T: Clone> Clone for Rule<I, T> {
    fn clone(&self) -> Self {
        Self {
            conditions: self.conditions.clone(),
            item: self.item.clone(),
        }
    }
}
