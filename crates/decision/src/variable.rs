//! Decision variables.
//!
//! A [`Variable`] is a function of the decider input, possibly reading other
//! variables. The set of variable kinds is closed; each kind declares which
//! fields make up its identity, and two variables with equal identity share
//! one memoized value per decision.

use crate::context::DecisionContext;
use crate::error::VariableError;
use regex::Regex;
use stageplan_core::Value;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

type ReadFn<I> = dyn Fn(&I) -> Result<Value, VariableError> + Send + Sync;
type DeriveFn = dyn Fn(&[Value]) -> Result<Value, VariableError> + Send + Sync;
type PredicateFn = dyn Fn(&Value) -> bool + Send + Sync;

enum Kind<I> {
    Primary {
        name: String,
        read: Box<ReadFn<I>>,
    },
    Identity {
        convert: fn(&I) -> Value,
    },
    Predicate {
        source: Variable<I>,
        label: String,
        predicate: Box<PredicateFn>,
    },
    Derived {
        name: String,
        dependencies: Vec<Variable<I>>,
        derive: Box<DeriveFn>,
    },
    RegexMatch {
        source: Variable<I>,
        pattern: String,
        regex: Regex,
    },
    CollectionSize {
        source: Variable<I>,
    },
}

/// A named function computing a [`Value`] from decider input and/or other
/// variables.
///
/// Cloning is cheap; clones are the same variable.
pub struct Variable<I>(Arc<Kind<I>>);

fn input_to_value<I: Clone + Into<Value>>(input: &I) -> Value {
    input.clone().into()
}

impl<I: 'static> Variable<I> {
    /// A variable reading the input through an infallible function.
    ///
    /// Primary variables are identified by name, so two primaries with the
    /// same name are treated as the same variable.
    pub fn primary<F>(name: impl Into<String>, read: F) -> Self
    where
        F: Fn(&I) -> Value + Send + Sync + 'static,
    {
        Self::try_primary(name, move |input| Ok(read(input)))
    }

    /// A variable reading the input through a fallible function.
    pub fn try_primary<F>(name: impl Into<String>, read: F) -> Self
    where
        F: Fn(&I) -> Result<Value, VariableError> + Send + Sync + 'static,
    {
        Self(Arc::new(Kind::Primary {
            name: name.into(),
            read: Box::new(read),
        }))
    }

    /// A variable whose value is the input itself.
    pub fn identity() -> Self
    where
        I: Clone + Into<Value>,
    {
        Self(Arc::new(Kind::Identity {
            convert: input_to_value::<I>,
        }))
    }

    /// A meta variable computing its value from the values of `dependencies`,
    /// passed in the same order.
    pub fn derived<F>(name: impl Into<String>, dependencies: Vec<Variable<I>>, derive: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, VariableError> + Send + Sync + 'static,
    {
        Self(Arc::new(Kind::Derived {
            name: name.into(),
            dependencies,
            derive: Box::new(derive),
        }))
    }

    /// A boolean meta variable applying `predicate` to this variable's value.
    ///
    /// The label is part of the identity: predicates with the same label over
    /// the same variable are the same variable.
    pub fn matches<F>(&self, label: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        Self(Arc::new(Kind::Predicate {
            source: self.clone(),
            label: label.into(),
            predicate: Box::new(predicate),
        }))
    }

    /// A boolean meta variable that is `true` when this variable's string
    /// value matches `pattern` in full.
    pub fn regex_match(&self, pattern: &str) -> Result<Self, VariableError> {
        let regex = Regex::new(&format!("^(?:{})$", pattern)).map_err(|e| {
            VariableError::InvalidPattern {
                pattern: pattern.to_string(),
                message: e.to_string(),
            }
        })?;

        Ok(Self(Arc::new(Kind::RegexMatch {
            source: self.clone(),
            pattern: pattern.to_string(),
            regex,
        })))
    }

    /// An integer meta variable holding the length of this variable's list
    /// or string value (`0` for null).
    pub fn size(&self) -> Self {
        Self(Arc::new(Kind::CollectionSize {
            source: self.clone(),
        }))
    }
}

impl<I> Variable<I> {
    /// Computes the value of this variable.
    ///
    /// Production code should go through [`DecisionContext::get`] instead,
    /// which memoizes the result for the current decision.
    pub fn evaluate(&self, context: &dyn DecisionContext<I>) -> Result<Value, VariableError> {
        match &*self.0 {
            Kind::Primary { read, .. } => read(context.input()?),
            Kind::Identity { convert } => Ok(convert(context.input()?)),
            Kind::Predicate {
                source, predicate, ..
            } => Ok(Value::Bool(predicate(&context.get(source)?))),
            Kind::Derived {
                dependencies,
                derive,
                ..
            } => {
                let values = dependencies
                    .iter()
                    .map(|d| context.get(d))
                    .collect::<Result<Vec<_>, _>>()?;
                derive(&values)
            }
            Kind::RegexMatch { source, regex, .. } => match context.get(source)? {
                Value::Str(s) => Ok(Value::Bool(regex.is_match(&s))),
                Value::Null => Ok(Value::Bool(false)),
                other => Err(self.mismatch("string", &other)),
            },
            Kind::CollectionSize { source } => match context.get(source)? {
                Value::List(items) => Ok(Value::from(items.len())),
                Value::Str(s) => Ok(Value::from(s.chars().count())),
                Value::Null => Ok(Value::Int(0)),
                other => Err(self.mismatch("list", &other)),
            },
        }
    }

    /// Variables this one reads from the decision context.
    pub fn dependencies(&self) -> Vec<Variable<I>> {
        match &*self.0 {
            Kind::Primary { .. } | Kind::Identity { .. } => Vec::new(),
            Kind::Derived { dependencies, .. } => dependencies.clone(),
            Kind::Predicate { source, .. }
            | Kind::RegexMatch { source, .. }
            | Kind::CollectionSize { source } => vec![source.clone()],
        }
    }

    /// Whether this variable never reads the input directly.
    pub fn is_meta(&self) -> bool {
        !matches!(&*self.0, Kind::Primary { .. } | Kind::Identity { .. })
    }

    fn mismatch(&self, expected: &'static str, actual: &Value) -> VariableError {
        VariableError::TypeMismatch {
            variable: self.to_string(),
            expected,
            actual: actual.kind(),
        }
    }
}

impl<I> Clone for Variable<I> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<I> PartialEq for Variable<I> {
    fn eq(&self, other: &Self) -> bool {
        if Arc::ptr_eq(&self.0, &other.0) {
            return true;
        }

        match (&*self.0, &*other.0) {
            (Kind::Primary { name: a, .. }, Kind::Primary { name: b, .. }) => a == b,
            (Kind::Identity { .. }, Kind::Identity { .. }) => true,
            (
                Kind::Predicate {
                    source: s1,
                    label: l1,
                    ..
                },
                Kind::Predicate {
                    source: s2,
                    label: l2,
                    ..
                },
            ) => l1 == l2 && s1 == s2,
            (
                Kind::Derived {
                    name: n1,
                    dependencies: d1,
                    ..
                },
                Kind::Derived {
                    name: n2,
                    dependencies: d2,
                    ..
                },
            ) => n1 == n2 && d1 == d2,
            (
                Kind::RegexMatch {
                    source: s1,
                    pattern: p1,
                    ..
                },
                Kind::RegexMatch {
                    source: s2,
                    pattern: p2,
                    ..
                },
            ) => p1 == p2 && s1 == s2,
            (Kind::CollectionSize { source: s1 }, Kind::CollectionSize { source: s2 }) => s1 == s2,
            _ => false,
        }
    }
}

impl<I> Eq for Variable<I> {}

impl<I> Hash for Variable<I> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match &*self.0 {
            Kind::Primary { name, .. } => {
                0u8.hash(state);
                name.hash(state);
            }
            Kind::Identity { .. } => 1u8.hash(state),
            Kind::Predicate { source, label, .. } => {
                2u8.hash(state);
                label.hash(state);
                source.hash(state);
            }
            Kind::Derived {
                name, dependencies, ..
            } => {
                3u8.hash(state);
                name.hash(state);
                dependencies.hash(state);
            }
            Kind::RegexMatch {
                source, pattern, ..
            } => {
                4u8.hash(state);
                pattern.hash(state);
                source.hash(state);
            }
            Kind::CollectionSize { source } => {
                5u8.hash(state);
                source.hash(state);
            }
        }
    }
}

impl<I> fmt::Display for Variable<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.0 {
            Kind::Primary { name, .. } | Kind::Derived { name, .. } => write!(f, "{}", name),
            Kind::Identity { .. } => write!(f, "input"),
            Kind::Predicate { source, label, .. } => write!(f, "{}({})", label, source),
            Kind::RegexMatch {
                source, pattern, ..
            } => write!(f, "{} =~ /{}/", source, pattern),
            Kind::CollectionSize { source } => write!(f, "size({})", source),
        }
    }
}

impl<I> fmt::Debug for Variable<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Variable({})", self)
    }
}
