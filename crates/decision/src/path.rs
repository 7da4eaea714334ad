//! Path expressions compiled into decision conditions.
//!
//! Useful for routers built on a decider: an expression like
//!
//! ```text
//! /orders/:orderId([0-9a-z]{4})
//! ```
//!
//! matches `/orders/12ab` but neither `/orders/1` nor `/orders/12ab/lines`
//! (the latter does match when the expression is not exact).

use crate::context::DecisionContext;
use crate::error::{DecisionError, Result, VariableError};
use crate::rule::Condition;
use crate::variable::Variable;
use regex::Regex;
use stageplan_core::Value;
use std::fmt;
use std::sync::OnceLock;

fn parameter_step_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^:([^(]+)?(?:\((.*)\))?$").expect("parameter step pattern is valid"))
}

/// Split a path into its non-empty steps.
pub fn parse_path(path: &str) -> Vec<String> {
    path.split('/')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn segments_of<I: 'static>(path: &Variable<I>) -> Variable<I> {
    let name = format!("path parsed from {}", path);
    let variable_name = name.clone();
    Variable::derived(name, vec![path.clone()], move |values| match &values[0] {
        Value::Str(s) => Ok(Value::from(parse_path(s))),
        Value::Null => Ok(Value::List(Vec::new())),
        other => Err(VariableError::TypeMismatch {
            variable: variable_name.clone(),
            expected: "string",
            actual: other.kind(),
        }),
    })
}

fn step_of<I: 'static>(segments: &Variable<I>, step: usize) -> Variable<I> {
    Variable::derived(
        format!("step {} of {}", step, segments),
        vec![segments.clone()],
        move |values| {
            Ok(values[0]
                .as_list()
                .and_then(|steps| steps.get(step))
                .cloned()
                .unwrap_or_else(|| Value::from("")))
        },
    )
}

/// A set of conditions generated from a path pattern.
///
/// Named parameters (`:name`) match any single step; a parameter may carry a
/// regular expression in parentheses (`:name(re)` or just `:(re)`) that the
/// step has to match in full. Exact expressions also pin the step count;
/// inexact ones accept longer paths.
pub struct PathExpression<I> {
    path: Variable<I>,
    segments: Variable<I>,
    source: String,
    exact: bool,
    conditions: Vec<Condition<I>>,
    parameters: Vec<(usize, String)>,
}

impl<I: 'static> PathExpression<I> {
    /// Compile `source` against the path held by `path`.
    pub fn new(path: Variable<I>, source: &str, exact: bool) -> Result<Self> {
        let segments = segments_of(&path);
        let steps = parse_path(source);
        let mut conditions = Vec::new();
        let mut parameters = Vec::new();

        let parametrized = steps.iter().any(|s| parameter_step_re().is_match(s));

        if parametrized {
            for (index, step) in steps.iter().enumerate() {
                if let Some(captures) = parameter_step_re().captures(step) {
                    if let Some(pattern) = captures.get(2) {
                        let matcher = step_of(&segments, index).regex_match(pattern.as_str())?;
                        conditions.push(Condition::new(matcher, true));
                    }
                    if let Some(name) = captures.get(1) {
                        parameters.push((index, name.as_str().to_string()));
                    }
                    continue;
                }

                conditions.push(Condition::new(step_of(&segments, index), step.as_str()));
            }

            if exact {
                conditions.push(Condition::new(segments.size(), steps.len()));
            }
        } else {
            let canonical = format!("/{}", steps.join("/"));

            if exact {
                conditions.push(Condition::new(path.clone(), canonical));
            } else {
                let label = format!("starts_with {}", canonical);
                let prefix = path.matches(label, move |v| {
                    v.as_str().map_or(false, |s| s.starts_with(&canonical))
                });
                conditions.push(Condition::new(prefix, true));
            }
        }

        Ok(Self {
            path,
            segments,
            source: source.to_string(),
            exact,
            conditions,
            parameters,
        })
    }

    /// Conditions that hold exactly when the path matches the expression.
    pub fn conditions(&self) -> Vec<Condition<I>> {
        self.conditions.clone()
    }

    /// Names of the parameters declared by the expression, in path order.
    pub fn parameter_names(&self) -> Vec<&str> {
        self.parameters.iter().map(|(_, name)| name.as_str()).collect()
    }

    /// Values of the named parameters for the path in `context`.
    pub fn extract_parameters(&self, context: &dyn DecisionContext<I>) -> Result<Vec<(String, String)>> {
        let segments = context.get(&self.segments)?;
        let steps = segments.as_list().unwrap_or(&[]);
        let mut extracted = Vec::with_capacity(self.parameters.len());

        for (index, name) in &self.parameters {
            match steps.get(*index).and_then(Value::as_str) {
                Some(value) => extracted.push((name.clone(), value.to_string())),
                None => {
                    return Err(DecisionError::PathMismatch {
                        path: context.get(&self.path)?.to_string(),
                        expression: self.to_string(),
                    })
                }
            }
        }

        Ok(extracted)
    }
}

impl<I> fmt::Display for PathExpression<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} path expression \"{}\" for path from {}",
            if self.exact { "exact" } else { "inexact" },
            self.source,
            self.path
        )
    }
}
