//! Rule accumulation and decision tree compilation.

use crate::context::AssumedContext;
use crate::error::{DecisionError, Result};
use crate::factory::DecisionFactory;
use crate::rule::{Condition, Conditions, Rule};
use crate::tree::{TreeDecider, TreeNode};
use crate::variable::Variable;
use stageplan_core::Value;
use std::collections::HashMap;
use tracing::debug;

/// Configuration for decider compilation.
#[derive(Debug, Clone, Default)]
pub struct DeciderConfig {
    /// Upper bound on compiled tree nodes (None = unbounded)
    ///
    /// Rules silent on a split variable are copied into every branch of that
    /// split, so adversarial rule sets can grow exponentially.
    pub max_nodes: Option<usize>,
}

impl DeciderConfig {
    /// Create a configuration with no limits.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the node ceiling.
    pub fn with_max_nodes(mut self, max_nodes: usize) -> Self {
        self.max_nodes = Some(max_nodes);
        self
    }
}

/// Builder for tree deciders.
///
/// The builder is not thread-safe and may be built several times; every
/// build compiles the rules known at that moment.
pub struct DeciderBuilder<I, T> {
    rules: Vec<Rule<I, T>>,
    config: DeciderConfig,
}

impl<I: 'static, T: Clone> DeciderBuilder<I, T> {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            config: DeciderConfig::default(),
        }
    }

    /// Set the configuration.
    pub fn with_config(mut self, config: DeciderConfig) -> Self {
        self.config = config;
        self
    }

    /// Add a rule selecting `item` when all `conditions` hold.
    ///
    /// Fails with [`DecisionError::ContradictingConditions`] when the
    /// conditions require one variable to have different values. Repeated
    /// identical conditions are accepted.
    pub fn add_rule(&mut self, conditions: impl IntoIterator<Item = Condition<I>>, item: T) -> Result<()> {
        let rule = Rule::new(conditions, item)?;
        self.rules.push(rule);
        Ok(())
    }

    /// Add a rule from a conditions builder.
    pub fn add(&mut self, item: T, conditions: Conditions<I>) -> Result<()> {
        self.add_rule(conditions, item)
    }

    /// Number of rules added so far.
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Compile the rules into a decider producing output through `factory`.
    pub fn build<F: DecisionFactory<I, T>>(&self, factory: F) -> Result<TreeDecider<I, T, F>> {
        let mut compiler = TreeCompiler {
            nodes: Vec::new(),
            max_nodes: self.config.max_nodes,
        };

        compiler.compile(self.rules.clone(), HashMap::new(), None)?;

        debug!(
            rules = self.rules.len(),
            nodes = compiler.nodes.len(),
            "Compiled decision tree"
        );

        Ok(TreeDecider {
            nodes: compiler.nodes,
            factory,
        })
    }
}

impl<I: 'static, T: Clone> Default for DeciderBuilder<I, T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Pick the variable to split on: the one mentioned by most rules, with extra
/// credit for variables other mentioned variables depend on.
fn pick_split_variable<I, T>(rules: &[Rule<I, T>]) -> Option<Variable<I>> {
    let mut counts: Vec<(Variable<I>, usize)> = Vec::new();
    let mut index: HashMap<Variable<I>, usize> = HashMap::new();

    for rule in rules {
        for (variable, _) in &rule.conditions {
            match index.get(variable) {
                Some(&i) => counts[i].1 += 1,
                None => {
                    index.insert(variable.clone(), counts.len());
                    counts.push((variable.clone(), 1));
                }
            }
        }
    }

    for rule in rules {
        for (variable, _) in &rule.conditions {
            for dependency in variable.dependencies() {
                if let Some(&i) = index.get(&dependency) {
                    counts[i].1 += 1;
                }
            }
        }
    }

    let mut best: Option<(Variable<I>, usize)> = None;
    for (variable, count) in counts {
        if best.as_ref().map_or(true, |(_, c)| count > *c) {
            best = Some((variable, count));
        }
    }
    best.map(|(variable, _)| variable)
}

struct TreeCompiler<I, T, V> {
    nodes: Vec<TreeNode<I, T, V>>,
    max_nodes: Option<usize>,
}

impl<I, T: Clone, V> TreeCompiler<I, T, V> {
    fn push_node(&mut self, parent: Option<usize>, variable: Option<Variable<I>>, items: Vec<T>) -> Result<usize> {
        if let Some(limit) = self.max_nodes {
            if self.nodes.len() >= limit {
                return Err(DecisionError::TreeTooLarge { limit });
            }
        }

        self.nodes.push(TreeNode::new(parent, variable, items));
        Ok(self.nodes.len() - 1)
    }

    /// Value of a meta variable when every dependency is pinned by the
    /// assumptions of the current path; `None` when it must be split on.
    fn resolve_meta(
        &self,
        variable: &Variable<I>,
        assumptions: &HashMap<Variable<I>, Value>,
    ) -> Result<Option<Value>> {
        if !variable.is_meta() {
            return Ok(None);
        }

        let dependencies = variable.dependencies();
        // Without dependencies the value may hinge on something outside the
        // input, so it has to be checked at decision time.
        if dependencies.is_empty() || !dependencies.iter().all(|d| assumptions.contains_key(d)) {
            return Ok(None);
        }

        let context = AssumedContext::new(variable, assumptions);
        variable
            .evaluate(&context)
            .map(Some)
            .map_err(|source| DecisionError::AssumptionViolated {
                variable: variable.to_string(),
                source,
            })
    }

    fn compile(
        &mut self,
        mut rules: Vec<Rule<I, T>>,
        mut assumptions: HashMap<Variable<I>, Value>,
        parent: Option<usize>,
    ) -> Result<usize> {
        let (split, groups, defaults) = loop {
            let Some(split) = pick_split_variable(&rules) else {
                // No conditions left: every remaining rule matches here
                let items = rules.into_iter().map(|r| r.item).collect();
                return self.push_node(parent, None, items);
            };

            if let Some(known) = self.resolve_meta(&split, &assumptions)? {
                rules.retain_mut(|rule| match rule.take(&split) {
                    Some(expected) => expected == known,
                    None => true,
                });
                assumptions.insert(split, known);
                continue;
            }

            let mut groups: Vec<(Value, Vec<Rule<I, T>>)> = Vec::new();
            let mut group_index: HashMap<Value, usize> = HashMap::new();
            let mut defaults = Vec::new();

            for mut rule in rules {
                match rule.take(&split) {
                    Some(value) => match group_index.get(&value) {
                        Some(&i) => groups[i].1.push(rule),
                        None => {
                            group_index.insert(value.clone(), groups.len());
                            groups.push((value, vec![rule]));
                        }
                    },
                    None => defaults.push(rule),
                }
            }

            break (split, groups, defaults);
        };

        let (unconditional, conditional): (Vec<_>, Vec<_>) =
            defaults.into_iter().partition(|rule| rule.conditions.is_empty());

        let items = unconditional.into_iter().map(|r| r.item).collect();
        let index = self.push_node(parent, Some(split.clone()), items)?;

        if !conditional.is_empty() {
            let child = self.compile(conditional.clone(), assumptions.clone(), Some(index))?;
            self.nodes[index].default_child = Some(child);
        }

        for (value, mut group) in groups {
            // Rules silent on the split variable still apply in every branch
            group.extend(conditional.iter().cloned());

            let mut child_assumptions = assumptions.clone();
            child_assumptions.insert(split.clone(), value.clone());

            let child = self.compile(group, child_assumptions, Some(index))?;
            self.nodes[index].add_child(value, child);
        }

        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::ContextIndependentFactory;
    use crate::tree::Decider;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    type Input = HashMap<String, String>;

    fn key(name: &'static str) -> Variable<Input> {
        Variable::primary(name, move |input: &Input| {
            Value::from(input.get(name).cloned().unwrap_or_default())
        })
    }

    fn input(pairs: &[(&str, &str)]) -> Input {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn concat(items: &[&'static str]) -> String {
        let mut sorted = items.to_vec();
        sorted.sort();
        sorted.join(", ")
    }

    fn build(
        rules: Vec<(&'static str, Conditions<Input>)>,
    ) -> impl Decider<Input, Output = String> {
        let mut builder = DeciderBuilder::new();
        for (item, conditions) in rules {
            builder.add(item, conditions).unwrap();
        }
        builder
            .build(ContextIndependentFactory::new(concat))
            .unwrap()
    }

    #[test]
    fn test_simple_conditions() {
        let d = build(vec![
            ("a is 1", Conditions::new().expect(&key("a"), "1")),
            ("a is 2", Conditions::new().expect(&key("a"), "2")),
            ("b is 1", Conditions::new().expect(&key("b"), "1")),
        ]);

        assert_eq!(d.decide(&input(&[])).unwrap(), "");
        assert_eq!(d.decide(&input(&[("a", "1")])).unwrap(), "a is 1");
        assert_eq!(d.decide(&input(&[("a", "2")])).unwrap(), "a is 2");
        assert_eq!(d.decide(&input(&[("b", "1")])).unwrap(), "b is 1");
        assert_eq!(d.decide(&input(&[("a", "1"), ("b", "1")])).unwrap(), "a is 1, b is 1");
        assert_eq!(d.decide(&input(&[("a", "2"), ("b", "1")])).unwrap(), "a is 2, b is 1");
    }

    #[test]
    fn test_predicate_variables() {
        let a = key("a");
        let d = build(vec![
            (
                "a is not lowercase",
                Conditions::new().expect_that(&a, "not_lowercase", |v| {
                    v.as_str().map_or(false, |s| s.to_lowercase() != s)
                }),
            ),
            (
                "a is not uppercase",
                Conditions::new().expect_that(&a, "not_uppercase", |v| {
                    v.as_str().map_or(false, |s| s.to_uppercase() != s)
                }),
            ),
            ("a is UP", Conditions::new().expect(&a, "UP")),
        ]);

        assert_eq!(d.decide(&input(&[("a", "UP")])).unwrap(), "a is UP, a is not lowercase");
        assert_eq!(d.decide(&input(&[("a", "lo")])).unwrap(), "a is not uppercase");
        assert_eq!(
            d.decide(&input(&[("a", "lU")])).unwrap(),
            "a is not lowercase, a is not uppercase"
        );
    }

    #[test]
    fn test_unconditional_rules_always_apply() {
        let d = build(vec![
            ("always", Conditions::new()),
            ("a is 1", Conditions::new().expect(&key("a"), "1")),
        ]);

        assert_eq!(d.decide(&input(&[])).unwrap(), "always");
        assert_eq!(d.decide(&input(&[("a", "1")])).unwrap(), "a is 1, always");
    }

    #[test]
    fn test_conjunction_requires_all_conditions() {
        let d = build(vec![(
            "a1 and b2",
            Conditions::new().expect(&key("a"), "1").expect(&key("b"), "2"),
        )]);

        assert_eq!(d.decide(&input(&[("a", "1")])).unwrap(), "");
        assert_eq!(d.decide(&input(&[("b", "2")])).unwrap(), "");
        assert_eq!(d.decide(&input(&[("a", "1"), ("b", "2")])).unwrap(), "a1 and b2");
    }

    #[test]
    fn test_identical_rules_are_accepted() {
        let d = build(vec![
            ("x", Conditions::new().expect(&key("a"), "1")),
            ("x", Conditions::new().expect(&key("a"), "1").expect(&key("a"), "1")),
        ]);

        assert_eq!(d.decide(&input(&[("a", "1")])).unwrap(), "x, x");
    }

    #[test]
    fn test_contradicting_rule_is_rejected() {
        let mut builder: DeciderBuilder<Input, &str> = DeciderBuilder::new();
        let result = builder.add_rule(
            vec![
                Condition::new(key("a"), "1"),
                Condition::new(key("a"), "2"),
            ],
            "bad",
        );

        assert!(matches!(result, Err(DecisionError::ContradictingConditions(_))));
        assert_eq!(builder.rule_count(), 0);
    }

    #[test]
    fn test_variables_evaluated_once_per_decision() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let a = Variable::primary("a", move |input: &Input| {
            counter.fetch_add(1, Ordering::SeqCst);
            Value::from(input.get("a").cloned().unwrap_or_default())
        });
        let d = build(vec![
            ("exact", Conditions::new().expect(&a, "x")),
            ("long", Conditions::new().expect_that(&a, "long", |v| {
                v.as_str().map_or(false, |s| s.len() > 3)
            })),
        ]);

        d.decide(&input(&[("a", "xxxxx")])).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_meta_variable_is_resolved_at_build_time() {
        let a = key("a");
        let mut builder = DeciderBuilder::new();
        builder
            .add("a is abc", Conditions::new().expect(&a, "abc"))
            .unwrap();
        builder
            .add(
                "abc is long",
                Conditions::new()
                    .expect(&a, "abc")
                    .expect_that(&a, "long", |v| v.as_str().map_or(false, |s| s.len() > 2)),
            )
            .unwrap();
        builder
            .add(
                "abc is short",
                Conditions::new()
                    .expect(&a, "abc")
                    .expect_not(&a, "long", |v| v.as_str().map_or(false, |s| s.len() > 2)),
            )
            .unwrap();

        let d = builder.build(ContextIndependentFactory::new(concat)).unwrap();

        assert_eq!(d.decide(&input(&[("a", "abc")])).unwrap(), "a is abc, abc is long");
        assert_eq!(d.decide(&input(&[("a", "zz")])).unwrap(), "");
        // root split on `a`; the `long` predicate collapsed into its child leaf
        assert_eq!(d.node_count(), 2);
    }

    #[test]
    fn test_failing_meta_variable_fails_build() {
        let n = Variable::primary("n", |input: &Input| {
            Value::Int(input.get("n").map_or(0, |s| s.len() as i64))
        });
        let mut builder = DeciderBuilder::new();
        builder
            .add(
                "five",
                Conditions::new()
                    .expect(&n, 5)
                    .expect(&n.regex_match("x+").unwrap(), true),
            )
            .unwrap();

        let result = builder.build(ContextIndependentFactory::new(concat));
        assert!(matches!(
            result,
            Err(DecisionError::AssumptionViolated {
                source: crate::VariableError::TypeMismatch { .. },
                ..
            })
        ));
    }

    #[test]
    fn test_derived_variable_over_pinned_dependencies() {
        let a = key("a");
        let b = key("b");
        let same = Variable::derived("same", vec![a.clone(), b.clone()], |values| {
            Ok(Value::Bool(values[0] == values[1]))
        });
        let mut builder = DeciderBuilder::new();
        builder
            .add(
                "pinned equal",
                Conditions::new().expect(&a, "1").expect(&b, "1").expect(&same, true),
            )
            .unwrap();
        builder
            .add("same", Conditions::new().expect(&same, true))
            .unwrap();

        let d = builder.build(ContextIndependentFactory::new(concat)).unwrap();
        assert_eq!(d.decide(&input(&[("a", "1"), ("b", "1")])).unwrap(), "pinned equal, same");
        assert_eq!(d.decide(&input(&[("a", "2"), ("b", "2")])).unwrap(), "same");
        assert_eq!(d.decide(&input(&[("a", "1"), ("b", "2")])).unwrap(), "");
    }

    #[test]
    fn test_tree_ceiling() {
        let mut builder = DeciderBuilder::new().with_config(DeciderConfig::new().with_max_nodes(2));
        builder.add("a1", Conditions::new().expect(&key("a"), "1")).unwrap();
        builder.add("b1", Conditions::new().expect(&key("b"), "1")).unwrap();

        let result = builder.build(ContextIndependentFactory::new(concat));
        assert!(matches!(result, Err(DecisionError::TreeTooLarge { limit: 2 })));
    }

    #[test]
    fn test_invariant_computed_once_per_leaf() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mut builder = DeciderBuilder::new();
        builder.add("a1", Conditions::new().expect(&key("a"), "1")).unwrap();

        let d = builder
            .build(ContextIndependentFactory::new(move |items: &[&str]| {
                counter.fetch_add(1, Ordering::SeqCst);
                items.len()
            }))
            .unwrap();

        assert_eq!(d.decide(&input(&[("a", "1")])).unwrap(), 1);
        assert_eq!(d.decide(&input(&[("a", "1"), ("b", "x")])).unwrap(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(d.decide(&input(&[])).unwrap(), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_builder_is_reusable() {
        let mut builder = DeciderBuilder::new();
        builder.add("a1", Conditions::new().expect(&key("a"), "1")).unwrap();
        let first = builder.build(ContextIndependentFactory::new(concat)).unwrap();

        builder.add("b1", Conditions::new().expect(&key("b"), "1")).unwrap();
        let second = builder.build(ContextIndependentFactory::new(concat)).unwrap();

        let both = input(&[("a", "1"), ("b", "1")]);
        assert_eq!(first.decide(&both).unwrap(), "a1");
        assert_eq!(second.decide(&both).unwrap(), "a1, b1");
    }

    #[test]
    fn test_tree_display() {
        let mut builder = DeciderBuilder::new();
        builder.add("a1", Conditions::new().expect(&key("a"), "1")).unwrap();
        builder.add("always", Conditions::new()).unwrap();
        let d = builder.build(ContextIndependentFactory::new(concat)).unwrap();

        let rendered = d.to_string();
        assert!(rendered.starts_with("* by a\n- \"always\"\n+ when \"1\"\n"));
    }
}
