//! Plan files.
//!
//! A plan file describes one operation over JSON documents:
//!
//! ```text
//! {
//!   "name": "fulfil",
//!   "executor": { "mode": "concurrent" },
//!   "rules": [
//!     { "when": { "express": true },
//!       "sequence": [ { "key": "pack", "append": { "field": "log", "value": "packed" } } ] }
//!   ]
//! }
//! ```
//!
//! Steps are `{key?, set: {..}}`, `{key?, append: {field, value}}`,
//! `{expect: key}` and `{par: [[step..]..]}`.

use crate::json::{append_stage, field_variable, set_stage};
use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{Map, Value as Json};
use stageplan_decision::{
    Condition, Conditions, ContextIndependentFactory, DeciderBuilder, DeciderConfig, TreeDecider,
};
use stageplan_execution::{
    sequence_patch, ExecutorConfig, OperationPlan, OperationRegistry, PlanFactory, PlanPatch, Stage,
};
use stageplan_order::{OrderError, SequenceBuilder};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

fn default_name() -> String {
    "plan".to_string()
}

/// Parsed plan file.
#[derive(Debug, Clone, Deserialize)]
pub struct PlanFile {
    /// Operation name
    #[serde(default = "default_name")]
    pub name: String,
    /// Executor settings
    #[serde(default)]
    pub executor: ExecutorConfig,
    /// Decision tree node ceiling
    #[serde(default)]
    pub max_nodes: Option<usize>,
    /// Rules of the operation
    pub rules: Vec<RuleSpec>,
}

/// One rule: the stages to add when every field matches.
#[derive(Debug, Clone, Deserialize)]
pub struct RuleSpec {
    /// Rule label
    #[serde(default)]
    pub name: Option<String>,
    /// Field values the document must have
    #[serde(default)]
    pub when: BTreeMap<String, Json>,
    /// Stages to add
    pub sequence: Vec<Step>,
}

/// One step of a rule sequence.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Step {
    /// Assign fields
    Set {
        /// Order key
        #[serde(default)]
        key: Option<String>,
        /// Fields to assign
        set: Map<String, Json>,
    },
    /// Append to an array field
    Append {
        /// Order key
        #[serde(default)]
        key: Option<String>,
        /// What to append
        append: AppendSpec,
    },
    /// Wait for a key
    Expect {
        /// Key to wait for
        expect: String,
    },
    /// Branches running side by side
    Par {
        /// Branches, each a sequence of steps
        par: Vec<Vec<Step>>,
    },
}

/// Target of an append step.
#[derive(Debug, Clone, Deserialize)]
pub struct AppendSpec {
    /// Array field
    pub field: String,
    /// Appended value
    pub value: Json,
}

enum CompiledStep {
    Run { key: Option<String>, stage: Stage<Json> },
    Expect(String),
    Par(Vec<Vec<CompiledStep>>),
}

fn compile_steps(label: &str, steps: &[Step], counter: &mut usize) -> Vec<CompiledStep> {
    steps
        .iter()
        .map(|step| {
            *counter += 1;
            let position = *counter;
            let name = |key: &Option<String>| {
                key.clone()
                    .unwrap_or_else(|| format!("{} step {}", label, position))
            };
            match step {
                Step::Set { key, set } => CompiledStep::Run {
                    key: key.clone(),
                    stage: set_stage(name(key), set.clone()),
                },
                Step::Append { key, append } => CompiledStep::Run {
                    key: key.clone(),
                    stage: append_stage(name(key), append.field.clone(), append.value.clone()),
                },
                Step::Expect { expect } => CompiledStep::Expect(expect.clone()),
                Step::Par { par } => CompiledStep::Par(
                    par.iter()
                        .map(|branch| compile_steps(label, branch, counter))
                        .collect(),
                ),
            }
        })
        .collect()
}

fn apply_steps(
    steps: &[CompiledStep],
    sequence: &mut SequenceBuilder<'_, Stage<Json>>,
) -> std::result::Result<(), OrderError> {
    for step in steps {
        match step {
            CompiledStep::Run { key: Some(key), stage } => {
                sequence.add_keyed(key.as_str(), stage.clone())?;
            }
            CompiledStep::Run { key: None, stage } => {
                sequence.add(stage.clone())?;
            }
            CompiledStep::Expect(key) => {
                sequence.expect(key.as_str())?;
            }
            CompiledStep::Par(branches) => {
                sequence.par(|par| {
                    for branch in branches {
                        par.seq(|seq| apply_steps(branch, seq))?;
                    }
                    Ok(())
                })?;
            }
        }
    }
    Ok(())
}

impl RuleSpec {
    /// Label used in logs and stage names.
    pub fn label(&self, index: usize) -> String {
        self.name.clone().unwrap_or_else(|| format!("rule {}", index))
    }

    /// Conditions on document fields.
    pub fn conditions(&self) -> Vec<Condition<Json>> {
        self.when
            .iter()
            .map(|(field, value)| Condition::new(field_variable(field), value))
            .collect()
    }

    fn compile(&self, index: usize) -> Arc<Vec<CompiledStep>> {
        let mut counter = 0;
        Arc::new(compile_steps(&self.label(index), &self.sequence, &mut counter))
    }

    fn patch(&self, index: usize) -> PlanPatch<Stage<Json>> {
        let steps = self.compile(index);
        sequence_patch(move |sequence| apply_steps(&steps, sequence))
    }
}

/// Decider listing the labels of the rules matching a document.
pub type RuleMatcher =
    TreeDecider<Json, String, ContextIndependentFactory<fn(&[String]) -> Vec<String>>>;

fn collect_labels(labels: &[String]) -> Vec<String> {
    labels.to_vec()
}

impl PlanFile {
    /// Read and parse a plan file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read plan file {}", path.display()))?;
        let plan: PlanFile = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse plan file {}", path.display()))?;

        info!(name = %plan.name, rules = plan.rules.len(), "Loaded plan file");
        Ok(plan)
    }

    /// Decider configuration for the plan.
    pub fn decider_config(&self) -> DeciderConfig {
        match self.max_nodes {
            Some(max) => DeciderConfig::new().with_max_nodes(max),
            None => DeciderConfig::new(),
        }
    }

    /// Add the rules to the operation named after the plan.
    pub fn install(&self, registry: &mut OperationRegistry<Json, Stage<Json>>) -> Result<()> {
        registry
            .edit(&self.name, |editor| {
                for (index, rule) in self.rules.iter().enumerate() {
                    let steps = rule.compile(index);
                    let conditions = Conditions::new().extend(rule.conditions());
                    editor.add(conditions, move |sequence| apply_steps(&steps, sequence))?;
                }
                Ok(())
            })
            .with_context(|| format!("Failed to install operation {}", self.name))
    }

    /// Compile the rules into an operation plan.
    pub fn operation_plan(&self) -> Result<OperationPlan<Json, Stage<Json>>> {
        let mut builder = DeciderBuilder::new().with_config(self.decider_config());
        for (index, rule) in self.rules.iter().enumerate() {
            builder.add_rule(rule.conditions(), rule.patch(index))?;
        }
        Ok(builder.build(PlanFactory)?)
    }

    /// Compile the rules into a decider naming the matching rules.
    pub fn rule_matcher(&self) -> Result<RuleMatcher> {
        let mut builder = DeciderBuilder::new().with_config(self.decider_config());
        for (index, rule) in self.rules.iter().enumerate() {
            builder.add_rule(rule.conditions(), rule.label(index))?;
        }
        let collect: fn(&[String]) -> Vec<String> = collect_labels;
        Ok(builder.build(ContextIndependentFactory::new(collect))?)
    }
}
