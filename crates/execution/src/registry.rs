//! Operation registry.

use crate::editor::OperationEditor;
use crate::error::{ExecutionError, Result};
use crate::executor::PlanExecutor;
use crate::operation::Operation;
use stageplan_decision::DeciderConfig;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Named operations sharing one executor.
///
/// Operations are edited through [`edit`](Self::edit); the first edit of a
/// name registers an empty operation, so a name resolves as soon as anyone
/// has started editing it.
pub struct OperationRegistry<C, S> {
    executor: Arc<dyn PlanExecutor<C, S>>,
    config: DeciderConfig,
    operations: HashMap<String, Arc<dyn Operation<C>>>,
    editors: HashMap<String, OperationEditor<C, S>>,
}

impl<C, S> OperationRegistry<C, S>
where
    C: Send + 'static,
    S: PartialEq + Send + Sync + 'static,
{
    /// Create a registry whose operations run through `executor`.
    pub fn new(executor: Arc<dyn PlanExecutor<C, S>>) -> Self {
        Self {
            executor,
            config: DeciderConfig::default(),
            operations: HashMap::new(),
            editors: HashMap::new(),
        }
    }

    /// Set the decider configuration for operations edited from now on.
    pub fn with_decider_config(mut self, config: DeciderConfig) -> Self {
        self.config = config;
        self
    }

    /// Executor shared by the registered operations.
    pub fn executor(&self) -> Arc<dyn PlanExecutor<C, S>> {
        self.executor.clone()
    }

    /// Register an operation, replacing any previous one under `name`.
    pub fn register(&mut self, name: impl Into<String>, operation: Arc<dyn Operation<C>>) {
        self.operations.insert(name.into(), operation);
    }

    /// Operation registered under `name`.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Operation<C>>> {
        self.operations
            .get(name)
            .cloned()
            .ok_or_else(|| ExecutionError::UnknownOperation(name.to_string()))
    }

    /// Whether an operation is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.operations.contains_key(name)
    }

    /// Names of all registered operations.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.operations.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Edit the operation `name` and register the rebuilt operation.
    ///
    /// Patches added before `patch` fails stay in the editor and are picked up
    /// by the next successful edit.
    pub fn edit<F>(&mut self, name: &str, patch: F) -> Result<()>
    where
        F: FnOnce(&mut OperationEditor<C, S>) -> Result<()>,
    {
        let editor = match self.editors.entry(name.to_string()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let editor = OperationEditor::new(name, self.executor.clone())
                    .with_config(self.config.clone());
                self.operations.insert(name.to_string(), editor.flush()?);
                debug!(operation = name, "Created operation editor");
                entry.insert(editor)
            }
        };

        patch(editor)?;
        let operation = editor.flush()?;
        self.operations.insert(name.to_string(), operation);

        Ok(())
    }
}
