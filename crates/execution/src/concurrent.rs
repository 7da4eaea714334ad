//! Concurrent plan execution.
//!
//! Every key of the plan gets its own task. A task waits for the tasks of
//! the keys it depends on, merges their contexts with the reducer, then runs
//! its own stages one after another. Keys without a path between them run
//! side by side.

use crate::error::{ExecutionError, Result};
use crate::executor::{PlanExecutor, Reducer};
use crate::stage::StageRunner;
use async_trait::async_trait;
use futures::future::{join_all, BoxFuture, Shared};
use futures::FutureExt;
use stageplan_order::{Key, Order};
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

type TaskFuture<C> = Shared<BoxFuture<'static, Result<C>>>;

/// Runs independent parts of a plan concurrently on a tokio runtime.
///
/// Failure policy: a failing stage fails the task of its key, every key
/// depending on it fails with [`ExecutionError::DependencyFailed`] without
/// running its stages, and keys not depending on it still run to the end.
/// The overall result is the first failure among the keys nothing depends
/// on, in the order the keys were created.
pub struct ConcurrentExecutor<C, R> {
    runner: Arc<R>,
    reducer: Reducer<C>,
    handle: Handle,
    stage_limit: Option<Arc<Semaphore>>,
}

impl<C, R> ConcurrentExecutor<C, R> {
    /// Create an executor spawning tasks on `handle`.
    pub fn new<F>(runner: R, reducer: F, handle: Handle) -> Self
    where
        F: Fn(C, C) -> C + Send + Sync + 'static,
    {
        Self {
            runner: Arc::new(runner),
            reducer: Arc::new(reducer),
            handle,
            stage_limit: None,
        }
    }

    /// Limit how many stages may run at the same time.
    pub fn with_max_concurrent_stages(mut self, max: NonZeroUsize) -> Self {
        self.stage_limit = Some(Arc::new(Semaphore::new(max.get())));
        self
    }

    fn spawn_task<S>(
        &self,
        key: Key,
        stages: Vec<S>,
        dependencies: Vec<(Key, TaskFuture<C>)>,
        input: C,
    ) -> TaskFuture<C>
    where
        C: Clone + Send + Sync + 'static,
        S: Send + Sync + 'static,
        R: StageRunner<S, C> + 'static,
    {
        let task = KeyTask {
            key: key.clone(),
            stages,
            dependencies,
            input,
            runner: self.runner.clone(),
            reducer: self.reducer.clone(),
            limit: self.stage_limit.clone(),
        };
        let handle = self.handle.spawn(task.run());

        async move {
            handle.await.unwrap_or_else(|e| {
                Err(ExecutionError::TaskAborted {
                    key,
                    message: e.to_string(),
                })
            })
        }
        .boxed()
        .shared()
    }
}

/// Work of one key: merge the dependency contexts, then run the stages.
struct KeyTask<C, S, R> {
    key: Key,
    stages: Vec<S>,
    dependencies: Vec<(Key, TaskFuture<C>)>,
    input: C,
    runner: Arc<R>,
    reducer: Reducer<C>,
    limit: Option<Arc<Semaphore>>,
}

impl<C, S, R> KeyTask<C, S, R>
where
    C: Clone + Send + Sync + 'static,
    S: Send + Sync + 'static,
    R: StageRunner<S, C> + 'static,
{
    async fn run(self) -> Result<C> {
        let KeyTask {
            key,
            stages,
            dependencies,
            input,
            runner,
            reducer,
            limit,
        } = self;

        let outputs = join_all(
            dependencies
                .into_iter()
                .map(|(dependency, task)| async move { (dependency, task.await) }),
        )
        .await;

        let mut merged: Option<C> = None;
        for (dependency, output) in outputs {
            match output {
                Ok(context) => {
                    merged = Some(match merged.take() {
                        Some(acc) => reducer(acc, context),
                        None => context,
                    });
                }
                Err(source) => {
                    debug!(key = %key, dependency = %dependency, "Skipping stages");
                    return Err(ExecutionError::DependencyFailed {
                        key,
                        dependency,
                        source: Box::new(source),
                    });
                }
            }
        }

        let mut context = merged.unwrap_or(input);
        for stage in &stages {
            let _permit = match &limit {
                Some(semaphore) => Some(semaphore.acquire().await.map_err(|e| {
                    ExecutionError::TaskAborted {
                        key: key.clone(),
                        message: e.to_string(),
                    }
                })?),
                None => None,
            };

            debug!(key = %key, "Running stage");
            context = runner.run(stage, context).await.map_err(|source| {
                warn!(key = %key, error = %source, "Stage failed");
                ExecutionError::StageFailed {
                    key: key.clone(),
                    source,
                }
            })?;
        }

        Ok(context)
    }
}

#[async_trait]
impl<C, S, R> PlanExecutor<C, S> for ConcurrentExecutor<C, R>
where
    C: Clone + Send + Sync + 'static,
    S: Clone + Send + Sync + 'static,
    R: StageRunner<S, C> + 'static,
{
    async fn execute_case(&self, order: &Order<S>, context: C) -> Result<C> {
        let terminals = order.visit(|key, stages, dependencies: Vec<(Key, TaskFuture<C>)>| {
            let task = self.spawn_task(key.clone(), stages.to_vec(), dependencies, context.clone());
            (key.clone(), task)
        })?;

        debug!(tasks = order.node_count(), terminals = terminals.len(), "Spawned plan tasks");

        let outputs = join_all(terminals.into_iter().map(|(_, task)| task)).await;

        let mut merged: Option<C> = None;
        for output in outputs {
            let output = output?;
            merged = Some(match merged.take() {
                Some(acc) => (self.reducer)(acc, output),
                None => output,
            });
        }

        Ok(merged.unwrap_or(context))
    }
}
