//! Executor configuration.

use crate::concurrent::ConcurrentExecutor;
use crate::executor::PlanExecutor;
use crate::sequential::SequentialExecutor;
use crate::stage::{CallStage, Stage};
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::runtime::Handle;

/// How the stages of a plan are scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// One stage at a time, in linear order
    #[default]
    Sequential,
    /// Independent keys run side by side
    Concurrent,
}

/// Configuration for plan executors.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Scheduling mode
    pub mode: ExecutionMode,
    /// Max stages running at once in concurrent mode (None = unbounded)
    pub max_concurrent_stages: Option<NonZeroUsize>,
}

impl ExecutorConfig {
    /// Create the default (sequential) configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the execution mode.
    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the concurrent stage limit.
    pub fn with_max_concurrent_stages(mut self, max: NonZeroUsize) -> Self {
        self.max_concurrent_stages = Some(max);
        self
    }

    /// Create an executor for [`Stage`] plans.
    ///
    /// `reducer` and `handle` are only used in concurrent mode.
    pub fn build<C, F>(&self, reducer: F, handle: Handle) -> Arc<dyn PlanExecutor<C, Stage<C>>>
    where
        C: Clone + Send + Sync + 'static,
        F: Fn(C, C) -> C + Send + Sync + 'static,
    {
        match self.mode {
            ExecutionMode::Sequential => Arc::new(SequentialExecutor::new(CallStage)),
            ExecutionMode::Concurrent => {
                let mut executor = ConcurrentExecutor::new(CallStage, reducer, handle);
                if let Some(max) = self.max_concurrent_stages {
                    executor = executor.with_max_concurrent_stages(max);
                }
                Arc::new(executor)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stageplan_order::Order;

    #[test]
    fn test_deserialize_defaults() {
        let config: ExecutorConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.mode, ExecutionMode::Sequential);
        assert!(config.max_concurrent_stages.is_none());
    }

    #[test]
    fn test_deserialize_concurrent() {
        let config: ExecutorConfig =
            serde_json::from_str(r#"{"mode": "concurrent", "max_concurrent_stages": 4}"#).unwrap();
        assert_eq!(config.mode, ExecutionMode::Concurrent);
        assert_eq!(config.max_concurrent_stages, NonZeroUsize::new(4));
    }

    #[test]
    fn test_zero_limit_is_rejected() {
        let parsed = serde_json::from_str::<ExecutorConfig>(r#"{"max_concurrent_stages": 0}"#);
        assert!(parsed.is_err());
    }

    #[tokio::test]
    async fn test_built_executors_run_plans() {
        let mut order = Order::new();
        order
            .put(
                "a",
                Stage::sync("a", |n: &mut i64| {
                    *n += 1;
                    Ok(())
                }),
            )
            .unwrap();
        order
            .put(
                "b",
                Stage::sync("b", |n: &mut i64| {
                    *n *= 10;
                    Ok(())
                }),
            )
            .unwrap();
        order.connect("a", "b").unwrap();

        for mode in [ExecutionMode::Sequential, ExecutionMode::Concurrent] {
            let executor = ExecutorConfig::new()
                .with_mode(mode)
                .build(|a: i64, b: i64| a + b, Handle::current());
            assert_eq!(executor.execute_case(&order, 1).await.unwrap(), 20);
        }
    }
}
