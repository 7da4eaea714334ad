//! Stages and stage runners.

use crate::error::StageError;
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Future returned by a stage.
pub type StageFuture<C> = BoxFuture<'static, Result<C, StageError>>;

type StageFn<C> = dyn Fn(C) -> StageFuture<C> + Send + Sync;

/// A named unit of async work on a context.
///
/// A stage owns the context while it runs and hands back the context for the
/// next stage. Clones are the same stage; two stages are equal only when one
/// is a clone of the other.
pub struct Stage<C> {
    name: Arc<str>,
    run: Arc<StageFn<C>>,
}

impl<C: Send + 'static> Stage<C> {
    /// Create a stage from an async function.
    pub fn new<F, Fut>(name: impl Into<String>, run: F) -> Self
    where
        F: Fn(C) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<C, StageError>> + Send + 'static,
    {
        Self {
            name: Arc::from(name.into()),
            run: Arc::new(move |context| run(context).boxed()),
        }
    }

    /// Create a stage that edits the context in place.
    pub fn sync<F>(name: impl Into<String>, edit: F) -> Self
    where
        F: Fn(&mut C) -> Result<(), StageError> + Send + Sync + 'static,
    {
        let edit = Arc::new(edit);
        Self::new(name, move |mut context: C| {
            let edit = edit.clone();
            async move {
                edit(&mut context)?;
                Ok(context)
            }
        })
    }
}

impl<C> Stage<C> {
    /// Stage name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run the stage.
    pub fn call(&self, context: C) -> StageFuture<C> {
        (self.run)(context)
    }
}

impl<C> Clone for Stage<C> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            run: self.run.clone(),
        }
    }
}

impl<C> PartialEq for Stage<C> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(
            Arc::as_ptr(&self.run) as *const (),
            Arc::as_ptr(&other.run) as *const (),
        )
    }
}

impl<C> fmt::Debug for Stage<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Stage").field(&self.name).finish()
    }
}

impl<C> fmt::Display for Stage<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Runs one stage of type `S` against a context.
#[async_trait]
pub trait StageRunner<S, C>: Send + Sync {
    /// Run `stage` and return the context for the next stage.
    async fn run(&self, stage: &S, context: C) -> Result<C, StageError>;
}

/// Runner for [`Stage`] values: calls the stage itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct CallStage;

#[async_trait]
impl<C: Send + 'static> StageRunner<Stage<C>, C> for CallStage {
    async fn run(&self, stage: &Stage<C>, context: C) -> Result<C, StageError> {
        stage.call(context).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_async_stage() {
        let stage = Stage::new("double", |n: i64| async move { Ok(n * 2) });
        assert_eq!(stage.call(21).await.unwrap(), 42);
        assert_eq!(stage.name(), "double");
    }

    #[tokio::test]
    async fn test_sync_stage_edits_in_place() {
        let stage = Stage::sync("push", |v: &mut Vec<&'static str>| {
            v.push("x");
            Ok(())
        });
        let out = CallStage.run(&stage, vec!["a"]).await.unwrap();
        assert_eq!(out, vec!["a", "x"]);
    }

    #[tokio::test]
    async fn test_failing_stage() {
        let stage = Stage::sync("fail", |_: &mut i64| Err(StageError::new("nope")));
        assert_eq!(stage.call(1).await.unwrap_err(), StageError::new("nope"));
    }

    #[test]
    fn test_equality_is_identity() {
        let a = Stage::sync("same", |_: &mut i64| Ok(()));
        let b = Stage::sync("same", |_: &mut i64| Ok(()));
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }
}
