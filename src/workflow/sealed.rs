//! Sealed workflows
//!
//! Sealing consumes a builder and returns a read-only [`Sealed`] handle. The
//! handle can only be run, so adding nodes after sealing does not compile:
//!
//! ```compile_fail
//! use work_tree::{Context, Step, Workflow};
//!
//! let sealed = Workflow::<()>::new().seal();
//! let _ = sealed.serial(Step::new("late", |_ctx: Context<()>| async { Ok(()) }));
//! ```
//!
//! A custom executor can wrap the default one with cross-cutting behavior:
//!
//! ```
//! use work_tree::{Context, SealOptions, Step, Workflow};
//!
//! # tokio_test::block_on(async {
//! let sealed = Workflow::new()
//!     .serial(Step::new("validate", |ctx: Context<String>| async move {
//!         Ok(!ctx.data().is_empty())
//!     }))
//!     .unwrap()
//!     .seal_with(SealOptions::new().execute(|ctx, next| async move {
//!         tracing::info!("before workflow");
//!         let result = next.execute(ctx).await;
//!         tracing::info!("after workflow");
//!         result
//!     }));
//!
//! assert!(sealed.is_sealed());
//! let result = sealed.run("user-123".to_string()).await;
//! assert!(result.is_completed());
//! # });
//! ```

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::instrument;

use super::builder::{Composite, Unit};
use super::context::Context;
use super::engine_config::EngineConfig;
use crate::engine::executor::Engine;
use crate::engine::result::RunResult;

pub(crate) type CustomExecute<D> =
    Arc<dyn Fn(Context<D>, Next<D>) -> BoxFuture<'static, RunResult<D>> + Send + Sync>;

/// Options for [`Workflow::seal_with`](crate::Workflow::seal_with)
pub struct SealOptions<D: Send + Sync + 'static> {
    execute: Option<CustomExecute<D>>,
}

impl<D: Send + Sync + 'static> Default for SealOptions<D> {
    fn default() -> Self {
        Self { execute: None }
    }
}

impl<D: Send + Sync + 'static> SealOptions<D> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the top-level executor
    ///
    /// The executor receives the run context and a [`Next`] that runs the
    /// sealed composition with the default strategy.
    pub fn execute<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Context<D>, Next<D>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = RunResult<D>> + Send + 'static,
    {
        self.execute = Some(Arc::new(move |ctx, next| f(ctx, next).boxed()));
        self
    }

    pub(crate) fn into_execute(self) -> Option<CustomExecute<D>> {
        self.execute
    }
}

/// Default executor of a sealed composition
pub struct Next<D: Send + Sync + 'static> {
    composite: Arc<Composite<D>>,
    engine: Engine,
}

impl<D: Send + Sync + 'static> Next<D> {
    pub(crate) fn new(composite: Arc<Composite<D>>, engine: Engine) -> Self {
        Self { composite, engine }
    }

    pub fn name(&self) -> &str {
        &self.composite.name
    }

    pub async fn execute(self, ctx: Context<D>) -> RunResult<D> {
        self.engine.run_composite(&self.composite, ctx).await
    }

    pub async fn run(self, data: D) -> RunResult<D> {
        self.execute(Context::new(data)).await
    }
}

/// Read-only handle over a sealed composition
pub struct Sealed<D: Send + Sync + 'static> {
    unit: Unit<D>,
    config: EngineConfig,
}

impl<D: Send + Sync + 'static> Clone for Sealed<D> {
    fn clone(&self) -> Self {
        Self {
            unit: self.unit.clone(),
            config: self.config.clone(),
        }
    }
}

impl<D: Send + Sync + 'static> Sealed<D> {
    pub(crate) fn new(unit: Unit<D>, config: EngineConfig) -> Self {
        Self { unit, config }
    }

    pub fn name(&self) -> &str {
        self.unit.name()
    }

    pub fn is_sealed(&self) -> bool {
        true
    }

    pub fn has_custom_execute(&self) -> bool {
        self.unit.custom.is_some()
    }

    /// Run against a pre-built context, through the custom executor if any
    pub async fn execute(&self, ctx: Context<D>) -> RunResult<D> {
        Engine::new(self.config.clone())
            .execute_unit(&self.unit, ctx)
            .await
    }

    /// Build a fresh context from `data` and delegate to [`Sealed::execute`]
    #[instrument(skip(self, data), fields(workflow = %self.name()))]
    pub async fn run(&self, data: D) -> RunResult<D> {
        self.execute(Context::new(data)).await
    }

    pub(crate) fn into_unit(self) -> Unit<D> {
        self.unit
    }
}
