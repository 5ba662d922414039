//! Steps and their gating hooks
//!
//! A step is anything implementing [`Work`]. Most steps are built from
//! closures with [`Step::new`]; types that carry their own state can
//! implement [`Work`] directly and be composed with [`Node::work`].
//!
//! [`Node::work`]: crate::workflow::Node::work

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Serialize;
use serde_json::Value;

use super::context::Context;

/// A named unit of asynchronous work
///
/// # Example
///
/// ```
/// use async_trait::async_trait;
/// use serde_json::{json, Value};
/// use work_tree::{Context, Work};
///
/// struct Greet;
///
/// #[async_trait]
/// impl Work<String> for Greet {
///     fn name(&self) -> &str {
///         "greet"
///     }
///
///     async fn execute(&self, ctx: &Context<String>) -> anyhow::Result<Value> {
///         Ok(json!(format!("hello {}", ctx.data())))
///     }
/// }
/// ```
#[async_trait]
pub trait Work<D: Send + Sync + 'static>: Send + Sync {
    /// Name the result is recorded under
    fn name(&self) -> &str;

    /// Perform the work. The returned value becomes the node's result.
    async fn execute(&self, ctx: &Context<D>) -> anyhow::Result<Value>;

    /// Whether the work should run for this context
    async fn should_run(&self, _ctx: &Context<D>) -> bool {
        true
    }

    /// Called when `should_run` returned false
    async fn on_skipped(&self, _ctx: &Context<D>) -> anyhow::Result<()> {
        Ok(())
    }
}

type ExecuteFn<D> =
    Arc<dyn Fn(Context<D>) -> BoxFuture<'static, anyhow::Result<Value>> + Send + Sync>;

enum Predicate<D> {
    Sync(Arc<dyn Fn(&Context<D>) -> bool + Send + Sync>),
    Async(Arc<dyn Fn(Context<D>) -> BoxFuture<'static, bool> + Send + Sync>),
}

enum SkipHook<D> {
    Sync(Arc<dyn Fn(&Context<D>) -> anyhow::Result<()> + Send + Sync>),
    Async(Arc<dyn Fn(Context<D>) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>),
}

impl<D> Clone for Predicate<D> {
    fn clone(&self) -> Self {
        match self {
            Predicate::Sync(f) => Predicate::Sync(Arc::clone(f)),
            Predicate::Async(f) => Predicate::Async(Arc::clone(f)),
        }
    }
}

impl<D> Clone for SkipHook<D> {
    fn clone(&self) -> Self {
        match self {
            SkipHook::Sync(f) => SkipHook::Sync(Arc::clone(f)),
            SkipHook::Async(f) => SkipHook::Async(Arc::clone(f)),
        }
    }
}

/// Optional `should_run` / `on_skipped` pair
///
/// An empty gate always runs and does nothing on skip.
pub struct Gate<D> {
    should_run: Option<Predicate<D>>,
    on_skipped: Option<SkipHook<D>>,
}

impl<D> Default for Gate<D> {
    fn default() -> Self {
        Self {
            should_run: None,
            on_skipped: None,
        }
    }
}

impl<D> Clone for Gate<D> {
    fn clone(&self) -> Self {
        Self {
            should_run: self.should_run.clone(),
            on_skipped: self.on_skipped.clone(),
        }
    }
}

impl<D: Send + Sync + 'static> Gate<D> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_should_run(&self) -> bool {
        self.should_run.is_some()
    }

    pub fn has_on_skipped(&self) -> bool {
        self.on_skipped.is_some()
    }

    pub fn set_should_run<F>(&mut self, f: F)
    where
        F: Fn(&Context<D>) -> bool + Send + Sync + 'static,
    {
        self.should_run = Some(Predicate::Sync(Arc::new(f)));
    }

    pub fn set_should_run_async<F, Fut>(&mut self, f: F)
    where
        F: Fn(Context<D>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        self.should_run = Some(Predicate::Async(Arc::new(move |ctx| f(ctx).boxed())));
    }

    pub fn set_on_skipped<F>(&mut self, f: F)
    where
        F: Fn(&Context<D>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.on_skipped = Some(SkipHook::Sync(Arc::new(f)));
    }

    pub fn set_on_skipped_async<F, Fut>(&mut self, f: F)
    where
        F: Fn(Context<D>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.on_skipped = Some(SkipHook::Async(Arc::new(move |ctx| f(ctx).boxed())));
    }

    /// Evaluate `should_run`, defaulting to true
    pub async fn should_run(&self, ctx: &Context<D>) -> bool {
        match &self.should_run {
            None => true,
            Some(Predicate::Sync(f)) => f(ctx),
            Some(Predicate::Async(f)) => f(ctx.clone()).await,
        }
    }

    /// Invoke `on_skipped` if present
    pub async fn on_skipped(&self, ctx: &Context<D>) -> anyhow::Result<()> {
        match &self.on_skipped {
            None => Ok(()),
            Some(SkipHook::Sync(f)) => f(ctx),
            Some(SkipHook::Async(f)) => f(ctx.clone()).await,
        }
    }
}

/// Closure-backed step
pub struct Step<D> {
    name: String,
    execute: ExecuteFn<D>,
    gate: Gate<D>,
}

impl<D> Clone for Step<D> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            execute: Arc::clone(&self.execute),
            gate: self.gate.clone(),
        }
    }
}

impl<D: Send + Sync + 'static> Step<D> {
    /// Create a step from an async executor
    ///
    /// The executor receives its own clone of the context. Any serializable
    /// value it returns is recorded as the step's result.
    pub fn new<F, Fut, R>(name: impl Into<String>, execute: F) -> Self
    where
        F: Fn(Context<D>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
        R: Serialize + Send + 'static,
    {
        let name = name.into();
        let step_name = name.clone();
        let execute: ExecuteFn<D> = Arc::new(move |ctx| {
            let fut = execute(ctx);
            let step_name = step_name.clone();
            async move {
                let output = fut.await?;
                serde_json::to_value(output).map_err(|e| {
                    anyhow::Error::new(e)
                        .context(format!("failed to serialize result of '{}'", step_name))
                })
            }
            .boxed()
        });

        Self {
            name,
            execute,
            gate: Gate::new(),
        }
    }

    pub fn should_run<F>(mut self, f: F) -> Self
    where
        F: Fn(&Context<D>) -> bool + Send + Sync + 'static,
    {
        self.gate.set_should_run(f);
        self
    }

    pub fn should_run_async<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Context<D>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        self.gate.set_should_run_async(f);
        self
    }

    pub fn on_skipped<F>(mut self, f: F) -> Self
    where
        F: Fn(&Context<D>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.gate.set_on_skipped(f);
        self
    }

    pub fn on_skipped_async<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Context<D>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.gate.set_on_skipped_async(f);
        self
    }
}

#[async_trait]
impl<D: Send + Sync + 'static> Work<D> for Step<D> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &Context<D>) -> anyhow::Result<Value> {
        (self.execute)(ctx.clone()).await
    }

    async fn should_run(&self, ctx: &Context<D>) -> bool {
        self.gate.should_run(ctx).await
    }

    async fn on_skipped(&self, ctx: &Context<D>) -> anyhow::Result<()> {
        self.gate.on_skipped(ctx).await
    }
}
