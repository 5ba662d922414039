//! Workflow Executor - Interprets compositions
//!
//! The engine walks a composition and:
//! 1. Applies the skip protocol before every step, nested workflow and tree
//! 2. Runs serial nodes one at a time, stopping at the first failure
//! 3. Runs parallel members concurrently and waits for all of them
//! 4. Records one WorkResult per named node into the run context
//! 5. Computes the final run status from the root's own result

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::future::{join_all, BoxFuture};
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::engine::error::WorkError;
use crate::engine::result::{RunResult, WorkResult, WorkflowStatus};
use crate::workflow::builder::{Composite, Node, ParallelGroup, Unit};
use crate::workflow::context::{Context, WorkResults};
use crate::workflow::engine_config::{EngineConfig, ResultOrder};
use crate::workflow::sealed::Next;
use crate::workflow::step::Work;

/// Entries a node records into its enclosing level, the node's own entry last
type Recorded = Vec<(String, WorkResult)>;

#[derive(Debug, Clone, Default)]
pub struct Engine {
    config: Arc<EngineConfig>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run a unit through its custom executor, or the default one
    pub(crate) fn execute_unit<'a, D: Send + Sync + 'static>(
        &'a self,
        unit: &'a Unit<D>,
        ctx: Context<D>,
    ) -> BoxFuture<'a, RunResult<D>> {
        async move {
            match &unit.custom {
                Some(custom) => {
                    debug!(workflow = %unit.name(), "Using custom executor");
                    let started_at = Utc::now();
                    let started = Instant::now();
                    let fallback = ctx.clone();
                    let next = Next::new(Arc::clone(&unit.composite), self.clone());
                    match self
                        .guarded(unit.name(), async move { custom(ctx, next).await })
                        .await
                    {
                        Ok(run) => run,
                        Err(e) => {
                            error!("Custom executor of {} panicked: {}", unit.name(), e);
                            failed_run(unit.name(), fallback, e, started, started_at)
                        }
                    }
                }
                None => self.run_composite(&unit.composite, ctx).await,
            }
        }
        .boxed()
    }

    /// Default strategy: gate, serial chain, root entry
    pub(crate) fn run_composite<'a, D: Send + Sync + 'static>(
        &'a self,
        composite: &'a Composite<D>,
        mut ctx: Context<D>,
    ) -> BoxFuture<'a, RunResult<D>> {
        let span = info_span!("workflow", workflow = %composite.name, run_id = %ctx.run_id());
        async move {
            let started_at = Utc::now();
            let started = Instant::now();
            info!("Starting workflow: {}", composite.name);

            let gate = self
                .guarded(&composite.name, composite.gate.should_run(&ctx))
                .await;
            let own = match gate {
                Ok(true) => match self.run_serial(&composite.nodes, &mut ctx).await {
                    Ok(()) => WorkResult::completed(
                        ctx.work_results().result_map(),
                        started.elapsed(),
                    ),
                    Err(e) => WorkResult::failed(e, started.elapsed()),
                },
                Ok(false) => {
                    info!("Skipping workflow {} (should_run returned false)", composite.name);
                    self.skip(&composite.name, composite.gate.on_skipped(&ctx))
                        .await
                }
                Err(e) => {
                    error!("Gate of workflow {} panicked: {}", composite.name, e);
                    WorkResult::failed(e, started.elapsed())
                }
            };

            let mut error = own.error.clone();
            self.trace_result(&composite.name, &own);
            if let Err(e) = ctx.record(&composite.name, own) {
                error.get_or_insert(e);
            }

            let status = if error.is_some() {
                WorkflowStatus::Failed
            } else {
                WorkflowStatus::Completed
            };
            let total_duration = started.elapsed();

            match &error {
                Some(e) => error!(
                    "Workflow {} failed after {:?}: {}",
                    composite.name, total_duration, e
                ),
                None => info!(
                    "Workflow {} completed in {:?}",
                    composite.name, total_duration
                ),
            }

            RunResult {
                status,
                context: ctx,
                total_duration,
                error,
                started_at,
            }
        }
        .instrument(span)
        .boxed()
    }

    /// Run nodes in order, recording as they settle. Stops at the first failure.
    async fn run_serial<D: Send + Sync + 'static>(
        &self,
        nodes: &[Node<D>],
        ctx: &mut Context<D>,
    ) -> Result<(), WorkError> {
        for node in nodes {
            let recorded = self.run_node(node, ctx).await;
            let mut failure = recorded.last().and_then(|(_, r)| r.error.clone());

            for (name, result) in recorded {
                self.trace_result(&name, &result);
                if let Err(e) = ctx.record(&name, result) {
                    warn!("Result of {} was not recorded: {}", name, e);
                    failure.get_or_insert(e);
                }
            }

            if let Some(e) = failure {
                debug!("Stopping serial chain at {}", node.name());
                return Err(e);
            }
        }
        Ok(())
    }

    fn run_node<'a, D: Send + Sync + 'static>(
        &'a self,
        node: &'a Node<D>,
        ctx: &'a Context<D>,
    ) -> BoxFuture<'a, Recorded> {
        async move {
            match node {
                Node::Step(work) => {
                    let result = self.run_step(work.as_ref(), ctx).await;
                    vec![(work.name().to_string(), result)]
                }
                Node::Unit(unit) => {
                    let result = self.run_nested(unit, ctx).await;
                    vec![(unit.name().to_string(), result)]
                }
                Node::Parallel(group) => self.run_parallel(group, ctx).await,
            }
        }
        .boxed()
    }

    async fn run_step<D: Send + Sync + 'static>(
        &self,
        work: &dyn Work<D>,
        ctx: &Context<D>,
    ) -> WorkResult {
        let name = work.name();

        match self.guarded(name, work.should_run(ctx)).await {
            Ok(true) => {}
            Ok(false) => {
                info!("Skipping step {} (should_run returned false)", name);
                return self.skip(name, work.on_skipped(ctx)).await;
            }
            Err(e) => {
                error!("Gate of step {} panicked: {}", name, e);
                return WorkResult::failed(e, Duration::ZERO);
            }
        }

        debug!("Executing step: {}", name);
        let started = Instant::now();
        let outcome = match self.guarded(name, work.execute(ctx)).await {
            Ok(outcome) => outcome.map_err(|e| WorkError::execution(name, e)),
            Err(e) => Err(e),
        };
        let duration = started.elapsed();

        match outcome {
            Ok(value) => {
                debug!("Step {} completed in {:?}", name, duration);
                WorkResult::completed(value, duration)
            }
            Err(e) => {
                error!("Step '{}' failed: {}", name, e);
                WorkResult::failed(e, duration)
            }
        }
    }

    /// Run a nested unit on a scoped context and fold its run into one WorkResult
    async fn run_nested<D: Send + Sync + 'static>(
        &self,
        unit: &Unit<D>,
        ctx: &Context<D>,
    ) -> WorkResult {
        let name = unit.name();
        let run = self.execute_unit(unit, ctx.scoped()).await;

        let mut own = None;
        let mut children = WorkResults::new();
        for (entry, result) in run.context.into_work_results() {
            if entry == name && own.is_none() {
                own = Some(result);
            } else if let Err(e) = children.insert(entry, result) {
                warn!("Dropping duplicate result inside {}: {}", name, e);
            }
        }

        let own = match (run.status, own) {
            (WorkflowStatus::Failed, own) => {
                let error = run
                    .error
                    .or_else(|| own.and_then(|r| r.error))
                    .unwrap_or_else(|| {
                        WorkError::execution(name, anyhow::anyhow!("nested run failed"))
                    });
                WorkResult::failed(error, run.total_duration)
            }
            (WorkflowStatus::Completed, Some(own)) => own,
            (WorkflowStatus::Completed, None) => {
                WorkResult::completed(children.result_map(), run.total_duration)
            }
        };

        own.with_children(children)
    }

    /// Launch every member, wait for all of them, then build the group's entry
    async fn run_parallel<D: Send + Sync + 'static>(
        &self,
        group: &ParallelGroup<D>,
        ctx: &Context<D>,
    ) -> Recorded {
        info!(
            "Starting parallel group {} ({} members)",
            group.name,
            group.members.len()
        );
        let started = Instant::now();
        let launched = group.members.iter().map(|member| self.run_node(member, ctx));

        let settled: Vec<Recorded> = match self.config.parallel_order {
            ResultOrder::Registration => join_all(launched).await,
            ResultOrder::Completion => {
                let mut pending: FuturesUnordered<_> = launched.collect();
                let mut settled = Vec::with_capacity(group.members.len());
                while let Some(recorded) = pending.next().await {
                    settled.push(recorded);
                }
                settled
            }
        };

        let mut members = WorkResults::new();
        let mut failures = Vec::new();
        for recorded in settled {
            if let Some(e) = recorded.last().and_then(|(_, r)| r.error.clone()) {
                failures.push(e);
            }
            for (name, result) in recorded {
                if let Err(e) = members.insert(name, result) {
                    failures.push(e);
                }
            }
        }

        let duration = started.elapsed();
        let own = if failures.is_empty() {
            debug!("Parallel group {} completed in {:?}", group.name, duration);
            WorkResult::completed(members.result_map(), duration)
        } else {
            error!(
                "Parallel group {} failed: {} member(s) failed",
                group.name,
                failures.len()
            );
            WorkResult::failed(
                WorkError::Parallel {
                    group: group.name.clone(),
                    failures,
                },
                duration,
            )
        };

        let mut recorded: Recorded = members
            .iter()
            .map(|(name, result)| (name.to_string(), result.clone()))
            .collect();
        recorded.push((group.name.clone(), own.with_children(members)));
        recorded
    }

    /// Invoke a skip hook and turn its outcome into the node's WorkResult
    async fn skip<F>(&self, name: &str, hook: F) -> WorkResult
    where
        F: Future<Output = anyhow::Result<()>>,
    {
        match self.guarded(name, hook).await {
            Ok(Ok(())) => WorkResult::skipped(),
            Ok(Err(e)) => {
                warn!("Skip hook of {} failed: {:#}", name, e);
                WorkResult::failed(WorkError::skip_hook(name, e), Duration::ZERO)
            }
            Err(e) => {
                warn!("Skip hook of {} panicked: {}", name, e);
                WorkResult::failed(e, Duration::ZERO)
            }
        }
    }

    /// Await user code, turning a panic into `WorkError::Panicked` when
    /// `catch_panics` is on
    async fn guarded<T, F>(&self, work: &str, fut: F) -> Result<T, WorkError>
    where
        F: Future<Output = T>,
    {
        if !self.config.catch_panics {
            return Ok(fut.await);
        }
        AssertUnwindSafe(fut)
            .catch_unwind()
            .await
            .map_err(|panic| WorkError::Panicked {
                work: work.to_string(),
                message: panic_message(panic.as_ref()),
            })
    }

    fn trace_result(&self, name: &str, result: &WorkResult) {
        if !self.config.trace_results {
            return;
        }
        match serde_json::to_string(result) {
            Ok(json) => debug!(work = %name, result = %json, "Recorded result"),
            Err(e) => warn!(work = %name, error = %e, "Could not serialize recorded result"),
        }
    }
}

/// Run result for a unit whose custom executor panicked
fn failed_run<D>(
    name: &str,
    mut ctx: Context<D>,
    error: WorkError,
    started: Instant,
    started_at: DateTime<Utc>,
) -> RunResult<D> {
    let total_duration = started.elapsed();
    if let Err(e) = ctx.record(name, WorkResult::failed(error.clone(), total_duration)) {
        warn!("Result of {} was not recorded: {}", name, e);
    }
    RunResult {
        status: WorkflowStatus::Failed,
        context: ctx,
        total_duration,
        error: Some(error),
        started_at,
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_message() {
        let boxed: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(boxed.as_ref()), "boom");

        let boxed: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(boxed.as_ref()), "bang");

        let boxed: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(boxed.as_ref()), "unknown panic");
    }

    #[test]
    fn test_engine_uses_given_config() {
        let engine = Engine::new(EngineConfig::default().catch_panics(false));
        assert!(!engine.config().catch_panics);
    }

    #[tokio::test]
    async fn test_guarded_reports_panics() {
        let engine = Engine::default();

        let ok = engine.guarded("calm", async { 5 }).await;
        assert_eq!(ok.unwrap(), 5);

        let err = engine
            .guarded("loud", async {
                if true {
                    panic!("gate boom");
                }
                5
            })
            .await
            .unwrap_err();
        match err {
            WorkError::Panicked { work, message } => {
                assert_eq!(work, "loud");
                assert_eq!(message, "gate boom");
            }
            other => panic!("expected a panic error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_traced_results_are_recorded_unchanged() {
        let workflow = crate::Workflow::new()
            .with_config(EngineConfig::default().trace_results(true))
            .serial(crate::Step::new("a", |_ctx: Context<()>| async {
                Ok(serde_json::json!({ "n": 1 }))
            }))
            .unwrap();

        let result = workflow.run(()).await;

        assert!(result.is_completed());
        assert_eq!(result.result("a"), Some(&serde_json::json!({ "n": 1 })));
    }
}
