//! Composition builders
//!
//! A [`Workflow`] is an ordered chain of nodes. Each node is a step, a nested
//! workflow or tree, or a parallel group whose members run concurrently.
//! A [`Tree`] is a named workflow with its own `should_run`/`on_skipped`
//! gate covering the whole composition.
//!
//! Builders are consumed by [`Workflow::seal`]/[`Tree::seal`], which return a
//! [`Sealed`] handle with no composition methods.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use tracing::instrument;

use super::context::Context;
use super::engine_config::EngineConfig;
use super::sealed::{CustomExecute, SealOptions, Sealed};
use super::step::{Gate, Step, Work};
use crate::engine::error::CompositionError;
use crate::engine::executor::Engine;
use crate::engine::result::RunResult;

/// One entry of a composition
pub enum Node<D: Send + Sync + 'static> {
    Step(Arc<dyn Work<D>>),
    Unit(Unit<D>),
    Parallel(ParallelGroup<D>),
}

impl<D: Send + Sync + 'static> Node<D> {
    /// Wrap any [`Work`] implementation as a step node
    pub fn work(work: impl Work<D> + 'static) -> Self {
        Node::Step(Arc::new(work))
    }

    pub fn name(&self) -> &str {
        match self {
            Node::Step(work) => work.name(),
            Node::Unit(unit) => unit.name(),
            Node::Parallel(group) => &group.name,
        }
    }

    /// Every name this node records into its enclosing level
    fn recorded_names(&self) -> Vec<&str> {
        match self {
            Node::Parallel(group) => group
                .members
                .iter()
                .flat_map(|member| member.recorded_names())
                .chain(std::iter::once(group.name.as_str()))
                .collect(),
            _ => vec![self.name()],
        }
    }

    /// Names the caller chose, leaving out unnamed workflows and groups
    fn explicit_names(&self) -> Vec<&str> {
        match self {
            Node::Step(work) => vec![work.name()],
            Node::Unit(unit) if unit.composite.auto_named => Vec::new(),
            Node::Unit(unit) => vec![unit.name()],
            Node::Parallel(group) => {
                let mut names: Vec<&str> = group
                    .members
                    .iter()
                    .flat_map(|member| member.explicit_names())
                    .collect();
                if !group.auto_named {
                    names.push(&group.name);
                }
                names
            }
        }
    }

    /// Give unnamed workflows and groups the first free `<prefix>-<n>`
    fn assign_names(&mut self, reserved: &mut HashSet<String>) {
        match self {
            Node::Step(_) => {}
            Node::Unit(unit) => {
                if unit.composite.auto_named {
                    let name = free_name("workflow", reserved);
                    let composite = Arc::make_mut(&mut unit.composite);
                    composite.name = name;
                    composite.auto_named = false;
                }
            }
            Node::Parallel(group) => {
                for member in &mut group.members {
                    member.assign_names(reserved);
                }
                if group.auto_named {
                    group.name = free_name("parallel", reserved);
                    group.auto_named = false;
                }
            }
        }
    }
}

fn free_name(prefix: &str, reserved: &mut HashSet<String>) -> String {
    let mut n = 1;
    loop {
        let name = format!("{}-{}", prefix, n);
        if reserved.insert(name.clone()) {
            return name;
        }
        n += 1;
    }
}

impl<D: Send + Sync + 'static> Clone for Node<D> {
    fn clone(&self) -> Self {
        match self {
            Node::Step(work) => Node::Step(Arc::clone(work)),
            Node::Unit(unit) => Node::Unit(unit.clone()),
            Node::Parallel(group) => Node::Parallel(group.clone()),
        }
    }
}

impl<D: Send + Sync + 'static> From<Step<D>> for Node<D> {
    fn from(step: Step<D>) -> Self {
        Node::Step(Arc::new(step))
    }
}

impl<D: Send + Sync + 'static> From<Arc<dyn Work<D>>> for Node<D> {
    fn from(work: Arc<dyn Work<D>>) -> Self {
        Node::Step(work)
    }
}

impl<D: Send + Sync + 'static> From<Workflow<D>> for Node<D> {
    fn from(workflow: Workflow<D>) -> Self {
        Node::Unit(Unit {
            composite: workflow.composite,
            custom: None,
        })
    }
}

impl<D: Send + Sync + 'static> From<Tree<D>> for Node<D> {
    fn from(tree: Tree<D>) -> Self {
        Node::from(tree.workflow)
    }
}

impl<D: Send + Sync + 'static> From<Sealed<D>> for Node<D> {
    fn from(sealed: Sealed<D>) -> Self {
        Node::Unit(sealed.into_unit())
    }
}

/// Members that run concurrently against the same context
///
/// The group records each member's result, then its own result, which is
/// `Failed` if any member failed.
pub struct ParallelGroup<D: Send + Sync + 'static> {
    pub(crate) name: String,
    pub(crate) members: Vec<Node<D>>,
    auto_named: bool,
}

impl<D: Send + Sync + 'static> Clone for ParallelGroup<D> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            members: self.members.clone(),
            auto_named: self.auto_named,
        }
    }
}

impl<D: Send + Sync + 'static> ParallelGroup<D> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn members(&self) -> &[Node<D>] {
        &self.members
    }
}

/// Frozen composition shared by builders, sealed handles and nested nodes
pub(crate) struct Composite<D: Send + Sync + 'static> {
    pub(crate) name: String,
    pub(crate) nodes: Vec<Node<D>>,
    pub(crate) gate: Gate<D>,
    /// Created by `Workflow::new`, renamed when nested
    auto_named: bool,
}

impl<D: Send + Sync + 'static> Clone for Composite<D> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            nodes: self.nodes.clone(),
            gate: self.gate.clone(),
            auto_named: self.auto_named,
        }
    }
}

impl<D: Send + Sync + 'static> Composite<D> {
    fn new(name: String, auto_named: bool) -> Self {
        Self {
            name,
            nodes: Vec::new(),
            gate: Gate::new(),
            auto_named,
        }
    }

    fn push(&mut self, mut node: Node<D>) -> Result<(), CompositionError> {
        let mut taken: HashSet<String> = self
            .nodes
            .iter()
            .flat_map(|n| n.recorded_names())
            .map(str::to_string)
            .collect();
        taken.insert(self.name.clone());

        let mut reserved = taken.clone();
        reserved.extend(node.explicit_names().into_iter().map(str::to_string));
        node.assign_names(&mut reserved);

        if let Node::Parallel(group) = &node {
            if group.members.is_empty() {
                return Err(CompositionError::EmptyGroup {
                    name: group.name.clone(),
                });
            }
        }

        for name in node.recorded_names() {
            if name.is_empty() {
                return Err(CompositionError::EmptyName {
                    scope: self.name.clone(),
                });
            }
            if !taken.insert(name.to_string()) {
                return Err(CompositionError::DuplicateName {
                    name: name.to_string(),
                    scope: self.name.clone(),
                });
            }
        }

        self.nodes.push(node);
        Ok(())
    }
}

/// A composition as it appears inside another one
pub struct Unit<D: Send + Sync + 'static> {
    pub(crate) composite: Arc<Composite<D>>,
    pub(crate) custom: Option<CustomExecute<D>>,
}

impl<D: Send + Sync + 'static> Clone for Unit<D> {
    fn clone(&self) -> Self {
        Self {
            composite: Arc::clone(&self.composite),
            custom: self.custom.clone(),
        }
    }
}

impl<D: Send + Sync + 'static> Unit<D> {
    pub fn name(&self) -> &str {
        &self.composite.name
    }
}

/// Mutable composition builder
pub struct Workflow<D: Send + Sync + 'static> {
    composite: Arc<Composite<D>>,
    config: EngineConfig,
}

impl<D: Send + Sync + 'static> Clone for Workflow<D> {
    fn clone(&self) -> Self {
        Self {
            composite: Arc::clone(&self.composite),
            config: self.config.clone(),
        }
    }
}

impl<D: Send + Sync + 'static> Default for Workflow<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: Send + Sync + 'static> Workflow<D> {
    /// Create an empty workflow named `workflow`
    ///
    /// When nested, an unnamed workflow is recorded as `workflow-<n>`, the
    /// first such name free at that level.
    pub fn new() -> Self {
        Self::from_composite(Composite::new("workflow".to_string(), true))
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self::from_composite(Composite::new(name.into(), false))
    }

    fn from_composite(composite: Composite<D>) -> Self {
        Self {
            composite: Arc::new(composite),
            config: EngineConfig::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.composite.name
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Number of top-level nodes
    pub fn len(&self) -> usize {
        self.composite.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.composite.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[Node<D>] {
        &self.composite.nodes
    }

    /// Append a node to the sequential chain
    pub fn serial(mut self, node: impl Into<Node<D>>) -> Result<Self, CompositionError> {
        Arc::make_mut(&mut self.composite).push(node.into())?;
        Ok(self)
    }

    /// Append a parallel group named `parallel-<n>`, the first such name
    /// free at this level
    pub fn parallel<I, N>(self, members: I) -> Result<Self, CompositionError>
    where
        I: IntoIterator<Item = N>,
        N: Into<Node<D>>,
    {
        self.push_group(String::new(), true, members)
    }

    /// Append a parallel group with an explicit name
    pub fn parallel_named<I, N>(
        self,
        name: impl Into<String>,
        members: I,
    ) -> Result<Self, CompositionError>
    where
        I: IntoIterator<Item = N>,
        N: Into<Node<D>>,
    {
        self.push_group(name.into(), false, members)
    }

    fn push_group<I, N>(
        mut self,
        name: String,
        auto_named: bool,
        members: I,
    ) -> Result<Self, CompositionError>
    where
        I: IntoIterator<Item = N>,
        N: Into<Node<D>>,
    {
        let group = ParallelGroup {
            name,
            members: members.into_iter().map(Into::into).collect(),
            auto_named,
        };
        Arc::make_mut(&mut self.composite).push(Node::Parallel(group))?;
        Ok(self)
    }

    pub fn is_sealed(&self) -> bool {
        false
    }

    /// Freeze the composition with the default executor
    pub fn seal(self) -> Sealed<D> {
        self.seal_with(SealOptions::default())
    }

    /// Freeze the composition, optionally replacing its top-level executor
    pub fn seal_with(self, options: SealOptions<D>) -> Sealed<D> {
        Sealed::new(
            Unit {
                composite: self.composite,
                custom: options.into_execute(),
            },
            self.config,
        )
    }

    /// Run against fresh input data
    #[instrument(skip(self, data), fields(workflow = %self.name()))]
    pub async fn run(&self, data: D) -> RunResult<D> {
        self.execute(Context::new(data)).await
    }

    /// Run against a pre-built context
    pub async fn execute(&self, ctx: Context<D>) -> RunResult<D> {
        Engine::new(self.config.clone())
            .run_composite(&self.composite, ctx)
            .await
    }

    pub(crate) fn gate_mut(&mut self) -> &mut Gate<D> {
        &mut Arc::make_mut(&mut self.composite).gate
    }

    pub(crate) fn gate(&self) -> &Gate<D> {
        &self.composite.gate
    }
}

/// Named root composition with its own gate
///
/// # Example
///
/// ```
/// use serde_json::json;
/// use work_tree::{Context, Step, Tree, WorkStatus};
///
/// # tokio_test::block_on(async {
/// let tree = Tree::new("maintenance")
///     .should_run(|ctx: &Context<bool>| !*ctx.data())
///     .serial(Step::new("processRequest", |_ctx: Context<bool>| async {
///         Ok(json!({ "processed": true }))
///     }))
///     .unwrap();
///
/// assert!(tree.is_skipped(true).await);
///
/// let result = tree.run(true).await;
/// assert!(result.is_completed());
/// assert_eq!(result.get("maintenance").unwrap().status, WorkStatus::Skipped);
/// # });
/// ```
pub struct Tree<D: Send + Sync + 'static> {
    workflow: Workflow<D>,
}

impl<D: Send + Sync + 'static> Clone for Tree<D> {
    fn clone(&self) -> Self {
        Self {
            workflow: self.workflow.clone(),
        }
    }
}

impl<D: Send + Sync + 'static> Tree<D> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            workflow: Workflow::named(name),
        }
    }

    pub fn name(&self) -> &str {
        self.workflow.name()
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.workflow = self.workflow.with_config(config);
        self
    }

    pub fn len(&self) -> usize {
        self.workflow.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workflow.is_empty()
    }

    pub fn should_run<F>(mut self, f: F) -> Self
    where
        F: Fn(&Context<D>) -> bool + Send + Sync + 'static,
    {
        self.workflow.gate_mut().set_should_run(f);
        self
    }

    pub fn should_run_async<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Context<D>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        self.workflow.gate_mut().set_should_run_async(f);
        self
    }

    pub fn on_skipped<F>(mut self, f: F) -> Self
    where
        F: Fn(&Context<D>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.workflow.gate_mut().set_on_skipped(f);
        self
    }

    pub fn on_skipped_async<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Context<D>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.workflow.gate_mut().set_on_skipped_async(f);
        self
    }

    pub fn serial(mut self, node: impl Into<Node<D>>) -> Result<Self, CompositionError> {
        self.workflow = self.workflow.serial(node)?;
        Ok(self)
    }

    pub fn parallel<I, N>(mut self, members: I) -> Result<Self, CompositionError>
    where
        I: IntoIterator<Item = N>,
        N: Into<Node<D>>,
    {
        self.workflow = self.workflow.parallel(members)?;
        Ok(self)
    }

    pub fn parallel_named<I, N>(
        mut self,
        name: impl Into<String>,
        members: I,
    ) -> Result<Self, CompositionError>
    where
        I: IntoIterator<Item = N>,
        N: Into<Node<D>>,
    {
        self.workflow = self.workflow.parallel_named(name, members)?;
        Ok(self)
    }

    /// Evaluate the tree-level `should_run` against `data` alone
    ///
    /// No step runs and `on_skipped` is not invoked.
    pub async fn is_skipped(&self, data: D) -> bool {
        !self.workflow.gate().should_run(&Context::new(data)).await
    }

    pub fn is_sealed(&self) -> bool {
        false
    }

    pub fn seal(self) -> Sealed<D> {
        self.workflow.seal()
    }

    pub fn seal_with(self, options: SealOptions<D>) -> Sealed<D> {
        self.workflow.seal_with(options)
    }

    #[instrument(skip(self, data), fields(tree = %self.name()))]
    pub async fn run(&self, data: D) -> RunResult<D> {
        self.workflow.execute(Context::new(data)).await
    }

    pub async fn execute(&self, ctx: Context<D>) -> RunResult<D> {
        self.workflow.execute(ctx).await
    }
}
