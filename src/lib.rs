//! # Work Tree
//!
//! An in-process engine for composing asynchronous steps into workflows and
//! running them against a shared, typed context.
//!
//! ## Features
//!
//! - **Serial and parallel composition** - Chain steps, or fan them out and wait for all
//! - **Skip protocol** - Per-step and per-tree `should_run` gates with `on_skipped` hooks
//! - **Nesting** - Workflows and trees compose into other workflows
//! - **Sealing** - Freeze a composition, optionally wrapping its executor
//! - **Recorded results** - Every node leaves a WorkResult in the run context
//!
//! ## Quick Start
//!
//! ```rust
//! use serde_json::json;
//! use work_tree::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let workflow = Workflow::new()
//!         .serial(Step::new("fetchUser", |ctx: Context<String>| async move {
//!             Ok(json!({ "id": ctx.data().clone(), "name": "Jane" }))
//!         }))?
//!         .parallel(vec![
//!             Step::new("orders", |_ctx: Context<String>| async { Ok(3) }),
//!             Step::new("reviews", |_ctx: Context<String>| async { Ok(5) }),
//!         ])?;
//!
//!     let result = workflow.run("user-123".to_string()).await;
//!
//!     println!("Workflow completed: {}", result.is_completed());
//!     assert_eq!(result.result("orders"), Some(&json!(3)));
//!     Ok(())
//! }
//! ```

pub mod engine;
pub mod workflow;

// Re-export main types
pub use engine::{
    CompositionError, Engine, RunResult, WorkError, WorkResult, WorkStatus, WorkflowStatus,
};
pub use workflow::{
    ConfigError, Context, EngineConfig, Gate, Next, Node, ParallelGroup, ResultOrder,
    SealOptions, Sealed, Step, Tree, Unit, Work, WorkResults, Workflow,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::engine::{
        CompositionError, RunResult, WorkError, WorkResult, WorkStatus, WorkflowStatus,
    };
    pub use crate::workflow::{
        Context, EngineConfig, Node, ResultOrder, SealOptions, Sealed, Step, Tree, Work,
        Workflow,
    };
}
