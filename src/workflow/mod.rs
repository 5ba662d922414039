//! Workflow types and definitions
//!
//! This module contains all types for defining compositions:
//! - `step` - The `Work` trait, closure-backed `Step` and skip gates
//! - `builder` - `Workflow`, `Tree` and their nodes
//! - `sealed` - Sealed handles and custom executors
//! - `context` - Run context and recorded WorkResults
//! - `engine_config` - Engine configuration loaded from YAML

pub mod builder;
pub mod context;
pub mod engine_config;
pub mod sealed;
pub mod step;

// Re-export all public types for convenience
pub use builder::{Node, ParallelGroup, Tree, Unit, Workflow};
pub use context::{Context, WorkResults};
pub use engine_config::{ConfigError, EngineConfig, ResultOrder};
pub use sealed::{Next, SealOptions, Sealed};
pub use step::{Gate, Step, Work};
