//! Workflow execution engine module
//!
//! This module contains:
//! - `executor` - The engine interpreting compositions
//! - `error` - Composition and execution error types
//! - `result` - Work and run result types

pub mod error;
pub mod executor;
pub mod result;

pub use error::{CompositionError, WorkError};
pub use executor::Engine;
pub use result::{RunResult, WorkResult, WorkStatus, WorkflowStatus};
