//! Engine error types
//!
//! Two families live here:
//! - `CompositionError` is raised while a workflow is being built and never mid-run.
//! - `WorkError` is recorded inside a node's `WorkResult` when the node fails.

use std::sync::Arc;

use serde::{Serialize, Serializer};

/// Errors raised while composing a workflow
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompositionError {
    #[error("Duplicate name '{name}' in '{scope}'")]
    DuplicateName { name: String, scope: String },

    #[error("Empty name in '{scope}'")]
    EmptyName { scope: String },

    #[error("Parallel group '{name}' has no members")]
    EmptyGroup { name: String },
}

/// Failure recorded for a single node during a run
#[derive(Debug, Clone, thiserror::Error)]
pub enum WorkError {
    #[error("Work '{work}' failed: {cause:#}")]
    Execution {
        work: String,
        cause: Arc<anyhow::Error>,
    },

    #[error("Work '{work}' panicked: {message}")]
    Panicked { work: String, message: String },

    #[error("Skip hook of '{work}' failed: {cause:#}")]
    SkipHook {
        work: String,
        cause: Arc<anyhow::Error>,
    },

    #[error("Parallel group '{group}' failed: {} member(s) failed", .failures.len())]
    Parallel {
        group: String,
        failures: Vec<WorkError>,
    },

    #[error("Work '{work}' already has a recorded result")]
    AlreadyRecorded { work: String },
}

impl WorkError {
    pub(crate) fn execution(work: &str, cause: anyhow::Error) -> Self {
        WorkError::Execution {
            work: work.to_string(),
            cause: Arc::new(cause),
        }
    }

    pub(crate) fn skip_hook(work: &str, cause: anyhow::Error) -> Self {
        WorkError::SkipHook {
            work: work.to_string(),
            cause: Arc::new(cause),
        }
    }

    /// Name of the node that produced this error
    pub fn work(&self) -> &str {
        match self {
            WorkError::Execution { work, .. }
            | WorkError::Panicked { work, .. }
            | WorkError::SkipHook { work, .. }
            | WorkError::AlreadyRecorded { work } => work,
            WorkError::Parallel { group, .. } => group,
        }
    }

    /// Errors of the failed members, empty unless this is a parallel failure
    pub fn failures(&self) -> &[WorkError] {
        match self {
            WorkError::Parallel { failures, .. } => failures,
            _ => &[],
        }
    }
}

impl Serialize for WorkError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = WorkError::execution("fetchUser", anyhow::anyhow!("Invalid user ID"));
        assert_eq!(err.to_string(), "Work 'fetchUser' failed: Invalid user ID");

        let err = CompositionError::DuplicateName {
            name: "validate".to_string(),
            scope: "workflow".to_string(),
        };
        assert_eq!(err.to_string(), "Duplicate name 'validate' in 'workflow'");
    }

    #[test]
    fn test_parallel_error_lists_failures() {
        let err = WorkError::Parallel {
            group: "parallel-1".to_string(),
            failures: vec![
                WorkError::execution("b", anyhow::anyhow!("boom")),
                WorkError::Panicked {
                    work: "c".to_string(),
                    message: "oops".to_string(),
                },
            ],
        };

        assert_eq!(err.work(), "parallel-1");
        assert_eq!(err.failures().len(), 2);
        assert_eq!(err.failures()[1].work(), "c");
        assert!(err.to_string().contains("2 member(s) failed"));
    }

    #[test]
    fn test_error_serializes_as_message() {
        let err = WorkError::AlreadyRecorded {
            work: "a".to_string(),
        };
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json, serde_json::json!("Work 'a' already has a recorded result"));
    }
}
