//! Execution result types

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::engine::error::WorkError;
use crate::workflow::context::{Context, WorkResults};

/// Outcome of a single node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkStatus {
    Skipped,
    Completed,
    Failed,
}

/// Outcome of a whole run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStatus {
    Completed,
    Failed,
}

/// Recorded outcome of one named node
///
/// `result` is populated only for `Completed`, `error` only for `Failed`.
/// Composite nodes (nested workflows and parallel groups) also carry the
/// WorkResults of their children.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkResult {
    pub status: WorkStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<WorkError>,
    #[serde(rename = "durationMs", serialize_with = "serialize_millis")]
    pub duration: Duration,
    #[serde(skip_serializing_if = "WorkResults::is_empty")]
    pub children: WorkResults,
}

impl WorkResult {
    pub fn skipped() -> Self {
        Self {
            status: WorkStatus::Skipped,
            result: None,
            error: None,
            duration: Duration::ZERO,
            children: WorkResults::new(),
        }
    }

    pub fn completed(result: Value, duration: Duration) -> Self {
        Self {
            status: WorkStatus::Completed,
            result: Some(result),
            error: None,
            duration,
            children: WorkResults::new(),
        }
    }

    pub fn failed(error: WorkError, duration: Duration) -> Self {
        Self {
            status: WorkStatus::Failed,
            result: None,
            error: Some(error),
            duration,
            children: WorkResults::new(),
        }
    }

    pub(crate) fn with_children(mut self, children: WorkResults) -> Self {
        self.children = children;
        self
    }

    pub fn is_skipped(&self) -> bool {
        self.status == WorkStatus::Skipped
    }

    pub fn is_completed(&self) -> bool {
        self.status == WorkStatus::Completed
    }

    pub fn is_failed(&self) -> bool {
        self.status == WorkStatus::Failed
    }
}

/// Result of `run`/`execute`
///
/// A failed run is still returned as a value: callers tell failure apart by
/// `status`, and `error` carries the error that failed the root.
#[derive(Debug, Clone)]
pub struct RunResult<D> {
    pub status: WorkflowStatus,
    pub context: Context<D>,
    pub total_duration: Duration,
    pub error: Option<WorkError>,
    pub started_at: DateTime<Utc>,
}

impl<D> RunResult<D> {
    pub fn is_completed(&self) -> bool {
        self.status == WorkflowStatus::Completed
    }

    pub fn is_failed(&self) -> bool {
        self.status == WorkflowStatus::Failed
    }

    /// The recorded WorkResults of this run
    pub fn work_results(&self) -> &WorkResults {
        self.context.work_results()
    }

    /// Shortcut for `context.work_results().get(name)`
    pub fn get(&self, name: &str) -> Option<&WorkResult> {
        self.context.work_results().get(name)
    }

    /// Completed result value of a node, if any
    pub fn result(&self, name: &str) -> Option<&Value> {
        self.get(name).and_then(|r| r.result.as_ref())
    }
}

impl<D: Serialize> Serialize for RunResult<D> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;

        let mut state = serializer.serialize_struct("RunResult", 5)?;
        state.serialize_field("status", &self.status)?;
        state.serialize_field("context", &self.context)?;
        state.serialize_field("totalDuration", &(self.total_duration.as_millis() as u64))?;
        state.serialize_field("error", &self.error)?;
        state.serialize_field("startedAt", &self.started_at)?;
        state.end()
    }
}

fn serialize_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(duration.as_millis() as u64)
}
