//! Execution context for a single run
//!
//! A `Context` carries the run's input data and the WorkResults recorded so
//! far. Input data and recorded results sit behind `Arc`s, so handing every
//! step its own clone of the context is cheap. Results are copied only when
//! a context holding a shared map records into it.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::ser::{SerializeMap, SerializeStruct};
use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::engine::error::WorkError;
use crate::engine::result::WorkResult;

/// Insertion-ordered, write-once map from node name to its WorkResult
#[derive(Debug, Clone, Default)]
pub struct WorkResults {
    entries: Vec<(String, WorkResult)>,
    index: HashMap<String, usize>,
}

impl WorkResults {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&WorkResult> {
        self.index.get(name).map(|&i| &self.entries[i].1)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Names in insertion order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &WorkResult)> {
        self.entries.iter().map(|(name, result)| (name.as_str(), result))
    }

    /// Record a result. Each name can be recorded once.
    pub(crate) fn insert(&mut self, name: String, result: WorkResult) -> Result<(), WorkError> {
        if self.index.contains_key(&name) {
            return Err(WorkError::AlreadyRecorded { work: name });
        }
        self.index.insert(name.clone(), self.entries.len());
        self.entries.push((name, result));
        Ok(())
    }

    /// JSON object mapping each name to its result value (`null` when absent)
    pub(crate) fn result_map(&self) -> Value {
        let map = self
            .entries
            .iter()
            .map(|(name, r)| (name.clone(), r.result.clone().unwrap_or(Value::Null)))
            .collect::<serde_json::Map<_, _>>();
        Value::Object(map)
    }
}

impl IntoIterator for WorkResults {
    type Item = (String, WorkResult);
    type IntoIter = std::vec::IntoIter<(String, WorkResult)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl Serialize for WorkResults {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, result) in &self.entries {
            map.serialize_entry(name, result)?;
        }
        map.end()
    }
}

/// Per-run payload threaded through every step
pub struct Context<D> {
    data: Arc<D>,
    /// Shared with clones until one of them records
    work_results: Arc<WorkResults>,
    /// Enclosing context when running inside a nested workflow
    outer: Option<Arc<Context<D>>>,
    run_id: String,
}

impl<D> Context<D> {
    /// Create a fresh context with a generated run ID
    pub fn new(data: D) -> Self {
        Self::from_shared(Arc::new(data))
    }

    pub fn from_shared(data: Arc<D>) -> Self {
        Self {
            data,
            work_results: Arc::new(WorkResults::new()),
            outer: None,
            run_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn data(&self) -> &D {
        &self.data
    }

    pub fn shared_data(&self) -> Arc<D> {
        Arc::clone(&self.data)
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Results recorded at this level
    pub fn work_results(&self) -> &WorkResults {
        &self.work_results
    }

    /// Look up a result at this level, then in enclosing levels
    pub fn get(&self, name: &str) -> Option<&WorkResult> {
        self.work_results
            .get(name)
            .or_else(|| self.outer.as_ref().and_then(|outer| outer.get(name)))
    }

    /// Result value of a completed node
    pub fn result(&self, name: &str) -> Option<&Value> {
        self.get(name).and_then(|r| r.result.as_ref())
    }

    /// Result value of a completed node, decoded into `T`
    pub fn result_as<T: DeserializeOwned>(&self, name: &str) -> Option<T> {
        self.result(name)
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }

    pub fn into_work_results(self) -> WorkResults {
        Arc::try_unwrap(self.work_results).unwrap_or_else(|shared| (*shared).clone())
    }

    pub(crate) fn record(&mut self, name: &str, result: WorkResult) -> Result<(), WorkError> {
        if self.work_results.contains(name) {
            return Err(WorkError::AlreadyRecorded {
                work: name.to_string(),
            });
        }
        Arc::make_mut(&mut self.work_results).insert(name.to_string(), result)
    }

    /// Child context for a nested workflow: same data and run ID, empty
    /// results, lookups falling back to this context.
    pub(crate) fn scoped(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
            work_results: Arc::new(WorkResults::new()),
            outer: Some(Arc::new(self.clone())),
            run_id: self.run_id.clone(),
        }
    }
}

impl<D> Clone for Context<D> {
    fn clone(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
            work_results: Arc::clone(&self.work_results),
            outer: self.outer.clone(),
            run_id: self.run_id.clone(),
        }
    }
}

impl<D: fmt::Debug> fmt::Debug for Context<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("run_id", &self.run_id)
            .field("data", &self.data)
            .field("work_results", &*self.work_results)
            .finish()
    }
}

impl<D: Serialize> Serialize for Context<D> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Context", 3)?;
        state.serialize_field("runId", &self.run_id)?;
        state.serialize_field("data", &*self.data)?;
        state.serialize_field("workResults", &*self.work_results)?;
        state.end()
    }
}
