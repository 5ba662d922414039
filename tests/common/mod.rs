#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use tempfile::TempDir;
use work_tree::prelude::*;
use work_tree::WorkResults;

pub fn create_test_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp directory")
}

pub fn write_config(dir: &Path, content: &str) -> PathBuf {
    let path = dir.join("engine.yaml");
    fs::write(&path, content).expect("Failed to write engine.yaml");
    path
}

/// Shared call counter for executors and hooks
#[derive(Clone, Default)]
pub struct Calls(Arc<AtomicUsize>);

impl Calls {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hit(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// Shared log of step names in the order they started or finished
#[derive(Clone, Default)]
pub struct Trace(Arc<Mutex<Vec<String>>>);

impl Trace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

pub fn value_step<D: Send + Sync + 'static>(name: &str, value: Value) -> Step<D> {
    Step::new(name, move |_ctx: Context<D>| {
        let value = value.clone();
        async move { Ok(value) }
    })
}

pub fn counted_step<D: Send + Sync + 'static>(name: &str, calls: &Calls, value: Value) -> Step<D> {
    let calls = calls.clone();
    Step::new(name, move |_ctx: Context<D>| {
        let calls = calls.clone();
        let value = value.clone();
        async move {
            calls.hit();
            Ok(value)
        }
    })
}

pub fn failing_step<D: Send + Sync + 'static>(name: &str, message: &'static str) -> Step<D> {
    Step::new(name, move |_ctx: Context<D>| async move {
        Err::<(), _>(anyhow::anyhow!(message))
    })
}

/// Step that sleeps, then logs its name into `trace`
pub fn delayed_step<D: Send + Sync + 'static>(name: &str, delay_ms: u64, trace: &Trace) -> Step<D> {
    let trace = trace.clone();
    let step_name = name.to_string();
    Step::new(name, move |_ctx: Context<D>| {
        let trace = trace.clone();
        let step_name = step_name.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            trace.push(step_name.clone());
            Ok(step_name)
        }
    })
}

pub fn names(results: &WorkResults) -> Vec<String> {
    results.names().map(str::to_string).collect()
}
