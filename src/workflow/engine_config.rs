//! Engine configuration
//!
//! Tunes how runs are interpreted. Every field has a default, so an empty
//! file is a valid configuration:
//!
//! ```yaml
//! # engine.yaml
//! parallel_order: registration   # or: completion
//! catch_panics: true
//! trace_results: false
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error in {file}: {error}")]
    Yaml {
        file: String,
        error: serde_yaml::Error,
    },
}

/// Order in which parallel member results are recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultOrder {
    /// Order the members were added to the group
    #[default]
    Registration,
    /// Order the members settled in
    Completion,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub parallel_order: ResultOrder,

    /// Record a panicking executor as a failed node instead of unwinding
    #[serde(default = "default_catch_panics")]
    pub catch_panics: bool,

    /// Emit a debug event with the JSON of every recorded result
    #[serde(default)]
    pub trace_results: bool,
}

fn default_catch_panics() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            parallel_order: ResultOrder::default(),
            catch_panics: default_catch_panics(),
            trace_results: false,
        }
    }
}

impl EngineConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&content).map_err(|e| ConfigError::Yaml {
            file: path.display().to_string(),
            error: e,
        })
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(yaml).map_err(|e| ConfigError::Yaml {
            file: "<inline>".to_string(),
            error: e,
        })
    }

    pub fn parallel_order(mut self, order: ResultOrder) -> Self {
        self.parallel_order = order;
        self
    }

    pub fn catch_panics(mut self, enabled: bool) -> Self {
        self.catch_panics = enabled;
        self
    }

    pub fn trace_results(mut self, enabled: bool) -> Self {
        self.trace_results = enabled;
        self
    }
}
