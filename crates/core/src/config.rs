// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Simulator configuration.
//!
//! Config files are JSON. A run merges a default file with an optional user
//! overlay (`SimConfig::load` / `merge_overlay`); the overlay wins key by
//! key, objects merge recursively. Bad or missing required config fails
//! fast at initialization, a run never starts half-configured.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Errors surfaced while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("JSON error in {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Clock mode for the environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClockMode {
    /// All scheduled agents processed to quiescence each step.
    #[default]
    Round,
    /// Wall-clock-paced subset each step; no quiescence wait.
    Tick,
}

/// Node role in distributed mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeMode {
    #[default]
    Single,
    Master,
    Worker,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentConfig {
    pub name: String,
    pub mode: ClockMode,
    pub max_steps: u64,
    /// Seconds between ticks in tick mode.
    pub tick_interval_secs: f64,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            mode: ClockMode::Round,
            max_steps: 1,
            tick_interval_secs: 1.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorSection {
    pub environment: EnvironmentConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileCount {
    pub count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub strategy: Option<String>,
    /// Window size for the sliding-window strategy.
    pub capacity: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    /// Agent counts per type.
    pub profile: BTreeMap<String, ProfileCount>,
    pub planning: Option<String>,
    pub memory: MemoryConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSection {
    /// Config names of chat models to balance across.
    pub chat: Vec<String>,
    /// Config names of embedding models to balance across.
    pub embedding: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DistributionConfig {
    pub enabled: bool,
    pub mode: NodeMode,
    pub node_id: Option<String>,
    pub master_address: String,
    pub master_port: u16,
    pub worker_address: String,
    pub worker_port: u16,
    pub expected_workers: usize,
    pub heartbeat_interval_secs: u64,
    pub worker_timeout_secs: u64,
    pub health_check_interval_secs: u64,
}

impl Default for DistributionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            mode: NodeMode::Single,
            node_id: None,
            master_address: "127.0.0.1".to_string(),
            master_port: 10051,
            worker_address: "127.0.0.1".to_string(),
            worker_port: 10052,
            expected_workers: 1,
            heartbeat_interval_secs: 10,
            worker_timeout_secs: 60,
            health_check_interval_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub user: String,
    pub password: String,
    /// Directory for the bundled append-only decision store. When unset,
    /// the store lives under the scene directory.
    pub path: Option<PathBuf>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: "localhost".to_string(),
            port: 5432,
            dbname: "colony".to_string(),
            user: String::new(),
            password: String::new(),
            path: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub enabled: bool,
    /// Seconds between metric samples.
    pub update_interval: u64,
    pub metrics_path: Option<PathBuf>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            update_interval: 60,
            metrics_path: None,
        }
    }
}

/// Top-level simulator config, merged from a default and a user overlay.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub simulator: SimulatorSection,
    pub agent: AgentSection,
    pub model: ModelSection,
    pub distribution: DistributionConfig,
    pub database: DatabaseConfig,
    pub monitor: MonitorConfig,
}

impl SimConfig {
    /// Load a config file, optionally merged with an overlay file
    /// (overlay wins).
    pub fn load(path: &Path, overlay: Option<&Path>) -> Result<Self, ConfigError> {
        let mut value = read_json(path)?;
        if let Some(overlay_path) = overlay {
            let overlay_value = read_json(overlay_path)?;
            merge_value(&mut value, overlay_value);
        }
        let config: SimConfig =
            serde_json::from_value(value).map_err(|source| ConfigError::Json {
                path: path.to_owned(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.distribution.enabled && self.distribution.mode == NodeMode::Single {
            return Err(ConfigError::Invalid(
                "distribution.enabled requires mode master or worker".to_string(),
            ));
        }
        if self.simulator.environment.mode == ClockMode::Tick
            && self.simulator.environment.tick_interval_secs <= 0.0
        {
            return Err(ConfigError::Invalid(
                "tick_interval_secs must be positive in tick mode".to_string(),
            ));
        }
        Ok(())
    }
}

/// One model entry. `provider`, `config_name`, and `model_name` are
/// required; everything else is provider-specific.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelEntry {
    pub provider: String,
    pub config_name: String,
    pub model_name: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl ModelEntry {
    pub fn extra_str(&self, key: &str) -> Option<&str> {
        self.extra.get(key).and_then(Value::as_str)
    }
}

/// Model configuration file: chat and embedding entries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfigFile {
    pub chat: Vec<ModelEntry>,
    pub embedding: Vec<ModelEntry>,
}

impl ModelConfigFile {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let value = read_json(path)?;
        serde_json::from_value(value).map_err(|source| ConfigError::Json {
            path: path.to_owned(),
            source,
        })
    }
}

fn read_json(path: &Path) -> Result<Value, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_owned(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| ConfigError::Json {
        path: path.to_owned(),
        source,
    })
}

/// Deep-merge `overlay` into `base`: objects merge key by key, everything
/// else is replaced by the overlay value.
pub fn merge_value(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(base_value) => merge_value(base_value, overlay_value),
                    None => {
                        base_map.insert(key, overlay_value);
                    }
                }
            }
        }
        (base_slot, overlay_value) => *base_slot = overlay_value,
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
