// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scene manifest types.
//!
//! A scenario directory carries `scene_info.json` at its root plus
//! `profile/schema/<type>.json` and `profile/data/<type>.json` files. The
//! manifest names the agent types, their avatar portraits, the ODD
//! protocol description, and the metric specs the monitor samples.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::ConfigError;

/// Where a metric variable is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableSource {
    /// Environment key/value state.
    Env,
    /// One field across all agents of `agent_type`.
    Agent,
}

/// One input variable of a metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableSpec {
    pub name: String,
    pub source_type: VariableSource,
    /// Dotted path into the env state or agent profile.
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_type: Option<String>,
    #[serde(default = "default_true")]
    pub required: bool,
}

fn default_true() -> bool {
    true
}

/// A metric the monitor samples on an interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSpec {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub variables: Vec<VariableSpec>,
    #[serde(default)]
    pub visualization_type: String,
    /// Seconds between samples.
    #[serde(default = "default_update_interval")]
    pub update_interval: u64,
}

fn default_update_interval() -> u64 {
    60
}

impl MetricSpec {
    /// Stable identifier: the declared id, else the name.
    pub fn key(&self) -> &str {
        if self.id.is_empty() {
            &self.name
        } else {
            &self.id
        }
    }
}

/// The `scene_info.json` manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneInfo {
    pub scene_name: String,
    #[serde(default)]
    pub domain: String,
    /// Agent type -> role description.
    pub agent_types: BTreeMap<String, String>,
    /// Agent type -> avatar id (1-5).
    #[serde(default)]
    pub portrait: BTreeMap<String, u32>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub odd_protocol: Value,
    #[serde(default)]
    pub metrics: Vec<MetricSpec>,
}

impl SceneInfo {
    /// Load and validate `scene_info.json` from a scenario directory.
    /// Missing or malformed manifests fail fast.
    pub fn load(scene_dir: &Path) -> Result<Self, ConfigError> {
        let path = scene_dir.join("scene_info.json");
        let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        let info: SceneInfo =
            serde_json::from_str(&text).map_err(|source| ConfigError::Json { path, source })?;
        info.validate()?;
        Ok(info)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.agent_types.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "scene '{}' declares no agent types",
                self.scene_name
            )));
        }
        for (agent_type, portrait) in &self.portrait {
            if !(1..=5).contains(portrait) {
                return Err(ConfigError::Invalid(format!(
                    "portrait for '{agent_type}' must be 1-5, got {portrait}"
                )));
            }
        }
        for metric in &self.metrics {
            for variable in &metric.variables {
                if variable.source_type == VariableSource::Agent && variable.agent_type.is_none() {
                    return Err(ConfigError::Invalid(format!(
                        "metric '{}' variable '{}' reads agent data without an agent_type",
                        metric.name, variable.name
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn schema_path(scene_dir: &Path, agent_type: &str) -> PathBuf {
        scene_dir
            .join("profile")
            .join("schema")
            .join(format!("{agent_type}.json"))
    }

    pub fn data_path(scene_dir: &Path, agent_type: &str) -> PathBuf {
        scene_dir
            .join("profile")
            .join("data")
            .join(format!("{agent_type}.json"))
    }
}

#[cfg(test)]
#[path = "scene_tests.rs"]
mod tests;
