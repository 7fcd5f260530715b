// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scene loading: manifest, schemas, profile data, agent construction.
//!
//! Scenario code supplies per-type setup hooks that register handlers on
//! the freshly built agents; everything else (profile sampling, LLM field
//! generation, directory registration) is driven by the scene files and
//! the simulator config.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use colony_core::config::SimConfig;
use colony_core::event::AgentId;
use colony_core::{AgentProfile, AgentSchema, ConfigError, IdSource, SceneInfo};
use colony_models::{ChatRequest, JsonBlockParser, ModelManager};
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use crate::agent::Agent;
use crate::env::{AgentDirectory, EnvironmentLink};
use crate::error::EngineError;
use crate::memory::memory_from_config;
use crate::planning::planning_from_config;

/// Registers a type's handlers on a newly built agent.
pub type AgentSetup = Arc<dyn Fn(&Arc<Agent>) + Send + Sync>;

/// Scenario-supplied construction hooks, one per agent type.
#[derive(Default, Clone)]
pub struct ScenarioHooks {
    setups: HashMap<String, AgentSetup>,
}

impl ScenarioHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, agent_type: impl Into<String>, setup: AgentSetup) {
        self.setups.insert(agent_type.into(), setup);
    }

    pub fn on_build<F>(mut self, agent_type: impl Into<String>, setup: F) -> Self
    where
        F: Fn(&Arc<Agent>) + Send + Sync + 'static,
    {
        self.setups.insert(agent_type.into(), Arc::new(setup));
        self
    }

    /// Setup hook for an agent type, if one was registered.
    pub fn setup_for(&self, agent_type: &str) -> Option<AgentSetup> {
        self.setups.get(agent_type).cloned()
    }
}

/// A fully loaded scene: manifest plus the locally constructed agents.
pub struct LoadedScene {
    pub info: SceneInfo,
    pub agents: Vec<Arc<Agent>>,
}

impl std::fmt::Debug for LoadedScene {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedScene")
            .field("info", &self.info)
            .field("agent_count", &self.agents.len())
            .finish()
    }
}

/// Build profiles for one agent type from its schema and data files.
///
/// Data rows are reused round-robin when `count` exceeds the file; rows
/// carrying an `id` field keep it as the profile id, everything else gets
/// a generated one. Duplicate ids fail the load.
pub fn load_profiles<G: IdSource>(
    scene_dir: &Path,
    agent_type: &str,
    count: usize,
    id_gen: &G,
) -> Result<Vec<AgentProfile>, EngineError> {
    let schema_path = SceneInfo::schema_path(scene_dir, agent_type);
    let schema_text =
        std::fs::read_to_string(&schema_path).map_err(|source| EngineError::Io {
            path: schema_path.clone(),
            source,
        })?;
    let schema: AgentSchema = serde_json::from_str(&schema_text).map_err(|source| {
        EngineError::Config(ConfigError::Json {
            path: schema_path,
            source,
        })
    })?;

    let data_path = SceneInfo::data_path(scene_dir, agent_type);
    let rows: Vec<Map<String, Value>> = match std::fs::read_to_string(&data_path) {
        Ok(text) => serde_json::from_str(&text).map_err(|source| {
            EngineError::Config(ConfigError::Json {
                path: data_path,
                source,
            })
        })?,
        Err(_) => {
            debug!(agent_type, "no profile data file, sampling all fields");
            Vec::new()
        }
    };

    let mut seen = HashSet::new();
    let mut profiles = Vec::with_capacity(count);
    for index in 0..count {
        let row = if rows.is_empty() {
            None
        } else {
            Some(rows[index % rows.len()].clone())
        };
        let profile_id = row
            .as_ref()
            .and_then(|r| r.get("id"))
            .and_then(Value::as_str)
            // Reused rows must not reuse the row id
            .filter(|_| index < rows.len())
            .map(str::to_string)
            .unwrap_or_else(|| id_gen.fresh());
        if !seen.insert(profile_id.clone()) {
            return Err(EngineError::Config(ConfigError::Invalid(format!(
                "duplicate profile id '{profile_id}' for agent type '{agent_type}'"
            ))));
        }
        profiles.push(AgentProfile::new(
            agent_type,
            AgentId::new(profile_id),
            schema.clone(),
            row,
        ));
    }
    Ok(profiles)
}

/// Load a scenario directory and construct its local agents.
pub async fn load_scene<G: IdSource>(
    scene_dir: &Path,
    config: &SimConfig,
    env: Arc<dyn EnvironmentLink>,
    models: Arc<ModelManager>,
    directory: Arc<AgentDirectory>,
    hooks: &ScenarioHooks,
    id_gen: &G,
) -> Result<LoadedScene, EngineError> {
    let info = SceneInfo::load(scene_dir)?;
    let mut agents = Vec::new();

    for (agent_type, profile_config) in &config.agent.profile {
        if !info.agent_types.contains_key(agent_type) {
            return Err(EngineError::Config(ConfigError::Invalid(format!(
                "agent type '{agent_type}' is not declared by scene '{}'",
                info.scene_name
            ))));
        }
        let profiles = load_profiles(scene_dir, agent_type, profile_config.count, id_gen)?;

        if models.has_chat() {
            if let Err(error) = generate_llm_fields(&profiles, &models).await {
                warn!(agent_type, %error, "LLM profile generation failed, keeping defaults");
            }
        }

        let description = info
            .agent_types
            .get(agent_type)
            .cloned()
            .unwrap_or_default();
        let sys_prompt = format!("You are a {agent_type}. {description}");

        let memory_config = &config.agent.memory;
        let planning_model = models.chat().ok();

        for profile in profiles {
            let mut agent = Agent::new(
                profile,
                sys_prompt.clone(),
                Arc::clone(&env),
                Arc::clone(&models),
                Arc::clone(&directory),
            );
            if let Some(memory) =
                memory_from_config(memory_config.strategy.as_deref(), memory_config.capacity)
            {
                agent = agent.with_memory(memory);
            }
            if let Some(planning) = planning_from_config(
                config.agent.planning.as_deref(),
                planning_model.clone(),
            ) {
                agent = agent.with_planning(planning);
            }

            let agent = Arc::new(agent);
            match hooks.setup_for(agent_type) {
                Some(setup) => setup(&agent),
                None => warn!(agent_type, "no setup hook registered, agent has no handlers"),
            }
            directory.register(Arc::clone(&agent));
            agents.push(agent);
        }
    }

    info!(
        scene = %info.scene_name,
        agents = agents.len(),
        "scene loaded"
    );
    Ok(LoadedScene { info, agents })
}

/// Fill `llm`-sampled schema fields with one bulk generation call per
/// batch of profiles. Parse failures retry twice, then defaults stand.
async fn generate_llm_fields(
    profiles: &[AgentProfile],
    models: &Arc<ModelManager>,
) -> Result<(), EngineError> {
    let Some(first) = profiles.first() else {
        return Ok(());
    };
    let fields: Vec<Value> = first
        .schema()
        .llm_sampled_fields()
        .into_iter()
        .map(|(name, spec)| {
            json!({
                "field_name": name,
                "type": spec.field_type,
                "description": spec.description,
            })
        })
        .collect();
    if fields.is_empty() {
        return Ok(());
    }

    let model = models.chat()?;
    let parser = JsonBlockParser::new();
    let prompt = format!(
        "Generate {count} complete profiles in JSON array format for agents of \
         type {agent_type}, one object per agent, based on these field \
         requirements:\n{fields}\n\
         Ensure the output is a valid JSON array with exactly {count} objects.",
        count = profiles.len(),
        agent_type = first.agent_type(),
        fields = serde_json::to_string_pretty(&fields).unwrap_or_default(),
    );

    let mut last_error = None;
    for _attempt in 0..3 {
        let response = model
            .chat(ChatRequest::from_prompt(None, prompt.clone()))
            .await?;
        match parser.parse_array(&response.content) {
            Ok(items) if items.len() == profiles.len() => {
                for (profile, item) in profiles.iter().zip(items) {
                    if let Value::Object(generated) = item {
                        for (key, value) in generated {
                            if profile.schema().get(&key).is_some() {
                                profile.apply_generated(&key, value);
                            }
                        }
                    }
                }
                return Ok(());
            }
            Ok(items) => {
                warn!(
                    expected = profiles.len(),
                    got = items.len(),
                    "bulk generation returned wrong profile count, retrying"
                );
            }
            Err(error) => {
                last_error = Some(error.to_string());
            }
        }
    }
    warn!(
        error = last_error.as_deref().unwrap_or("wrong count"),
        "bulk profile generation failed after retries"
    );
    Ok(())
}

#[cfg(test)]
#[path = "scene_loader_tests.rs"]
mod tests;
