// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The agent runtime.
//!
//! An agent owns its profile, relationships, optional memory/planning
//! strategies, and a handler table keyed by event kind. Handlers are async
//! closures registered by scenario code; `generate_reaction` is the one
//! LLM entry point and records exactly one decision per call.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use colony_core::event::AgentId;
use colony_core::{AgentProfile, Event, RelationshipManager, ENV_ID};
use colony_models::{ChatMessage, ChatRequest, JsonBlockParser, ModelManager};
use futures::future::BoxFuture;
use parking_lot::RwLock;
use serde_json::{json, Map, Value};
use tracing::{debug, error, warn};

use crate::env::{AgentDirectory, EnvironmentLink};
use crate::error::EngineError;
use crate::memory::MemoryStrategy;
use crate::planning::PlanningStrategy;

/// Future returned by a handler.
pub type HandlerFuture = BoxFuture<'static, Result<Vec<Event>, EngineError>>;

/// A handler: consumes an event, returns follow-up events.
pub type HandlerFn = Arc<dyn Fn(Arc<Agent>, Event) -> HandlerFuture + Send + Sync>;

/// Extra parse retries after the first attempt, with a stricter
/// instruction appended.
const REACTION_RETRIES: usize = 2;

const STRICT_SUFFIX: &str =
    "\nRespond with ONLY a valid JSON object in the requested format, no other text.";

/// Default soft timeout for one LLM call.
pub const DEFAULT_REACTION_TIMEOUT: Duration = Duration::from_secs(60);

/// One simulated actor and its handler table.
pub struct Agent {
    profile: Arc<AgentProfile>,
    sys_prompt: String,
    relationships: RelationshipManager,
    memory: Option<Arc<dyn MemoryStrategy>>,
    planning: Option<Arc<dyn PlanningStrategy>>,
    handlers: RwLock<HashMap<String, Vec<(String, HandlerFn)>>>,
    env: Arc<dyn EnvironmentLink>,
    models: Arc<ModelManager>,
    directory: Arc<AgentDirectory>,
    reaction_timeout: Duration,
}

impl Agent {
    pub fn new(
        profile: AgentProfile,
        sys_prompt: impl Into<String>,
        env: Arc<dyn EnvironmentLink>,
        models: Arc<ModelManager>,
        directory: Arc<AgentDirectory>,
    ) -> Self {
        let owner = profile.profile_id().clone();
        Self {
            profile: Arc::new(profile),
            sys_prompt: sys_prompt.into(),
            relationships: RelationshipManager::new(owner),
            memory: None,
            planning: None,
            handlers: RwLock::new(HashMap::new()),
            env,
            models,
            directory,
            reaction_timeout: DEFAULT_REACTION_TIMEOUT,
        }
    }

    pub fn with_memory(mut self, memory: Arc<dyn MemoryStrategy>) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn with_planning(mut self, planning: Arc<dyn PlanningStrategy>) -> Self {
        self.planning = Some(planning);
        self
    }

    pub fn with_reaction_timeout(mut self, timeout: Duration) -> Self {
        self.reaction_timeout = timeout;
        self
    }

    pub fn profile_id(&self) -> &AgentId {
        self.profile.profile_id()
    }

    pub fn agent_type(&self) -> &str {
        self.profile.agent_type()
    }

    pub fn profile(&self) -> &Arc<AgentProfile> {
        &self.profile
    }

    pub fn relationships(&self) -> &RelationshipManager {
        &self.relationships
    }

    pub fn planning(&self) -> Option<&Arc<dyn PlanningStrategy>> {
        self.planning.as_ref()
    }

    pub fn env(&self) -> &Arc<dyn EnvironmentLink> {
        &self.env
    }

    /// Register a handler for an event kind.
    ///
    /// Idempotent append keyed by `(kind, name)`: registering the same
    /// pair again is a no-op, while the same name under a second kind adds
    /// a second route (a handler may serve several kinds).
    pub fn register_event(&self, event_kind: &str, name: &str, handler: HandlerFn) {
        let mut handlers = self.handlers.write();
        let entries = handlers.entry(event_kind.to_string()).or_default();
        if entries.iter().any(|(existing, _)| existing == name) {
            debug!(
                agent_id = %self.profile_id(),
                event_kind,
                name,
                "handler already registered, skipping"
            );
            return;
        }
        entries.push((name.to_string(), handler));
    }

    pub fn has_handler(&self, event_kind: &str) -> bool {
        self.handlers.read().contains_key(event_kind)
    }

    /// Run every handler registered for the event's kind and collect their
    /// follow-up events. Handler failures are logged, recorded as failed
    /// decisions, and do not stop the run.
    pub async fn handle_event(self: Arc<Self>, event: Event) -> Vec<Event> {
        let routes: Vec<(String, HandlerFn)> = {
            let handlers = self.handlers.read();
            match handlers.get(&event.event_kind) {
                Some(entries) => entries.clone(),
                None => {
                    // Defensive: the dispatcher already filters on kind
                    warn!(
                        agent_id = %self.profile_id(),
                        event_kind = %event.event_kind,
                        "no handler registered, dropping event"
                    );
                    return Vec::new();
                }
            }
        };

        let mut follow_ups = Vec::new();
        for (name, handler) in routes {
            match handler(Arc::clone(&self), event.clone()).await {
                Ok(events) => follow_ups.extend(events),
                Err(err) => {
                    error!(
                        agent_id = %self.profile_id(),
                        event = %event.log_summary(),
                        handler = %name,
                        error = %err,
                        "handler failed"
                    );
                    self.record_failure(&event, Some(&name), &err.to_string()).await;
                }
            }
        }
        follow_ups
    }

    /// Invoke the LLM with the agent's system prompt, an instruction, and
    /// an observation; parse the response as a JSON object.
    ///
    /// At most one decision is recorded per call: the parsed success, or
    /// the failure (timeout, transport error, or unparseable output after
    /// retries, in which case the returned map is empty and the run
    /// continues).
    pub async fn generate_reaction(
        &self,
        event: &Event,
        instruction: &str,
        observation: &str,
    ) -> Result<Map<String, Value>, EngineError> {
        let model = self.models.chat()?;
        let parser = JsonBlockParser::new();
        let context = json!({
            "instruction": instruction,
            "observation": observation,
        });

        let mut user_prompt = self.build_user_prompt(instruction, observation).await;
        let started = Instant::now();
        let mut last_output = String::new();

        for attempt in 0..=REACTION_RETRIES {
            let request =
                ChatRequest::new(self.reaction_messages(&user_prompt));

            let response =
                match tokio::time::timeout(self.reaction_timeout, model.chat(request)).await {
                    Ok(Ok(response)) => response,
                    Ok(Err(model_error)) => {
                        warn!(
                            agent_id = %self.profile_id(),
                            error = %model_error,
                            "LLM call failed"
                        );
                        self.record_reaction(
                            event,
                            &user_prompt,
                            "",
                            context.clone(),
                            started.elapsed(),
                            Some(&format!("llm error: {model_error}")),
                        )
                        .await;
                        return Ok(Map::new());
                    }
                    Err(_) => {
                        warn!(
                            agent_id = %self.profile_id(),
                            timeout = ?self.reaction_timeout,
                            "LLM call timed out"
                        );
                        self.record_reaction(
                            event,
                            &user_prompt,
                            "",
                            context.clone(),
                            started.elapsed(),
                            Some("llm timeout"),
                        )
                        .await;
                        return Ok(Map::new());
                    }
                };

            last_output = response.content.clone();
            match parser.parse(&response.content) {
                Ok(map) => {
                    self.record_reaction(
                        event,
                        &user_prompt,
                        &response.content,
                        context.clone(),
                        started.elapsed(),
                        None,
                    )
                    .await;
                    self.remember_exchange(observation, &response.content).await;
                    return Ok(map);
                }
                Err(parse_error) => {
                    debug!(
                        agent_id = %self.profile_id(),
                        attempt,
                        error = %parse_error,
                        "response did not parse, retrying with stricter instruction"
                    );
                    if !user_prompt.ends_with(STRICT_SUFFIX) {
                        user_prompt.push_str(STRICT_SUFFIX);
                    }
                }
            }
        }

        self.record_reaction(
            event,
            &user_prompt,
            &last_output,
            context,
            started.elapsed(),
            Some("unparseable response after retries"),
        )
        .await;
        Ok(Map::new())
    }

    /// Coerce a handler's `target_ids` value: `"ENV"` passes through, a
    /// scalar becomes a single-element list, unknown ids are dropped with
    /// a warning.
    pub fn resolve_targets(&self, value: Option<&Value>) -> Vec<AgentId> {
        let candidates: Vec<String> = match value {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::String(id)) => vec![id.clone()],
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect(),
            Some(other) => {
                warn!(
                    agent_id = %self.profile_id(),
                    value = %other,
                    "target_ids is neither a string nor a list, ignoring"
                );
                Vec::new()
            }
        };

        candidates
            .into_iter()
            .filter(|id| {
                if id == ENV_ID || self.directory.contains(&AgentId::new(id.clone())) {
                    true
                } else {
                    warn!(
                        agent_id = %self.profile_id(),
                        target = %id,
                        "unknown target id dropped"
                    );
                    false
                }
            })
            .map(AgentId::new)
            .collect()
    }

    /// Read environment state (remote-capable through the link).
    pub async fn get_env_data(&self, key: &str, default: Value) -> Value {
        self.env.get_data(key, default).await
    }

    pub async fn update_env_data(&self, key: &str, value: Value) -> bool {
        self.env.update_data(key, value).await
    }

    fn reaction_messages(&self, user_prompt: &str) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(2);
        if !self.sys_prompt.is_empty() {
            messages.push(ChatMessage::system(&self.sys_prompt));
        }
        messages.push(ChatMessage::user(user_prompt));
        messages
    }

    async fn build_user_prompt(&self, instruction: &str, observation: &str) -> String {
        let mut prompt = format!("Your profile:\n{}\n", self.profile.profile_str(false));
        if let Some(memory) = &self.memory {
            let recalled = memory.recall(observation, 5).await;
            if !recalled.is_empty() {
                prompt.push_str("Relevant memory:\n");
                for entry in recalled {
                    prompt.push_str("- ");
                    prompt.push_str(&entry);
                    prompt.push('\n');
                }
            }
        }
        prompt.push_str("\nInstruction: ");
        prompt.push_str(instruction);
        if !observation.is_empty() {
            prompt.push_str("\nObservation: ");
            prompt.push_str(observation);
        }
        prompt
    }

    async fn remember_exchange(&self, observation: &str, output: &str) {
        if let Some(memory) = &self.memory {
            let step = self.env.current_step();
            memory
                .remember(format!("step {step}: observed '{observation}', decided {output}"))
                .await;
        }
    }

    async fn record_reaction(
        &self,
        event: &Event,
        prompt: &str,
        output: &str,
        context: Value,
        elapsed: Duration,
        failure_reason: Option<&str>,
    ) {
        let mut record = colony_core::DecisionRecord::new(
            self.env.trail_id(),
            self.env.universe_id(),
            self.profile_id().clone(),
            self.agent_type(),
            self.env.current_step(),
        )
        .triggered_by(event.event_id.clone())
        .with_exchange(prompt, output)
        .with_context(context)
        .with_processing_time(elapsed.as_secs_f64());
        if let Some(reason) = failure_reason {
            record.reason = Some(reason.to_string());
        }
        self.env.queue_decision(record).await;
    }

    async fn record_failure(&self, event: &Event, handler: Option<&str>, reason: &str) {
        let mut record = colony_core::DecisionRecord::new(
            self.env.trail_id(),
            self.env.universe_id(),
            self.profile_id().clone(),
            self.agent_type(),
            self.env.current_step(),
        )
        .triggered_by(event.event_id.clone());
        if let Some(handler) = handler {
            record = record.with_action(handler);
        }
        record.reason = Some(reason.to_string());
        self.env.queue_decision(record).await;
    }
}

#[cfg(test)]
#[path = "agent_tests.rs"]
mod tests;
