// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared helpers for engine unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use colony_core::decision::{DecisionRecord, EventRecord};
use colony_core::event::AgentId;
use colony_core::{Event, TrailId, MAIN_UNIVERSE};
use colony_models::{ModelManager, ScriptedChatModel, UsageLedger};
use parking_lot::Mutex;
use serde_json::{Map, Value};

use crate::agent::Agent;
use crate::env::{AgentDirectory, EnvironmentLink};

/// In-memory environment link that records everything it is asked to do.
#[derive(Default)]
pub struct TestEnv {
    pub step: AtomicU64,
    pub state: Mutex<Map<String, Value>>,
    pub agent_fields: Mutex<HashMap<String, Map<String, Value>>>,
    pub decisions: Mutex<Vec<DecisionRecord>>,
    pub events: Mutex<Vec<EventRecord>>,
    pub env_events: Mutex<Vec<Event>>,
    pub stop_reason: Mutex<Option<String>>,
}

impl TestEnv {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn decision_count(&self) -> usize {
        self.decisions.lock().len()
    }
}

#[async_trait]
impl EnvironmentLink for TestEnv {
    fn trail_id(&self) -> TrailId {
        TrailId::new("trail-test")
    }

    fn universe_id(&self) -> String {
        MAIN_UNIVERSE.to_string()
    }

    fn current_step(&self) -> u64 {
        self.step.load(Ordering::SeqCst)
    }

    async fn get_data(&self, key: &str, default: Value) -> Value {
        self.state.lock().get(key).cloned().unwrap_or(default)
    }

    async fn update_data(&self, key: &str, value: Value) -> bool {
        self.state.lock().insert(key.to_string(), value);
        true
    }

    async fn get_agent_data(&self, agent_id: &AgentId, key: &str, default: Value) -> Value {
        self.agent_fields
            .lock()
            .get(agent_id.as_str())
            .and_then(|fields| fields.get(key).cloned())
            .unwrap_or(default)
    }

    async fn get_agent_data_by_type(
        &self,
        _agent_type: &str,
        key: &str,
        default: Value,
    ) -> HashMap<String, Value> {
        self.agent_fields
            .lock()
            .iter()
            .map(|(id, fields)| {
                (
                    id.clone(),
                    fields.get(key).cloned().unwrap_or(default.clone()),
                )
            })
            .collect()
    }

    async fn queue_event(&self, record: EventRecord) {
        self.events.lock().push(record);
    }

    async fn queue_decision(&self, record: DecisionRecord) {
        self.decisions.lock().push(record);
    }

    async fn handle_env_event(&self, event: Event) -> Vec<Event> {
        self.env_events.lock().push(event);
        Vec::new()
    }

    async fn stop_simulation(&self, reason: &str) {
        self.stop_reason.lock().get_or_insert_with(|| reason.to_string());
    }
}

/// Model manager backed by one scripted chat model.
pub fn scripted_models(model: ScriptedChatModel) -> Arc<ModelManager> {
    let mut manager = ModelManager::new(UsageLedger::new());
    manager.register_chat(Arc::new(model));
    Arc::new(manager)
}

/// A bare agent of type `TestAgent` with a score profile.
pub fn test_agent(
    id: &str,
    env: Arc<dyn EnvironmentLink>,
    models: Arc<ModelManager>,
    directory: Arc<AgentDirectory>,
) -> Arc<Agent> {
    let profile = colony_core::test_support::score_profile("TestAgent", id, 0);
    Arc::new(Agent::new(
        profile,
        "You are a test agent.",
        env,
        models,
        directory,
    ))
}
