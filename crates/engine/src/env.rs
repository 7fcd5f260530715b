// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The environment data-access seam and the agent directory.
//!
//! Handlers see one [`EnvironmentLink`] surface whether they run next to
//! the real environment (single node, master) or behind a worker-side
//! proxy that forwards to the master. The [`EventRouter`] is the
//! distribution layer's hook for events whose target is not hosted
//! locally.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use colony_core::decision::{DecisionRecord, EventRecord};
use colony_core::event::AgentId;
use colony_core::{Event, TrailId};
use parking_lot::RwLock;
use serde_json::Value;

use crate::agent::Agent;

/// The environment contract available to agent handlers.
#[async_trait]
pub trait EnvironmentLink: Send + Sync {
    fn trail_id(&self) -> TrailId;

    fn universe_id(&self) -> String;

    /// Address this environment answers to. The central environment is
    /// `ENV`; a worker-side proxy also answers to `{node_id}_ENV` so
    /// response events can find their way back across nodes.
    fn env_id(&self) -> AgentId {
        AgentId::new(colony_core::ENV_ID)
    }

    /// Current step (round or tick number).
    fn current_step(&self) -> u64;

    /// Env-state read; missing keys resolve to `default`.
    async fn get_data(&self, key: &str, default: Value) -> Value;

    /// Env-state write, last-writer-wins. Remote writes surface success.
    async fn update_data(&self, key: &str, value: Value) -> bool;

    /// Read one agent's profile field.
    async fn get_agent_data(&self, agent_id: &AgentId, key: &str, default: Value) -> Value;

    /// `{agent_id -> value}` across all agents of `agent_type`, local and
    /// remote.
    async fn get_agent_data_by_type(
        &self,
        agent_type: &str,
        key: &str,
        default: Value,
    ) -> HashMap<String, Value>;

    /// Queue a dispatched event for durable recording.
    async fn queue_event(&self, record: EventRecord);

    /// Queue a completed decision for durable recording.
    async fn queue_decision(&self, record: DecisionRecord);

    /// Service an event addressed to `ENV`. Returns follow-up events.
    async fn handle_env_event(&self, event: Event) -> Vec<Event>;

    /// Request run termination.
    async fn stop_simulation(&self, reason: &str);
}

/// Distribution hook for non-local delivery and remote aggregation.
#[async_trait]
pub trait EventRouter: Send + Sync {
    /// Forward an event to the node hosting its target. Returns false when
    /// the event was dropped (unknown placement, unreachable worker).
    async fn forward(&self, event: Event) -> bool;

    /// Read one remote agent's field. `None` when the agent is unknown.
    async fn remote_agent_data(&self, agent_id: &AgentId, key: &str, default: Value)
        -> Option<Value>;

    /// Merge `{agent_id -> value}` from remote nodes for a by-type query.
    async fn remote_agent_data_by_type(
        &self,
        agent_type: &str,
        key: &str,
        default: Value,
    ) -> HashMap<String, Value>;

    /// Signal all remote nodes that the run is over.
    async fn broadcast_terminate(&self, reason: &str);
}

/// Registry of locally hosted agents.
#[derive(Default)]
pub struct AgentDirectory {
    agents: RwLock<HashMap<AgentId, Arc<Agent>>>,
    by_type: RwLock<HashMap<String, Vec<AgentId>>>,
}

impl AgentDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, agent: Arc<Agent>) {
        let id = agent.profile_id().clone();
        self.by_type
            .write()
            .entry(agent.agent_type().to_string())
            .or_default()
            .push(id.clone());
        self.agents.write().insert(id, agent);
    }

    pub fn get(&self, agent_id: &AgentId) -> Option<Arc<Agent>> {
        self.agents.read().get(agent_id).cloned()
    }

    pub fn contains(&self, agent_id: &AgentId) -> bool {
        self.agents.read().contains_key(agent_id)
    }

    pub fn remove(&self, agent_id: &AgentId) -> Option<Arc<Agent>> {
        let removed = self.agents.write().remove(agent_id);
        if removed.is_some() {
            let mut by_type = self.by_type.write();
            for ids in by_type.values_mut() {
                ids.retain(|id| id != agent_id);
            }
        }
        removed
    }

    pub fn ids(&self) -> Vec<AgentId> {
        let mut ids: Vec<AgentId> = self.agents.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn agents_of_type(&self, agent_type: &str) -> Vec<Arc<Agent>> {
        let by_type = self.by_type.read();
        let agents = self.agents.read();
        by_type
            .get(agent_type)
            .map(|ids| ids.iter().filter_map(|id| agents.get(id).cloned()).collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.agents.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.read().is_empty()
    }
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
