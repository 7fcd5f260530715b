// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Decision and event records bound for durable storage.
//!
//! A decision is one LLM invocation by a handler: the prompt, the raw
//! output, the context it ran in, and post-hoc scoring fields. Once a
//! decision id is durably written its immutable fields never change;
//! `rating` / `feedback` / `reason` are last-writer-wins patches.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::event::{AgentId, Event, EventId};

crate::id_type! {
    /// Unique identifier for a recorded decision.
    pub struct DecisionId;
}

crate::id_type! {
    /// Identifies one end-to-end simulation run.
    pub struct TrailId;
}

/// Default universe (branch) within a trail.
pub const MAIN_UNIVERSE: &str = "main";

/// One recorded LLM decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub decision_id: DecisionId,
    pub trail_id: TrailId,
    #[serde(default = "default_universe")]
    pub universe_id: String,
    pub agent_id: AgentId,
    #[serde(default)]
    pub agent_type: String,
    pub step: u64,
    pub timestamp: DateTime<Utc>,
    /// Event that triggered the handler.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<EventId>,
    /// Handler-supplied context (instruction, observation, ...).
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub context: Value,
    pub prompt: String,
    pub output: String,
    /// Handler method that produced the decision.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    /// Seconds spent in the LLM call.
    #[serde(default)]
    pub processing_time: f64,
    // -- mutable scoring fields, last-writer-wins --
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

fn default_universe() -> String {
    MAIN_UNIVERSE.to_string()
}

impl DecisionRecord {
    /// Fresh record with a UUID decision id and the current timestamp.
    pub fn new(
        trail_id: TrailId,
        universe_id: impl Into<String>,
        agent_id: AgentId,
        agent_type: impl Into<String>,
        step: u64,
    ) -> Self {
        Self {
            decision_id: DecisionId::new(uuid::Uuid::new_v4().to_string()),
            trail_id,
            universe_id: universe_id.into(),
            agent_id,
            agent_type: agent_type.into(),
            step,
            timestamp: Utc::now(),
            event_id: None,
            context: Value::Null,
            prompt: String::new(),
            output: String::new(),
            action: None,
            processing_time: 0.0,
            rating: None,
            feedback: None,
            reason: None,
        }
    }

    pub fn triggered_by(mut self, event_id: EventId) -> Self {
        self.event_id = Some(event_id);
        self
    }

    pub fn with_exchange(mut self, prompt: impl Into<String>, output: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self.output = output.into();
        self
    }

    pub fn with_context(mut self, context: Value) -> Self {
        self.context = context;
        self
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    pub fn with_processing_time(mut self, seconds: f64) -> Self {
        self.processing_time = seconds;
        self
    }
}

/// A dispatched event captured for durable storage, scoped to its trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub trail_id: TrailId,
    #[serde(default = "default_universe")]
    pub universe_id: String,
    pub step: u64,
    pub event: Event,
}

impl EventRecord {
    pub fn new(trail_id: TrailId, universe_id: impl Into<String>, step: u64, event: Event) -> Self {
        Self {
            trail_id,
            universe_id: universe_id.into(),
            step,
            event,
        }
    }
}

#[cfg(test)]
#[path = "decision_tests.rs"]
mod tests;
