// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test helpers for use across crates.
//!
//! Gated behind `#[cfg(any(test, feature = "test-support"))]`.

use serde_json::{json, Map, Value};

use crate::decision::{DecisionRecord, TrailId, MAIN_UNIVERSE};
use crate::event::{AgentId, Event, ENV_ID};
use crate::profile::AgentProfile;
use crate::schema::AgentSchema;

// ── Event factories ─────────────────────────────────────────────────────────

pub fn start_event(to: &str, step: u64) -> Event {
    Event::start(ENV_ID, to, step)
}

pub fn ping_event(from: &str, to: &str) -> Event {
    Event::new(from, to, "PingEvent").with("note", "ping")
}

pub fn end_event(reason: &str) -> Event {
    Event::end(ENV_ID, reason)
}

// ── Profile factories ───────────────────────────────────────────────────────

/// Minimal schema with a public `score` and a private `secret`.
pub fn score_schema() -> AgentSchema {
    serde_json::from_value(json!({
        "score": {"type": "int", "default": 0},
        "secret": {"type": "str", "default": "hidden", "private": true}
    }))
    .unwrap_or_default()
}

pub fn score_profile(agent_type: &str, id: &str, score: i64) -> AgentProfile {
    let mut data = Map::new();
    data.insert("score".to_string(), Value::from(score));
    AgentProfile::new(agent_type, AgentId::new(id), score_schema(), Some(data))
}

// ── Decision factories ──────────────────────────────────────────────────────

pub fn decision(trail: &str, agent: &str, step: u64) -> DecisionRecord {
    DecisionRecord::new(
        TrailId::new(trail),
        MAIN_UNIVERSE,
        AgentId::new(agent),
        "TestAgent",
        step,
    )
    .with_exchange(
        format!("prompt for {agent} at step {step}"),
        json!({"answer": "x", "target_ids": ["ENV"]}).to_string(),
    )
}
