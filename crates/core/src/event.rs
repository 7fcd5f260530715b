// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event types for the simulation runtime.
//!
//! Event kinds are open strings: each scenario defines its own kinds and the
//! runtime routes purely on the `kind` tag. A handful of well-known kinds
//! (start/end and the env data protocol) are defined in [`kind`].
//!
//! Events are immutable once enqueued, the builder API is consumed before
//! the event reaches the bus, and nothing downstream mutates them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

crate::id_type! {
    /// Unique identifier for an event within a trail.
    pub struct EventId;
}

crate::id_type! {
    /// Unique identifier for an agent instance.
    ///
    /// `"ENV"` is reserved for the environment ([`ENV_ID`]).
    pub struct AgentId;
}

/// Reserved agent identifier for the environment.
pub const ENV_ID: &str = "ENV";

/// Well-known event kinds.
pub mod kind {
    /// Tick/round trigger emitted by the environment.
    pub const START: &str = "StartEvent";
    /// Terminates the run when addressed to `ENV`.
    pub const END: &str = "EndEvent";
    /// Env-state read request.
    pub const DATA: &str = "DataEvent";
    /// Paired response for [`DATA`] and [`AGENT_DATA_BY_TYPE`].
    pub const DATA_RESPONSE: &str = "DataResponseEvent";
    /// Env-state write request.
    pub const DATA_UPDATE: &str = "DataUpdateEvent";
    /// Paired response for [`DATA_UPDATE`].
    pub const DATA_UPDATE_RESPONSE: &str = "DataUpdateResponseEvent";
    /// Aggregate read across all agents of one type.
    pub const AGENT_DATA_BY_TYPE: &str = "AgentDataByTypeEvent";
}

/// A typed message routed between agents (or agent and environment).
///
/// Serializes to the self-describing wire blob:
/// `{event_id, parent_event_id, from, to, kind, timestamp, payload}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub event_id: EventId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_event_id: Option<EventId>,
    #[serde(rename = "from")]
    pub from_agent_id: AgentId,
    #[serde(rename = "to")]
    pub to_agent_id: AgentId,
    #[serde(rename = "kind")]
    pub event_kind: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub payload: Map<String, Value>,
}

impl Event {
    /// Create an event with a fresh UUID identity and the current timestamp.
    pub fn new(
        from: impl Into<AgentId>,
        to: impl Into<AgentId>,
        event_kind: impl Into<String>,
    ) -> Self {
        Self {
            event_id: EventId::new(uuid::Uuid::new_v4().to_string()),
            parent_event_id: None,
            from_agent_id: from.into(),
            to_agent_id: to.into(),
            event_kind: event_kind.into(),
            timestamp: Utc::now(),
            payload: Map::new(),
        }
    }

    /// Attach a payload field. Values are anything `serde_json` can represent.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    /// Record the triggering event as this event's parent.
    pub fn caused_by(mut self, parent: &Event) -> Self {
        self.parent_event_id = Some(parent.event_id.clone());
        self
    }

    pub fn is_to_env(&self) -> bool {
        self.to_agent_id == *ENV_ID
    }

    // -- payload accessors --

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }

    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }

    pub fn f64_field(&self, key: &str) -> Option<f64> {
        self.payload.get(key).and_then(Value::as_f64)
    }

    pub fn u64_field(&self, key: &str) -> Option<u64> {
        self.payload.get(key).and_then(Value::as_u64)
    }

    pub fn bool_field(&self, key: &str) -> Option<bool> {
        self.payload.get(key).and_then(Value::as_bool)
    }

    /// Correlation id for the env data protocol.
    pub fn request_id(&self) -> Option<&str> {
        self.str_field("request_id")
    }

    // -- well-known constructors --

    /// Tick/round trigger. `step` is the environment's current step.
    pub fn start(from: impl Into<AgentId>, to: impl Into<AgentId>, step: u64) -> Self {
        Self::new(from, to, kind::START).with("step", step)
    }

    /// Termination request; terminal when addressed to [`ENV_ID`].
    pub fn end(from: impl Into<AgentId>, reason: impl Into<String>) -> Self {
        Self::new(from, ENV_ID, kind::END).with("reason", reason.into())
    }

    /// Env-state read request.
    pub fn data_request(
        from: impl Into<AgentId>,
        to: impl Into<AgentId>,
        request_id: impl Into<String>,
        key: impl Into<String>,
        default: Value,
    ) -> Self {
        Self::new(from, to, kind::DATA)
            .with("request_id", request_id.into())
            .with("key", key.into())
            .with("default", default)
    }

    /// Paired response for a data read. `value` is the resolved value.
    pub fn data_response(
        from: impl Into<AgentId>,
        request: &Event,
        value: Value,
        success: bool,
        error: Option<String>,
    ) -> Self {
        let mut event = Self::new(from, request.from_agent_id.clone(), kind::DATA_RESPONSE)
            .with("request_id", request.request_id().unwrap_or_default())
            .with("value", value)
            .with("success", success)
            .caused_by(request);
        if let Some(message) = error {
            event = event.with("error", message);
        }
        event
    }

    /// Env-state write request.
    pub fn data_update(
        from: impl Into<AgentId>,
        to: impl Into<AgentId>,
        request_id: impl Into<String>,
        key: impl Into<String>,
        value: Value,
    ) -> Self {
        Self::new(from, to, kind::DATA_UPDATE)
            .with("request_id", request_id.into())
            .with("key", key.into())
            .with("value", value)
    }

    /// Paired response for a data write.
    pub fn data_update_response(
        from: impl Into<AgentId>,
        request: &Event,
        success: bool,
        error: Option<String>,
    ) -> Self {
        let mut event = Self::new(
            from,
            request.from_agent_id.clone(),
            kind::DATA_UPDATE_RESPONSE,
        )
        .with("request_id", request.request_id().unwrap_or_default())
        .with("key", request.str_field("key").unwrap_or_default())
        .with("success", success)
        .caused_by(request);
        if let Some(message) = error {
            event = event.with("error", message);
        }
        event
    }

    /// Aggregate read across all agents of `agent_type`.
    pub fn agent_data_by_type(
        from: impl Into<AgentId>,
        to: impl Into<AgentId>,
        request_id: impl Into<String>,
        agent_type: impl Into<String>,
        key: impl Into<String>,
        default: Value,
    ) -> Self {
        Self::new(from, to, kind::AGENT_DATA_BY_TYPE)
            .with("request_id", request_id.into())
            .with("agent_type", agent_type.into())
            .with("key", key.into())
            .with("default", default)
    }

    /// One-line summary for structured logs.
    pub fn log_summary(&self) -> String {
        format!(
            "{} {} -> {} id={}",
            self.event_kind,
            self.from_agent_id,
            self.to_agent_id,
            self.event_id.prefix(8)
        )
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
