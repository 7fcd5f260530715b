// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! colony-core: shared types for the colony simulation runtime.
//!
//! Events, ids, agent profiles and schemas, relationships, decision
//! records, configuration, and the scene manifest.

pub mod config;
pub mod decision;
pub mod event;
pub mod id;
pub mod profile;
pub mod relationship;
pub mod scene;
pub mod schema;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use config::{
    ClockMode, ConfigError, DatabaseConfig, DistributionConfig, ModelConfigFile, ModelEntry,
    MonitorConfig, NodeMode, SimConfig,
};
pub use decision::{DecisionId, DecisionRecord, EventRecord, TrailId, MAIN_UNIVERSE};
pub use event::{kind, AgentId, Event, EventId, ENV_ID};
pub use id::{CountingIdSource, IdSource, UuidIdSource};
pub use profile::AgentProfile;
pub use relationship::{Relationship, RelationshipManager};
pub use scene::{MetricSpec, SceneInfo, VariableSource, VariableSpec};
pub use schema::{AgentSchema, FieldSpec, FieldType, Sampling};
