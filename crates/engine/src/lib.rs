// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! colony-engine: the simulation runtime.
//!
//! The event bus and dispatcher, the agent runtime with its handler
//! table and `generate_reaction`, the environment (clock, env state,
//! termination), scene loading, memory/planning hooks, the metric
//! monitor, and the decision-curation pipeline.

pub mod agent;
pub mod bus;
pub mod dispatcher;
pub mod env;
pub mod environment;
pub mod error;
pub mod memory;
pub mod monitor;
pub mod planning;
pub mod refine;
pub mod scene_loader;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use agent::{Agent, HandlerFn, HandlerFuture, DEFAULT_REACTION_TIMEOUT};
pub use bus::{Activity, BusReader, EventBus, StopSignal};
pub use dispatcher::{Dispatcher, DEFAULT_HANDLER_CONCURRENCY};
pub use env::{AgentDirectory, EnvironmentLink, EventRouter};
pub use environment::{EnvSettings, SimEnv};
pub use error::EngineError;
pub use memory::{memory_from_config, MemoryStrategy, NoopMemory, WindowMemory};
pub use monitor::{MetricSample, MonitorManager};
pub use planning::{planning_from_config, DirectPlanning, PlanningStrategy};
pub use scene_loader::{load_profiles, load_scene, AgentSetup, LoadedScene, ScenarioHooks};
