// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test harnesses for behavioral specifications.
//!
//! `World` is a complete single-node runtime with a durable store and a
//! scripted chat model. `Cluster` is a master plus N in-process workers
//! talking real framed RPC over localhost.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, dead_code)]

use std::sync::Arc;
use std::time::Duration;

use colony_core::{AgentId, ClockMode, DistributionConfig, Event, TrailId, MAIN_UNIVERSE};
use colony_engine::{
    Agent, AgentDirectory, Dispatcher, EnvSettings, EnvironmentLink, EventBus, HandlerFn,
    ScenarioHooks, SimEnv, StopSignal,
};
use colony_models::{ModelManager, ScriptedChatModel, UsageLedger};
use colony_net::{MasterNode, NodeId, WireProfile, WorkerNode};
use colony_storage::{BatchConfig, BatchProcessor, DecisionSink, JsonlDecisionStore, StepRange};

pub const SPEC_WAIT_MAX: Duration = Duration::from_secs(5);
pub const SPEC_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Poll until `check` passes or the spec wait budget runs out.
pub async fn wait_until(mut check: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + SPEC_WAIT_MAX;
    while !check() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met within spec wait budget"
        );
        tokio::time::sleep(SPEC_POLL_INTERVAL).await;
    }
}

// ── Single-node world ───────────────────────────────────────────────────────

pub struct World {
    pub env: Arc<SimEnv>,
    pub bus: EventBus,
    pub directory: Arc<AgentDirectory>,
    pub stop: Arc<StopSignal>,
    pub sink: Arc<JsonlDecisionStore>,
    pub models: Arc<ModelManager>,
    pub model: ScriptedChatModel,
    pub trail: TrailId,
    store_dir: tempfile::TempDir,
}

impl World {
    /// Build a round-mode world with a durable store and one scripted
    /// chat model, and start its dispatcher.
    pub fn start(max_steps: u64, scripted: ScriptedChatModel) -> Self {
        let store_dir = tempfile::tempdir().unwrap();
        let sink = Arc::new(JsonlDecisionStore::open(store_dir.path()).unwrap());

        let (bus, reader) = EventBus::new();
        let directory = Arc::new(AgentDirectory::new());
        let stop = Arc::new(StopSignal::default());
        let batch = BatchProcessor::start(
            sink.clone() as Arc<dyn DecisionSink>,
            BatchConfig {
                batch_size: 4,
                max_wait: Duration::from_millis(50),
            },
        );

        let mut manager = ModelManager::new(UsageLedger::new());
        manager.register_chat(Arc::new(scripted.clone()));
        let models = Arc::new(manager);

        let trail = TrailId::new("trail-spec");
        let settings = EnvSettings {
            name: "spec".to_string(),
            mode: ClockMode::Round,
            max_steps,
            tick_interval: Duration::from_millis(10),
            universe_id: MAIN_UNIVERSE.to_string(),
            settle: Duration::from_millis(5),
        };
        let env = SimEnv::new(
            settings,
            trail.clone(),
            bus.clone(),
            Arc::clone(&directory),
            batch,
            sink.clone() as Arc<dyn DecisionSink>,
            Arc::clone(&stop),
        );

        let dispatcher = Arc::new(Dispatcher::new(
            bus.clone(),
            env.clone() as Arc<dyn EnvironmentLink>,
            Arc::clone(&directory),
            None,
            Arc::clone(&stop),
        ));
        dispatcher.spawn(reader);

        Self {
            env,
            bus,
            directory,
            stop,
            sink,
            models,
            model: scripted,
            trail,
            store_dir,
        }
    }

    /// Add a participating agent with the given handler registrations.
    pub fn add_agent(
        &self,
        agent_type: &str,
        id: &str,
        registrations: &[(&str, &str, HandlerFn)],
    ) -> Arc<Agent> {
        let profile = colony_core::test_support::score_profile(agent_type, id, 0);
        let agent = Arc::new(Agent::new(
            profile,
            format!("You are {id}, a {agent_type}."),
            self.env.clone() as Arc<dyn EnvironmentLink>,
            Arc::clone(&self.models),
            Arc::clone(&self.directory),
        ));
        for (kind, name, handler) in registrations {
            agent.register_event(kind, name, handler.clone());
        }
        self.directory.register(Arc::clone(&agent));
        self.env.add_participant(AgentId::new(id));
        agent
    }

    /// Stored decisions for one agent, all steps.
    pub async fn decisions_of(&self, agent_id: &str) -> Vec<colony_core::DecisionRecord> {
        self.sink
            .get_agent_decisions(
                &self.trail,
                &AgentId::new(agent_id),
                MAIN_UNIVERSE,
                StepRange::default(),
                1000,
            )
            .await
            .unwrap()
    }

    /// Directory the durable store lives in.
    pub fn store_path(&self) -> std::path::PathBuf {
        self.store_dir.path().to_path_buf()
    }

    /// Raw store lines (events included), for observations the query
    /// surface does not cover.
    pub fn store_lines(&self) -> Vec<String> {
        std::fs::read_to_string(self.store_dir.path().join("decisions.jsonl"))
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    /// Count stored event records of one kind addressed to `to`.
    pub fn stored_events(&self, kind: &str, to: &str) -> usize {
        self.store_lines()
            .iter()
            .filter(|line| {
                line.contains("\"type\":\"event\"")
                    && line.contains(&format!("\"kind\":\"{kind}\""))
                    && line.contains(&format!("\"to\":\"{to}\""))
            })
            .count()
    }
}

// ── Distributed cluster ─────────────────────────────────────────────────────

pub struct Cluster {
    pub master: Arc<MasterNode>,
    pub env: Arc<SimEnv>,
    pub stop: Arc<StopSignal>,
    pub sink: Arc<JsonlDecisionStore>,
    pub workers: Vec<Arc<WorkerNode>>,
    store_dir: tempfile::TempDir,
}

impl Cluster {
    /// Start a master and `worker_count` workers over localhost TCP.
    /// Every worker gets the same hooks and a fresh scripted model.
    pub async fn start(
        worker_count: usize,
        worker_timeout_secs: u64,
        hooks: ScenarioHooks,
        worker_responses: &str,
    ) -> Self {
        let store_dir = tempfile::tempdir().unwrap();
        let sink = Arc::new(JsonlDecisionStore::open(store_dir.path()).unwrap());

        let (bus, reader) = EventBus::new();
        let directory = Arc::new(AgentDirectory::new());
        let stop = Arc::new(StopSignal::default());
        let batch = BatchProcessor::start(
            sink.clone() as Arc<dyn DecisionSink>,
            BatchConfig {
                batch_size: 2,
                max_wait: Duration::from_millis(50),
            },
        );

        let settings = EnvSettings {
            name: "spec-cluster".to_string(),
            mode: ClockMode::Round,
            max_steps: 100,
            tick_interval: Duration::from_millis(10),
            universe_id: MAIN_UNIVERSE.to_string(),
            settle: Duration::from_millis(20),
        };
        let env = SimEnv::new(
            settings,
            TrailId::new("trail-cluster"),
            bus.clone(),
            Arc::clone(&directory),
            batch,
            sink.clone() as Arc<dyn DecisionSink>,
            Arc::clone(&stop),
        );

        let (listener, master_port) = colony_net::bind("127.0.0.1", 0).await.unwrap();
        let config = DistributionConfig {
            expected_workers: worker_count,
            worker_timeout_secs,
            health_check_interval_secs: 1,
            master_address: "127.0.0.1".to_string(),
            master_port,
            heartbeat_interval_secs: 1,
            ..DistributionConfig::default()
        };
        let master = MasterNode::new(
            NodeId::new("master-spec"),
            &config,
            Arc::clone(&env),
            UsageLedger::new(),
            Arc::clone(&stop),
        );
        colony_net::spawn(
            listener,
            Arc::clone(&master) as Arc<dyn colony_net::RequestHandler>,
            Arc::clone(&stop),
        );

        let mut workers = Vec::new();
        for index in 0..worker_count {
            let worker_config = DistributionConfig {
                master_address: "127.0.0.1".to_string(),
                master_port,
                worker_address: "127.0.0.1".to_string(),
                worker_port: 0,
                heartbeat_interval_secs: 1,
                ..DistributionConfig::default()
            };
            let mut manager = ModelManager::new(UsageLedger::new());
            manager.register_chat(Arc::new(ScriptedChatModel::always(worker_responses)));
            let (worker, _tasks) = WorkerNode::start(
                NodeId::new(format!("w-{index}")),
                &worker_config,
                Arc::new(manager),
                hooks.clone(),
            )
            .await
            .unwrap();
            worker.proxy().set_trail_id(TrailId::new("trail-cluster"));
            workers.push(worker);
        }

        master.wait_for_workers().await;

        env.set_router(master.clone());
        let dispatcher = Arc::new(Dispatcher::new(
            bus,
            env.clone() as Arc<dyn EnvironmentLink>,
            directory,
            Some(master.clone() as Arc<dyn colony_engine::EventRouter>),
            Arc::clone(&stop),
        ));
        dispatcher.spawn(reader);

        Self {
            master,
            env,
            stop,
            sink,
            workers,
            store_dir,
        }
    }

    /// Ship score-profile agents of one type across the cluster.
    pub async fn create_scored_agents(&self, agent_type: &str, scores: &[i64]) -> usize {
        let wire: Vec<WireProfile> = scores
            .iter()
            .enumerate()
            .map(|(index, score)| {
                let profile = colony_core::test_support::score_profile(
                    agent_type,
                    &format!("{agent_type}{index}"),
                    *score,
                );
                WireProfile::from_profile(&profile, "You are a spec agent.")
            })
            .collect();
        self.master.create_agents(agent_type, wire).await
    }

    /// Count master-side stored events of one kind.
    pub fn stored_events(&self, kind: &str) -> usize {
        std::fs::read_to_string(self.store_dir.path().join("decisions.jsonl"))
            .unwrap_or_default()
            .lines()
            .filter(|line| {
                line.contains("\"type\":\"event\"")
                    && line.contains(&format!("\"kind\":\"{kind}\""))
            })
            .count()
    }
}

/// Handler that replies to `StartEvent` with one `DoneEvent` to ENV.
pub fn done_reply_hooks(agent_type: &str) -> ScenarioHooks {
    ScenarioHooks::new().on_build(agent_type, |agent: &Arc<Agent>| {
        agent.register_event(
            "StartEvent",
            "acknowledge",
            Arc::new(|agent, event| {
                Box::pin(async move {
                    Ok(vec![Event::new(
                        agent.profile_id().clone(),
                        colony_core::ENV_ID,
                        "DoneEvent",
                    )
                    .caused_by(&event)])
                })
            }),
        );
    })
}
