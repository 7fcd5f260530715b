// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Node lifecycle: assemble a run from config and drive it to completion.
//!
//! Scenario binaries depend on this module: they build their
//! [`ScenarioHooks`] (the per-type handler registrations) and hand them to
//! [`run`]. The bare `colonyd` binary runs with empty hooks, which
//! exercises the clock and distribution plumbing with handler-less agents.

use std::path::PathBuf;
use std::sync::Arc;

use colony_core::{
    ConfigError, IdSource, ModelConfigFile, NodeMode, SimConfig, TrailId, UuidIdSource,
};
use colony_engine::{
    load_profiles, load_scene, AgentDirectory, Dispatcher, EngineError, EnvSettings,
    EnvironmentLink, EventBus, MonitorManager, ScenarioHooks, SimEnv, StopSignal,
};
use colony_models::{ModelError, ModelManager, UsageLedger};
use colony_net::{
    node_id_or_generated, MasterNode, ProtocolError, WireProfile, WorkerNode,
};
use colony_storage::{
    BatchConfig, BatchProcessor, DecisionSink, DisabledSink, JsonlDecisionStore, StoreError,
};
use thiserror::Error;
use tracing::{info, warn};

/// Paths and overrides assembled by the binary's argument parsing.
#[derive(Debug, Clone)]
pub struct LaunchConfig {
    pub config_path: PathBuf,
    pub overlay_path: Option<PathBuf>,
    pub model_config_path: Option<PathBuf>,
    pub scene_dir: PathBuf,
    pub mode_override: Option<NodeMode>,
}

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("model error: {0}")]
    Model(#[from] ModelError),

    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("network error: {0}")]
    Protocol(#[from] ProtocolError),
}

/// Load config, build the node for its role, and run until termination.
pub async fn run(launch: LaunchConfig, hooks: ScenarioHooks) -> Result<(), LifecycleError> {
    let mut config = SimConfig::load(&launch.config_path, launch.overlay_path.as_deref())?;
    if let Some(mode) = launch.mode_override {
        config.distribution.mode = mode;
        config.distribution.enabled = mode != NodeMode::Single;
    }

    let ledger = UsageLedger::new();
    let models = match &launch.model_config_path {
        Some(path) => {
            let file = ModelConfigFile::load(path)?;
            Arc::new(ModelManager::from_config(&file, &config.model, ledger.clone())?)
        }
        None => {
            info!("no model config supplied, LLM calls disabled");
            Arc::new(ModelManager::new(ledger.clone()))
        }
    };

    let mode = if config.distribution.enabled {
        config.distribution.mode
    } else {
        NodeMode::Single
    };

    match mode {
        NodeMode::Single => run_single(&launch, &config, models, hooks).await,
        NodeMode::Master => run_master(&launch, &config, models, ledger, hooks).await,
        NodeMode::Worker => run_worker(&config, models, hooks).await,
    }
}

/// Build the sink selected by the database config.
fn build_sink(launch: &LaunchConfig, config: &SimConfig) -> Result<Arc<dyn DecisionSink>, LifecycleError> {
    if !config.database.enabled {
        return Ok(Arc::new(DisabledSink));
    }
    let dir = config
        .database
        .path
        .clone()
        .unwrap_or_else(|| launch.scene_dir.join("data"));
    Ok(Arc::new(JsonlDecisionStore::open(&dir)?))
}

struct EnvParts {
    env: Arc<SimEnv>,
    bus: EventBus,
    reader: colony_engine::BusReader,
    directory: Arc<AgentDirectory>,
    stop: Arc<StopSignal>,
}

fn build_environment(launch: &LaunchConfig, config: &SimConfig) -> Result<EnvParts, LifecycleError> {
    let (bus, reader) = EventBus::new();
    let directory = Arc::new(AgentDirectory::new());
    let stop = Arc::new(StopSignal::default());
    let sink = build_sink(launch, config)?;
    let batch = BatchProcessor::start(Arc::clone(&sink), BatchConfig::default());

    let trail_id = TrailId::new(UuidIdSource.fresh());
    let env = SimEnv::new(
        EnvSettings::from_config(config),
        trail_id,
        bus.clone(),
        Arc::clone(&directory),
        batch,
        Arc::clone(&sink),
        Arc::clone(&stop),
    );
    Ok(EnvParts {
        env,
        bus,
        reader,
        directory,
        stop,
    })
}

fn start_monitor(
    config: &SimConfig,
    scene_metrics: Vec<colony_core::MetricSpec>,
    env: Arc<dyn EnvironmentLink>,
    stop: Arc<StopSignal>,
) -> Option<MonitorManager> {
    if !config.monitor.enabled || scene_metrics.is_empty() {
        return None;
    }
    let monitor = MonitorManager::new(&config.monitor, scene_metrics, env, stop);
    monitor.start();
    info!(metrics = monitor.metric_count(), "monitor started");
    Some(monitor)
}

async fn run_single(
    launch: &LaunchConfig,
    config: &SimConfig,
    models: Arc<ModelManager>,
    hooks: ScenarioHooks,
) -> Result<(), LifecycleError> {
    let parts = build_environment(launch, config)?;
    let loaded = load_scene(
        &launch.scene_dir,
        config,
        parts.env.clone() as Arc<dyn EnvironmentLink>,
        models,
        Arc::clone(&parts.directory),
        &hooks,
        &UuidIdSource,
    )
    .await?;
    for agent in &loaded.agents {
        parts.env.add_participant(agent.profile_id().clone());
    }

    let dispatcher = Arc::new(Dispatcher::new(
        parts.bus.clone(),
        parts.env.clone() as Arc<dyn EnvironmentLink>,
        Arc::clone(&parts.directory),
        None,
        Arc::clone(&parts.stop),
    ));
    dispatcher.spawn(parts.reader);

    let _monitor = start_monitor(
        config,
        loaded.info.metrics.clone(),
        parts.env.clone() as Arc<dyn EnvironmentLink>,
        Arc::clone(&parts.stop),
    );

    install_signal_stop(parts.env.clone());
    parts.env.run().await;
    Ok(())
}

async fn run_master(
    launch: &LaunchConfig,
    config: &SimConfig,
    _models: Arc<ModelManager>,
    ledger: UsageLedger,
    _hooks: ScenarioHooks,
) -> Result<(), LifecycleError> {
    // Agents live on workers; the master keeps no handler hooks and no
    // local chat pool.

    let parts = build_environment(launch, config)?;
    let node_id = node_id_or_generated(config.distribution.node_id.as_deref());
    let master = MasterNode::new(
        node_id,
        &config.distribution,
        Arc::clone(&parts.env),
        ledger,
        Arc::clone(&parts.stop),
    );

    let (listener, port) = colony_net::bind(
        &config.distribution.master_address,
        config.distribution.master_port,
    )
    .await?;
    colony_net::spawn(
        listener,
        Arc::clone(&master) as Arc<dyn colony_net::RequestHandler>,
        Arc::clone(&parts.stop),
    );
    info!(port, "master RPC endpoint up");

    master.wait_for_workers().await;
    master.spawn_health_task();

    // Ship placed agents to the workers
    let info = colony_core::SceneInfo::load(&launch.scene_dir)?;
    for (agent_type, profile_config) in &config.agent.profile {
        let profiles = load_profiles(
            &launch.scene_dir,
            agent_type,
            profile_config.count,
            &UuidIdSource,
        )?;
        let description = info.agent_types.get(agent_type).cloned().unwrap_or_default();
        let sys_prompt = format!("You are a {agent_type}. {description}");
        let wire: Vec<WireProfile> = profiles
            .iter()
            .map(|profile| WireProfile::from_profile(profile, &sys_prompt))
            .collect();
        let created = master.create_agents(agent_type, wire).await;
        info!(agent_type, created, "agents placed on workers");
    }

    parts.env.set_router(master.clone());
    let dispatcher = Arc::new(Dispatcher::new(
        parts.bus.clone(),
        parts.env.clone() as Arc<dyn EnvironmentLink>,
        Arc::clone(&parts.directory),
        Some(master.clone() as Arc<dyn colony_engine::EventRouter>),
        Arc::clone(&parts.stop),
    ));
    dispatcher.spawn(parts.reader);

    let _monitor = start_monitor(
        config,
        info.metrics.clone(),
        parts.env.clone() as Arc<dyn EnvironmentLink>,
        Arc::clone(&parts.stop),
    );

    install_signal_stop(parts.env.clone());
    parts.env.run().await;
    Ok(())
}

async fn run_worker(
    config: &SimConfig,
    models: Arc<ModelManager>,
    hooks: ScenarioHooks,
) -> Result<(), LifecycleError> {
    let node_id = node_id_or_generated(config.distribution.node_id.as_deref());
    let (worker, _tasks) =
        WorkerNode::start(node_id, &config.distribution, models, hooks).await?;

    let stop = Arc::clone(worker.stop_signal());
    tokio::spawn(async move {
        if wait_for_shutdown_signal().await {
            stop.trigger("signal");
        }
    });

    worker.run_until_terminated().await;
    Ok(())
}

/// Trigger `stop_simulation` on SIGINT/SIGTERM.
fn install_signal_stop(env: Arc<SimEnv>) {
    tokio::spawn(async move {
        if wait_for_shutdown_signal().await {
            env.stop_simulation("signal").await;
        }
    });
}

async fn wait_for_shutdown_signal() -> bool {
    use tokio::signal::unix::{signal, SignalKind};
    let Ok(mut interrupt) = signal(SignalKind::interrupt()) else {
        warn!("signal handler installation failed");
        return false;
    };
    let Ok(mut terminate) = signal(SignalKind::terminate()) else {
        warn!("signal handler installation failed");
        return false;
    };
    tokio::select! {
        _ = interrupt.recv() => {}
        _ = terminate.recv() => {}
    }
    info!("shutdown signal received");
    true
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
