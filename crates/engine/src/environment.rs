// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The simulation environment: clock, env state, termination.
//!
//! Round mode emits one `StartEvent` per scheduled agent each round and
//! advances only at quiescence (bus empty, all handlers returned). Tick
//! mode emits on a wall-clock cadence without waiting. Termination comes
//! from `max_steps`, an `EndEvent` addressed to `ENV`, or an external
//! `stop_simulation` call; on termination the environment flushes the
//! batch processor, closes the sink, and signals remote workers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use colony_core::decision::{DecisionRecord, EventRecord};
use colony_core::event::AgentId;
use colony_core::{kind, ClockMode, Event, SimConfig, TrailId, ENV_ID, MAIN_UNIVERSE};
use colony_storage::{BatchProcessor, DecisionSink};
use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::bus::{EventBus, StopSignal};
use crate::env::{AgentDirectory, EnvironmentLink, EventRouter};

/// Environment settings distilled from the simulator config.
#[derive(Debug, Clone)]
pub struct EnvSettings {
    pub name: String,
    pub mode: ClockMode,
    pub max_steps: u64,
    pub tick_interval: Duration,
    pub universe_id: String,
    /// Settle delay between quiescence re-checks when remote workers are
    /// in play (an event may be in flight on a worker while the local bus
    /// looks idle).
    pub settle: Duration,
}

impl EnvSettings {
    pub fn from_config(config: &SimConfig) -> Self {
        let env = &config.simulator.environment;
        Self {
            name: env.name.clone(),
            mode: env.mode,
            max_steps: env.max_steps,
            tick_interval: Duration::from_secs_f64(env.tick_interval_secs.max(0.001)),
            universe_id: MAIN_UNIVERSE.to_string(),
            settle: Duration::from_millis(50),
        }
    }
}

/// The central environment. One per trail on the owning node.
pub struct SimEnv {
    settings: EnvSettings,
    trail_id: TrailId,
    start_time: DateTime<Utc>,
    state: RwLock<Map<String, Value>>,
    round_number: AtomicU64,
    bus: EventBus,
    directory: Arc<AgentDirectory>,
    batch: BatchProcessor,
    sink: Arc<dyn DecisionSink>,
    router: RwLock<Option<Arc<dyn EventRouter>>>,
    stop: Arc<StopSignal>,
    /// Decisions awaiting human feedback export.
    pending_decisions: Mutex<Vec<DecisionRecord>>,
    /// All participating agents, local and remote.
    roster: RwLock<Vec<AgentId>>,
    /// Optional per-run subset to receive start events.
    schedule: RwLock<Option<Vec<AgentId>>>,
    finalized: AtomicBool,
}

impl SimEnv {
    pub fn new(
        settings: EnvSettings,
        trail_id: TrailId,
        bus: EventBus,
        directory: Arc<AgentDirectory>,
        batch: BatchProcessor,
        sink: Arc<dyn DecisionSink>,
        stop: Arc<StopSignal>,
    ) -> Arc<Self> {
        Arc::new(Self {
            settings,
            trail_id,
            start_time: Utc::now(),
            state: RwLock::new(Map::new()),
            round_number: AtomicU64::new(0),
            bus,
            directory,
            batch,
            sink,
            router: RwLock::new(None),
            stop,
            pending_decisions: Mutex::new(Vec::new()),
            roster: RwLock::new(Vec::new()),
            schedule: RwLock::new(None),
            finalized: AtomicBool::new(false),
        })
    }

    pub fn name(&self) -> &str {
        &self.settings.name
    }

    pub fn mode(&self) -> ClockMode {
        self.settings.mode
    }

    pub fn max_steps(&self) -> u64 {
        self.settings.max_steps
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn round_number(&self) -> u64 {
        self.round_number.load(Ordering::SeqCst)
    }

    pub fn stop_signal(&self) -> &Arc<StopSignal> {
        &self.stop
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn directory(&self) -> &Arc<AgentDirectory> {
        &self.directory
    }

    pub fn batch(&self) -> &BatchProcessor {
        &self.batch
    }

    /// Attach the distribution layer's router (master mode).
    pub fn set_router(&self, router: Arc<dyn EventRouter>) {
        *self.router.write() = Some(router);
    }

    pub fn router(&self) -> Option<Arc<dyn EventRouter>> {
        self.router.read().clone()
    }

    /// Add a participating agent (local or remote) to the roster.
    pub fn add_participant(&self, agent_id: AgentId) {
        let mut roster = self.roster.write();
        if !roster.contains(&agent_id) {
            roster.push(agent_id);
        }
    }

    pub fn roster(&self) -> Vec<AgentId> {
        self.roster.read().clone()
    }

    /// Restrict start events to a subset of the roster.
    pub fn set_schedule(&self, agents: Vec<AgentId>) {
        *self.schedule.write() = Some(agents);
    }

    /// Enqueue an event onto the bus.
    pub fn add_event(&self, event: Event) {
        self.bus.enqueue(event);
    }

    /// Decisions buffered for human feedback export; draining them does
    /// not affect durable storage.
    pub fn take_pending_decisions(&self) -> Vec<DecisionRecord> {
        std::mem::take(&mut *self.pending_decisions.lock())
    }

    /// Run the clock until termination, then finalize.
    pub async fn run(self: &Arc<Self>) {
        info!(
            trail_id = %self.trail_id,
            mode = ?self.settings.mode,
            max_steps = self.settings.max_steps,
            "environment starting"
        );
        match self.settings.mode {
            ClockMode::Round => self.run_rounds().await,
            ClockMode::Tick => self.run_ticks().await,
        }
        let reason = self
            .stop
            .reason()
            .unwrap_or_else(|| "completed".to_string());
        self.finalize(&reason).await;
    }

    async fn run_rounds(self: &Arc<Self>) {
        loop {
            if self.stop.is_stopped() {
                break;
            }
            let round = self.round_number();
            if round >= self.settings.max_steps {
                self.stop.trigger("max_steps");
                break;
            }

            let targets = self.scheduled_targets();
            debug!(round, targets = targets.len(), "emitting start events");
            for target in targets {
                self.bus.enqueue(Event::start(ENV_ID, target, round));
            }

            tokio::select! {
                _ = self.wait_quiescent() => {}
                _ = self.stop.wait() => break,
            }

            self.round_number.fetch_add(1, Ordering::SeqCst);
        }
    }

    async fn run_ticks(self: &Arc<Self>) {
        let mut interval = tokio::time::interval(self.settings.tick_interval);
        loop {
            if self.stop.is_stopped() {
                break;
            }
            let tick = self.round_number();
            if tick >= self.settings.max_steps {
                self.stop.trigger("max_steps");
                break;
            }

            for target in self.scheduled_targets() {
                self.bus.enqueue(Event::start(ENV_ID, target, tick));
            }
            self.round_number.fetch_add(1, Ordering::SeqCst);

            tokio::select! {
                _ = interval.tick() => {}
                _ = self.stop.wait() => break,
            }
        }
    }

    /// Wait until no events are queued and no handlers are running. With
    /// remote workers attached, re-check after a settle delay: an event
    /// can be in flight on a worker while the local bus is momentarily
    /// idle.
    async fn wait_quiescent(&self) {
        loop {
            self.bus.activity().wait_idle().await;
            if self.router.read().is_none() {
                return;
            }
            tokio::time::sleep(self.settings.settle).await;
            if self.bus.activity().is_idle() {
                return;
            }
        }
    }

    fn scheduled_targets(&self) -> Vec<AgentId> {
        let schedule = self.schedule.read();
        match schedule.as_ref() {
            Some(subset) => subset.clone(),
            None => self.roster.read().clone(),
        }
    }

    /// Flush recording, close the sink, and signal workers. Idempotent.
    async fn finalize(&self, reason: &str) {
        if self.finalized.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(reason, round = self.round_number(), "environment terminating");

        if let Err(error) = self.batch.stop().await {
            warn!(%error, "batch processor flush on termination failed");
        }
        if let Err(error) = self.sink.close().await {
            warn!(%error, "sink close failed");
        }
        if let Some(router) = self.router() {
            router.broadcast_terminate(reason).await;
        }
    }
}

#[async_trait]
impl EnvironmentLink for SimEnv {
    fn trail_id(&self) -> TrailId {
        self.trail_id.clone()
    }

    fn universe_id(&self) -> String {
        self.settings.universe_id.clone()
    }

    fn current_step(&self) -> u64 {
        self.round_number()
    }

    async fn get_data(&self, key: &str, default: Value) -> Value {
        self.state.read().get(key).cloned().unwrap_or(default)
    }

    async fn update_data(&self, key: &str, value: Value) -> bool {
        self.state.write().insert(key.to_string(), value);
        true
    }

    async fn get_agent_data(&self, agent_id: &AgentId, key: &str, default: Value) -> Value {
        if let Some(agent) = self.directory.get(agent_id) {
            return agent.profile().get_data(key, default);
        }
        let router = self.router();
        if let Some(router) = router {
            if let Some(value) = router.remote_agent_data(agent_id, key, default.clone()).await {
                return value;
            }
        }
        default
    }

    async fn get_agent_data_by_type(
        &self,
        agent_type: &str,
        key: &str,
        default: Value,
    ) -> HashMap<String, Value> {
        let mut values: HashMap<String, Value> = self
            .directory
            .agents_of_type(agent_type)
            .into_iter()
            .map(|agent| {
                (
                    agent.profile_id().to_string(),
                    agent.profile().get_data(key, default.clone()),
                )
            })
            .collect();

        let router = self.router();
        if let Some(router) = router {
            for (agent_id, value) in router
                .remote_agent_data_by_type(agent_type, key, default.clone())
                .await
            {
                values.entry(agent_id).or_insert(value);
            }
        }
        values
    }

    async fn queue_event(&self, record: EventRecord) {
        if let Err(error) = self.batch.add_storage_event(record).await {
            warn!(%error, "failed to queue event record");
        }
    }

    async fn queue_decision(&self, record: DecisionRecord) {
        self.pending_decisions.lock().push(record.clone());
        if let Err(error) = self.batch.add_decision_record(record).await {
            warn!(%error, "failed to queue decision record");
        }
    }

    async fn handle_env_event(&self, event: Event) -> Vec<Event> {
        match event.event_kind.as_str() {
            kind::DATA => {
                let key = event.str_field("key").unwrap_or_default().to_string();
                let default = event.field("default").cloned().unwrap_or(Value::Null);
                let value = self.get_data(&key, default).await;
                vec![Event::data_response(ENV_ID, &event, value, true, None)]
            }
            kind::DATA_UPDATE => {
                let key = event.str_field("key").unwrap_or_default().to_string();
                let value = event.field("value").cloned().unwrap_or(Value::Null);
                let success = self.update_data(&key, value).await;
                vec![Event::data_update_response(ENV_ID, &event, success, None)]
            }
            kind::AGENT_DATA_BY_TYPE => {
                let agent_type = event.str_field("agent_type").unwrap_or_default().to_string();
                let key = event.str_field("key").unwrap_or_default().to_string();
                let default = event.field("default").cloned().unwrap_or(Value::Null);
                let values = self.get_agent_data_by_type(&agent_type, &key, default).await;
                let map: Map<String, Value> = values.into_iter().collect();
                vec![Event::data_response(
                    ENV_ID,
                    &event,
                    Value::Object(map),
                    true,
                    None,
                )]
            }
            kind::END => {
                let reason = event.str_field("reason").unwrap_or("end_event").to_string();
                self.stop.trigger(&reason);
                Vec::new()
            }
            other => {
                debug!(event_kind = other, "environment observed event");
                Vec::new()
            }
        }
    }

    async fn stop_simulation(&self, reason: &str) {
        self.stop.trigger(reason);
    }
}

#[cfg(test)]
#[path = "environment_tests.rs"]
mod tests;
