// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Master node: worker registry, agent placement, event forwarding.
//!
//! The registry (workers + placement map) sits behind one lock; every
//! modification, including heartbeat updates, acquires it. Placement is
//! sticky for the life of the trail, a removed worker invalidates its
//! placements and events to those agents drop with a warning.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use colony_core::event::AgentId;
use colony_core::{DistributionConfig, Event, ENV_ID};
use colony_engine::{EnvironmentLink, EventRouter, SimEnv, StopSignal};
use colony_models::{UsageLedger, UsageSummary};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::client::RpcClient;
use crate::node::{NodeId, NodeState, NodeStatus};
use crate::protocol::{Request, Response, WireProfile, PROTOCOL_VERSION};
use crate::server::RequestHandler;

colony_core::id_type! {
    /// Identifier a worker registers under.
    pub struct WorkerId;
}

/// Liveness status of a registered worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerStatus {
    Connected,
    Lost,
}

/// Information about a connected worker node.
#[derive(Debug, Clone)]
pub struct WorkerInfo {
    pub worker_id: WorkerId,
    pub address: String,
    pub port: u16,
    pub agent_count: usize,
    pub agent_ids: Vec<AgentId>,
    pub status: WorkerStatus,
    pub last_heartbeat: Instant,
}

/// Workers and placement, guarded together by the master lock.
#[derive(Default)]
struct Registry {
    workers: HashMap<WorkerId, WorkerInfo>,
    placement: HashMap<AgentId, WorkerId>,
}

/// The master node.
pub struct MasterNode {
    status: NodeStatus,
    env: Arc<SimEnv>,
    registry: Mutex<Registry>,
    registration: Notify,
    expected_workers: usize,
    worker_timeout: Duration,
    health_check_interval: Duration,
    shutting_down: AtomicBool,
    ledger: UsageLedger,
    stop: Arc<StopSignal>,
}

impl MasterNode {
    pub fn new(
        node_id: NodeId,
        config: &DistributionConfig,
        env: Arc<SimEnv>,
        ledger: UsageLedger,
        stop: Arc<StopSignal>,
    ) -> Arc<Self> {
        Arc::new(Self {
            status: NodeStatus::new(node_id),
            env,
            registry: Mutex::new(Registry::default()),
            registration: Notify::new(),
            expected_workers: config.expected_workers,
            worker_timeout: Duration::from_secs(config.worker_timeout_secs.max(1)),
            health_check_interval: Duration::from_secs(config.health_check_interval_secs.max(1)),
            shutting_down: AtomicBool::new(false),
            ledger,
            stop,
        })
    }

    pub fn status(&self) -> &NodeStatus {
        &self.status
    }

    pub fn env(&self) -> &Arc<SimEnv> {
        &self.env
    }

    pub fn worker_count(&self) -> usize {
        self.registry.lock().workers.len()
    }

    pub fn worker_ids(&self) -> Vec<WorkerId> {
        let mut ids: Vec<WorkerId> = self.registry.lock().workers.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn placement_of(&self, agent_id: &AgentId) -> Option<WorkerId> {
        self.registry.lock().placement.get(agent_id).cloned()
    }

    /// Register (or re-register) a worker. Re-registration updates the
    /// endpoint and resets the heartbeat.
    pub fn register_worker(&self, worker_id: &str, address: &str, port: u16) -> String {
        let worker_id = WorkerId::new(worker_id);
        let message = {
            let mut registry = self.registry.lock();
            let message = match registry.workers.get_mut(&worker_id) {
                Some(info) => {
                    warn!(worker_id = %worker_id, "worker already registered, updating endpoint");
                    info.address = address.to_string();
                    info.port = port;
                    info.status = WorkerStatus::Connected;
                    info.last_heartbeat = Instant::now();
                    format!("Worker {worker_id} updated")
                }
                None => {
                    registry.workers.insert(
                        worker_id.clone(),
                        WorkerInfo {
                            worker_id: worker_id.clone(),
                            address: address.to_string(),
                            port,
                            agent_count: 0,
                            agent_ids: Vec::new(),
                            status: WorkerStatus::Connected,
                            last_heartbeat: Instant::now(),
                        },
                    );
                    format!("Worker {worker_id} registered successfully")
                }
            };
            // The worker's proxy environment answers at a reserved id so
            // response events can route back to it.
            registry
                .placement
                .insert(proxy_env_id(&worker_id), worker_id.clone());
            message
        };
        info!(worker_id = %worker_id, address, port, "worker registered");
        self.registration.notify_waiters();
        message
    }

    /// Wait until the expected number of workers have registered.
    /// `expected_workers == 0` returns immediately.
    pub async fn wait_for_workers(&self) {
        loop {
            let notified = self.registration.notified();
            let connected = self.worker_count();
            if connected >= self.expected_workers {
                info!(connected, "all expected workers connected");
                self.status.advance(NodeState::Ready);
                return;
            }
            info!(
                connected,
                expected = self.expected_workers,
                "waiting for workers"
            );
            notified.await;
        }
    }

    /// Record a heartbeat. Returns false for unknown workers (asking the
    /// worker to re-register).
    pub fn heartbeat(&self, worker_id: &str) -> bool {
        let worker_id = WorkerId::new(worker_id);
        let mut registry = self.registry.lock();
        match registry.workers.get_mut(&worker_id) {
            Some(info) => {
                info.last_heartbeat = Instant::now();
                info.status = WorkerStatus::Connected;
                true
            }
            None => {
                warn!(worker_id = %worker_id, "heartbeat from unknown worker");
                false
            }
        }
    }

    /// Place an agent on the least-loaded worker (ties broken by stable
    /// worker-id order). Sticky for the life of the trail.
    pub fn allocate_agent(&self, agent_id: AgentId) -> Option<WorkerId> {
        let mut registry = self.registry.lock();
        if let Some(existing) = registry.placement.get(&agent_id) {
            return Some(existing.clone());
        }

        let target = {
            let mut workers: Vec<&WorkerInfo> = registry.workers.values().collect();
            workers.sort_by(|a, b| {
                a.agent_count
                    .cmp(&b.agent_count)
                    .then_with(|| a.worker_id.cmp(&b.worker_id))
            });
            workers.first().map(|info| info.worker_id.clone())
        };

        let Some(worker_id) = target else {
            warn!(agent_id = %agent_id, "no workers available to place agent");
            return None;
        };

        if let Some(info) = registry.workers.get_mut(&worker_id) {
            info.agent_count += 1;
            info.agent_ids.push(agent_id.clone());
        }
        registry.placement.insert(agent_id.clone(), worker_id.clone());
        debug!(agent_id = %agent_id, worker_id = %worker_id, "agent placed");
        Some(worker_id)
    }

    /// Ship placed profiles to their workers and add them to the roster.
    pub async fn create_agents(
        &self,
        agent_type: &str,
        profiles: Vec<WireProfile>,
    ) -> usize {
        let mut by_worker: HashMap<WorkerId, Vec<WireProfile>> = HashMap::new();
        for profile in profiles {
            let agent_id = AgentId::new(profile.profile_id.clone());
            match self.allocate_agent(agent_id.clone()) {
                Some(worker_id) => {
                    self.env.add_participant(agent_id);
                    by_worker.entry(worker_id).or_default().push(profile);
                }
                None => {
                    warn!(agent_id = %agent_id, "dropping unplaceable agent");
                }
            }
        }

        let mut created = 0;
        for (worker_id, batch) in by_worker {
            let Some(client) = self.client_for(&worker_id) else {
                continue;
            };
            let request = Request::CreateAgents {
                agent_type: agent_type.to_string(),
                profiles: batch,
            };
            match client.call(&request).await {
                Ok(Response::AgentsCreated { count }) => created += count,
                Ok(other) => warn!(worker_id = %worker_id, response = ?other, "unexpected create response"),
                Err(error) => warn!(worker_id = %worker_id, %error, "agent creation failed"),
            }
        }
        created
    }

    fn client_for(&self, worker_id: &WorkerId) -> Option<RpcClient> {
        let registry = self.registry.lock();
        registry
            .workers
            .get(worker_id)
            .map(|info| RpcClient::new(info.address.clone(), info.port))
    }

    fn worker_clients(&self) -> Vec<(WorkerId, RpcClient)> {
        let registry = self.registry.lock();
        registry
            .workers
            .values()
            .map(|info| {
                (
                    info.worker_id.clone(),
                    RpcClient::new(info.address.clone(), info.port),
                )
            })
            .collect()
    }

    /// Drop workers whose heartbeat is older than `worker_timeout` and
    /// invalidate their placements. Returns the removed worker ids.
    pub fn check_workers_health(&self) -> Vec<WorkerId> {
        let mut removed = Vec::new();
        let mut registry = self.registry.lock();

        let stale: Vec<WorkerId> = registry
            .workers
            .values()
            .filter(|info| info.last_heartbeat.elapsed() > self.worker_timeout)
            .map(|info| info.worker_id.clone())
            .collect();

        for worker_id in stale {
            if let Some(info) = registry.workers.remove(&worker_id) {
                warn!(
                    worker_id = %worker_id,
                    stale_for = ?info.last_heartbeat.elapsed(),
                    "worker timed out, removing"
                );
                for agent_id in &info.agent_ids {
                    registry.placement.remove(agent_id);
                }
                registry.placement.remove(&proxy_env_id(&worker_id));
                removed.push(worker_id);
            }
        }
        removed
    }

    /// Spawn the periodic health scan.
    pub fn spawn_health_task(self: &Arc<Self>) -> JoinHandle<()> {
        let master = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(master.health_check_interval);
            ticker.tick().await; // skip the immediate first tick
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = master.stop.wait() => break,
                }
                let removed = master.check_workers_health();
                if !removed.is_empty() {
                    warn!(removed = removed.len(), "health check removed workers");
                }
            }
        })
    }

    /// Best-effort token usage: the master's own ledger merged with a pull
    /// from every worker. Unreachable workers contribute nothing.
    pub async fn collect_token_usage(&self) -> UsageSummary {
        let mut summary = self.ledger.summary();
        for (worker_id, client) in self.worker_clients() {
            match client.try_call(&Request::GetTokenUsage).await {
                Some(Response::TokenUsage { usage }) => summary.merge(&usage),
                Some(_) | None => {
                    debug!(worker_id = %worker_id, "token usage pull failed")
                }
            }
        }
        summary
    }

    /// Send `Terminate` to every worker. Errors are expected during
    /// shutdown and logged at debug.
    pub async fn send_termination_to_workers(&self, reason: &str) {
        self.shutting_down.store(true, Ordering::SeqCst);
        self.status.advance(NodeState::ShuttingDown);
        for (worker_id, client) in self.worker_clients() {
            info!(worker_id = %worker_id, "sending termination to worker");
            if client
                .try_call(&Request::Terminate {
                    reason: reason.to_string(),
                })
                .await
                .is_none()
            {
                debug!(worker_id = %worker_id, "termination signal not delivered");
            }
        }
        self.status.advance(NodeState::Stopped);
    }
}

/// Reserved bus address of a worker's proxy environment.
pub fn proxy_env_id(worker_id: &WorkerId) -> AgentId {
    AgentId::new(format!("{worker_id}_ENV"))
}

#[async_trait]
impl EventRouter for MasterNode {
    /// Forward an event to the worker hosting its target. Unknown targets
    /// drop with one warning; during shutdown forwarding is suppressed to
    /// avoid unavailable-endpoint noise.
    async fn forward(&self, event: Event) -> bool {
        if self.shutting_down.load(Ordering::SeqCst) && event.to_agent_id != *ENV_ID {
            return true;
        }

        let target = event.to_agent_id.clone();
        let endpoint = {
            let registry = self.registry.lock();
            let Some(worker_id) = registry.placement.get(&target) else {
                warn!(agent_id = %target, event_kind = %event.event_kind, "unknown agent, event dropped");
                return false;
            };
            let Some(info) = registry.workers.get(worker_id) else {
                warn!(agent_id = %target, worker_id = %worker_id, "worker gone, event dropped");
                return false;
            };
            (info.worker_id.clone(), info.address.clone(), info.port)
        };

        let (worker_id, address, port) = endpoint;
        let client = RpcClient::new(address, port);
        match client.call(&Request::SendEvent { event }).await {
            Ok(Response::EventAccepted { accepted }) => accepted,
            Ok(other) => {
                warn!(worker_id = %worker_id, response = ?other, "unexpected forward response");
                false
            }
            Err(error) => {
                if !self.shutting_down.load(Ordering::SeqCst) {
                    warn!(worker_id = %worker_id, %error, "event forwarding failed, dropped");
                }
                false
            }
        }
    }

    async fn remote_agent_data(
        &self,
        agent_id: &AgentId,
        key: &str,
        default: Value,
    ) -> Option<Value> {
        let worker_id = self.placement_of(agent_id)?;
        let client = self.client_for(&worker_id)?;
        match client
            .try_call(&Request::GetAgentData {
                agent_id: agent_id.to_string(),
                key: key.to_string(),
                default,
            })
            .await
        {
            Some(Response::AgentData { value }) => Some(value),
            _ => None,
        }
    }

    /// Fan out to every worker and merge. Workers without agents of the
    /// type answer with empty maps.
    async fn remote_agent_data_by_type(
        &self,
        agent_type: &str,
        key: &str,
        default: Value,
    ) -> HashMap<String, Value> {
        let mut merged = HashMap::new();
        for (worker_id, client) in self.worker_clients() {
            let request = Request::GetAgentDataByType {
                agent_type: agent_type.to_string(),
                key: key.to_string(),
                default: default.clone(),
            };
            match client.try_call(&request).await {
                Some(Response::AgentDataByType { values }) => merged.extend(values),
                Some(_) | None => {
                    debug!(worker_id = %worker_id, "by-type query failed on worker")
                }
            }
        }
        merged
    }

    async fn broadcast_terminate(&self, reason: &str) {
        self.send_termination_to_workers(reason).await;
    }
}

#[async_trait]
impl RequestHandler for MasterNode {
    async fn handle(&self, request: Request) -> Response {
        match request {
            Request::Ping => Response::Pong,
            Request::Hello { .. } => Response::Hello {
                version: PROTOCOL_VERSION.to_string(),
            },
            Request::RegisterWorker {
                worker_id,
                address,
                port,
            } => Response::Registered {
                message: self.register_worker(&worker_id, &address, port),
            },
            Request::Heartbeat { worker_id } => Response::HeartbeatAck {
                known: self.heartbeat(&worker_id),
            },
            Request::SendEvent { event } => {
                self.env.add_event(event);
                Response::EventAccepted { accepted: true }
            }
            Request::GetEnvData { key, default } => Response::EnvData {
                value: self.env.get_data(&key, default).await,
            },
            Request::UpdateEnvData { key, value } => Response::Updated {
                success: self.env.update_data(&key, value).await,
            },
            Request::GetAgentData {
                agent_id,
                key,
                default,
            } => Response::AgentData {
                value: self
                    .env
                    .get_agent_data(&AgentId::new(agent_id), &key, default)
                    .await,
            },
            Request::GetAgentDataByType {
                agent_type,
                key,
                default,
            } => Response::AgentDataByType {
                values: self
                    .env
                    .get_agent_data_by_type(&agent_type, &key, default)
                    .await,
            },
            Request::QueueDecisions { records } => {
                for record in records {
                    self.env.queue_decision(record).await;
                }
                Response::Ok
            }
            Request::QueueEvents { records } => {
                for record in records {
                    self.env.queue_event(record).await;
                }
                Response::Ok
            }
            Request::GetTokenUsage => Response::TokenUsage {
                usage: self.ledger.summary(),
            },
            Request::StopSimulation { node_id } => {
                info!(node_id, "stop requested over RPC");
                self.env.stop_simulation("stop_simulation").await;
                Response::Ok
            }
            Request::CreateAgents { .. } => Response::Error {
                message: "master does not host agents".to_string(),
            },
            Request::Terminate { .. } => Response::Error {
                message: "master cannot be terminated by a worker".to_string(),
            },
        }
    }
}

#[cfg(test)]
#[path = "master_tests.rs"]
mod tests;
