// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker node: hosts a shard of the agents behind a proxy environment.
//!
//! On startup the worker binds its RPC endpoint, registers with the
//! master (bounded retries), and starts a heartbeat loop plus the local
//! dispatcher. Events arrive over `SendEvent` and drain through the same
//! engine as a single-node run; anything not hosted locally routes back
//! to the master.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use colony_core::event::AgentId;
use colony_core::{kind, DistributionConfig, Event};
use colony_engine::{
    Agent, AgentDirectory, Dispatcher, EnvironmentLink, EventRouter, ScenarioHooks, StopSignal,
};
use colony_models::ModelManager;
use colony_storage::{BatchConfig, BatchProcessor};
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::client::RpcClient;
use crate::master::WorkerId;
use crate::node::{NodeId, NodeState, NodeStatus};
use crate::protocol::{ProtocolError, Request, Response, WireProfile, PROTOCOL_VERSION};
use crate::proxy::{MasterSink, ProxyEnv};
use crate::server::{self, RequestHandler};

/// Registration retry schedule.
const REGISTER_ATTEMPTS: u32 = 5;
const REGISTER_BACKOFF: Duration = Duration::from_millis(500);

/// A running worker node.
pub struct WorkerNode {
    status: NodeStatus,
    worker_id: WorkerId,
    master: RpcClient,
    listen_address: String,
    listen_port: u16,
    bus: colony_engine::EventBus,
    directory: Arc<AgentDirectory>,
    proxy: Arc<ProxyEnv>,
    models: Arc<ModelManager>,
    hooks: ScenarioHooks,
    stop: Arc<StopSignal>,
    heartbeat_interval: Duration,
}

impl WorkerNode {
    /// Bind, register with the master, and start serving. Returns the
    /// running node and its background task handles.
    pub async fn start(
        node_id: NodeId,
        config: &DistributionConfig,
        models: Arc<ModelManager>,
        hooks: ScenarioHooks,
    ) -> Result<(Arc<Self>, Vec<JoinHandle<()>>), ProtocolError> {
        let stop = Arc::new(StopSignal::default());
        let master = RpcClient::new(config.master_address.clone(), config.master_port);
        let directory = Arc::new(AgentDirectory::new());

        let batch = BatchProcessor::start(
            Arc::new(MasterSink::new(master.clone())),
            BatchConfig::default(),
        );
        let proxy = ProxyEnv::new(
            node_id.clone(),
            master.clone(),
            Arc::clone(&directory),
            batch,
            Arc::clone(&stop),
        );

        let (listener, listen_port) = server::bind(&config.worker_address, config.worker_port).await?;
        let (bus, reader) = colony_engine::EventBus::new();

        let worker = Arc::new(Self {
            status: NodeStatus::new(node_id.clone()),
            worker_id: WorkerId::new(node_id.as_str()),
            master,
            listen_address: config.worker_address.clone(),
            listen_port,
            bus: bus.clone(),
            directory: Arc::clone(&directory),
            proxy: Arc::clone(&proxy),
            models,
            hooks,
            stop: Arc::clone(&stop),
            heartbeat_interval: Duration::from_secs(config.heartbeat_interval_secs.max(1)),
        });

        let mut tasks = Vec::new();
        tasks.push(server::spawn(
            listener,
            Arc::clone(&worker) as Arc<dyn RequestHandler>,
            Arc::clone(&stop),
        ));

        if let Err(error) = worker.register_with_master().await {
            stop.trigger("registration_failed");
            worker.status.advance(NodeState::Failed);
            return Err(error);
        }
        worker.status.advance(NodeState::Ready);

        tasks.push(worker.spawn_heartbeat());

        let router: Arc<dyn EventRouter> = Arc::new(WorkerRouter {
            master: worker.master.clone(),
            stop: Arc::clone(&stop),
        });
        let dispatcher = Arc::new(Dispatcher::new(
            bus,
            Arc::clone(&proxy) as Arc<dyn EnvironmentLink>,
            directory,
            Some(router),
            Arc::clone(&stop),
        ));
        tasks.push(dispatcher.spawn(reader));

        worker.status.advance(NodeState::Running);
        info!(
            worker_id = %worker.worker_id,
            port = worker.listen_port,
            "worker node running"
        );
        Ok((worker, tasks))
    }

    pub fn status(&self) -> &NodeStatus {
        &self.status
    }

    pub fn worker_id(&self) -> &WorkerId {
        &self.worker_id
    }

    pub fn listen_port(&self) -> u16 {
        self.listen_port
    }

    pub fn proxy(&self) -> &Arc<ProxyEnv> {
        &self.proxy
    }

    pub fn directory(&self) -> &Arc<AgentDirectory> {
        &self.directory
    }

    pub fn stop_signal(&self) -> &Arc<StopSignal> {
        &self.stop
    }

    /// Block until the run terminates, then flush recording.
    pub async fn run_until_terminated(&self) {
        self.stop.wait().await;
        self.status.advance(NodeState::ShuttingDown);
        if let Err(error) = self.proxy_batch_stop().await {
            warn!(%error, "worker batch flush failed on shutdown");
        }
        self.status.advance(NodeState::Stopped);
        info!(worker_id = %self.worker_id, "worker node stopped");
    }

    async fn proxy_batch_stop(&self) -> Result<(), colony_storage::StoreError> {
        // The proxy owns the batch processor; stopping it pushes the tail
        // of buffered records to the master.
        self.proxy.queue_flush().await
    }

    async fn register_with_master(&self) -> Result<(), ProtocolError> {
        let request = Request::RegisterWorker {
            worker_id: self.worker_id.to_string(),
            address: self.listen_address.clone(),
            port: self.listen_port,
        };

        let mut last_error = None;
        for attempt in 0..REGISTER_ATTEMPTS {
            match self.master.call(&request).await {
                Ok(Response::Registered { message }) => {
                    info!(worker_id = %self.worker_id, message, "registered with master");
                    return Ok(());
                }
                Ok(other) => {
                    warn!(response = ?other, "unexpected registration response");
                    last_error = Some(ProtocolError::UnexpectedResponse(format!("{other:?}")));
                }
                Err(error) => {
                    debug!(attempt, %error, "registration attempt failed");
                    last_error = Some(error);
                }
            }
            tokio::time::sleep(REGISTER_BACKOFF * (attempt + 1)).await;
        }
        Err(last_error.unwrap_or(ProtocolError::Timeout))
    }

    fn spawn_heartbeat(self: &Arc<Self>) -> JoinHandle<()> {
        let worker = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(worker.heartbeat_interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = worker.stop.wait() => break,
                }
                let request = Request::Heartbeat {
                    worker_id: worker.worker_id.to_string(),
                };
                match worker.master.try_call(&request).await {
                    Some(Response::HeartbeatAck { known: false }) => {
                        warn!("master does not know us, re-registering");
                        if let Err(error) = worker.register_with_master().await {
                            warn!(%error, "re-registration failed");
                        }
                    }
                    Some(_) => {}
                    None => debug!("heartbeat not delivered"),
                }
            }
            debug!(worker_id = %worker.worker_id, "heartbeat loop stopped");
        })
    }

    /// Build and host agents shipped by the master.
    fn create_agents(&self, profiles: Vec<WireProfile>) -> usize {
        let mut created = 0;
        for wire in profiles {
            let agent_type = wire.agent_type.clone();
            let profile = colony_core::AgentProfile::new(
                wire.agent_type,
                AgentId::new(wire.profile_id),
                wire.schema,
                Some(wire.data),
            );
            let agent = Arc::new(Agent::new(
                profile,
                wire.sys_prompt,
                Arc::clone(&self.proxy) as Arc<dyn EnvironmentLink>,
                Arc::clone(&self.models),
                Arc::clone(&self.directory),
            ));
            match self.hooks_setup(&agent_type) {
                Some(setup) => setup(&agent),
                None => warn!(agent_type, "no setup hook for shipped agent type"),
            }
            self.directory.register(agent);
            created += 1;
        }
        created
    }

    fn hooks_setup(&self, agent_type: &str) -> Option<colony_engine::AgentSetup> {
        self.hooks.setup_for(agent_type)
    }
}

/// Routes non-local events to the master.
struct WorkerRouter {
    master: RpcClient,
    stop: Arc<StopSignal>,
}

#[async_trait]
impl EventRouter for WorkerRouter {
    async fn forward(&self, event: Event) -> bool {
        if self.stop.is_stopped() {
            // Shutdown: drop silently to avoid unavailable-endpoint noise
            return true;
        }
        match self.master.call(&Request::SendEvent { event }).await {
            Ok(Response::EventAccepted { accepted }) => accepted,
            Ok(_) => false,
            Err(error) => {
                if !self.stop.is_stopped() {
                    warn!(%error, "event forward to master failed, dropped");
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
        let request = Request::GetAgentData {
            agent_id: agent_id.to_string(),
            key: key.to_string(),
            default,
        };
        match self.master.try_call(&request).await {
            Some(Response::AgentData { value }) => Some(value),
            _ => None,
        }
    }

    async fn remote_agent_data_by_type(
        &self,
        agent_type: &str,
        key: &str,
        default: Value,
    ) -> HashMap<String, Value> {
        let request = Request::GetAgentDataByType {
            agent_type: agent_type.to_string(),
            key: key.to_string(),
            default,
        };
        match self.master.try_call(&request).await {
            Some(Response::AgentDataByType { values }) => values,
            _ => HashMap::new(),
        }
    }

    async fn broadcast_terminate(&self, _reason: &str) {}
}

#[async_trait]
impl RequestHandler for WorkerNode {
    async fn handle(&self, request: Request) -> Response {
        match request {
            Request::Ping => Response::Pong,
            Request::Hello { .. } => Response::Hello {
                version: PROTOCOL_VERSION.to_string(),
            },
            Request::SendEvent { event } => {
                if event.event_kind == kind::START {
                    if let Some(step) = event.u64_field("step") {
                        self.proxy.set_step(step);
                    }
                }
                self.bus.enqueue(event);
                Response::EventAccepted { accepted: true }
            }
            Request::GetAgentData {
                agent_id,
                key,
                default,
            } => {
                let agent_id = AgentId::new(agent_id);
                let value = match self.directory.get(&agent_id) {
                    Some(agent) => agent.profile().get_data(&key, default),
                    None => default,
                };
                Response::AgentData { value }
            }
            Request::GetAgentDataByType {
                agent_type,
                key,
                default,
            } => {
                let values = self
                    .directory
                    .agents_of_type(&agent_type)
                    .into_iter()
                    .map(|agent| {
                        (
                            agent.profile_id().to_string(),
                            agent.profile().get_data(&key, default.clone()),
                        )
                    })
                    .collect();
                Response::AgentDataByType { values }
            }
            Request::CreateAgents { profiles, .. } => Response::AgentsCreated {
                count: self.create_agents(profiles),
            },
            Request::GetTokenUsage => Response::TokenUsage {
                usage: self.models.ledger().summary(),
            },
            Request::Terminate { reason } => {
                info!(worker_id = %self.worker_id, reason, "termination received from master");
                self.stop.trigger(&reason);
                Response::Ok
            }
            other => Response::Error {
                message: format!("unsupported request on worker: {other:?}"),
            },
        }
    }
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;
