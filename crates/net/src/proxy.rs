// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker-side proxy environment.
//!
//! Exposes the same data-access contract as the central environment but
//! forwards to the master over RPC. Incoming data-protocol events are
//! serviced by forwarding and answering with the paired response event;
//! response events arriving for the proxy's own outbound requests
//! complete futures parked in the [`RequestTracker`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use colony_core::decision::{DecisionId, DecisionRecord, EventRecord};
use colony_core::event::AgentId;
use colony_core::{kind, Event, TrailId};
use colony_engine::{AgentDirectory, EnvironmentLink, StopSignal};
use colony_storage::{BatchProcessor, DecisionSink, StepRange, StoreError};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::client::RpcClient;
use crate::node::NodeId;
use crate::protocol::{Request, Response};

/// Default timeout for an event-correlated request.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("request carries no request_id")]
    MissingRequestId,

    #[error("request {0} timed out")]
    Timeout(String),

    #[error("request {0} was cancelled")]
    Cancelled(String),

    #[error("rpc error: {0}")]
    Rpc(#[from] crate::protocol::ProtocolError),
}

/// Parks one future per outbound `request_id`; each is completed exactly
/// once, by the paired response, by the hard timeout, or by
/// cancellation when the tracker drops.
#[derive(Default)]
pub struct RequestTracker {
    pending: Mutex<HashMap<String, oneshot::Sender<Event>>>,
}

impl RequestTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, request_id: &str) -> oneshot::Receiver<Event> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(request_id.to_string(), tx);
        rx
    }

    /// Complete the future parked under the event's `request_id`.
    /// Returns false when nothing is waiting (late or duplicate response).
    pub fn complete(&self, event: Event) -> bool {
        let Some(request_id) = event.request_id().map(str::to_string) else {
            return false;
        };
        match self.pending.lock().remove(&request_id) {
            Some(sender) => sender.send(event).is_ok(),
            None => {
                debug!(request_id, "response for unknown request ignored");
                false
            }
        }
    }

    /// Await a registered future with a hard timeout; timing out removes
    /// the entry so the future can never complete twice.
    pub async fn await_response(
        &self,
        request_id: &str,
        rx: oneshot::Receiver<Event>,
        timeout: Duration,
    ) -> Result<Event, ProxyError> {
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(event)) => Ok(event),
            Ok(Err(_)) => Err(ProxyError::Cancelled(request_id.to_string())),
            Err(_) => {
                self.pending.lock().remove(request_id);
                Err(ProxyError::Timeout(request_id.to_string()))
            }
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }
}

/// Sink that forwards batches to the master's sink over RPC. Queries and
/// scoring patches are master-side concerns and come back empty here.
pub struct MasterSink {
    master: RpcClient,
}

impl MasterSink {
    pub fn new(master: RpcClient) -> Self {
        Self { master }
    }
}

#[async_trait]
impl DecisionSink for MasterSink {
    async fn record_decision(&self, record: DecisionRecord) -> Result<DecisionId, StoreError> {
        let id = record.decision_id.clone();
        self.record_decisions(vec![record]).await?;
        Ok(id)
    }

    async fn record_decisions(&self, records: Vec<DecisionRecord>) -> Result<(), StoreError> {
        if records.is_empty() {
            return Ok(());
        }
        self.master
            .call(&Request::QueueDecisions { records })
            .await
            .map_err(|e| StoreError::Remote(e.to_string()))
            .map(|_| ())
    }

    async fn record_events(&self, records: Vec<EventRecord>) -> Result<(), StoreError> {
        if records.is_empty() {
            return Ok(());
        }
        self.master
            .call(&Request::QueueEvents { records })
            .await
            .map_err(|e| StoreError::Remote(e.to_string()))
            .map(|_| ())
    }

    async fn add_feedback(&self, _: &DecisionId, _: &str) -> Result<bool, StoreError> {
        Ok(false)
    }

    async fn add_rating(&self, _: &DecisionId, _: f64) -> Result<bool, StoreError> {
        Ok(false)
    }

    async fn add_reason(&self, _: &DecisionId, _: &str) -> Result<bool, StoreError> {
        Ok(false)
    }

    async fn get_agent_decisions(
        &self,
        _: &TrailId,
        _: &AgentId,
        _: &str,
        _: StepRange,
        _: usize,
    ) -> Result<Vec<DecisionRecord>, StoreError> {
        Ok(Vec::new())
    }

    async fn get_decisions_by_event(
        &self,
        _: &TrailId,
        _: &str,
        _: &str,
    ) -> Result<Vec<DecisionRecord>, StoreError> {
        Ok(Vec::new())
    }

    async fn decision_count(&self) -> Result<usize, StoreError> {
        Ok(0)
    }

    async fn flush(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Worker-side stand-in for the central environment.
pub struct ProxyEnv {
    node_id: NodeId,
    env_id: AgentId,
    master: RpcClient,
    directory: Arc<AgentDirectory>,
    batch: BatchProcessor,
    trail_id: RwLock<TrailId>,
    step: AtomicU64,
    tracker: RequestTracker,
    stop: Arc<StopSignal>,
    request_timeout: Duration,
}

impl ProxyEnv {
    pub fn new(
        node_id: NodeId,
        master: RpcClient,
        directory: Arc<AgentDirectory>,
        batch: BatchProcessor,
        stop: Arc<StopSignal>,
    ) -> Arc<Self> {
        let env_id = AgentId::new(format!("{node_id}_ENV"));
        Arc::new(Self {
            node_id,
            env_id,
            master,
            directory,
            batch,
            trail_id: RwLock::new(TrailId::new("")),
            step: AtomicU64::new(0),
            tracker: RequestTracker::new(),
            stop,
            request_timeout: REQUEST_TIMEOUT,
        })
    }

    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    pub fn tracker(&self) -> &RequestTracker {
        &self.tracker
    }

    pub fn batch(&self) -> &BatchProcessor {
        &self.batch
    }

    /// Flush the buffered records through to the master and disable the
    /// batcher (shutdown path).
    pub async fn queue_flush(&self) -> Result<(), StoreError> {
        self.batch.stop().await
    }

    /// Set once the worker learns the trail from the master.
    pub fn set_trail_id(&self, trail_id: TrailId) {
        *self.trail_id.write() = trail_id;
    }

    /// Updated from incoming start events so local decisions carry the
    /// right step.
    pub fn set_step(&self, step: u64) {
        self.step.store(step, Ordering::SeqCst);
    }

    /// Event-correlated request: park a future under the event's
    /// `request_id`, ship the event to the master, and await the paired
    /// response event routed back to this proxy.
    pub async fn request(&self, event: Event) -> Result<Event, ProxyError> {
        let request_id = event
            .request_id()
            .map(str::to_string)
            .ok_or(ProxyError::MissingRequestId)?;
        let rx = self.tracker.register(&request_id);

        if let Err(error) = self.master.call(&Request::SendEvent { event }).await {
            self.tracker.pending.lock().remove(&request_id);
            return Err(ProxyError::Rpc(error));
        }
        self.tracker
            .await_response(&request_id, rx, self.request_timeout)
            .await
    }
}

#[async_trait]
impl EnvironmentLink for ProxyEnv {
    fn trail_id(&self) -> TrailId {
        self.trail_id.read().clone()
    }

    fn universe_id(&self) -> String {
        colony_core::MAIN_UNIVERSE.to_string()
    }

    fn env_id(&self) -> AgentId {
        self.env_id.clone()
    }

    fn current_step(&self) -> u64 {
        self.step.load(Ordering::SeqCst)
    }

    async fn get_data(&self, key: &str, default: Value) -> Value {
        let request = Request::GetEnvData {
            key: key.to_string(),
            default: default.clone(),
        };
        match self.master.call(&request).await {
            Ok(Response::EnvData { value }) => value,
            Ok(other) => {
                warn!(response = ?other, "unexpected env data response");
                default
            }
            Err(error) => {
                warn!(key, %error, "env data read failed, using default");
                default
            }
        }
    }

    async fn update_data(&self, key: &str, value: Value) -> bool {
        let request = Request::UpdateEnvData {
            key: key.to_string(),
            value,
        };
        match self.master.call(&request).await {
            Ok(Response::Updated { success }) => success,
            Ok(_) => false,
            Err(error) => {
                warn!(key, %error, "env data update failed");
                false
            }
        }
    }

    async fn get_agent_data(&self, agent_id: &AgentId, key: &str, default: Value) -> Value {
        // Locally hosted agents answer without a network hop
        if let Some(agent) = self.directory.get(agent_id) {
            return agent.profile().get_data(key, default);
        }
        let request = Request::GetAgentData {
            agent_id: agent_id.to_string(),
            key: key.to_string(),
            default: default.clone(),
        };
        match self.master.call(&request).await {
            Ok(Response::AgentData { value }) => value,
            _ => default,
        }
    }

    async fn get_agent_data_by_type(
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
        match self.master.call(&request).await {
            Ok(Response::AgentDataByType { values }) => values,
            Ok(other) => {
                warn!(response = ?other, "unexpected by-type response");
                HashMap::new()
            }
            Err(error) => {
                warn!(agent_type, %error, "by-type query failed");
                HashMap::new()
            }
        }
    }

    async fn queue_event(&self, record: EventRecord) {
        if let Err(error) = self.batch.add_storage_event(record).await {
            warn!(%error, "failed to queue event record");
        }
    }

    async fn queue_decision(&self, record: DecisionRecord) {
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
                vec![Event::data_response(self.env_id.clone(), &event, value, true, None)]
            }
            kind::DATA_UPDATE => {
                let key = event.str_field("key").unwrap_or_default().to_string();
                let value = event.field("value").cloned().unwrap_or(Value::Null);
                let success = self.update_data(&key, value).await;
                vec![Event::data_update_response(
                    self.env_id.clone(),
                    &event,
                    success,
                    None,
                )]
            }
            kind::AGENT_DATA_BY_TYPE => {
                let agent_type = event.str_field("agent_type").unwrap_or_default().to_string();
                let key = event.str_field("key").unwrap_or_default().to_string();
                let default = event.field("default").cloned().unwrap_or(Value::Null);
                let values = self.get_agent_data_by_type(&agent_type, &key, default).await;
                vec![Event::data_response(
                    self.env_id.clone(),
                    &event,
                    Value::Object(values.into_iter().collect()),
                    true,
                    None,
                )]
            }
            kind::DATA_RESPONSE | kind::DATA_UPDATE_RESPONSE => {
                self.tracker.complete(event);
                Vec::new()
            }
            kind::END => {
                let reason = event.str_field("reason").unwrap_or("end_event").to_string();
                self.stop_simulation(&reason).await;
                Vec::new()
            }
            other => {
                // Anything else addressed to ENV belongs to the central
                // environment; ship it upstream.
                if self.stop.is_stopped() {
                    return Vec::new();
                }
                debug!(event_kind = other, "forwarding env event to master");
                if let Err(error) = self.master.call(&Request::SendEvent { event }).await {
                    warn!(%error, "env event forward to master failed, dropped");
                }
                Vec::new()
            }
        }
    }

    /// Ask the master to initiate shutdown, then stop locally.
    async fn stop_simulation(&self, reason: &str) {
        if !self.stop.is_stopped() {
            let request = Request::StopSimulation {
                node_id: self.node_id.to_string(),
            };
            if self.master.try_call(&request).await.is_none() {
                debug!("stop request to master not delivered");
            }
        }
        self.stop.trigger(reason);
    }
}

#[cfg(test)]
#[path = "proxy_tests.rs"]
mod tests;
