// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! RPC protocol between nodes.
//!
//! Wire format: 4-byte length prefix (big-endian) + JSON payload. One
//! request/response exchange per connection. Event blobs are the
//! self-describing maps from `colony_core::Event`; payloads are
//! type-tagged by `kind`.

use std::collections::HashMap;

use colony_core::decision::{DecisionRecord, EventRecord};
use colony_core::{AgentSchema, Event};
use colony_models::UsageSummary;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// A profile shipped to a worker for agent construction. The schema
/// re-splits `data` into public and private halves on arrival.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireProfile {
    pub agent_type: String,
    pub profile_id: String,
    #[serde(default)]
    pub sys_prompt: String,
    pub schema: AgentSchema,
    pub data: Map<String, Value>,
}

impl WireProfile {
    pub fn from_profile(profile: &colony_core::AgentProfile, sys_prompt: &str) -> Self {
        Self {
            agent_type: profile.agent_type().to_string(),
            profile_id: profile.profile_id().to_string(),
            sys_prompt: sys_prompt.to_string(),
            schema: profile.schema().clone(),
            data: profile.export_data(),
        }
    }
}

/// Request between nodes (worker -> master, master -> worker).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Request {
    /// Health check ping
    Ping,

    /// Version handshake
    Hello { version: String },

    /// Worker announces itself to the master
    RegisterWorker {
        worker_id: String,
        address: String,
        port: u16,
    },

    /// Periodic worker liveness signal
    Heartbeat { worker_id: String },

    /// Deliver an event to the receiving node's bus
    SendEvent { event: Event },

    /// Env-state read
    GetEnvData { key: String, default: Value },

    /// Env-state write
    UpdateEnvData { key: String, value: Value },

    /// Read one agent's profile field
    GetAgentData {
        agent_id: String,
        key: String,
        default: Value,
    },

    /// Read one field across all agents of a type hosted by the receiver
    GetAgentDataByType {
        agent_type: String,
        key: String,
        default: Value,
    },

    /// Master ships placed profiles to the hosting worker
    CreateAgents {
        agent_type: String,
        profiles: Vec<WireProfile>,
    },

    /// Batched decision records bound for the master's sink
    QueueDecisions { records: Vec<DecisionRecord> },

    /// Batched event records bound for the master's sink
    QueueEvents { records: Vec<EventRecord> },

    /// Best-effort token usage pull
    GetTokenUsage,

    /// Node asks the master to end the run
    StopSimulation { node_id: String },

    /// Master tells a worker the run is over
    Terminate { reason: String },
}

/// Response to a [`Request`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Response {
    /// Generic success
    Ok,

    /// Health check response
    Pong,

    /// Version handshake response
    Hello { version: String },

    /// Registration outcome
    Registered { message: String },

    /// Heartbeat outcome; `known: false` asks the worker to re-register
    HeartbeatAck { known: bool },

    /// Event intake outcome
    EventAccepted { accepted: bool },

    /// Env-state read result
    EnvData { value: Value },

    /// Env-state write result
    Updated { success: bool },

    /// Single-agent read result
    AgentData { value: Value },

    /// By-type read result: agent_id -> value
    AgentDataByType { values: HashMap<String, Value> },

    /// Agents constructed on the worker
    AgentsCreated { count: usize },

    /// Token usage snapshot
    TokenUsage { usage: UsageSummary },

    /// Error response
    Error { message: String },
}

/// Protocol errors
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("frame of {size} bytes exceeds the {MAX_FRAME_BYTES}-byte cap")]
    FrameTooLarge { size: usize },

    #[error("peer closed the connection")]
    PeerClosed,

    #[error("Timeout")]
    Timeout,

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),
}

/// Upper bound on one frame's JSON payload (64 MB). Event payloads and
/// record batches stay far below this; anything bigger is a bug or an
/// attack, and the connection is dropped rather than buffered.
pub const MAX_FRAME_BYTES: usize = 64 * 1024 * 1024;

/// Default RPC timeout
pub const DEFAULT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

/// Protocol version (from Cargo.toml)
pub const PROTOCOL_VERSION: &str = env!("CARGO_PKG_VERSION");

fn ensure_frame_fits(size: usize) -> Result<(), ProtocolError> {
    if size > MAX_FRAME_BYTES {
        Err(ProtocolError::FrameTooLarge { size })
    } else {
        Ok(())
    }
}

/// Serialize `message` and write it as one frame, bounded by `timeout`.
pub async fn send_frame<W, T>(
    writer: &mut W,
    message: &T,
    timeout: std::time::Duration,
) -> Result<(), ProtocolError>
where
    W: tokio::io::AsyncWriteExt + Unpin,
    T: Serialize,
{
    let payload = serde_json::to_vec(message)?;
    ensure_frame_fits(payload.len())?;

    let io = async {
        writer.write_all(&(payload.len() as u32).to_be_bytes()).await?;
        writer.write_all(&payload).await?;
        writer.flush().await
    };
    match tokio::time::timeout(timeout, io).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(ProtocolError::Timeout),
    }
}

/// Read one frame and parse its payload, bounded by `timeout`.
///
/// A clean EOF before the header means the peer hung up
/// ([`ProtocolError::PeerClosed`]); EOF mid-payload is a torn frame and
/// surfaces as an IO error.
pub async fn recv_frame<R, T>(
    reader: &mut R,
    timeout: std::time::Duration,
) -> Result<T, ProtocolError>
where
    R: tokio::io::AsyncReadExt + Unpin,
    T: DeserializeOwned,
{
    let payload = match tokio::time::timeout(timeout, read_raw_frame(reader)).await {
        Ok(result) => result?,
        Err(_) => return Err(ProtocolError::Timeout),
    };
    Ok(serde_json::from_slice(&payload)?)
}

/// Pull the length header, validate it, then the payload bytes.
async fn read_raw_frame<R>(reader: &mut R) -> Result<Vec<u8>, ProtocolError>
where
    R: tokio::io::AsyncReadExt + Unpin,
{
    let mut header = [0u8; 4];
    if let Err(e) = reader.read_exact(&mut header).await {
        return Err(if e.kind() == std::io::ErrorKind::UnexpectedEof {
            ProtocolError::PeerClosed
        } else {
            ProtocolError::Io(e)
        });
    }

    let payload_len = u32::from_be_bytes(header) as usize;
    ensure_frame_fits(payload_len)?;

    let mut payload = vec![0u8; payload_len];
    reader.read_exact(&mut payload).await?;
    Ok(payload)
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
