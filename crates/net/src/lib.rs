// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! colony-net: the distribution layer.
//!
//! The wire protocol (length-prefixed JSON over TCP), the RPC client and
//! server, the master/worker node roles, and the worker-side proxy
//! environment. Single-node runs never touch this crate.

pub mod client;
pub mod master;
pub mod node;
pub mod protocol;
pub mod proxy;
pub mod server;
pub mod worker;

pub use client::RpcClient;
pub use master::{proxy_env_id, MasterNode, WorkerId, WorkerInfo, WorkerStatus};
pub use node::{node_id_or_generated, NodeId, NodeMode, NodeState, NodeStatus};
pub use protocol::{ProtocolError, Request, Response, WireProfile, PROTOCOL_VERSION};
pub use proxy::{MasterSink, ProxyEnv, ProxyError, RequestTracker};
pub use server::{bind, spawn, RequestHandler};
pub use worker::WorkerNode;
