// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Node identity and lifecycle state.
//!
//! Every process is one node: single (no RPC), master (owns the
//! environment and placement), or worker (hosts agents behind a proxy
//! environment). The state machine:
//!
//! ```text
//!   Init -> Ready -> Running -> ShuttingDown -> Stopped
//!     \-> Failed
//! ```

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub use colony_core::NodeMode;

colony_core::id_type! {
    /// Stable node identifier.
    pub struct NodeId;
}

/// Generate a node id when the config does not pin one.
pub fn node_id_or_generated(configured: Option<&str>) -> NodeId {
    match configured {
        Some(id) if !id.is_empty() => NodeId::new(id),
        _ => {
            let suffix = uuid::Uuid::new_v4().simple().to_string();
            NodeId::new(format!("node-{}", &suffix[..8]))
        }
    }
}

/// Lifecycle state of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    Init,
    Ready,
    Running,
    ShuttingDown,
    Stopped,
    Failed,
}

impl NodeState {
    /// Legal forward transitions.
    fn can_advance_to(self, next: NodeState) -> bool {
        use NodeState::*;
        matches!(
            (self, next),
            (Init, Ready)
                | (Init, Failed)
                | (Ready, Running)
                | (Ready, Failed)
                | (Ready, ShuttingDown)
                | (Running, ShuttingDown)
                | (Running, Failed)
                | (ShuttingDown, Stopped)
        )
    }
}

/// Tracks a node's lifecycle with transition validation.
#[derive(Debug)]
pub struct NodeStatus {
    node_id: NodeId,
    state: Mutex<NodeState>,
}

impl NodeStatus {
    pub fn new(node_id: NodeId) -> Self {
        Self {
            node_id,
            state: Mutex::new(NodeState::Init),
        }
    }

    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    pub fn state(&self) -> NodeState {
        *self.state.lock()
    }

    /// Advance to `next` if the transition is legal. Illegal transitions
    /// are logged and refused (the state machine never goes backward).
    pub fn advance(&self, next: NodeState) -> bool {
        let mut state = self.state.lock();
        if state.can_advance_to(next) {
            info!(node_id = %self.node_id, from = ?*state, to = ?next, "node state");
            *state = next;
            true
        } else {
            warn!(
                node_id = %self.node_id,
                from = ?*state,
                to = ?next,
                "illegal node state transition refused"
            );
            false
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.state(), NodeState::Stopped | NodeState::Failed)
    }
}

#[cfg(test)]
#[path = "node_tests.rs"]
mod tests;
