// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Directed labeled relationships between agents.
//!
//! Each edge caches a snapshot of the target's public profile taken at edge
//! creation. Snapshots refresh only on explicit request, staleness is
//! allowed and expected.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::event::AgentId;
use crate::profile::AgentProfile;

/// A directed edge from the owning agent to `target_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub owner_id: AgentId,
    pub target_id: AgentId,
    pub label: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub attributes: Map<String, Value>,
    /// Target's public profile captured at edge creation.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub snapshot: Map<String, Value>,
}

/// Per-agent relationship store.
#[derive(Debug)]
pub struct RelationshipManager {
    owner_id: AgentId,
    edges: Mutex<Vec<Relationship>>,
}

impl RelationshipManager {
    pub fn new(owner_id: AgentId) -> Self {
        Self {
            owner_id,
            edges: Mutex::new(Vec::new()),
        }
    }

    pub fn owner_id(&self) -> &AgentId {
        &self.owner_id
    }

    /// Add an edge, snapshotting the target's public profile. Re-adding an
    /// edge to the same target replaces it (label, attributes, snapshot).
    pub fn add(
        &self,
        target: &AgentProfile,
        label: impl Into<String>,
        attributes: Map<String, Value>,
    ) {
        let edge = Relationship {
            owner_id: self.owner_id.clone(),
            target_id: target.profile_id().clone(),
            label: label.into(),
            attributes,
            snapshot: target.public_snapshot(),
        };
        let mut edges = self.edges.lock();
        edges.retain(|e| e.target_id != edge.target_id);
        edges.push(edge);
    }

    pub fn remove(&self, target_id: &AgentId) -> bool {
        let mut edges = self.edges.lock();
        let before = edges.len();
        edges.retain(|e| &e.target_id != target_id);
        edges.len() != before
    }

    pub fn get(&self, target_id: &AgentId) -> Option<Relationship> {
        self.edges
            .lock()
            .iter()
            .find(|e| &e.target_id == target_id)
            .cloned()
    }

    pub fn all(&self) -> Vec<Relationship> {
        self.edges.lock().clone()
    }

    pub fn with_label(&self, label: &str) -> Vec<Relationship> {
        self.edges
            .lock()
            .iter()
            .filter(|e| e.label == label)
            .cloned()
            .collect()
    }

    /// Target ids across all edges, in insertion order.
    pub fn target_ids(&self) -> Vec<AgentId> {
        self.edges.lock().iter().map(|e| e.target_id.clone()).collect()
    }

    /// Re-capture the target's public profile. Returns false when no edge
    /// to that target exists.
    pub fn refresh_snapshot(&self, target: &AgentProfile) -> bool {
        let mut edges = self.edges.lock();
        match edges
            .iter_mut()
            .find(|e| e.target_id == *target.profile_id())
        {
            Some(edge) => {
                edge.snapshot = target.public_snapshot();
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
#[path = "relationship_tests.rs"]
mod tests;
