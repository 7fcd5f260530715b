// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The decision/event sink contract.
//!
//! Durable append of prompts, outputs, and post-hoc scoring, scoped by
//! trail and universe. The bundled [`crate::store::JsonlDecisionStore`]
//! implements it on a local append-only log; a relational backend is an
//! external collaborator behind this same trait. In embedded mode the
//! [`DisabledSink`] satisfies writers with synthetic ids.

use std::io;
use std::path::PathBuf;

use async_trait::async_trait;
use colony_core::decision::{DecisionId, DecisionRecord, EventRecord};
use colony_core::event::AgentId;
use colony_core::TrailId;
use thiserror::Error;
use tracing::debug;

/// Errors from sink operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error at {path}: {source}")]
    Io { path: PathBuf, source: io::Error },

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(String),

    #[error("remote sink error: {0}")]
    Remote(String),

    #[error("sink is closed")]
    Closed,
}

/// Step-range filter for decision queries.
#[derive(Debug, Clone, Copy, Default)]
pub struct StepRange {
    pub start: Option<u64>,
    pub end: Option<u64>,
}

impl StepRange {
    pub fn contains(&self, step: u64) -> bool {
        self.start.is_none_or(|s| step >= s) && self.end.is_none_or(|e| step <= e)
    }
}

/// Append-only durable store for decisions and dispatched events.
#[async_trait]
pub trait DecisionSink: Send + Sync {
    /// Durably append one decision, returning its id. Re-recording an id
    /// already present leaves the stored immutable fields untouched.
    async fn record_decision(&self, record: DecisionRecord) -> Result<DecisionId, StoreError>;

    /// Batch append (the batch processor's flush path).
    async fn record_decisions(&self, records: Vec<DecisionRecord>) -> Result<(), StoreError>;

    /// Batch append of event records.
    async fn record_events(&self, records: Vec<EventRecord>) -> Result<(), StoreError>;

    /// Idempotent, last-writer-wins scoring patches. Return false when the
    /// decision id is unknown.
    async fn add_feedback(&self, decision_id: &DecisionId, feedback: &str)
        -> Result<bool, StoreError>;
    async fn add_rating(&self, decision_id: &DecisionId, rating: f64) -> Result<bool, StoreError>;
    async fn add_reason(&self, decision_id: &DecisionId, reason: &str) -> Result<bool, StoreError>;

    /// Decisions for one agent, ordered by step ascending.
    async fn get_agent_decisions(
        &self,
        trail_id: &TrailId,
        agent_id: &AgentId,
        universe_id: &str,
        range: StepRange,
        limit: usize,
    ) -> Result<Vec<DecisionRecord>, StoreError>;

    /// All decisions triggered by one event.
    async fn get_decisions_by_event(
        &self,
        trail_id: &TrailId,
        event_id: &str,
        universe_id: &str,
    ) -> Result<Vec<DecisionRecord>, StoreError>;

    async fn decision_count(&self) -> Result<usize, StoreError>;

    /// Make buffered appends durable.
    async fn flush(&self) -> Result<(), StoreError>;

    /// Flush and release resources. Further writes fail with
    /// [`StoreError::Closed`].
    async fn close(&self) -> Result<(), StoreError>;
}

/// Sink used when storage is disabled: writes succeed with synthetic ids,
/// reads come back empty.
#[derive(Debug, Default, Clone)]
pub struct DisabledSink;

#[async_trait]
impl DecisionSink for DisabledSink {
    async fn record_decision(&self, record: DecisionRecord) -> Result<DecisionId, StoreError> {
        debug!(decision_id = %record.decision_id, "sink disabled, returning synthetic id");
        Ok(record.decision_id)
    }

    async fn record_decisions(&self, _records: Vec<DecisionRecord>) -> Result<(), StoreError> {
        Ok(())
    }

    async fn record_events(&self, _records: Vec<EventRecord>) -> Result<(), StoreError> {
        Ok(())
    }

    async fn add_feedback(
        &self,
        _decision_id: &DecisionId,
        _feedback: &str,
    ) -> Result<bool, StoreError> {
        Ok(true)
    }

    async fn add_rating(&self, _decision_id: &DecisionId, _rating: f64) -> Result<bool, StoreError> {
        Ok(true)
    }

    async fn add_reason(&self, _decision_id: &DecisionId, _reason: &str) -> Result<bool, StoreError> {
        Ok(true)
    }

    async fn get_agent_decisions(
        &self,
        _trail_id: &TrailId,
        _agent_id: &AgentId,
        _universe_id: &str,
        _range: StepRange,
        _limit: usize,
    ) -> Result<Vec<DecisionRecord>, StoreError> {
        Ok(Vec::new())
    }

    async fn get_decisions_by_event(
        &self,
        _trail_id: &TrailId,
        _event_id: &str,
        _universe_id: &str,
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

#[cfg(test)]
#[path = "sink_tests.rs"]
mod tests;
