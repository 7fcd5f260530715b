// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only JSONL decision store.
//!
//! Each line is one tagged record: a decision, an event, or a scoring
//! patch. Opening the store replays the log into an in-memory index;
//! a torn final line (crash mid-write) is skipped with a warning. Writes
//! are buffered and made durable by `flush` (group commit).

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use colony_core::decision::{DecisionId, DecisionRecord, EventRecord};
use colony_core::event::AgentId;
use colony_core::TrailId;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::sink::{DecisionSink, StepRange, StoreError};

/// One line of the log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum LogRecord {
    Decision(DecisionRecord),
    Event(EventRecord),
    Feedback {
        decision_id: DecisionId,
        feedback: String,
    },
    Rating {
        decision_id: DecisionId,
        rating: f64,
    },
    Reason {
        decision_id: DecisionId,
        reason: String,
    },
}

struct StoreInner {
    file: File,
    path: PathBuf,
    /// JSON lines waiting for the next flush (without trailing newline).
    write_buffer: Vec<String>,
    /// decision_id -> current record (patches applied).
    decisions: HashMap<DecisionId, DecisionRecord>,
    /// Insertion order of decision ids.
    order: Vec<DecisionId>,
    event_count: usize,
    closed: bool,
}

/// File-backed [`DecisionSink`].
pub struct JsonlDecisionStore {
    inner: Mutex<StoreInner>,
}

impl JsonlDecisionStore {
    /// Open (or create) the store at `dir/decisions.jsonl` and replay it.
    pub fn open(dir: &Path) -> Result<Self, StoreError> {
        std::fs::create_dir_all(dir).map_err(|source| StoreError::Io {
            path: dir.to_owned(),
            source,
        })?;
        let path = dir.join("decisions.jsonl");

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)
            .map_err(|source| StoreError::Io {
                path: path.clone(),
                source,
            })?;

        let mut inner = StoreInner {
            file,
            path,
            write_buffer: Vec::new(),
            decisions: HashMap::new(),
            order: Vec::new(),
            event_count: 0,
            closed: false,
        };
        replay(&mut inner)?;

        debug!(
            path = %inner.path.display(),
            decisions = inner.order.len(),
            events = inner.event_count,
            "decision store opened"
        );
        Ok(Self {
            inner: Mutex::new(inner),
        })
    }

    fn append(inner: &mut StoreInner, record: &LogRecord) -> Result<(), StoreError> {
        let line = serde_json::to_string(record)?;
        inner.write_buffer.push(line);
        Ok(())
    }

    fn flush_inner(inner: &mut StoreInner) -> Result<(), StoreError> {
        if inner.write_buffer.is_empty() {
            return Ok(());
        }
        let mut chunk = String::new();
        for line in inner.write_buffer.drain(..) {
            chunk.push_str(&line);
            chunk.push('\n');
        }
        inner
            .file
            .write_all(chunk.as_bytes())
            .and_then(|()| inner.file.sync_data())
            .map_err(|source| StoreError::Io {
                path: inner.path.clone(),
                source,
            })
    }
}

/// Replay the log into the in-memory index. Unparseable lines are skipped
/// with a warning; a torn final line is the expected crash artifact.
fn replay(inner: &mut StoreInner) -> Result<(), StoreError> {
    let file = File::open(&inner.path).map_err(|source| StoreError::Io {
        path: inner.path.clone(),
        source,
    })?;
    let reader = BufReader::new(file);

    for (line_number, line) in reader.lines().enumerate() {
        let line = line.map_err(|source| StoreError::Io {
            path: inner.path.clone(),
            source,
        })?;
        if line.trim().is_empty() {
            continue;
        }
        let record: LogRecord = match serde_json::from_str(&line) {
            Ok(record) => record,
            Err(error) => {
                warn!(
                    path = %inner.path.display(),
                    line = line_number + 1,
                    %error,
                    "skipping unparseable store line"
                );
                continue;
            }
        };
        apply(inner, record);
    }
    Ok(())
}

fn apply(inner: &mut StoreInner, record: LogRecord) {
    match record {
        LogRecord::Decision(decision) => {
            let id = decision.decision_id.clone();
            // First write wins for immutable fields
            if !inner.decisions.contains_key(&id) {
                inner.order.push(id.clone());
                inner.decisions.insert(id, decision);
            }
        }
        LogRecord::Event(_) => inner.event_count += 1,
        LogRecord::Feedback {
            decision_id,
            feedback,
        } => {
            if let Some(decision) = inner.decisions.get_mut(&decision_id) {
                decision.feedback = Some(feedback);
            }
        }
        LogRecord::Rating {
            decision_id,
            rating,
        } => {
            if let Some(decision) = inner.decisions.get_mut(&decision_id) {
                decision.rating = Some(rating);
            }
        }
        LogRecord::Reason {
            decision_id,
            reason,
        } => {
            if let Some(decision) = inner.decisions.get_mut(&decision_id) {
                decision.reason = Some(reason);
            }
        }
    }
}

#[async_trait]
impl DecisionSink for JsonlDecisionStore {
    async fn record_decision(&self, record: DecisionRecord) -> Result<DecisionId, StoreError> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(StoreError::Closed);
        }
        let id = record.decision_id.clone();
        if inner.decisions.contains_key(&id) {
            // Immutable fields never change once written
            return Ok(id);
        }
        Self::append(&mut inner, &LogRecord::Decision(record.clone()))?;
        apply(&mut inner, LogRecord::Decision(record));
        Ok(id)
    }

    async fn record_decisions(&self, records: Vec<DecisionRecord>) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(StoreError::Closed);
        }
        for record in records {
            if inner.decisions.contains_key(&record.decision_id) {
                continue;
            }
            Self::append(&mut inner, &LogRecord::Decision(record.clone()))?;
            apply(&mut inner, LogRecord::Decision(record));
        }
        Self::flush_inner(&mut inner)
    }

    async fn record_events(&self, records: Vec<EventRecord>) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(StoreError::Closed);
        }
        for record in records {
            Self::append(&mut inner, &LogRecord::Event(record.clone()))?;
            apply(&mut inner, LogRecord::Event(record));
        }
        Self::flush_inner(&mut inner)
    }

    async fn add_feedback(
        &self,
        decision_id: &DecisionId,
        feedback: &str,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(StoreError::Closed);
        }
        if !inner.decisions.contains_key(decision_id) {
            warn!(decision_id = %decision_id, "feedback for unknown decision");
            return Ok(false);
        }
        let record = LogRecord::Feedback {
            decision_id: decision_id.clone(),
            feedback: feedback.to_string(),
        };
        Self::append(&mut inner, &record)?;
        apply(&mut inner, record);
        Ok(true)
    }

    async fn add_rating(&self, decision_id: &DecisionId, rating: f64) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(StoreError::Closed);
        }
        if !inner.decisions.contains_key(decision_id) {
            warn!(decision_id = %decision_id, "rating for unknown decision");
            return Ok(false);
        }
        let record = LogRecord::Rating {
            decision_id: decision_id.clone(),
            rating,
        };
        Self::append(&mut inner, &record)?;
        apply(&mut inner, record);
        Ok(true)
    }

    async fn add_reason(&self, decision_id: &DecisionId, reason: &str) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(StoreError::Closed);
        }
        if !inner.decisions.contains_key(decision_id) {
            warn!(decision_id = %decision_id, "reason for unknown decision");
            return Ok(false);
        }
        let record = LogRecord::Reason {
            decision_id: decision_id.clone(),
            reason: reason.to_string(),
        };
        Self::append(&mut inner, &record)?;
        apply(&mut inner, record);
        Ok(true)
    }

    async fn get_agent_decisions(
        &self,
        trail_id: &TrailId,
        agent_id: &AgentId,
        universe_id: &str,
        range: StepRange,
        limit: usize,
    ) -> Result<Vec<DecisionRecord>, StoreError> {
        let inner = self.inner.lock();
        let mut matches: Vec<DecisionRecord> = inner
            .order
            .iter()
            .filter_map(|id| inner.decisions.get(id))
            .filter(|d| {
                d.trail_id == *trail_id
                    && d.agent_id == *agent_id
                    && d.universe_id == universe_id
                    && range.contains(d.step)
            })
            .cloned()
            .collect();
        matches.sort_by_key(|d| d.step);
        matches.truncate(limit);
        Ok(matches)
    }

    async fn get_decisions_by_event(
        &self,
        trail_id: &TrailId,
        event_id: &str,
        universe_id: &str,
    ) -> Result<Vec<DecisionRecord>, StoreError> {
        let inner = self.inner.lock();
        let mut matches: Vec<DecisionRecord> = inner
            .order
            .iter()
            .filter_map(|id| inner.decisions.get(id))
            .filter(|d| {
                d.trail_id == *trail_id
                    && d.universe_id == universe_id
                    && d.event_id.as_ref().is_some_and(|e| e.as_str() == event_id)
            })
            .cloned()
            .collect();
        matches.sort_by_key(|d| d.timestamp);
        Ok(matches)
    }

    async fn decision_count(&self) -> Result<usize, StoreError> {
        Ok(self.inner.lock().order.len())
    }

    async fn flush(&self) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        Self::flush_inner(&mut inner)
    }

    async fn close(&self) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Ok(());
        }
        Self::flush_inner(&mut inner)?;
        inner.closed = true;
        Ok(())
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
