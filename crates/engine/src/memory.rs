// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pluggable memory strategies.
//!
//! Handlers may consult memory through `generate_reaction`; the strategy
//! is selected by name from the agent config. The interface is
//! deliberately small, richer strategies (vector recall, summarization)
//! plug in behind it.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

/// A memory strategy attached to an agent.
#[async_trait]
pub trait MemoryStrategy: Send + Sync {
    /// Store one entry.
    async fn remember(&self, entry: String);

    /// Retrieve up to `k` entries relevant to `query`.
    async fn recall(&self, query: &str, k: usize) -> Vec<String>;
}

/// Remembers nothing, recalls nothing.
#[derive(Debug, Default)]
pub struct NoopMemory;

#[async_trait]
impl MemoryStrategy for NoopMemory {
    async fn remember(&self, _entry: String) {}

    async fn recall(&self, _query: &str, _k: usize) -> Vec<String> {
        Vec::new()
    }
}

/// Sliding window over the most recent entries; recall returns the last
/// `k` regardless of query.
#[derive(Debug)]
pub struct WindowMemory {
    capacity: usize,
    entries: Mutex<VecDeque<String>>,
}

impl WindowMemory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: Mutex::new(VecDeque::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[async_trait]
impl MemoryStrategy for WindowMemory {
    async fn remember(&self, entry: String) {
        let mut entries = self.entries.lock();
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    async fn recall(&self, _query: &str, k: usize) -> Vec<String> {
        let entries = self.entries.lock();
        entries
            .iter()
            .rev()
            .take(k)
            .rev()
            .cloned()
            .collect()
    }
}

/// Build a strategy by config name. Unknown names fall back to none.
pub fn memory_from_config(strategy: Option<&str>, capacity: usize) -> Option<Arc<dyn MemoryStrategy>> {
    match strategy {
        Some("window") => Some(Arc::new(WindowMemory::new(if capacity == 0 {
            16
        } else {
            capacity
        }))),
        Some("none") | None => None,
        Some(other) => {
            tracing::warn!(strategy = other, "unknown memory strategy, using none");
            None
        }
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
