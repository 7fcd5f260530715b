// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-wide token accounting.
//!
//! Every chat/embedding call records its token counts here; the monitor
//! and the master's periodic pull read the summary. Aggregation across
//! nodes is best-effort, an unreachable node contributes nothing.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::message::TokenCounts;

/// Cumulative usage for one model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    pub request_count: u64,
}

/// Snapshot of the ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageSummary {
    pub total_prompt_tokens: u64,
    pub total_completion_tokens: u64,
    pub total_tokens: u64,
    pub request_count: u64,
    #[serde(default)]
    pub model_usage: BTreeMap<String, ModelUsage>,
}

impl UsageSummary {
    /// Merge another node's summary into this one.
    pub fn merge(&mut self, other: &UsageSummary) {
        self.total_prompt_tokens += other.total_prompt_tokens;
        self.total_completion_tokens += other.total_completion_tokens;
        self.total_tokens += other.total_tokens;
        self.request_count += other.request_count;
        for (model, usage) in &other.model_usage {
            let entry = self.model_usage.entry(model.clone()).or_default();
            entry.prompt_tokens += usage.prompt_tokens;
            entry.completion_tokens += usage.completion_tokens;
            entry.total_tokens += usage.total_tokens;
            entry.request_count += usage.request_count;
        }
    }
}

/// Shared token ledger. Clone-cheap; all clones share state.
#[derive(Debug, Clone, Default)]
pub struct UsageLedger {
    inner: Arc<Mutex<UsageSummary>>,
}

impl UsageLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, model_name: &str, counts: TokenCounts) {
        let mut summary = self.inner.lock();
        summary.total_prompt_tokens += counts.prompt_tokens;
        summary.total_completion_tokens += counts.completion_tokens;
        summary.total_tokens += counts.total_tokens;
        summary.request_count += 1;

        let entry = summary.model_usage.entry(model_name.to_string()).or_default();
        entry.prompt_tokens += counts.prompt_tokens;
        entry.completion_tokens += counts.completion_tokens;
        entry.total_tokens += counts.total_tokens;
        entry.request_count += 1;
    }

    pub fn summary(&self) -> UsageSummary {
        self.inner.lock().clone()
    }
}

#[cfg(test)]
#[path = "usage_tests.rs"]
mod tests;
