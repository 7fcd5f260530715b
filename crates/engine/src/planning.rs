// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pluggable planning strategies.
//!
//! A planning strategy turns a goal plus context into a short plan string
//! a handler can fold into its observation. Selection is by name from the
//! agent config; most scenarios run without one.

use std::sync::Arc;

use async_trait::async_trait;
use colony_models::{ChatModel, ChatRequest};

use crate::error::EngineError;

#[async_trait]
pub trait PlanningStrategy: Send + Sync {
    async fn plan(&self, goal: &str, context: &str) -> Result<String, EngineError>;
}

/// Single-shot planner: one LLM call, plan text back.
pub struct DirectPlanning {
    model: Arc<dyn ChatModel>,
}

impl DirectPlanning {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl PlanningStrategy for DirectPlanning {
    async fn plan(&self, goal: &str, context: &str) -> Result<String, EngineError> {
        let prompt = format!(
            "Goal: {goal}\nContext: {context}\n\
             Produce a short numbered plan (3 steps or fewer) to pursue the goal."
        );
        let response = self
            .model
            .chat(ChatRequest::from_prompt(None, prompt))
            .await?;
        Ok(response.content)
    }
}

/// Build a strategy by config name. Unknown names fall back to none.
pub fn planning_from_config(
    strategy: Option<&str>,
    model: Option<Arc<dyn ChatModel>>,
) -> Option<Arc<dyn PlanningStrategy>> {
    match (strategy, model) {
        (Some("direct"), Some(model)) => Some(Arc::new(DirectPlanning::new(model))),
        (Some("direct"), None) => {
            tracing::warn!("direct planning requires a chat model, using none");
            None
        }
        (Some("none") | None, _) => None,
        (Some(other), _) => {
            tracing::warn!(strategy = other, "unknown planning strategy, using none");
            None
        }
    }
}

#[cfg(test)]
#[path = "planning_tests.rs"]
mod tests;
