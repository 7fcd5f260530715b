// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scripted chat model for tests.
//!
//! Gated behind `#[cfg(any(test, feature = "test-support"))]`. Hands back
//! canned responses in order (the last one repeats) and records every
//! request it received.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::client::ChatModel;
use crate::error::ModelError;
use crate::message::{ChatRequest, ChatResponse, TokenCounts};
use crate::usage::UsageLedger;

#[derive(Default)]
struct ScriptState {
    responses: Vec<String>,
    cursor: usize,
    requests: Vec<ChatRequest>,
}

/// Deterministic chat model: responds from a fixed script.
#[derive(Clone, Default)]
pub struct ScriptedChatModel {
    state: Arc<Mutex<ScriptState>>,
    ledger: Option<UsageLedger>,
}

impl ScriptedChatModel {
    pub fn new(responses: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            state: Arc::new(Mutex::new(ScriptState {
                responses: responses.into_iter().map(Into::into).collect(),
                cursor: 0,
                requests: Vec::new(),
            })),
            ledger: None,
        }
    }

    /// Respond with the same body to every request.
    pub fn always(response: impl Into<String>) -> Self {
        Self::new([response.into()])
    }

    pub fn with_ledger(mut self, ledger: UsageLedger) -> Self {
        self.ledger = Some(ledger);
        self
    }

    /// Requests observed so far.
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.state.lock().requests.clone()
    }

    pub fn call_count(&self) -> usize {
        self.state.lock().requests.len()
    }
}

#[async_trait]
impl ChatModel for ScriptedChatModel {
    fn config_name(&self) -> &str {
        "scripted"
    }

    fn model_name(&self) -> &str {
        "scripted-model"
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ModelError> {
        let content = {
            let mut state = self.state.lock();
            state.requests.push(request);
            if state.responses.is_empty() {
                return Err(ModelError::Provider {
                    status: 0,
                    message: "scripted model has no responses".to_string(),
                });
            }
            let index = state.cursor.min(state.responses.len() - 1);
            state.cursor += 1;
            state.responses[index].clone()
        };

        let usage = TokenCounts {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        };
        if let Some(ledger) = &self.ledger {
            ledger.record("scripted-model", usage);
        }
        Ok(ChatResponse { content, usage })
    }
}
