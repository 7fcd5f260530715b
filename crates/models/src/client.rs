// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The model façade traits.
//!
//! Handlers and the scene loader talk to `ChatModel`/`EmbeddingModel`;
//! concrete providers live behind them. Token accounting is a separate
//! concern ([`crate::usage::UsageLedger`]) queried by the monitor.

use async_trait::async_trait;

use crate::error::ModelError;
use crate::message::{ChatRequest, ChatResponse};

/// A routed chat model.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Config name this instance was registered under.
    fn config_name(&self) -> &str;

    /// Provider-side model identifier.
    fn model_name(&self) -> &str;

    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ModelError>;
}

/// A routed embedding model.
#[async_trait]
pub trait EmbeddingModel: Send + Sync {
    fn config_name(&self) -> &str;

    fn model_name(&self) -> &str;

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ModelError>;
}
