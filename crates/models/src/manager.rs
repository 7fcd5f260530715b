// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Model registry with round-robin load balancing.
//!
//! Built from the model configuration file; the simulator config's
//! `model.chat` / `model.embedding` lists select which config names join
//! the balanced pools (empty list = all). Each `chat()` / `embedding()`
//! call hands out the next model in rotation.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use colony_core::config::{ModelConfigFile, ModelEntry, ModelSection};
use tracing::info;

use crate::client::{ChatModel, EmbeddingModel};
use crate::error::ModelError;
use crate::openai::{OpenAiChatModel, OpenAiEmbeddingModel};
use crate::usage::UsageLedger;

/// Registry of chat and embedding models plus the shared token ledger.
pub struct ModelManager {
    chat: Vec<Arc<dyn ChatModel>>,
    embedding: Vec<Arc<dyn EmbeddingModel>>,
    chat_cursor: AtomicUsize,
    embedding_cursor: AtomicUsize,
    ledger: UsageLedger,
}

impl std::fmt::Debug for ModelManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelManager")
            .field("chat_count", &self.chat.len())
            .field("embedding_count", &self.embedding.len())
            .finish()
    }
}

impl Default for ModelManager {
    fn default() -> Self {
        Self::new(UsageLedger::new())
    }
}

impl ModelManager {
    pub fn new(ledger: UsageLedger) -> Self {
        Self {
            chat: Vec::new(),
            embedding: Vec::new(),
            chat_cursor: AtomicUsize::new(0),
            embedding_cursor: AtomicUsize::new(0),
            ledger,
        }
    }

    /// Build a manager from the model config file. `section` filters which
    /// config names join each pool; an empty list admits all entries.
    pub fn from_config(
        models: &ModelConfigFile,
        section: &ModelSection,
        ledger: UsageLedger,
    ) -> Result<Self, ModelError> {
        let mut manager = Self::new(ledger);

        for entry in &models.chat {
            if !section.chat.is_empty() && !section.chat.contains(&entry.config_name) {
                continue;
            }
            manager.chat.push(build_chat(entry, &manager.ledger)?);
        }
        for entry in &models.embedding {
            if !section.embedding.is_empty() && !section.embedding.contains(&entry.config_name) {
                continue;
            }
            manager
                .embedding
                .push(build_embedding(entry, &manager.ledger)?);
        }

        info!(
            chat = manager.chat.len(),
            embedding = manager.embedding.len(),
            "model manager initialized"
        );
        Ok(manager)
    }

    pub fn register_chat(&mut self, model: Arc<dyn ChatModel>) {
        self.chat.push(model);
    }

    pub fn register_embedding(&mut self, model: Arc<dyn EmbeddingModel>) {
        self.embedding.push(model);
    }

    /// Next chat model in round-robin order.
    pub fn chat(&self) -> Result<Arc<dyn ChatModel>, ModelError> {
        if self.chat.is_empty() {
            return Err(ModelError::EmptyPool("chat"));
        }
        let index = self.chat_cursor.fetch_add(1, Ordering::Relaxed) % self.chat.len();
        Ok(Arc::clone(&self.chat[index]))
    }

    /// Next embedding model in round-robin order.
    pub fn embedding(&self) -> Result<Arc<dyn EmbeddingModel>, ModelError> {
        if self.embedding.is_empty() {
            return Err(ModelError::EmptyPool("embedding"));
        }
        let index = self.embedding_cursor.fetch_add(1, Ordering::Relaxed) % self.embedding.len();
        Ok(Arc::clone(&self.embedding[index]))
    }

    /// Chat model by config name.
    pub fn chat_by_name(&self, config_name: &str) -> Result<Arc<dyn ChatModel>, ModelError> {
        self.chat
            .iter()
            .find(|m| m.config_name() == config_name)
            .cloned()
            .ok_or_else(|| ModelError::UnknownConfig(config_name.to_string()))
    }

    pub fn has_chat(&self) -> bool {
        !self.chat.is_empty()
    }

    pub fn ledger(&self) -> &UsageLedger {
        &self.ledger
    }
}

fn api_key(entry: &ModelEntry) -> String {
    entry
        .extra_str("api_key")
        .map(str::to_string)
        .or_else(|| std::env::var("OPENAI_API_KEY").ok())
        .unwrap_or_default()
}

fn build_chat(entry: &ModelEntry, ledger: &UsageLedger) -> Result<Arc<dyn ChatModel>, ModelError> {
    match entry.provider.as_str() {
        // vLLM and most local gateways speak the openai surface
        "openai" | "vllm" => {
            let mut model = OpenAiChatModel::new(
                &entry.config_name,
                &entry.model_name,
                api_key(entry),
                ledger.clone(),
            );
            if let Some(base) = entry.extra_str("api_base") {
                model = model.with_base_url(base);
            }
            if let Some(temperature) = entry.extra.get("temperature").and_then(|v| v.as_f64()) {
                model = model.with_temperature(temperature);
            }
            Ok(Arc::new(model))
        }
        other => Err(ModelError::UnknownProvider(other.to_string())),
    }
}

fn build_embedding(
    entry: &ModelEntry,
    ledger: &UsageLedger,
) -> Result<Arc<dyn EmbeddingModel>, ModelError> {
    match entry.provider.as_str() {
        "openai" | "vllm" => {
            let mut model = OpenAiEmbeddingModel::new(
                &entry.config_name,
                &entry.model_name,
                api_key(entry),
                ledger.clone(),
            );
            if let Some(base) = entry.extra_str("api_base") {
                model = model.with_base_url(base);
            }
            Ok(Arc::new(model))
        }
        other => Err(ModelError::UnknownProvider(other.to_string())),
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
