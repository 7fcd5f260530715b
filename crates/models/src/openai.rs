// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! OpenAI-compatible HTTP provider.
//!
//! Covers any endpoint speaking the `/chat/completions` and `/embeddings`
//! surface (OpenAI, vLLM, Together, local gateways). One shared
//! `reqwest::Client` keeps connections pooled across the many concurrent
//! handler calls a round produces.

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::client::{ChatModel, EmbeddingModel};
use crate::error::{map_http_status, map_reqwest_error, ModelError};
use crate::message::{ChatMessage, ChatRequest, ChatResponse, TokenCounts};
use crate::usage::UsageLedger;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

fn shared_http_client() -> &'static reqwest::Client {
    static CLIENT: OnceLock<reqwest::Client> = OnceLock::new();
    CLIENT.get_or_init(|| {
        reqwest::ClientBuilder::new()
            .pool_max_idle_per_host(10)
            .tcp_keepalive(Some(Duration::from_secs(60)))
            .connect_timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default()
    })
}

/// Chat client for an OpenAI-compatible endpoint.
pub struct OpenAiChatModel {
    config_name: String,
    model_name: String,
    base_url: String,
    api_key: String,
    temperature: Option<f64>,
    timeout: Duration,
    ledger: UsageLedger,
    http: reqwest::Client,
}

impl OpenAiChatModel {
    pub fn new(
        config_name: impl Into<String>,
        model_name: impl Into<String>,
        api_key: impl Into<String>,
        ledger: UsageLedger,
    ) -> Self {
        Self {
            config_name: config_name.into(),
            model_name: model_name.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            temperature: None,
            timeout: DEFAULT_TIMEOUT,
            ledger,
            http: shared_http_client().clone(),
        }
    }

    /// Point at a custom OpenAI-compatible base URL (no trailing slash).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Serialize)]
struct WireChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u64>,
}

#[derive(Deserialize)]
struct WireChatResponse {
    choices: Vec<WireChoice>,
    #[serde(default)]
    usage: TokenCounts,
}

#[derive(Deserialize)]
struct WireChoice {
    message: WireMessage,
}

#[derive(Deserialize)]
struct WireMessage {
    #[serde(default)]
    content: String,
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    fn config_name(&self) -> &str {
        &self.config_name
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ModelError> {
        let body = WireChatRequest {
            model: &self.model_name,
            messages: &request.messages,
            temperature: request.temperature.or(self.temperature),
            max_tokens: request.max_tokens,
        };

        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        let text = response.text().await.map_err(map_reqwest_error)?;
        if !status.is_success() {
            return Err(map_http_status(status, &text));
        }

        let parsed: WireChatResponse =
            serde_json::from_str(&text).map_err(|e| ModelError::Parse(e.to_string()))?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| ModelError::Parse("response has no choices".to_string()))?;

        self.ledger.record(&self.model_name, parsed.usage);
        Ok(ChatResponse {
            content,
            usage: parsed.usage,
        })
    }
}

/// Embedding client for an OpenAI-compatible endpoint.
pub struct OpenAiEmbeddingModel {
    config_name: String,
    model_name: String,
    base_url: String,
    api_key: String,
    timeout: Duration,
    ledger: UsageLedger,
    http: reqwest::Client,
}

impl OpenAiEmbeddingModel {
    pub fn new(
        config_name: impl Into<String>,
        model_name: impl Into<String>,
        api_key: impl Into<String>,
        ledger: UsageLedger,
    ) -> Self {
        Self {
            config_name: config_name.into(),
            model_name: model_name.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            timeout: DEFAULT_TIMEOUT,
            ledger,
            http: shared_http_client().clone(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

#[derive(Serialize)]
struct WireEmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct WireEmbeddingResponse {
    data: Vec<WireEmbedding>,
    #[serde(default)]
    usage: TokenCounts,
}

#[derive(Deserialize)]
struct WireEmbedding {
    embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingModel for OpenAiEmbeddingModel {
    fn config_name(&self) -> &str {
        &self.config_name
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ModelError> {
        let body = WireEmbeddingRequest {
            model: &self.model_name,
            input: texts,
        };

        let url = format!("{}/embeddings", self.base_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        let text = response.text().await.map_err(map_reqwest_error)?;
        if !status.is_success() {
            return Err(map_http_status(status, &text));
        }

        let parsed: WireEmbeddingResponse =
            serde_json::from_str(&text).map_err(|e| ModelError::Parse(e.to_string()))?;
        self.ledger.record(&self.model_name, parsed.usage);
        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }
}

#[cfg(test)]
#[path = "openai_tests.rs"]
mod tests;
