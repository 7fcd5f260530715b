// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! colony-models: the LLM client façade.
//!
//! Routed, load-balanced chat and embedding calls with token accounting.
//! Providers sit behind the [`ChatModel`]/[`EmbeddingModel`] traits; the
//! [`ModelManager`] owns the pools and the rotation.

pub mod client;
pub mod error;
pub mod manager;
pub mod message;
pub mod openai;
pub mod parser;
pub mod usage;

#[cfg(any(test, feature = "test-support"))]
pub mod scripted;

pub use client::{ChatModel, EmbeddingModel};
pub use error::ModelError;
pub use manager::ModelManager;
pub use message::{ChatMessage, ChatRequest, ChatResponse, Role, TokenCounts};
pub use openai::{OpenAiChatModel, OpenAiEmbeddingModel};
pub use parser::{JsonBlockParser, ParseError};
pub use usage::{ModelUsage, UsageLedger, UsageSummary};

#[cfg(any(test, feature = "test-support"))]
pub use scripted::ScriptedChatModel;
