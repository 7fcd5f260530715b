// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine error types.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("model error: {0}")]
    Model(#[from] colony_models::ModelError),

    #[error("storage error: {0}")]
    Store(#[from] colony_storage::StoreError),

    #[error("configuration error: {0}")]
    Config(#[from] colony_core::ConfigError),

    #[error("handler '{handler}' failed: {message}")]
    Handler { handler: String, message: String },

    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}
