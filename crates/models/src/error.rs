// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Model façade errors, with HTTP status mapping for hosted providers.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("invalid API key or authentication failure")]
    Unauthorized,

    #[error("rate limited by provider")]
    RateLimited,

    #[error("provider error (status {status}): {message}")]
    Provider { status: u16, message: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("response parse error: {0}")]
    Parse(String),

    #[error("unknown model config '{0}'")]
    UnknownConfig(String),

    #[error("unknown provider '{0}'")]
    UnknownProvider(String),

    #[error("no {0} models configured")]
    EmptyPool(&'static str),
}

/// Map an HTTP error status to a typed error.
pub(crate) fn map_http_status(status: reqwest::StatusCode, body: &str) -> ModelError {
    match status.as_u16() {
        401 | 403 => ModelError::Unauthorized,
        429 => ModelError::RateLimited,
        code => ModelError::Provider {
            status: code,
            message: truncate(body, 300),
        },
    }
}

/// Map a transport-level reqwest error.
pub(crate) fn map_reqwest_error(err: reqwest::Error) -> ModelError {
    if err.is_timeout() {
        ModelError::Timeout(std::time::Duration::from_secs(0))
    } else {
        ModelError::Network(err.to_string())
    }
}

fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}…", &text[..cut]),
        None => text.to_string(),
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
