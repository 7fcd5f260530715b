// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! RPC client: one request/response exchange per connection.

use std::time::Duration;

use tokio::net::TcpStream;

use crate::protocol::{self, ProtocolError, Request, Response, DEFAULT_TIMEOUT};

/// Client handle for a remote node's RPC endpoint.
#[derive(Debug, Clone)]
pub struct RpcClient {
    address: String,
    port: u16,
    timeout: Duration,
}

impl RpcClient {
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn endpoint(&self) -> (String, u16) {
        (self.address.clone(), self.port)
    }

    /// Send one request and await its response.
    pub async fn call(&self, request: &Request) -> Result<Response, ProtocolError> {
        let stream = tokio::time::timeout(
            self.timeout,
            TcpStream::connect((self.address.as_str(), self.port)),
        )
        .await
        .map_err(|_| ProtocolError::Timeout)??;

        let (mut reader, mut writer) = stream.into_split();
        protocol::send_frame(&mut writer, request, self.timeout).await?;
        let response: Response = protocol::recv_frame(&mut reader, self.timeout).await?;

        if let Response::Error { message } = &response {
            return Err(ProtocolError::UnexpectedResponse(message.clone()));
        }
        Ok(response)
    }

    /// `call` that swallows transport errors, for fire-and-forget paths
    /// (heartbeats, shutdown signals).
    pub async fn try_call(&self, request: &Request) -> Option<Response> {
        self.call(request).await.ok()
    }
}
