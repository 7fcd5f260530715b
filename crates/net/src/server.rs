// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! RPC server: accept loop spawning one task per connection.
//!
//! Each connection carries a single request/response exchange against the
//! node's [`RequestHandler`]. The loop exits on the shared stop signal.

use std::sync::Arc;

use async_trait::async_trait;
use colony_engine::StopSignal;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::protocol::{self, ProtocolError, Request, Response, DEFAULT_TIMEOUT};

/// Serves one node's side of the wire protocol.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn handle(&self, request: Request) -> Response;
}

/// Bind a listener, returning it with the actual bound port (port 0
/// picks an ephemeral one, used throughout the tests).
pub async fn bind(address: &str, port: u16) -> Result<(TcpListener, u16), ProtocolError> {
    let listener = TcpListener::bind((address, port)).await?;
    let actual = listener.local_addr()?.port();
    Ok((listener, actual))
}

/// Run the accept loop until the stop signal fires.
pub fn spawn(
    listener: TcpListener,
    handler: Arc<dyn RequestHandler>,
    stop: Arc<StopSignal>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let accepted = tokio::select! {
                accepted = listener.accept() => accepted,
                _ = stop.wait() => break,
            };
            match accepted {
                Ok((stream, _)) => {
                    let handler = Arc::clone(&handler);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, handler).await {
                            match e {
                                ProtocolError::PeerClosed => debug!("peer disconnected"),
                                ProtocolError::Timeout => warn!("connection timeout"),
                                _ => error!("connection error: {}", e),
                            }
                        }
                    });
                }
                Err(e) => {
                    error!("accept error: {}", e);
                }
            }
        }
        debug!("rpc server stopped");
    })
}

async fn handle_connection(
    stream: TcpStream,
    handler: Arc<dyn RequestHandler>,
) -> Result<(), ProtocolError> {
    let (mut reader, mut writer) = stream.into_split();

    let request: Request = protocol::recv_frame(&mut reader, DEFAULT_TIMEOUT).await?;
    debug!(request = ?request, "received request");

    let response = handler.handle(request).await;
    protocol::send_frame(&mut writer, &response, DEFAULT_TIMEOUT).await
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;
