//! TCP listener, connection routing, WebSocket handshake, and graceful
//! shutdown.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use ptybridge_common::Result;
use ptybridge_config::BridgeConfig;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;

use crate::file_api;
use crate::lifecycle::run_session;
use crate::registry::SessionRegistry;

/// A bound bridge server, ready to accept connections.
pub struct Server {
    listener: TcpListener,
    config: Arc<BridgeConfig>,
    registry: SessionRegistry,
}

impl Server {
    /// Bind the configured address. Port 0 picks a free port.
    pub async fn bind(config: BridgeConfig) -> Result<Self> {
        let addr = config.server.bind_addr();
        let listener = TcpListener::bind(&addr).await?;

        Ok(Self {
            listener,
            config: Arc::new(config),
            registry: SessionRegistry::new(),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Handle to the live session registry.
    pub fn registry(&self) -> SessionRegistry {
        self.registry.clone()
    }

    /// Accept connections until `shutdown` resolves, then cancel every
    /// session and wait up to `server.shutdown_grace_secs` for them to drain.
    pub async fn run<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let local = self.local_addr()?;
        tracing::info!(addr = %local, path = %self.config.server.path, "ptybridge listening");

        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let config = Arc::clone(&self.config);
                        let registry = self.registry.clone();
                        tokio::spawn(handle_connection(stream, peer, config, registry));
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "TCP accept error");
                    }
                },
            }
        }

        drop(self.listener);

        let live = self.registry.shutdown().await;
        tracing::info!(sessions = live, "shutting down");

        let grace = Duration::from_secs(self.config.server.shutdown_grace_secs);
        if !self.registry.wait_until_empty(grace).await {
            let remaining = self.registry.count().await;
            tracing::warn!(
                remaining,
                "sessions still open after shutdown grace period"
            );
        }

        Ok(())
    }
}

/// Route a new connection: editor file requests get a plain HTTP answer,
/// everything else goes through the WebSocket handshake into a session.
async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    config: Arc<BridgeConfig>,
    registry: SessionRegistry,
) {
    let deadline =
        tokio::time::Instant::now() + Duration::from_secs(config.server.handshake_timeout_secs);

    if config.server.file_api {
        let routed = tokio::time::timeout_at(deadline, file_api::is_file_request(&stream)).await;
        match routed {
            Ok(Ok(true)) => return file_api::serve(stream, peer, deadline).await,
            Ok(Ok(false)) => {}
            Ok(Err(e)) => {
                tracing::debug!(peer = %peer, error = %e, "connection failed before request");
                return;
            }
            Err(_) => {
                tracing::warn!(peer = %peer, "WS handshake timed out");
                return;
            }
        }
    }

    let expected = config.server.path.clone();
    let check_path = move |request: &Request, response: Response| {
        if request.uri().path() == expected {
            Ok(response)
        } else {
            tracing::debug!(peer = %peer, path = %request.uri().path(), "rejecting upgrade");
            Err(not_found())
        }
    };

    let ws = match tokio::time::timeout_at(deadline, accept_hdr_async(stream, check_path)).await {
        Ok(Ok(ws)) => ws,
        Ok(Err(e)) => {
            tracing::warn!(peer = %peer, error = %e, "WS handshake failed");
            return;
        }
        Err(_) => {
            tracing::warn!(peer = %peer, "WS handshake timed out");
            return;
        }
    };

    run_session(ws, peer, config, registry).await;
}

fn not_found() -> ErrorResponse {
    let mut response = ErrorResponse::new(Some("not found".to_string()));
    *response.status_mut() = StatusCode::NOT_FOUND;
    response
}
