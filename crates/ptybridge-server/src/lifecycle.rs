//! Per-connection session: allocate the shell, pump bytes, tear down.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use ptybridge_common::{SessionEnd, SessionId};
use ptybridge_config::BridgeConfig;
use ptybridge_pty::{run_duplex, PtyProcess, WindowSize};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use crate::registry::{SessionRegistry, SessionState};

/// Close reasons are limited to 123 bytes on the wire.
const MAX_CLOSE_REASON: usize = 123;

/// Drive one bridged shell session from handshake to `Closed`.
pub async fn run_session(
    ws: WebSocketStream<TcpStream>,
    peer: SocketAddr,
    config: Arc<BridgeConfig>,
    registry: SessionRegistry,
) {
    let id = SessionId::new();
    let cancel = registry.insert(id.clone(), peer).await;
    let (mut sink, mut stream) = ws.split();

    let size = WindowSize::new(config.terminal.rows, config.terminal.cols);
    let mut process = match PtyProcess::spawn(&config.shell, size) {
        Ok(process) => process,
        Err(e) => {
            tracing::error!(session = %id.short(), peer = %peer, error = %e, "session setup failed");
            let _ = sink.send(close_message(CloseCode::Error, &e.to_string())).await;
            finish(&registry, &id).await;
            return;
        }
    };

    registry.activate(&id, process.pid()).await;
    tracing::info!(session = %id.short(), peer = %peer, pid = ?process.pid(), "session started");

    let end = match process.device_mut() {
        Some(device) => {
            run_duplex(
                device,
                &mut sink,
                &mut stream,
                &cancel,
                config.terminal.read_chunk_size,
            )
            .await
        }
        None => SessionEnd::ProcessExited,
    };

    registry.set_state(&id, SessionState::Closing).await;
    tracing::debug!(session = %id.short(), reason = %end, "session closing");

    let exit_code = process.close().await;

    match farewell(&end) {
        Some(message) => {
            let _ = sink.send(message).await;
        }
        // The peer's close frame has been answered; flush the reply.
        None if matches!(end, SessionEnd::ClientDisconnected) => {
            let _ = sink.close().await;
        }
        None => {}
    }

    let age = registry.get(&id).await.map(|info| info.age);
    finish(&registry, &id).await;
    tracing::info!(
        session = %id.short(),
        peer = %peer,
        exit_code = ?exit_code,
        duration = ?age,
        reason = %end,
        "session closed"
    );
}

/// The close frame owed to the client, if the server is the one closing.
fn farewell(end: &SessionEnd) -> Option<Message> {
    match end {
        SessionEnd::ProcessExited => Some(close_message(CloseCode::Normal, "process exited")),
        SessionEnd::DeviceError(_) => Some(close_message(CloseCode::Error, "terminal device error")),
        SessionEnd::Terminated => Some(close_message(CloseCode::Away, "session terminated")),
        SessionEnd::ClientDisconnected | SessionEnd::ChannelError(_) => None,
    }
}

async fn finish(registry: &SessionRegistry, id: &SessionId) {
    registry.set_state(id, SessionState::Closed).await;
    registry.remove(id).await;
}

/// Build a close message, truncating the reason on a character boundary.
fn close_message(code: CloseCode, reason: &str) -> Message {
    let mut end = reason.len().min(MAX_CLOSE_REASON);
    while !reason.is_char_boundary(end) {
        end -= 1;
    }

    Message::Close(Some(CloseFrame {
        code,
        reason: reason[..end].to_string().into(),
    }))
}
