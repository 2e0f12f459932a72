//! Byte pumps between a terminal device and a message channel.
//!
//! Each session runs two pumps concurrently: terminal output to the client,
//! client input to the terminal. Whichever finishes first ends the session;
//! the other is dropped mid-await.

use std::fmt::Display;
use std::io;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use ptybridge_common::SessionEnd;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::frame::{self, ControlFrame};
use crate::process::{is_hangup, PtyDevice, PtyReader, PtyWriter};

/// Forward terminal output to the client as binary messages.
///
/// Bytes go out in the order they were read, with no framing or re-encoding;
/// a read returning `chunk_size` bytes or fewer becomes exactly one message.
pub async fn pump_outbound<Si>(reader: &PtyReader<'_>, sink: &mut Si, chunk_size: usize) -> SessionEnd
where
    Si: Sink<Message> + Unpin,
    Si::Error: Display,
{
    let mut buf = vec![0u8; chunk_size.max(1)];

    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => return SessionEnd::ProcessExited,
            Ok(n) => n,
            Err(e) if is_hangup(&e) => return SessionEnd::ProcessExited,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return SessionEnd::DeviceError(e),
        };

        tracing::trace!(bytes = n, "PTY -> client");
        if let Err(e) = sink.send(Message::binary(buf[..n].to_vec())).await {
            return SessionEnd::ChannelError(e.to_string());
        }
    }
}

/// Apply client messages to the terminal until the client goes away.
///
/// Binary payloads are written verbatim, resize frames adjust the window,
/// and everything else is logged and skipped.
pub async fn pump_inbound<St, E>(writer: &mut PtyWriter<'_>, stream: &mut St) -> SessionEnd
where
    St: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    loop {
        let message = match stream.next().await {
            Some(Ok(Message::Close(_))) | None => return SessionEnd::ClientDisconnected,
            Some(Ok(message)) => message,
            Some(Err(e)) => return SessionEnd::ChannelError(e.to_string()),
        };

        match frame::decode(message) {
            ControlFrame::Input(data) => {
                tracing::trace!(bytes = data.len(), "client -> PTY");
                if let Err(e) = writer.write_all(&data).await {
                    return if is_hangup(&e) {
                        SessionEnd::ProcessExited
                    } else {
                        SessionEnd::DeviceError(e)
                    };
                }
            }
            ControlFrame::Resize(size) => frame::apply_resize(writer, size),
            ControlFrame::Ignored(reason) => {
                tracing::debug!(reason = %reason, "ignoring client frame");
            }
        }
    }
}

/// Run both pumps over `device` until one of them, or `cancel`, finishes.
pub async fn run_duplex<Si, St, E>(
    device: &mut PtyDevice,
    sink: &mut Si,
    stream: &mut St,
    cancel: &CancellationToken,
    chunk_size: usize,
) -> SessionEnd
where
    Si: Sink<Message> + Unpin,
    Si::Error: Display,
    St: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    let (reader, mut writer) = device.split();

    tokio::select! {
        end = pump_outbound(&reader, sink, chunk_size) => end,
        end = pump_inbound(&mut writer, stream) => end,
        _ = cancel.cancelled() => SessionEnd::Terminated,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::tests::{sh, sh_c};
    use crate::process::{PtyProcess, WindowSize};
    use std::time::Duration;
    use tokio::sync::mpsc;

    /// A sink that forwards every message into an unbounded channel.
    fn channel_sink() -> (
        impl Sink<Message, Error = String> + Unpin,
        mpsc::UnboundedReceiver<Message>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = Box::pin(futures_util::sink::unfold(
            tx,
            |tx: mpsc::UnboundedSender<Message>, msg: Message| async move {
                tx.send(msg).map_err(|e| e.to_string())?;
                Ok::<_, String>(tx)
            },
        ));
        (sink, rx)
    }

    /// A stream fed from an unbounded channel; ends when the sender drops.
    fn channel_stream() -> (
        mpsc::UnboundedSender<Message>,
        impl Stream<Item = Result<Message, String>> + Unpin,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let stream = Box::pin(futures_util::stream::unfold(
            rx,
            |mut rx: mpsc::UnboundedReceiver<Message>| async move {
                rx.recv().await.map(|msg| (Ok(msg), rx))
            },
        ));
        (tx, stream)
    }

    fn collect_output(rx: &mut mpsc::UnboundedReceiver<Message>) -> String {
        let mut output = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            if let Message::Binary(data) = msg {
                output.extend_from_slice(&data);
            }
        }
        String::from_utf8_lossy(&output).into_owned()
    }

    async fn run_with_timeout<Si, St>(
        process: &mut PtyProcess,
        sink: &mut Si,
        stream: &mut St,
        cancel: &CancellationToken,
    ) -> SessionEnd
    where
        Si: Sink<Message> + Unpin,
        Si::Error: Display,
        St: Stream<Item = Result<Message, String>> + Unpin,
    {
        let device = process.device_mut().unwrap();
        tokio::time::timeout(
            Duration::from_secs(10),
            run_duplex(device, sink, stream, cancel, 4096),
        )
        .await
        .expect("session should end")
    }

    #[tokio::test]
    async fn input_frames_reach_shell_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("typed.txt");

        let mut shell = sh_c("head -c 11 > \"$PTYBRIDGE_OUT\"");
        shell
            .env
            .insert("PTYBRIDGE_OUT".into(), out.to_string_lossy().into_owned());
        let mut process = PtyProcess::spawn(&shell, WindowSize::new(24, 80)).unwrap();

        let (mut sink, _output) = channel_sink();
        let (input, mut stream) = channel_stream();
        for chunk in ["abc", "def", "ghij\n"] {
            input.send(Message::binary(chunk.as_bytes().to_vec())).unwrap();
        }

        let end = run_with_timeout(&mut process, &mut sink, &mut stream, &CancellationToken::new()).await;
        assert!(matches!(end, SessionEnd::ProcessExited), "got {end}");
        assert_eq!(process.close().await, Some(0));

        assert_eq!(std::fs::read_to_string(&out).unwrap(), "abcdefghij\n");
    }

    #[tokio::test]
    async fn output_reaches_client_as_binary() {
        let mut process =
            PtyProcess::spawn(&sh_c("echo bridged-$((40 + 2))"), WindowSize::new(24, 80)).unwrap();

        let (mut sink, mut output) = channel_sink();
        let (_input, mut stream) = channel_stream();

        let end = run_with_timeout(&mut process, &mut sink, &mut stream, &CancellationToken::new()).await;
        assert!(matches!(end, SessionEnd::ProcessExited), "got {end}");

        let text = collect_output(&mut output);
        assert!(text.contains("bridged-42"), "got: {text}");
        process.close().await;
    }

    #[tokio::test]
    async fn malformed_frames_do_not_end_session() {
        let mut process = PtyProcess::spawn(&sh(), WindowSize::new(24, 80)).unwrap();

        let (mut sink, _output) = channel_sink();
        let (input, mut stream) = channel_stream();
        input.send(Message::text("not json at all")).unwrap();
        input
            .send(Message::text(r#"{"type":"resize","rows":"abc","cols":80}"#))
            .unwrap();
        input.send(Message::text(r#"{"type":"paste","data":"x"}"#)).unwrap();
        input.send(Message::binary(b"exit 3\n".to_vec())).unwrap();

        let end = run_with_timeout(&mut process, &mut sink, &mut stream, &CancellationToken::new()).await;
        assert!(matches!(end, SessionEnd::ProcessExited), "got {end}");
        assert_eq!(process.close().await, Some(3));
    }

    #[tokio::test]
    async fn resize_frame_is_visible_to_shell() {
        let mut process = PtyProcess::spawn(&sh(), WindowSize::new(24, 80)).unwrap();

        let (mut sink, mut output) = channel_sink();
        let (input, mut stream) = channel_stream();
        input
            .send(Message::text(r#"{"type":"resize","rows":50,"cols":132}"#))
            .unwrap();
        input.send(Message::binary(b"stty size\n".to_vec())).unwrap();
        input.send(Message::binary(b"exit\n".to_vec())).unwrap();

        let end = run_with_timeout(&mut process, &mut sink, &mut stream, &CancellationToken::new()).await;
        assert!(matches!(end, SessionEnd::ProcessExited), "got {end}");

        let text = collect_output(&mut output);
        assert!(text.contains("50 132"), "got: {text}");
        process.close().await;
    }

    #[tokio::test]
    async fn dropped_channel_is_client_disconnect() {
        let mut process = PtyProcess::spawn(&sh(), WindowSize::new(24, 80)).unwrap();

        let (mut sink, _output) = channel_sink();
        let (input, mut stream) = channel_stream();
        drop(input);

        let end = run_with_timeout(&mut process, &mut sink, &mut stream, &CancellationToken::new()).await;
        assert!(matches!(end, SessionEnd::ClientDisconnected), "got {end}");
        assert!(process.is_running());
        process.close().await;
    }

    #[tokio::test]
    async fn close_message_is_client_disconnect() {
        let mut process = PtyProcess::spawn(&sh(), WindowSize::new(24, 80)).unwrap();

        let (mut sink, _output) = channel_sink();
        let (input, mut stream) = channel_stream();
        input.send(Message::Close(None)).unwrap();

        let end = run_with_timeout(&mut process, &mut sink, &mut stream, &CancellationToken::new()).await;
        assert!(matches!(end, SessionEnd::ClientDisconnected), "got {end}");
        process.close().await;
    }

    #[tokio::test]
    async fn cancellation_terminates_session() {
        let mut process = PtyProcess::spawn(&sh(), WindowSize::new(24, 80)).unwrap();

        let (mut sink, _output) = channel_sink();
        let (_input, mut stream) = channel_stream();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let end = run_with_timeout(&mut process, &mut sink, &mut stream, &cancel).await;
        assert!(matches!(end, SessionEnd::Terminated), "got {end}");
        process.close().await;
    }

    #[tokio::test]
    async fn failing_sink_is_channel_error() {
        let mut process =
            PtyProcess::spawn(&sh_c("echo hello; sleep 5"), WindowSize::new(24, 80)).unwrap();

        let mut sink = Box::pin(futures_util::sink::unfold((), |(), _msg: Message| async {
            Err::<(), _>("peer reset".to_string())
        }));
        let (_input, mut stream) = channel_stream();

        let end = run_with_timeout(&mut process, &mut sink, &mut stream, &CancellationToken::new()).await;
        assert!(matches!(end, SessionEnd::ChannelError(ref e) if e == "peer reset"), "got {end}");
        process.close().await;
    }
}
