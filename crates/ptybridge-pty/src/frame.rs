//! Client-to-server control frames.
//!
//! Binary messages are keystrokes for the shell. Text messages are JSON
//! control commands; the only one understood is
//! `{"type": "resize", "rows": N, "cols": N}`.

use serde_json::{Map, Value};
use tokio_tungstenite::tungstenite::Message;

use crate::process::{PtyWriter, WindowSize};

/// A decoded client message.
#[derive(Debug, PartialEq, Eq)]
pub enum ControlFrame {
    /// Bytes to write verbatim to the terminal.
    Input(Vec<u8>),
    /// New window size for the terminal.
    Resize(WindowSize),
    /// Not actionable; the session carries on.
    Ignored(MalformedFrame),
}

/// Why a client message was ignored.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MalformedFrame {
    #[error("text frame is not valid JSON: {0}")]
    NotJson(String),

    #[error("control frame is not a JSON object")]
    NotAnObject,

    #[error("control frame has no string \"type\" field")]
    MissingType,

    #[error("unknown control frame type {0:?}")]
    UnknownType(String),

    #[error("resize frame is missing {0:?}")]
    MissingField(&'static str),

    #[error("resize field {field:?} has invalid value {value}")]
    InvalidDimension { field: &'static str, value: String },

    #[error("{0} message carries no terminal data")]
    NotData(&'static str),
}

/// Classify a client message.
pub fn decode(message: Message) -> ControlFrame {
    match message {
        Message::Binary(data) => ControlFrame::Input(data.to_vec()),
        Message::Text(text) => match decode_text(text.as_str()) {
            Ok(size) => ControlFrame::Resize(size),
            Err(reason) => ControlFrame::Ignored(reason),
        },
        Message::Ping(_) => ControlFrame::Ignored(MalformedFrame::NotData("ping")),
        Message::Pong(_) => ControlFrame::Ignored(MalformedFrame::NotData("pong")),
        Message::Close(_) => ControlFrame::Ignored(MalformedFrame::NotData("close")),
        Message::Frame(_) => ControlFrame::Ignored(MalformedFrame::NotData("raw frame")),
    }
}

/// Parse a text control frame into a resize request.
pub fn decode_text(text: &str) -> Result<WindowSize, MalformedFrame> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| MalformedFrame::NotJson(e.to_string()))?;
    let object = value.as_object().ok_or(MalformedFrame::NotAnObject)?;

    let kind = object
        .get("type")
        .and_then(Value::as_str)
        .ok_or(MalformedFrame::MissingType)?;
    if kind != "resize" {
        return Err(MalformedFrame::UnknownType(kind.to_string()));
    }

    Ok(WindowSize {
        rows: dimension(object, "rows")?,
        cols: dimension(object, "cols")?,
    })
}

/// Coerce a resize field to a cell count.
///
/// Integers, floats (truncated) and base-10 integer strings are accepted;
/// the result must lie in `1..=u16::MAX`.
fn dimension(object: &Map<String, Value>, field: &'static str) -> Result<u16, MalformedFrame> {
    let value = object.get(field).ok_or(MalformedFrame::MissingField(field))?;

    let number = match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite())
                .map(|f| f.trunc() as i64)
        }),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };

    number
        .and_then(|n| u16::try_from(n).ok())
        .filter(|&n| n > 0)
        .ok_or_else(|| MalformedFrame::InvalidDimension {
            field,
            value: value.to_string(),
        })
}

/// Apply a resize to the live terminal. Failures are logged, never raised:
/// a missed resize cannot corrupt the byte stream.
pub fn apply_resize(writer: &PtyWriter<'_>, size: WindowSize) {
    match writer.resize(size) {
        Ok(()) => tracing::trace!(rows = size.rows, cols = size.cols, "PTY resized"),
        Err(e) => tracing::debug!(rows = size.rows, cols = size.cols, error = %e, "PTY resize failed"),
    }
}
