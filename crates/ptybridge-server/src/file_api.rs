//! Editor file endpoints, served as plain HTTP on the terminal port.
//!
//! - `GET /api/file/content?path=<path>` returns `{"content": "..."}`.
//! - `POST /api/file/save` with `{"path": "...", "content": "..."}` writes
//!   the file, creating parent directories.
//! - `OPTIONS` on either answers the CORS preflight.
//!
//! Connections are routed here by peeking at the request line, so a WebSocket
//! upgrade on the same listener never loses a byte.

use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use ptybridge_common::{files, FileError};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::http::StatusCode;

const CONTENT_PATH: &str = "/api/file/content";
const SAVE_PATH: &str = "/api/file/save";

/// Request-line prefixes that belong to the file API.
const ROUTED_PREFIXES: [&str; 3] = ["GET /api/file/", "POST /api/file/", "OPTIONS /api/file/"];

const MAX_HEAD_BYTES: usize = 16 * 1024;
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;
const MAX_HEADERS: usize = 64;
const PEEK_RETRY: Duration = Duration::from_millis(10);

/// Decide from the first bytes of a request whether it targets the file API.
/// `None` means more bytes are needed.
fn classify(seen: &[u8]) -> Option<bool> {
    let mut undecided = false;
    for prefix in ROUTED_PREFIXES.map(str::as_bytes) {
        if seen.len() >= prefix.len() {
            if seen.starts_with(prefix) {
                return Some(true);
            }
        } else if prefix.starts_with(seen) {
            undecided = true;
        }
    }
    (!undecided).then_some(false)
}

/// Peek at the connection without consuming anything.
pub async fn is_file_request(stream: &TcpStream) -> io::Result<bool> {
    let mut buf = [0u8; 32];
    loop {
        let n = stream.peek(&mut buf).await?;
        if n == 0 {
            return Ok(false);
        }
        if let Some(routed) = classify(&buf[..n]) {
            return Ok(routed);
        }
        // Request line split across segments; wait for the rest.
        tokio::time::sleep(PEEK_RETRY).await;
    }
}

// =============================================================================
// REQUEST PARSING
// =============================================================================

#[derive(Debug, PartialEq, Eq)]
struct Head {
    method: String,
    target: String,
    content_length: usize,
    len: usize,
}

#[derive(Debug)]
struct FileRequest {
    method: String,
    target: String,
    body: Vec<u8>,
}

#[derive(Debug, Deserialize)]
struct SaveRequest {
    path: String,
    content: String,
}

/// Parse a request head. `Ok(None)` means the head is not complete yet.
fn parse_head(buf: &[u8]) -> Result<Option<Head>, StatusCode> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut request = httparse::Request::new(&mut headers);

    let len = match request.parse(buf) {
        Ok(httparse::Status::Complete(len)) => len,
        Ok(httparse::Status::Partial) => return Ok(None),
        Err(_) => return Err(StatusCode::BAD_REQUEST),
    };

    let content_length = match request
        .headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case("content-length"))
    {
        Some(header) => std::str::from_utf8(header.value)
            .ok()
            .and_then(|v| v.trim().parse::<usize>().ok())
            .ok_or(StatusCode::BAD_REQUEST)?,
        None => 0,
    };

    Ok(Some(Head {
        method: request.method.unwrap_or_default().to_string(),
        target: request.path.unwrap_or_default().to_string(),
        content_length,
        len,
    }))
}

async fn read_request(stream: &mut TcpStream) -> Result<FileRequest, StatusCode> {
    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 4096];

    let head = loop {
        let n = stream
            .read(&mut chunk)
            .await
            .map_err(|_| StatusCode::BAD_REQUEST)?;
        if n == 0 {
            return Err(StatusCode::BAD_REQUEST);
        }
        buf.extend_from_slice(&chunk[..n]);

        if let Some(head) = parse_head(&buf)? {
            break head;
        }
        if buf.len() > MAX_HEAD_BYTES {
            return Err(StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE);
        }
    };

    if head.content_length > MAX_BODY_BYTES {
        return Err(StatusCode::PAYLOAD_TOO_LARGE);
    }

    let mut body = buf.split_off(head.len);
    if body.len() < head.content_length {
        let mut rest = vec![0u8; head.content_length - body.len()];
        stream
            .read_exact(&mut rest)
            .await
            .map_err(|_| StatusCode::BAD_REQUEST)?;
        body.extend_from_slice(&rest);
    }
    body.truncate(head.content_length);

    Ok(FileRequest {
        method: head.method,
        target: head.target,
        body,
    })
}

// =============================================================================
// HANDLERS
// =============================================================================

/// Read one request from `stream`, answer it, and close the connection.
pub async fn serve(mut stream: TcpStream, peer: SocketAddr, deadline: tokio::time::Instant) {
    let (status, body) = match tokio::time::timeout_at(deadline, read_request(&mut stream)).await {
        Ok(Ok(request)) => {
            tracing::debug!(peer = %peer, method = %request.method, target = %request.target, "file API request");
            route(request).await
        }
        Ok(Err(status)) => (status, Some(detail(status.canonical_reason().unwrap_or("Bad Request")))),
        Err(_) => {
            tracing::warn!(peer = %peer, "file API request timed out");
            return;
        }
    };

    if let Err(e) = write_response(&mut stream, status, body.as_ref()).await {
        tracing::debug!(peer = %peer, error = %e, "failed to write file API response");
    }
}

async fn route(request: FileRequest) -> (StatusCode, Option<Value>) {
    let (path, query) = match request.target.split_once('?') {
        Some((path, query)) => (path, query),
        None => (request.target.as_str(), ""),
    };

    match (request.method.as_str(), path) {
        ("OPTIONS", _) => (StatusCode::NO_CONTENT, None),
        ("GET", CONTENT_PATH) => get_content(query).await,
        ("POST", SAVE_PATH) => save(&request.body).await,
        (_, CONTENT_PATH | SAVE_PATH) => (
            StatusCode::METHOD_NOT_ALLOWED,
            Some(detail("Method Not Allowed")),
        ),
        _ => (StatusCode::NOT_FOUND, Some(detail("Not Found"))),
    }
}

async fn get_content(query: &str) -> (StatusCode, Option<Value>) {
    let Some(path) = url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == "path")
        .map(|(_, value)| PathBuf::from(value.into_owned()))
    else {
        return (StatusCode::BAD_REQUEST, Some(detail("missing query parameter: path")));
    };

    match tokio::task::spawn_blocking(move || files::read_file(&path)).await {
        Ok(Ok(content)) => (StatusCode::OK, Some(json!({ "content": content }))),
        Ok(Err(e)) => file_error(&e),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, Some(detail(&e.to_string()))),
    }
}

async fn save(body: &[u8]) -> (StatusCode, Option<Value>) {
    let request: SaveRequest = match serde_json::from_slice(body) {
        Ok(request) => request,
        Err(e) => return (StatusCode::BAD_REQUEST, Some(detail(&e.to_string()))),
    };

    let path = PathBuf::from(&request.path);
    let written = tokio::task::spawn_blocking(move || files::write_file(&path, &request.content)).await;

    match written {
        Ok(Ok(())) => (
            StatusCode::OK,
            Some(json!({
                "status": "success",
                "message": format!("Saved to {}", request.path),
            })),
        ),
        Ok(Err(e)) => file_error(&e),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, Some(detail(&e.to_string()))),
    }
}

fn file_error(err: &FileError) -> (StatusCode, Option<Value>) {
    match err {
        FileError::NotFound(_) => (StatusCode::NOT_FOUND, Some(detail("File not found"))),
        FileError::Io { .. } => (StatusCode::INTERNAL_SERVER_ERROR, Some(detail(&err.to_string()))),
    }
}

fn detail(message: &str) -> Value {
    json!({ "detail": message })
}

// =============================================================================
// RESPONSE
// =============================================================================

fn encode_response(status: StatusCode, body: Option<&Value>) -> Vec<u8> {
    let body = body.map(Value::to_string).unwrap_or_default();

    let mut head = format!(
        "HTTP/1.1 {} {}\r\n",
        status.as_u16(),
        status.canonical_reason().unwrap_or("")
    );
    if !body.is_empty() {
        head.push_str("Content-Type: application/json\r\n");
    }
    head.push_str(&format!("Content-Length: {}\r\n", body.len()));
    head.push_str("Access-Control-Allow-Origin: *\r\n");
    head.push_str("Access-Control-Allow-Methods: GET, POST, OPTIONS\r\n");
    head.push_str("Access-Control-Allow-Headers: *\r\n");
    head.push_str("Connection: close\r\n\r\n");

    let mut response = head.into_bytes();
    response.extend_from_slice(body.as_bytes());
    response
}

async fn write_response(stream: &mut TcpStream, status: StatusCode, body: Option<&Value>) -> io::Result<()> {
    stream.write_all(&encode_response(status, body)).await?;
    stream.shutdown().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_routes_file_api_prefixes() {
        assert_eq!(classify(b"GET /api/file/content?path=/x HTTP/1.1"), Some(true));
        assert_eq!(classify(b"POST /api/file/save HTTP/1.1"), Some(true));
        assert_eq!(classify(b"OPTIONS /api/file/save HTTP/1.1"), Some(true));
    }

    #[test]
    fn classify_leaves_other_requests_alone() {
        assert_eq!(classify(b"GET /ws/terminal HTTP/1.1"), Some(false));
        assert_eq!(classify(b"GET /api/other HTTP/1.1"), Some(false));
        assert_eq!(classify(b"\x16\x03\x01"), Some(false));
    }

    #[test]
    fn classify_waits_on_short_prefix() {
        assert_eq!(classify(b"GET /"), None);
        assert_eq!(classify(b"POST /api/fi"), None);
        assert_eq!(classify(b"OPT"), None);
    }

    #[test]
    fn parse_head_reads_content_length() {
        let raw = b"POST /api/file/save HTTP/1.1\r\nHost: x\r\nContent-Length: 12\r\n\r\n{\"a\":1}";
        let head = parse_head(raw).unwrap().unwrap();
        assert_eq!(head.method, "POST");
        assert_eq!(head.target, "/api/file/save");
        assert_eq!(head.content_length, 12);
        assert_eq!(&raw[head.len..], b"{\"a\":1}");
    }

    #[test]
    fn parse_head_partial_and_malformed() {
        assert_eq!(parse_head(b"GET /api/file/content HTTP/1.1\r\nHost:"), Ok(None));
        assert_eq!(
            parse_head(b"POST /api/file/save HTTP/1.1\r\nContent-Length: lots\r\n\r\n"),
            Err(StatusCode::BAD_REQUEST)
        );
    }

    #[test]
    fn encode_response_sets_cors_and_length() {
        let bytes = encode_response(StatusCode::OK, Some(&json!({ "content": "hi" })));
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("Access-Control-Allow-Origin: *\r\n"));
        assert!(text.contains("Content-Length: 16\r\n"));
        assert!(text.ends_with("\r\n\r\n{\"content\":\"hi\"}"));
    }

    #[test]
    fn encode_preflight_has_no_body() {
        let text = String::from_utf8(encode_response(StatusCode::NO_CONTENT, None)).unwrap();
        assert!(text.starts_with("HTTP/1.1 204 No Content\r\n"));
        assert!(text.contains("Content-Length: 0\r\n"));
        assert!(!text.contains("Content-Type"));
    }

    #[tokio::test]
    async fn route_maps_missing_file_to_404() {
        let dir = tempfile::tempdir().unwrap();
        let target = format!(
            "{CONTENT_PATH}?path={}",
            url::form_urlencoded::byte_serialize(dir.path().join("gone.txt").to_string_lossy().as_bytes())
                .collect::<String>()
        );
        let (status, body) = route(FileRequest {
            method: "GET".into(),
            target,
            body: Vec::new(),
        })
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, Some(json!({ "detail": "File not found" })));
    }

    #[tokio::test]
    async fn route_rejects_bad_save_body() {
        let (status, _) = route(FileRequest {
            method: "POST".into(),
            target: SAVE_PATH.into(),
            body: b"{\"path\": 3}".to_vec(),
        })
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn route_requires_path_parameter() {
        let (status, _) = route(FileRequest {
            method: "GET".into(),
            target: CONTENT_PATH.into(),
            body: Vec::new(),
        })
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn route_wrong_method_and_unknown_path() {
        let (status, _) = route(FileRequest {
            method: "DELETE".into(),
            target: SAVE_PATH.into(),
            body: Vec::new(),
        })
        .await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);

        let (status, _) = route(FileRequest {
            method: "GET".into(),
            target: "/api/file/list".into(),
            body: Vec::new(),
        })
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
