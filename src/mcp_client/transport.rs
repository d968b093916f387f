//! JSON-RPC transports for the tool server connection.
//!
//! Line-delimited JSON protocol (one JSON object per line) over one of two
//! byte streams:
//! - `StdioTransport`: a spawned subprocess, requests on stdin, responses on
//!   stdout, stderr drained to the log
//! - `TcpTransport`: a `host:port` socket
//!
//! Both are built through the [`TransportFactory`] seam so the client can
//! rebuild the transport on every connect and reconnect, and so tests can
//! inject scripted transports.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;

use super::errors::McpError;
use super::types::{JsonRpcRequest, JsonRpcResponse, TransportConfig};

// ─── Request ID Generator ────────────────────────────────────────────────────

/// Global monotonic request ID counter.
static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Generate a unique request ID.
pub fn next_request_id() -> u64 {
    NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed)
}

// ─── Transport Seam ──────────────────────────────────────────────────────────

/// A live JSON-RPC session with the tool server.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a request and wait for the matching response.
    async fn request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<JsonRpcResponse, McpError>;

    /// Send a notification (no response expected).
    async fn notify(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<(), McpError>;

    /// Tear down the underlying stream or process.
    async fn close(&self) -> Result<(), McpError>;
}

/// Builds fresh [`Transport`] sessions on demand.
#[async_trait]
pub trait TransportFactory: Send + Sync {
    /// Human-readable target for log lines.
    fn describe(&self) -> String;

    /// Open a new session.
    async fn connect(&self) -> Result<Box<dyn Transport>, McpError>;
}

#[async_trait]
impl TransportFactory for TransportConfig {
    fn describe(&self) -> String {
        match self {
            TransportConfig::Stdio { command, .. } => format!("stdio: {command}"),
            TransportConfig::Tcp { addr } => format!("tcp: {addr}"),
        }
    }

    async fn connect(&self) -> Result<Box<dyn Transport>, McpError> {
        match self {
            TransportConfig::Stdio {
                command,
                args,
                env,
                cwd,
            } => {
                let transport = StdioTransport::spawn(command, args, env, cwd.as_deref())?;
                Ok(Box::new(transport))
            }
            TransportConfig::Tcp { addr } => {
                let transport = TcpTransport::dial(addr).await?;
                Ok(Box::new(transport))
            }
        }
    }
}

// ─── Stdio Transport ─────────────────────────────────────────────────────────

/// Bi-directional JSON-RPC transport over a child process's stdio.
pub struct StdioTransport {
    child: Mutex<Child>,
    writer: Mutex<ChildStdin>,
    reader: Mutex<BufReader<ChildStdout>>,
}

impl StdioTransport {
    /// Spawn the server process and wire up its stdio.
    ///
    /// The child is spawned with `kill_on_drop`, so a transport discarded
    /// mid-handshake (e.g. by a connect-timeout cancellation) does not leave
    /// an orphan process behind.
    pub fn spawn(
        command: &str,
        args: &[String],
        env: &std::collections::HashMap<String, String>,
        cwd: Option<&str>,
    ) -> Result<Self, McpError> {
        let mut cmd = Command::new(command);
        cmd.args(args);

        for (key, value) in env {
            cmd.env(key, value);
        }

        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }

        // Wire stdio for JSON-RPC; stderr is drained to the log
        cmd.stdin(std::process::Stdio::piped());
        cmd.stdout(std::process::Stdio::piped());
        cmd.stderr(std::process::Stdio::piped());
        cmd.kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| McpError::Connection {
            reason: format!("failed to spawn '{command}': {e}"),
        })?;

        let stdin = child.stdin.take().ok_or(McpError::Connection {
            reason: "failed to capture stdin".into(),
        })?;

        let stdout = child.stdout.take().ok_or(McpError::Connection {
            reason: "failed to capture stdout".into(),
        })?;

        if let Some(stderr) = child.stderr.take() {
            spawn_stderr_logger(command, stderr);
        }

        Ok(Self {
            child: Mutex::new(child),
            writer: Mutex::new(stdin),
            reader: Mutex::new(BufReader::new(stdout)),
        })
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<JsonRpcResponse, McpError> {
        let id = next_request_id();
        let frame = encode_frame(&JsonRpcRequest::new(id, method, params))?;

        {
            let mut writer = self.writer.lock().await;
            write_frame(&mut *writer, &frame, "request to stdin").await?;
        }

        let mut reader = self.reader.lock().await;
        read_matching_response(&mut *reader, id).await
    }

    async fn notify(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<(), McpError> {
        let frame = encode_notification(method, params)?;
        let mut writer = self.writer.lock().await;
        write_frame(&mut *writer, &frame, "notification to stdin").await
    }

    async fn close(&self) -> Result<(), McpError> {
        let mut child = self.child.lock().await;
        child.kill().await.map_err(|e| McpError::Transport {
            reason: format!("failed to kill server process: {e}"),
        })
    }
}

/// Drain a child's stderr into the log so server-side diagnostics are not
/// lost when a handshake or call fails. The task ends on stderr EOF.
fn spawn_stderr_logger(command: &str, stderr: ChildStderr) {
    let server = command.to_string();
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            tracing::debug!(target: "fleetwatch::server", server = %server, %line, "server stderr");
        }
    });
}

// ─── TCP Transport ───────────────────────────────────────────────────────────

/// Bi-directional JSON-RPC transport over a TCP connection.
#[derive(Debug)]
pub struct TcpTransport {
    writer: Mutex<OwnedWriteHalf>,
    reader: Mutex<BufReader<OwnedReadHalf>>,
}

impl TcpTransport {
    /// Connect to `addr` (`host:port`).
    pub async fn dial(addr: &str) -> Result<Self, McpError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| McpError::Connection {
                reason: format!("failed to connect to {addr}: {e}"),
            })?;

        // Request/response latency matters more than throughput here
        let _ = stream.set_nodelay(true);

        let (read_half, write_half) = stream.into_split();
        Ok(Self {
            writer: Mutex::new(write_half),
            reader: Mutex::new(BufReader::new(read_half)),
        })
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<JsonRpcResponse, McpError> {
        let id = next_request_id();
        let frame = encode_frame(&JsonRpcRequest::new(id, method, params))?;

        {
            let mut writer = self.writer.lock().await;
            write_frame(&mut *writer, &frame, "request to socket").await?;
        }

        let mut reader = self.reader.lock().await;
        read_matching_response(&mut *reader, id).await
    }

    async fn notify(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<(), McpError> {
        let frame = encode_notification(method, params)?;
        let mut writer = self.writer.lock().await;
        write_frame(&mut *writer, &frame, "notification to socket").await
    }

    async fn close(&self) -> Result<(), McpError> {
        let mut writer = self.writer.lock().await;
        writer.shutdown().await.map_err(|e| McpError::Transport {
            reason: format!("failed to shut down socket: {e}"),
        })
    }
}

// ─── Framing ─────────────────────────────────────────────────────────────────

/// Serialize a request to one newline-terminated frame.
fn encode_frame(request: &JsonRpcRequest) -> Result<Vec<u8>, McpError> {
    let mut json = serde_json::to_string(request).map_err(|e| McpError::Protocol {
        reason: format!("failed to serialize request: {e}"),
    })?;
    json.push('\n');
    Ok(json.into_bytes())
}

/// Serialize a notification (no id) to one newline-terminated frame.
fn encode_notification(
    method: &str,
    params: Option<serde_json::Value>,
) -> Result<Vec<u8>, McpError> {
    let notification = serde_json::json!({
        "jsonrpc": "2.0",
        "method": method,
        "params": params,
    });

    let mut json = serde_json::to_string(&notification).map_err(|e| McpError::Protocol {
        reason: format!("failed to serialize notification: {e}"),
    })?;
    json.push('\n');
    Ok(json.into_bytes())
}

/// Write one frame and flush.
async fn write_frame<W>(writer: &mut W, frame: &[u8], what: &str) -> Result<(), McpError>
where
    W: AsyncWrite + Unpin,
{
    writer
        .write_all(frame)
        .await
        .map_err(|e| McpError::Transport {
            reason: format!("failed to write {what}: {e}"),
        })?;
    writer.flush().await.map_err(|e| McpError::Transport {
        reason: format!("failed to flush {what}: {e}"),
    })
}

/// Read response lines until one parses with a matching `id`.
///
/// Non-JSON lines (server log noise on the stream) and responses for other
/// ids are skipped. EOF before a match is a transport error whose reason
/// carries the "closed" signature.
async fn read_matching_response<R>(reader: &mut R, id: u64) -> Result<JsonRpcResponse, McpError>
where
    R: AsyncBufRead + Unpin,
{
    let mut line_buf = String::new();

    loop {
        line_buf.clear();
        let bytes_read = reader
            .read_line(&mut line_buf)
            .await
            .map_err(|e| McpError::Transport {
                reason: format!("failed to read response: {e}"),
            })?;

        if bytes_read == 0 {
            return Err(McpError::Transport {
                reason: "session closed before response (peer went away)".into(),
            });
        }

        let trimmed = line_buf.trim();
        if trimmed.is_empty() {
            continue;
        }

        match serde_json::from_str::<JsonRpcResponse>(trimmed) {
            Ok(resp) if resp.id == id => return Ok(resp),
            // Response for a different request ID; should not happen with
            // serialized calls, skip it rather than fail the session.
            Ok(_) => continue,
            // Not a JSON-RPC response, keep reading.
            Err(_) => continue,
        }
    }
}

// ─── Response Helpers ────────────────────────────────────────────────────────

/// Extract the result from a JSON-RPC response, converting errors to `McpError`.
pub fn extract_result(response: JsonRpcResponse) -> Result<serde_json::Value, McpError> {
    if let Some(err) = response.error {
        return Err(McpError::Server {
            code: err.code,
            message: err.message,
            data: err.data,
        });
    }

    response.result.ok_or(McpError::Server {
        code: super::types::error_codes::INTERNAL_ERROR,
        message: "response missing both result and error".into(),
        data: None,
    })
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_ids_strictly_increase() {
        let ids: Vec<u64> = (0..4).map(|_| next_request_id()).collect();
        assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn test_extract_result_success() {
        let resp = JsonRpcResponse {
            jsonrpc: "2.0".into(),
            id: 3,
            result: Some(serde_json::json!({"tools": [{"name": "getFleetOverview"}]})),
            error: None,
        };
        let result = extract_result(resp).unwrap();
        assert_eq!(result["tools"][0]["name"], "getFleetOverview");
    }

    #[test]
    fn test_extract_result_maps_error_object() {
        let resp = JsonRpcResponse {
            jsonrpc: "2.0".into(),
            id: 3,
            result: None,
            error: Some(super::super::types::JsonRpcError {
                code: -32000,
                message: "device index rebuilding".into(),
                data: Some(serde_json::json!({"retryAfterMs": 500})),
            }),
        };
        let err = extract_result(resp).unwrap_err();
        match err {
            McpError::Server {
                code,
                message,
                data,
            } => {
                assert_eq!(code, -32000);
                assert_eq!(message, "device index rebuilding");
                assert!(data.is_some());
            }
            other => panic!("expected server error, got {other:?}"),
        }
    }

    #[test]
    fn test_extract_result_missing_both_is_server_error() {
        let resp = JsonRpcResponse {
            jsonrpc: "2.0".into(),
            id: 5,
            result: None,
            error: None,
        };
        let err = extract_result(resp).unwrap_err();
        assert!(matches!(err, McpError::Server { .. }));
        assert!(err.to_string().contains("missing both result and error"));
    }

    #[tokio::test]
    async fn test_read_matching_response_skips_noise_and_other_ids() {
        let input = concat!(
            "plain log line from the server\n",
            "\n",
            "{\"jsonrpc\":\"2.0\",\"id\":999,\"result\":{\"other\":true}}\n",
            "{\"jsonrpc\":\"2.0\",\"id\":7,\"result\":{\"mine\":true}}\n",
        );
        let mut reader = BufReader::new(input.as_bytes());
        let resp = read_matching_response(&mut reader, 7).await.unwrap();
        assert_eq!(resp.id, 7);
        assert_eq!(resp.result.unwrap()["mine"], true);
    }

    #[tokio::test]
    async fn test_read_matching_response_eof_is_transport_error() {
        let mut reader = BufReader::new(&b"not json\n"[..]);
        let err = read_matching_response(&mut reader, 1).await.unwrap_err();
        assert!(err.is_transport_error(), "EOF should classify as transport: {err}");
    }

    #[tokio::test]
    async fn test_tcp_transport_request_roundtrip() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        // One-shot echo server: read a request line, answer with its id
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read_half, mut write_half) = stream.into_split();
            let mut line = String::new();
            let mut reader = BufReader::new(read_half);
            reader.read_line(&mut line).await.unwrap();
            let req: serde_json::Value = serde_json::from_str(line.trim()).unwrap();
            let id = req["id"].as_u64().unwrap();
            let response =
                format!("{{\"jsonrpc\":\"2.0\",\"id\":{id},\"result\":{{\"pong\":true}}}}\n");
            write_half.write_all(response.as_bytes()).await.unwrap();
        });

        let config = TransportConfig::Tcp { addr };
        let transport = config.connect().await.unwrap();
        let resp = transport.request("ping", None).await.unwrap();
        assert_eq!(resp.result.unwrap()["pong"], true);
        transport.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_tcp_dial_refused_is_connection_error() {
        // Bind then drop to get a port with nothing listening
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let err = TcpTransport::dial(&addr).await.unwrap_err();
        assert!(matches!(err, McpError::Connection { .. }));
    }
}
