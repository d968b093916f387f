//! MCP client error types.

use thiserror::Error;

use crate::timeout::TimeoutError;

/// Message signatures that identify a dropped transport.
///
/// Matched case-insensitively against `Transport` reasons. The stdio and TCP
/// transports phrase their I/O failures so the underlying cause keeps one of
/// these words (see `transport.rs`).
const TRANSPORT_ERROR_SIGNATURES: [&str; 6] = [
    "connection reset",
    "connection refused",
    "broken pipe",
    "closed",
    "disconnected",
    "reset by peer",
];

/// Failures raised by the tool-session client.
#[derive(Debug, Error)]
pub enum McpError {
    /// Establishing the session failed (spawn, dial, or handshake).
    #[error("connection failed: {reason}")]
    Connection {
        reason: String,
    },

    /// I/O failure on an established session.
    #[error("transport error: {reason}")]
    Transport {
        reason: String,
    },

    /// A bounded operation exceeded its deadline.
    #[error("{subsystem}: '{label}' timed out after {timeout_ms}ms")]
    Timeout {
        label: String,
        subsystem: &'static str,
        timeout_ms: u64,
    },

    /// Tool not present in the discovered catalog.
    #[error("unknown tool: '{name}'")]
    UnknownTool {
        name: String,
    },

    /// Operation attempted while disconnected.
    #[error("not connected (attempted {operation})")]
    NotConnected {
        operation: &'static str,
    },

    /// Reconnect attempts exceeded the configured maximum.
    #[error("max reconnect attempts ({max_attempts}) exceeded")]
    ReconnectExhausted {
        max_attempts: u32,
    },

    /// Server returned a JSON-RPC error response.
    #[error("server error [{code}]: {message}")]
    Server {
        code: i32,
        message: String,
        data: Option<serde_json::Value>,
    },

    /// Malformed protocol payload (unparseable frame or result).
    #[error("protocol error: {reason}")]
    Protocol {
        reason: String,
    },
}

impl McpError {
    /// Whether this error looks like a dropped transport.
    ///
    /// Only these errors trigger the client's reconnect-and-retry-once path
    /// in `call_tool` / `read_resource`. Server-side errors, timeouts, and
    /// protocol errors propagate without touching the connection.
    pub fn is_transport_error(&self) -> bool {
        match self {
            McpError::Transport { reason } => {
                let reason = reason.to_lowercase();
                TRANSPORT_ERROR_SIGNATURES
                    .iter()
                    .any(|sig| reason.contains(sig))
            }
            _ => false,
        }
    }
}

impl From<TimeoutError> for McpError {
    fn from(e: TimeoutError) -> Self {
        McpError::Timeout {
            label: e.label,
            subsystem: e.subsystem,
            timeout_ms: e.timeout_ms,
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
