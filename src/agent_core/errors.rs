//! Agent core error types.

use thiserror::Error;

use crate::inference::BackendError;
use crate::mcp_client::McpError;
use crate::timeout::TimeoutError;

/// Errors that abort an orchestration run.
///
/// Tool-level failures are deliberately absent: a failing tool call becomes
/// an `is_error` tool result inside the conversation and the run continues.
/// Only failures that leave the run unable to make further progress surface
/// here.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Backend request failed after retries were exhausted.
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    /// Backend request exceeded the per-request deadline.
    #[error("backend timed out: {0}")]
    BackendTimeout(#[from] TimeoutError),

    /// The tool session is gone and could not be restored within this run.
    #[error("tool session lost: {0}")]
    ConnectionLost(McpError),
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_timeout_from_timeout_error() {
        let err: AgentError = TimeoutError {
            label: "converse".to_string(),
            subsystem: "inference",
            timeout_ms: 120_000,
        }
        .into();
        assert!(matches!(err, AgentError::BackendTimeout(_)));
        assert!(err.to_string().contains("120000ms"));
    }

    #[test]
    fn test_connection_lost_display() {
        let err = AgentError::ConnectionLost(McpError::ReconnectExhausted { max_attempts: 3 });
        let text = err.to_string();
        assert!(text.starts_with("tool session lost:"), "got: {text}");
        assert!(text.contains('3'));
    }

    #[test]
    fn test_backend_error_display() {
        let err: AgentError = BackendError::Api {
            status: 500,
            body: "internal".to_string(),
        }
        .into();
        assert!(err.to_string().contains("backend error"));
    }
}
