//! Deadline wrapper for bounded async operations.
//!
//! Every network-facing await point in the client and the agent loop runs
//! under a deadline. This module is the single place that race is expressed,
//! so expiry always surfaces with the same context: which subsystem, which
//! operation, and what the configured bound was.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

/// A bounded operation exceeded its deadline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{subsystem}: '{label}' timed out after {timeout_ms}ms")]
pub struct TimeoutError {
    /// Operation label (e.g. "connect", "tools/call searchDevices").
    pub label: String,
    /// Subsystem the operation belongs to ("mcp", "inference").
    pub subsystem: &'static str,
    /// The configured bound in milliseconds.
    pub timeout_ms: u64,
}

/// Race `operation` against a deadline of `timeout_ms` milliseconds.
///
/// If the operation completes first, its output is returned as-is: a
/// failing operation propagates its own error unchanged inside `Ok`. On
/// expiry the operation future is dropped (cancelling any in-flight await,
/// e.g. an HTTP request or a pipe read) and a [`TimeoutError`] carrying the
/// label, subsystem, and bound is returned. The internal timer is consumed
/// by the race in either outcome.
pub async fn bounded<F>(
    timeout_ms: u64,
    subsystem: &'static str,
    label: &str,
    operation: F,
) -> Result<F::Output, TimeoutError>
where
    F: Future,
{
    match tokio::time::timeout(Duration::from_millis(timeout_ms), operation).await {
        Ok(output) => Ok(output),
        Err(_) => Err(TimeoutError {
            label: label.to_string(),
            subsystem,
            timeout_ms,
        }),
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_completes_before_deadline() {
        let result = bounded(1_000, "test", "fast-op", async { 42 }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_inner_error_passes_through_unchanged() {
        let result: Result<Result<(), String>, TimeoutError> =
            bounded(1_000, "test", "failing-op", async {
                Err("inner failure".to_string())
            })
            .await;
        // The operation's own error is not converted to a timeout
        let inner = result.unwrap();
        assert_eq!(inner.unwrap_err(), "inner failure");
    }

    #[tokio::test]
    async fn test_expiry_carries_label_subsystem_and_bound() {
        let result = bounded(10, "mcp", "slow-op", async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            1
        })
        .await;

        let err = result.unwrap_err();
        assert_eq!(err.label, "slow-op");
        assert_eq!(err.subsystem, "mcp");
        assert_eq!(err.timeout_ms, 10);
    }

    #[tokio::test]
    async fn test_expiry_on_never_completing_operation() {
        let result = bounded(10, "inference", "pending", std::future::pending::<u8>()).await;
        assert!(result.is_err());
    }

    #[test]
    fn test_display_includes_context() {
        let err = TimeoutError {
            label: "initialize".to_string(),
            subsystem: "mcp",
            timeout_ms: 10_000,
        };
        let msg = err.to_string();
        assert!(msg.contains("initialize"));
        assert!(msg.contains("mcp"));
        assert!(msg.contains("10000ms"));
    }
}
