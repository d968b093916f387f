//! Webhook notifications.
//!
//! Scheduled runs post a short text summary to an optional webhook (Slack
//! style `{"text": ...}` payload). Delivery is best effort: failures are
//! logged and never propagated, so a dead webhook cannot take down the
//! schedule loop.

use std::time::Duration;

use reqwest::Client as HttpClient;
use thiserror::Error;

use crate::agent_core::RunOutcome;

/// Construction failure for the notifier. Delivery failures are logged, not
/// typed; nothing downstream can act on them.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("http client construction failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Outbound request timeout. Webhooks answer fast or not at all.
const SEND_TIMEOUT_SECS: u64 = 10;

/// Longest raw-text excerpt included when a run produced no structured report.
const PREVIEW_CHARS: usize = 200;

// ─── Message Rendering ──────────────────────────────────────────────────────

/// One-line summary of a completed run.
pub fn render_outcome(outcome: &RunOutcome) -> String {
    match &outcome.report {
        Some(report) => format!(
            "Fleet report [{}]: {} ({} rounds, {} tool calls, {} findings)",
            report.overall_status.as_str(),
            report.summary,
            outcome.rounds,
            outcome.tool_call_count,
            report.findings.len(),
        ),
        None => format!(
            "Fleet report (unstructured): {}",
            preview(&outcome.raw_text)
        ),
    }
}

/// One-line summary of a failed run, including the error chain.
pub fn render_failure(err: &(dyn std::error::Error + 'static)) -> String {
    let mut message = format!("Fleet report failed: {err}");
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(&format!(": {cause}"));
        source = cause.source();
    }
    message
}

fn preview(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= PREVIEW_CHARS {
        return trimmed.to_string();
    }
    let cut: String = trimmed.chars().take(PREVIEW_CHARS).collect();
    format!("{cut}...")
}

// ─── Notifier ───────────────────────────────────────────────────────────────

/// Posts run summaries to the configured webhook, if any.
pub struct Notifier {
    http: HttpClient,
    webhook_url: Option<String>,
}

impl Notifier {
    pub fn new(webhook_url: Option<String>) -> Result<Self, NotifyError> {
        let http = HttpClient::builder()
            .timeout(Duration::from_secs(SEND_TIMEOUT_SECS))
            .build()?;
        Ok(Self { http, webhook_url })
    }

    /// Deliver `text` to the webhook. No-op without a configured URL; any
    /// delivery failure is logged and swallowed.
    pub async fn send(&self, text: &str) {
        let Some(url) = &self.webhook_url else {
            return;
        };
        let payload = serde_json::json!({ "text": text });
        match self.http.post(url).json(&payload).send().await {
            Ok(response) if response.status().is_success() => {
                tracing::debug!("notify: webhook delivered");
            }
            Ok(response) => {
                tracing::warn!(status = %response.status(), "notify: webhook rejected message");
            }
            Err(err) => {
                tracing::warn!(error = %err, "notify: webhook delivery failed");
            }
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent_core::{OverallStatus, StructuredReport};
    use crate::inference::TokenUsage;

    fn outcome_with_report() -> RunOutcome {
        RunOutcome {
            report: Some(StructuredReport {
                summary: "3 devices offline over 24h".to_string(),
                overall_status: OverallStatus::Warning,
                findings: vec![serde_json::json!({"deviceId": "mbp-204"})],
                metrics: serde_json::Map::new(),
            }),
            raw_text: "ignored".to_string(),
            tool_call_count: 4,
            rounds: 3,
            token_usage: TokenUsage::default(),
        }
    }

    #[test]
    fn test_render_outcome_with_report() {
        let text = render_outcome(&outcome_with_report());
        assert_eq!(
            text,
            "Fleet report [warning]: 3 devices offline over 24h (3 rounds, 4 tool calls, 1 findings)"
        );
    }

    #[test]
    fn test_render_outcome_without_report_previews_raw_text() {
        let outcome = RunOutcome {
            report: None,
            raw_text: "  The fleet looks healthy overall.  ".to_string(),
            tool_call_count: 1,
            rounds: 1,
            token_usage: TokenUsage::default(),
        };
        let text = render_outcome(&outcome);
        assert_eq!(
            text,
            "Fleet report (unstructured): The fleet looks healthy overall."
        );
    }

    #[test]
    fn test_render_outcome_truncates_long_raw_text() {
        let outcome = RunOutcome {
            report: None,
            raw_text: "x".repeat(500),
            tool_call_count: 0,
            rounds: 1,
            token_usage: TokenUsage::default(),
        };
        let text = render_outcome(&outcome);
        assert!(text.ends_with("..."));
        assert!(text.len() < 500);
    }

    #[test]
    fn test_render_failure_includes_error_chain() {
        let io = std::io::Error::other("connection refused");
        let err = crate::mcp_client::McpError::Connection {
            reason: io.to_string(),
        };
        let text = render_failure(&err);
        assert!(text.starts_with("Fleet report failed: "));
        assert!(text.contains("connection refused"));
    }
}
