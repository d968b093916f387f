//! Shared types for the agent core.
//!
//! The outcome shape returned by an orchestration run, consumed by the
//! scheduler, the CLI, and notification rendering.

use serde::Serialize;

use crate::agent_core::report::StructuredReport;
use crate::inference::TokenUsage;

// ─── Run Outcome ────────────────────────────────────────────────────────────

/// Result of one orchestration run.
///
/// A run always produces `raw_text` (the last assistant text, possibly empty
/// when the model emitted no text blocks); `report` is present only when that
/// text contained a well-formed report object.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunOutcome {
    /// Validated report extracted from the final assistant text.
    pub report: Option<StructuredReport>,
    /// Final assistant text, verbatim.
    pub raw_text: String,
    /// Tool invocations executed across all rounds.
    pub tool_call_count: u32,
    /// Backend exchanges performed.
    pub rounds: u32,
    /// Token totals accumulated across all exchanges.
    pub token_usage: TokenUsage,
}

impl RunOutcome {
    /// Whether the run ended with a validated report.
    pub fn has_report(&self) -> bool {
        self.report.is_some()
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_serializes_camel_case() {
        let outcome = RunOutcome {
            report: None,
            raw_text: "no structure today".to_string(),
            tool_call_count: 3,
            rounds: 2,
            token_usage: TokenUsage::default(),
        };
        let json = serde_json::to_string(&outcome).unwrap();
        assert!(json.contains("rawText"));
        assert!(json.contains("toolCallCount"));
        assert!(json.contains("tokenUsage"));
        assert!(!json.contains("raw_text"));
        assert!(!json.contains("tool_call_count"));
    }

    #[test]
    fn test_has_report() {
        let outcome = RunOutcome {
            report: None,
            raw_text: String::new(),
            tool_call_count: 0,
            rounds: 1,
            token_usage: TokenUsage::default(),
        };
        assert!(!outcome.has_report());
    }
}
