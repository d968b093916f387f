//! Structured report extraction.
//!
//! The model is asked to end a run with a single JSON report object, usually
//! wrapped in a markdown fence. Extraction is best effort: strip fence lines,
//! take the outermost brace span, parse, and validate the required fields.
//! Anything that fails along the way means "no report" — the raw text stays
//! authoritative and the run still counts as completed.

use serde::{Deserialize, Serialize};

// ─── Report Types ───────────────────────────────────────────────────────────

/// Fleet state as judged by the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverallStatus {
    Healthy,
    Warning,
    Critical,
}

impl OverallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OverallStatus::Healthy => "healthy",
            OverallStatus::Warning => "warning",
            OverallStatus::Critical => "critical",
        }
    }
}

/// Validated report extracted from the final assistant text.
///
/// `summary`, `overallStatus`, and `findings` are required; a candidate object
/// missing any of them is rejected. Finding entries and metric values are
/// model-produced and carried as opaque JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuredReport {
    pub summary: String,
    pub overall_status: OverallStatus,
    pub findings: Vec<serde_json::Value>,
    #[serde(default)]
    pub metrics: serde_json::Map<String, serde_json::Value>,
}

// ─── Extraction ─────────────────────────────────────────────────────────────

/// Pull a report out of assistant text, if one is present.
pub fn extract_report(text: &str) -> Option<StructuredReport> {
    let stripped = strip_fence_lines(text);
    let span = brace_span(&stripped)?;
    serde_json::from_str(span).ok()
}

/// Drop markdown fence lines (``` or ```json) so they cannot interfere with
/// the brace scan.
fn strip_fence_lines(text: &str) -> String {
    text.lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// The span from the first `{` to the last `}`, inclusive.
fn brace_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fenced_report_round_trips() {
        let text = "Here is the fleet report:\n```json\n{\"summary\":\"All 42 devices reporting\",\"overallStatus\":\"healthy\",\"findings\":[]}\n```\nLet me know if you need details.";
        let report = extract_report(text).unwrap();
        assert_eq!(report.summary, "All 42 devices reporting");
        assert_eq!(report.overall_status, OverallStatus::Healthy);
        assert!(report.findings.is_empty());
        assert!(report.metrics.is_empty(), "metrics defaults to empty map");
    }

    #[test]
    fn test_text_without_braces_yields_none() {
        assert!(extract_report("The fleet looks fine, nothing to report.").is_none());
    }

    #[test]
    fn test_missing_required_field_yields_none() {
        let text = r#"{"summary":"ok","findings":[]}"#;
        assert!(extract_report(text).is_none());
    }

    #[test]
    fn test_unknown_status_yields_none() {
        let text = r#"{"summary":"ok","overallStatus":"fine","findings":[]}"#;
        assert!(extract_report(text).is_none());
    }

    #[test]
    fn test_nested_findings_and_metrics_survive() {
        let text = r#"{
            "summary": "3 devices offline",
            "overallStatus": "warning",
            "findings": [
                {"deviceId": "mbp-204", "severity": "warning", "detail": "offline 26h"},
                {"deviceId": "mbp-219", "severity": "warning", "detail": "offline 31h"}
            ],
            "metrics": {"totalDevices": 42, "offlineDevices": 3}
        }"#;
        let report = extract_report(text).unwrap();
        assert_eq!(report.overall_status, OverallStatus::Warning);
        assert_eq!(report.findings.len(), 2);
        assert_eq!(report.findings[0]["deviceId"], "mbp-204");
        assert_eq!(report.metrics["totalDevices"], 42);
    }

    #[test]
    fn test_extra_top_level_fields_tolerated() {
        let text = r#"{"summary":"ok","overallStatus":"healthy","findings":[],"generatedAt":"2026-02-11T06:00:00Z"}"#;
        assert!(extract_report(text).is_some());
    }

    #[test]
    fn test_malformed_json_yields_none() {
        let text = "{\"summary\": \"truncated";
        assert!(extract_report(text).is_none());
    }

    #[test]
    fn test_report_serializes_camel_case() {
        let report = StructuredReport {
            summary: "ok".to_string(),
            overall_status: OverallStatus::Critical,
            findings: vec![],
            metrics: serde_json::Map::new(),
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["overallStatus"], "critical");
    }
}
