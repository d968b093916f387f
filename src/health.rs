//! Daemon health snapshot.
//!
//! The schedule loop keeps one [`HealthSnapshot`] per process and rewrites it
//! to an optional status file after every run, so external monitoring can
//! check freshness and failure streaks without scraping logs.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Point-in-time view of the daemon's run history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSnapshot {
    /// When this process started.
    pub started_at: DateTime<Utc>,
    /// When the most recent run finished, if any has.
    pub last_run_at: Option<DateTime<Utc>>,
    /// Whether the most recent run succeeded.
    pub last_run_ok: Option<bool>,
    /// Failed runs since the last success.
    pub consecutive_failures: u32,
    /// Rendered error from the most recent failed run.
    pub last_error: Option<String>,
}

impl HealthSnapshot {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            last_run_at: None,
            last_run_ok: None,
            consecutive_failures: 0,
            last_error: None,
        }
    }

    pub fn record_success(&mut self) {
        self.last_run_at = Some(Utc::now());
        self.last_run_ok = Some(true);
        self.consecutive_failures = 0;
        self.last_error = None;
    }

    pub fn record_failure(&mut self, error: &str) {
        self.last_run_at = Some(Utc::now());
        self.last_run_ok = Some(false);
        self.consecutive_failures += 1;
        self.last_error = Some(error.to_string());
    }

    /// Persist the snapshot as pretty JSON.
    pub fn write_to(&self, path: &Path) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }

    /// Load a previously written snapshot.
    pub fn read_from(path: &Path) -> std::io::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        serde_json::from_str(&raw).map_err(std::io::Error::other)
    }
}

impl Default for HealthSnapshot {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
