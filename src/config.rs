//! Application configuration loading and validation.
//!
//! Reads `fleetwatch.yaml` (default location under the platform config
//! directory) and maps it onto the client and run tunables. The backend API
//! key is resolved from an environment variable named by the config; it is
//! never stored in the file itself.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::agent_core::RunOptions;
use crate::mcp_client::{ClientOptions, TransportConfig};

// ─── Errors ─────────────────────────────────────────────────────────────────

/// Configuration failures, raised during load or validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {reason}")]
    Unreadable { path: String, reason: String },

    #[error("cannot parse {path}: {reason}")]
    Unparseable { path: String, reason: String },

    #[error("invalid value for '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("environment variable '{name}' is not set")]
    MissingApiKey { name: String },
}

// ─── Sections ───────────────────────────────────────────────────────────────

/// Reasoning backend settings.
#[derive(Debug, Clone, Deserialize)]
pub struct BackendSection {
    /// Model identifier sent with every request.
    pub model: String,
    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Alternate endpoint (gateways, proxies). Default API endpoint when absent.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Cap on output tokens per backend request.
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
}

/// Tool-session client settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientSection {
    pub connect_timeout_ms: u64,
    pub tool_timeout_ms: u64,
    pub max_reconnect_attempts: u32,
    pub reconnect_base_delay_ms: u64,
}

impl Default for ClientSection {
    fn default() -> Self {
        let defaults = ClientOptions::default();
        Self {
            connect_timeout_ms: defaults.connect_timeout_ms,
            tool_timeout_ms: defaults.tool_timeout_ms,
            max_reconnect_attempts: defaults.max_reconnect_attempts,
            reconnect_base_delay_ms: defaults.reconnect_base_delay_ms,
        }
    }
}

/// Orchestration run settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    pub max_tool_rounds: u32,
    pub request_timeout_ms: u64,
    pub include_write_tools: bool,
    pub system_prompt: String,
    pub task_prompt: String,
}

impl Default for AgentSection {
    fn default() -> Self {
        let defaults = RunOptions::default();
        Self {
            max_tool_rounds: defaults.max_tool_rounds,
            request_timeout_ms: defaults.request_timeout_ms,
            include_write_tools: defaults.include_write_tools,
            system_prompt: default_system_prompt(),
            task_prompt: default_task_prompt(),
        }
    }
}

/// Daily schedule settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScheduleSection {
    pub enabled: bool,
    /// Local wall-clock time of the daily run, "HH:MM".
    pub time: String,
}

impl Default for ScheduleSection {
    fn default() -> Self {
        Self {
            enabled: false,
            time: "06:00".to_string(),
        }
    }
}

/// Webhook notification settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NotifySection {
    pub webhook_url: Option<String>,
}

/// Health snapshot settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HealthSection {
    /// File the health snapshot is written to after every run.
    pub status_path: Option<PathBuf>,
}

/// Top-level configuration (mirrors `fleetwatch.yaml`).
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub transport: TransportConfig,
    pub backend: BackendSection,
    #[serde(default)]
    pub client: ClientSection,
    #[serde(default)]
    pub agent: AgentSection,
    #[serde(default)]
    pub schedule: ScheduleSection,
    #[serde(default)]
    pub notify: NotifySection,
    #[serde(default)]
    pub health: HealthSection,
}

// ─── Defaults ───────────────────────────────────────────────────────────────

fn default_api_key_env() -> String {
    "ANTHROPIC_API_KEY".to_string()
}

fn default_max_output_tokens() -> u32 {
    4096
}

fn default_system_prompt() -> String {
    "You are a fleet operations analyst. Use the available tools to inspect \
     the device fleet, then finish with a single JSON object containing the \
     fields summary, overallStatus (healthy | warning | critical), findings, \
     and metrics, wrapped in a markdown code fence."
        .to_string()
}

fn default_task_prompt() -> String {
    "Generate the scheduled fleet health report. Check device inventory, \
     recent alerts, and compliance status before writing the report."
        .to_string()
}

// ─── Loading ────────────────────────────────────────────────────────────────

/// Default config file location: `<config_dir>/fleetwatch/fleetwatch.yaml`.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("fleetwatch")
        .join("fleetwatch.yaml")
}

/// Load, parse, and validate a configuration file.
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Unreadable {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;

    let config: AppConfig = serde_yaml::from_str(&raw).map_err(|e| ConfigError::Unparseable {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;

    config.validate()?;
    Ok(config)
}

impl AppConfig {
    /// Check cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match &self.transport {
            TransportConfig::Stdio { command, .. } if command.is_empty() => {
                return Err(ConfigError::Invalid {
                    field: "transport.command",
                    reason: "must not be empty".to_string(),
                });
            }
            TransportConfig::Tcp { addr } if addr.is_empty() => {
                return Err(ConfigError::Invalid {
                    field: "transport.addr",
                    reason: "must not be empty".to_string(),
                });
            }
            _ => {}
        }

        if self.backend.model.is_empty() {
            return Err(ConfigError::Invalid {
                field: "backend.model",
                reason: "must not be empty".to_string(),
            });
        }
        if self.client.max_reconnect_attempts == 0 {
            return Err(ConfigError::Invalid {
                field: "client.max_reconnect_attempts",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.agent.max_tool_rounds == 0 {
            return Err(ConfigError::Invalid {
                field: "agent.max_tool_rounds",
                reason: "must be at least 1".to_string(),
            });
        }
        if chrono::NaiveTime::parse_from_str(&self.schedule.time, "%H:%M").is_err() {
            return Err(ConfigError::Invalid {
                field: "schedule.time",
                reason: format!("'{}' is not a valid HH:MM time", self.schedule.time),
            });
        }
        Ok(())
    }

    /// Resolve the backend API key from the configured environment variable.
    pub fn resolve_api_key(&self) -> Result<String, ConfigError> {
        std::env::var(&self.backend.api_key_env).map_err(|_| ConfigError::MissingApiKey {
            name: self.backend.api_key_env.clone(),
        })
    }

    /// Tool-session tunables in the client's own shape.
    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            connect_timeout_ms: self.client.connect_timeout_ms,
            tool_timeout_ms: self.client.tool_timeout_ms,
            max_reconnect_attempts: self.client.max_reconnect_attempts,
            reconnect_base_delay_ms: self.client.reconnect_base_delay_ms,
        }
    }

    /// Run tunables in the orchestrator's own shape.
    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            max_tool_rounds: self.agent.max_tool_rounds,
            request_timeout_ms: self.agent.request_timeout_ms,
            max_output_tokens: self.backend.max_output_tokens,
            include_write_tools: self.agent.include_write_tools,
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
