//! Inference backend — Anthropic Messages API client for report generation.
//!
//! This module handles all communication with the reasoning backend:
//! - Multi-turn conversations with tool definitions attached
//! - Content-block requests and responses (text, tool use, tool results)
//! - Rate-limit classification for caller-side backoff
//!
//! The orchestrator depends on the `ReasoningBackend` trait rather than the
//! concrete client, so tests can script exchanges without a network.

pub mod client;
pub mod errors;
pub mod types;

// Re-exports for convenience
pub use client::{AnthropicClient, ReasoningBackend};
pub use errors::{is_rate_limit_message, BackendError};
pub use types::{
    BackendResponse, ChatMessage, ContentBlock, Role, StopReason, TokenUsage, ToolSpec,
};
