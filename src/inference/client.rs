//! Anthropic Messages API client.
//!
//! - `ReasoningBackend` is the seam the report loop drives; orchestration code
//!   never touches HTTP directly
//! - `AnthropicClient` implements the trait against `POST /v1/messages`
//! - rate-limit and overload statuses surface as `BackendError::RateLimited`
//!   so callers can back off and retry

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use std::time::Duration;

use super::errors::BackendError;
use super::types::{BackendResponse, ChatMessage, MessagesRequest, MessagesResponse, ToolSpec};

// ─── Constants ───────────────────────────────────────────────────────────────

/// Default API endpoint; override with [`AnthropicClient::with_base_url`].
const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";

/// Messages API version header sent with every request.
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// TCP connect timeout for the underlying HTTP client (seconds).
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Keepalive so connections survive the idle gaps between scheduled runs (seconds).
const TCP_KEEPALIVE_SECS: u64 = 30;

// ─── Backend Trait ───────────────────────────────────────────────────────────

/// A conversational reasoning backend.
///
/// One call is one request/response exchange; conversation state stays with
/// the caller. Cancellation is cooperative: dropping the returned future
/// abandons the request.
#[async_trait]
pub trait ReasoningBackend: Send + Sync {
    async fn converse(
        &self,
        system: &str,
        messages: &[ChatMessage],
        tools: &[ToolSpec],
        max_tokens: u32,
    ) -> Result<BackendResponse, BackendError>;
}

// ─── Anthropic Client ────────────────────────────────────────────────────────

/// HTTP client for the Anthropic Messages API.
pub struct AnthropicClient {
    http: HttpClient,
    base_url: String,
    api_key: String,
    model: String,
}

impl AnthropicClient {
    /// Build a client for the given key and model identifier.
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self, BackendError> {
        let http = HttpClient::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .tcp_keepalive(Duration::from_secs(TCP_KEEPALIVE_SECS))
            .build()?;
        Ok(Self {
            http,
            base_url: ANTHROPIC_BASE_URL.to_string(),
            api_key: api_key.into(),
            model: model.into(),
        })
    }

    /// Point the client at a different endpoint (gateways, proxies, tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Model identifier sent with every request.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Map a non-success HTTP status to the matching error variant.
    fn classify_failure(status: u16, body: String) -> BackendError {
        match status {
            429 | 529 => BackendError::RateLimited { status, body },
            _ => BackendError::Api { status, body },
        }
    }
}

#[async_trait]
impl ReasoningBackend for AnthropicClient {
    async fn converse(
        &self,
        system: &str,
        messages: &[ChatMessage],
        tools: &[ToolSpec],
        max_tokens: u32,
    ) -> Result<BackendResponse, BackendError> {
        let request = MessagesRequest {
            model: &self.model,
            max_tokens,
            system,
            messages,
            tools: (!tools.is_empty()).then_some(tools),
        };

        tracing::debug!(
            model = %self.model,
            messages = messages.len(),
            tools = tools.len(),
            max_tokens,
            "sending messages request"
        );

        let response = self
            .http
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(Self::classify_failure(status.as_u16(), body));
        }

        let parsed: MessagesResponse =
            serde_json::from_str(&body).map_err(|err| BackendError::Malformed {
                reason: format!("invalid messages response: {err}"),
            })?;

        tracing::debug!(
            stop_reason = ?parsed.stop_reason,
            blocks = parsed.content.len(),
            input_tokens = parsed.usage.input_tokens,
            output_tokens = parsed.usage.output_tokens,
            "messages response received"
        );

        Ok(BackendResponse {
            content: parsed.content,
            stop_reason: parsed.stop_reason,
            usage: parsed.usage,
        })
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
