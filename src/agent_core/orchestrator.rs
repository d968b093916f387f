//! Report orchestration loop.
//!
//! One run drives the reasoning backend against the device-management tools
//! until the model answers without requesting any, or the round budget runs
//! out:
//! 1. **Converse** — send the conversation plus the filtered tool catalog,
//!    bounded by a request timeout; rate-limited rounds retry on a backoff
//! 2. **Execute** — requested tool calls run serially with a throttle delay;
//!    failures become error tool-results unless the session itself is lost
//! 3. **Extract** — the final assistant text goes through best-effort report
//!    extraction; unparseable output is still a completed run

use std::time::Duration;

use serde_json::Value;
use uuid::Uuid;

use crate::agent_core::catalog::filter_catalog;
use crate::agent_core::errors::AgentError;
use crate::agent_core::report::extract_report;
use crate::agent_core::types::RunOutcome;
use crate::inference::errors::is_rate_limit_message;
use crate::inference::types::{BackendResponse, ChatMessage, ContentBlock, TokenUsage, ToolSpec};
use crate::inference::ReasoningBackend;
use crate::mcp_client::{McpClient, McpError};
use crate::timeout;

// ─── Constants ──────────────────────────────────────────────────────────────

/// Attempts per round before a rate-limited run is abandoned.
const MAX_ROUND_ATTEMPTS: u32 = 3;

/// Base delay for the round-retry backoff (ms).
const ROUND_RETRY_BASE_DELAY_MS: u64 = 2_000;

/// Throttle between consecutive tool calls within a round (ms).
const TOOL_CALL_DELAY_MS: u64 = 500;

/// Attempts per tool call before the last error is surfaced as a result.
const MAX_TOOL_ATTEMPTS: u32 = 3;

/// Base delay for the per-call retry backoff (ms).
const TOOL_RETRY_BASE_DELAY_MS: u64 = 1_000;

// ─── Options ────────────────────────────────────────────────────────────────

/// Tunables for one orchestration run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Upper bound on backend rounds before degraded termination.
    pub max_tool_rounds: u32,
    /// Deadline for each backend request (ms).
    pub request_timeout_ms: u64,
    /// Cap on output tokens per backend request.
    pub max_output_tokens: u32,
    /// Expose write-capable tools to the model.
    pub include_write_tools: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            max_tool_rounds: 8,
            request_timeout_ms: 120_000,
            max_output_tokens: 4096,
            include_write_tools: false,
        }
    }
}

// ─── Orchestrator ───────────────────────────────────────────────────────────

/// Drives report runs against a reasoning backend and a tool session.
///
/// `run` takes the tool client by exclusive borrow: one client serves one run
/// at a time, and callers that share a client across tasks must serialize
/// runs themselves.
pub struct Orchestrator<B> {
    backend: B,
    options: RunOptions,
}

impl<B: ReasoningBackend> Orchestrator<B> {
    pub fn new(backend: B, options: RunOptions) -> Self {
        Self { backend, options }
    }

    /// Execute one report run to completion.
    ///
    /// Returns an error only when the run cannot continue: a non-retryable
    /// backend failure, a backend timeout, or a lost tool session. A model
    /// that never produces a report is a successful run with `report: None`.
    pub async fn run(
        &self,
        client: &mut McpClient,
        system_prompt: &str,
        task_prompt: &str,
    ) -> Result<RunOutcome, AgentError> {
        let run_id = Uuid::new_v4();
        let tools = filter_catalog(client.tools(), self.options.include_write_tools);
        tracing::info!(
            %run_id,
            tools = tools.len(),
            max_rounds = self.options.max_tool_rounds,
            include_write_tools = self.options.include_write_tools,
            "run: starting"
        );

        let mut conversation = vec![ChatMessage::user_text(task_prompt)];
        let mut tool_call_count: u32 = 0;
        let mut token_usage = TokenUsage::default();
        let mut rounds: u32 = 0;
        let mut last_text = String::new();

        while rounds < self.options.max_tool_rounds {
            rounds += 1;
            let response = self
                .converse_with_retry(run_id, rounds, system_prompt, &conversation, &tools)
                .await?;
            token_usage.accumulate(response.usage);
            last_text = response.text();

            let requests: Vec<(String, String, Value)> = response
                .content
                .iter()
                .filter_map(|block| match block {
                    ContentBlock::ToolUse { id, name, input } => {
                        Some((id.clone(), name.clone(), input.clone()))
                    }
                    _ => None,
                })
                .collect();
            conversation.push(ChatMessage::assistant(response.content));

            if requests.is_empty() {
                tracing::info!(%run_id, rounds, "run: terminal round");
                return Ok(finish(run_id, last_text, tool_call_count, rounds, token_usage));
            }

            tracing::info!(
                %run_id,
                round = rounds,
                requested = requests.len(),
                "run: executing tool calls"
            );

            let mut results = Vec::with_capacity(requests.len());
            for (index, (tool_use_id, name, input)) in requests.into_iter().enumerate() {
                if index > 0 {
                    tokio::time::sleep(Duration::from_millis(TOOL_CALL_DELAY_MS)).await;
                }
                tool_call_count += 1;
                let result = self
                    .call_with_retry(run_id, client, &tool_use_id, &name, input)
                    .await?;
                results.push(result);
            }
            conversation.push(ChatMessage::user_blocks(results));
        }

        tracing::warn!(
            %run_id,
            rounds,
            "run: round budget exhausted before a terminal response"
        );
        Ok(finish(run_id, last_text, tool_call_count, rounds, token_usage))
    }

    /// One backend exchange, bounded by the request timeout, with the whole
    /// round retried on rate-limit errors.
    async fn converse_with_retry(
        &self,
        run_id: Uuid,
        round: u32,
        system_prompt: &str,
        conversation: &[ChatMessage],
        tools: &[ToolSpec],
    ) -> Result<BackendResponse, AgentError> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let outcome = timeout::bounded(
                self.options.request_timeout_ms,
                "inference",
                "converse",
                self.backend.converse(
                    system_prompt,
                    conversation,
                    tools,
                    self.options.max_output_tokens,
                ),
            )
            .await?;

            match outcome {
                Ok(response) => {
                    tracing::debug!(
                        %run_id,
                        round,
                        attempt,
                        stop_reason = ?response.stop_reason,
                        "round: backend responded"
                    );
                    return Ok(response);
                }
                Err(err) if err.is_rate_limited() && attempt < MAX_ROUND_ATTEMPTS => {
                    let delay = ROUND_RETRY_BASE_DELAY_MS * 2u64.pow(attempt - 1);
                    tracing::warn!(
                        %run_id,
                        round,
                        attempt,
                        delay_ms = delay,
                        error = %err,
                        "round: backend rate limited, backing off"
                    );
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                }
                Err(err) => return Err(AgentError::Backend(err)),
            }
        }
    }

    /// One tool invocation with its retry policy applied.
    ///
    /// Retries cover thrown transport-pattern errors and rate-limit-pattern
    /// failures, including rate limits reported inside an error result. A
    /// lost session aborts the run; everything else becomes an error
    /// tool-result so the model can adapt.
    async fn call_with_retry(
        &self,
        run_id: Uuid,
        client: &mut McpClient,
        tool_use_id: &str,
        name: &str,
        input: Value,
    ) -> Result<ContentBlock, AgentError> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match client.call_tool(name, input.clone()).await {
                Ok(outcome) => {
                    let text = outcome.text();
                    if outcome.is_error
                        && is_rate_limit_message(&text)
                        && attempt < MAX_TOOL_ATTEMPTS
                    {
                        let delay = TOOL_RETRY_BASE_DELAY_MS * 2u64.pow(attempt - 1);
                        tracing::warn!(
                            %run_id,
                            tool = name,
                            attempt,
                            delay_ms = delay,
                            "tool: rate-limited result, backing off"
                        );
                        tokio::time::sleep(Duration::from_millis(delay)).await;
                        continue;
                    }
                    if outcome.is_error {
                        tracing::warn!(
                            %run_id,
                            tool = name,
                            result_preview = %truncate_utf8(&text, 200),
                            "tool: error result reported to model"
                        );
                    } else {
                        tracing::debug!(
                            %run_id,
                            tool = name,
                            result_preview = %truncate_utf8(&text, 200),
                            "tool: call succeeded"
                        );
                    }
                    return Ok(ContentBlock::ToolResult {
                        tool_use_id: tool_use_id.to_string(),
                        content: text,
                        is_error: outcome.is_error,
                    });
                }
                Err(err) if run_fatal(&err) => {
                    tracing::error!(%run_id, tool = name, error = %err, "tool: session lost, aborting run");
                    return Err(AgentError::ConnectionLost(err));
                }
                Err(err) if call_retryable(&err) && attempt < MAX_TOOL_ATTEMPTS => {
                    let delay = TOOL_RETRY_BASE_DELAY_MS * 2u64.pow(attempt - 1);
                    tracing::warn!(
                        %run_id,
                        tool = name,
                        attempt,
                        delay_ms = delay,
                        error = %err,
                        "tool: call failed, backing off"
                    );
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                }
                Err(err) => {
                    tracing::warn!(%run_id, tool = name, error = %err, "tool: failure reported to model");
                    return Ok(ContentBlock::ToolResult {
                        tool_use_id: tool_use_id.to_string(),
                        content: err.to_string(),
                        is_error: true,
                    });
                }
            }
        }
    }
}

// ─── Helpers ────────────────────────────────────────────────────────────────

/// Errors that mean the tool session cannot continue within this run.
fn run_fatal(err: &McpError) -> bool {
    matches!(
        err,
        McpError::NotConnected { .. } | McpError::ReconnectExhausted { .. }
    )
}

/// Thrown errors worth another attempt: transport failures and anything
/// matching the rate-limit pattern.
fn call_retryable(err: &McpError) -> bool {
    err.is_transport_error() || is_rate_limit_message(&err.to_string())
}

fn finish(
    run_id: Uuid,
    raw_text: String,
    tool_call_count: u32,
    rounds: u32,
    token_usage: TokenUsage,
) -> RunOutcome {
    let report = extract_report(&raw_text);
    tracing::info!(
        %run_id,
        report = report.is_some(),
        rounds,
        tool_calls = tool_call_count,
        input_tokens = token_usage.input_tokens,
        output_tokens = token_usage.output_tokens,
        "run: finished"
    );
    RunOutcome {
        report,
        raw_text,
        tool_call_count,
        rounds,
        token_usage,
    }
}

/// Truncate to at most `max_bytes` on a char boundary, for log previews.
fn truncate_utf8(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

// ─── Tests ──────────────────────────────────────────────────────────────────
