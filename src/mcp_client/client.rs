//! Connection client for the fleet tool server.
//!
//! Owns the single logical connection: handshake, capability discovery,
//! call-by-name tool invocation, resource reads, and bounded reconnection
//! with exponential backoff when the transport drops mid-session.
//!
//! State machine: `Disconnected` → connect() → `Connected` → disconnect()
//! or exhausted reconnects → `Disconnected`.

use std::collections::HashMap;
use std::time::Duration;

use super::errors::McpError;
use super::transport::{extract_result, Transport, TransportFactory};
use super::types::{
    InitializeResult, ResourceDescriptor, ResourceReadResult, ResourcesListResult, ToolCallOutcome,
    ToolDescriptor, ToolsListResult, TransportConfig, MCP_PROTOCOL_VERSION,
};
use crate::timeout;

// ─── Constants ───────────────────────────────────────────────────────────────

/// Default bound on transport construction plus handshake (ms).
const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;

/// Default bound on a single tool invocation, resource read, or discovery
/// request (ms).
const DEFAULT_TOOL_TIMEOUT_MS: u64 = 30_000;

/// Reconnect attempts allowed without an intervening healthy round trip.
const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 3;

/// First reconnect backoff step (ms); doubles on each subsequent attempt.
const DEFAULT_RECONNECT_BASE_DELAY_MS: u64 = 1_000;

// ─── Types ───────────────────────────────────────────────────────────────────

/// Connection lifecycle state. Owned exclusively by [`McpClient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
}

/// Tunable bounds for the connection client.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Bound on transport construction plus handshake (ms).
    pub connect_timeout_ms: u64,
    /// Bound on each tool invocation, resource read, or discovery request (ms).
    pub tool_timeout_ms: u64,
    /// Reconnect attempts allowed before the connection is abandoned.
    pub max_reconnect_attempts: u32,
    /// Backoff before reconnect attempt N is `base * 2^(N-1)` ms.
    pub reconnect_base_delay_ms: u64,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            tool_timeout_ms: DEFAULT_TOOL_TIMEOUT_MS,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            reconnect_base_delay_ms: DEFAULT_RECONNECT_BASE_DELAY_MS,
        }
    }
}

// ─── McpClient ───────────────────────────────────────────────────────────────

/// Client for one logical connection to the fleet tool server.
///
/// The reconnect attempt counter is shared across all calls on this client
/// and resets only on a proven-healthy round trip (a successful `connect()`
/// or a call that completes), so consecutive transport failures accumulate
/// toward the configured maximum even when each reconnect handshake
/// succeeds.
pub struct McpClient {
    factory: Box<dyn TransportFactory>,
    options: ClientOptions,
    state: ConnectionState,
    /// Live session; `Some` exactly while Connected.
    transport: Option<Box<dyn Transport>>,
    /// Tool name → descriptor, replaced wholesale on every discovery.
    tools: HashMap<String, ToolDescriptor>,
    /// Resource URI → descriptor; empty when the server has none.
    resources: HashMap<String, ResourceDescriptor>,
    reconnect_attempts: u32,
}

impl McpClient {
    pub fn new(factory: Box<dyn TransportFactory>, options: ClientOptions) -> Self {
        Self {
            factory,
            options,
            state: ConnectionState::Disconnected,
            transport: None,
            tools: HashMap::new(),
            resources: HashMap::new(),
            reconnect_attempts: 0,
        }
    }

    /// Build a client that opens sessions per the configured transport kind.
    pub fn from_config(config: TransportConfig, options: ClientOptions) -> Self {
        Self::new(Box::new(config), options)
    }

    // ─── Lifecycle ───────────────────────────────────────────────────────

    /// Establish the connection and run discovery. No-op when already
    /// connected.
    pub async fn connect(&mut self) -> Result<(), McpError> {
        if self.state == ConnectionState::Connected {
            return Ok(());
        }

        tracing::info!(server = %self.factory.describe(), "connecting to tool server");
        self.establish().await?;
        self.reconnect_attempts = 0;
        Ok(())
    }

    /// Close the session and clear discovered state. Idempotent; close
    /// errors are logged, not surfaced.
    pub async fn disconnect(&mut self) {
        if self.state == ConnectionState::Connected {
            tracing::info!("disconnecting from tool server");
        }
        self.teardown_session().await;
    }

    /// Open a transport, handshake under the connect timeout, then discover
    /// capabilities. Leaves the client fully Disconnected on any failure.
    async fn establish(&mut self) -> Result<(), McpError> {
        let factory = &self.factory;
        let connect_timeout_ms = self.options.connect_timeout_ms;

        let (transport, init) =
            timeout::bounded(connect_timeout_ms, "mcp", "connect", async move {
                let transport = factory.connect().await?;

                let params = serde_json::json!({
                    "protocolVersion": MCP_PROTOCOL_VERSION,
                    "capabilities": {},
                    "clientInfo": {
                        "name": env!("CARGO_PKG_NAME"),
                        "version": env!("CARGO_PKG_VERSION"),
                    },
                });
                let response = transport.request("initialize", Some(params)).await?;
                let init: InitializeResult = serde_json::from_value(extract_result(response)?)
                    .map_err(|e| McpError::Protocol {
                        reason: format!("invalid initialize result: {e}"),
                    })?;

                transport.notify("notifications/initialized", None).await?;
                Ok::<_, McpError>((transport, init))
            })
            .await??;

        if !init.protocol_version.is_empty() && init.protocol_version != MCP_PROTOCOL_VERSION {
            tracing::warn!(
                server_version = %init.protocol_version,
                client_version = MCP_PROTOCOL_VERSION,
                "server negotiated a different protocol version"
            );
        }
        if let Some(server) = &init.server_info {
            tracing::info!(
                server = server.name.as_deref().unwrap_or("unknown"),
                version = server.version.as_deref().unwrap_or("unknown"),
                "handshake complete"
            );
        }

        self.transport = Some(transport);
        self.state = ConnectionState::Connected;

        if let Err(err) = self.discover().await {
            self.teardown_session().await;
            return Err(err);
        }
        Ok(())
    }

    /// Drop the session, clear discovered tools and resources, go
    /// Disconnected. Transport close failures are logged only.
    async fn teardown_session(&mut self) {
        if let Some(transport) = self.transport.take() {
            if let Err(err) = transport.close().await {
                tracing::debug!(error = %err, "transport close failed");
            }
        }
        self.tools.clear();
        self.resources.clear();
        self.state = ConnectionState::Disconnected;
    }

    /// Back off, tear the session down, and establish a fresh one.
    ///
    /// The attempt counter is checked before any sleep so an exhausted
    /// client fails fast. A re-establish failure propagates to the call
    /// that triggered the reconnect, leaving the counter as-is.
    async fn reconnect(&mut self) -> Result<(), McpError> {
        self.reconnect_attempts += 1;
        let attempt = self.reconnect_attempts;
        let max_attempts = self.options.max_reconnect_attempts;

        if attempt > max_attempts {
            tracing::error!(max_attempts, "giving up on reconnection");
            self.teardown_session().await;
            return Err(McpError::ReconnectExhausted { max_attempts });
        }

        let delay_ms = self.options.reconnect_base_delay_ms * 2u64.pow(attempt - 1);
        tracing::warn!(attempt, max_attempts, delay_ms, "reconnecting to tool server");
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;

        self.teardown_session().await;
        self.establish().await
    }

    // ─── Discovery ───────────────────────────────────────────────────────

    /// Replace the tool and resource catalogs with the server's current
    /// lists. Tool listing failure is fatal to the connect attempt;
    /// resource listing failure leaves an empty mapping (not every server
    /// supports resources).
    async fn discover(&mut self) -> Result<(), McpError> {
        let tool_timeout_ms = self.options.tool_timeout_ms;
        let transport = self.transport.as_ref().ok_or(McpError::NotConnected {
            operation: "discover",
        })?;

        let tools = Self::list_tools(transport.as_ref(), tool_timeout_ms).await?;
        self.tools.clear();
        for tool in tools {
            self.tools.insert(tool.name.clone(), tool);
        }

        self.resources.clear();
        match Self::list_resources(transport.as_ref(), tool_timeout_ms).await {
            Ok(resources) => {
                for resource in resources {
                    self.resources.insert(resource.uri.clone(), resource);
                }
            }
            Err(err) => {
                tracing::debug!(error = %err, "resource listing skipped");
            }
        }

        tracing::info!(
            tools = self.tools.len(),
            resources = self.resources.len(),
            "discovery complete"
        );
        Ok(())
    }

    async fn list_tools(
        transport: &dyn Transport,
        timeout_ms: u64,
    ) -> Result<Vec<ToolDescriptor>, McpError> {
        let response = timeout::bounded(
            timeout_ms,
            "mcp",
            "tools/list",
            transport.request("tools/list", None),
        )
        .await??;

        let listed: ToolsListResult =
            serde_json::from_value(extract_result(response)?).map_err(|e| McpError::Protocol {
                reason: format!("invalid tools/list result: {e}"),
            })?;
        Ok(listed.tools)
    }

    async fn list_resources(
        transport: &dyn Transport,
        timeout_ms: u64,
    ) -> Result<Vec<ResourceDescriptor>, McpError> {
        let response = timeout::bounded(
            timeout_ms,
            "mcp",
            "resources/list",
            transport.request("resources/list", None),
        )
        .await??;

        let listed: ResourcesListResult =
            serde_json::from_value(extract_result(response)?).map_err(|e| McpError::Protocol {
                reason: format!("invalid resources/list result: {e}"),
            })?;
        Ok(listed.resources)
    }

    // ─── Invocation ──────────────────────────────────────────────────────

    /// Call a discovered tool by name.
    ///
    /// Fails without touching the wire when disconnected or when the name
    /// is not in the catalog. On a transport-level failure, reconnects once
    /// and retries the call once; the retry's own failure propagates as-is,
    /// even when it is another transport error.
    pub async fn call_tool(
        &mut self,
        name: &str,
        args: serde_json::Value,
    ) -> Result<ToolCallOutcome, McpError> {
        if self.state != ConnectionState::Connected {
            return Err(McpError::NotConnected {
                operation: "tools/call",
            });
        }
        if !self.tools.contains_key(name) {
            return Err(McpError::UnknownTool {
                name: name.to_string(),
            });
        }

        match self.invoke_tool(name, &args).await {
            Ok(outcome) => {
                self.reconnect_attempts = 0;
                Ok(outcome)
            }
            Err(err) if err.is_transport_error() => {
                tracing::warn!(tool = %name, error = %err, "transport failure, reconnecting");
                self.reconnect().await?;

                let outcome = self.invoke_tool(name, &args).await?;
                self.reconnect_attempts = 0;
                Ok(outcome)
            }
            Err(err) => Err(err),
        }
    }

    /// Read a resource by URI. Same guard, timeout, and
    /// reconnect-once-then-retry policy as [`Self::call_tool`].
    pub async fn read_resource(&mut self, uri: &str) -> Result<String, McpError> {
        if self.state != ConnectionState::Connected {
            return Err(McpError::NotConnected {
                operation: "resources/read",
            });
        }

        match self.invoke_read(uri).await {
            Ok(text) => {
                self.reconnect_attempts = 0;
                Ok(text)
            }
            Err(err) if err.is_transport_error() => {
                tracing::warn!(uri = %uri, error = %err, "transport failure, reconnecting");
                self.reconnect().await?;

                let text = self.invoke_read(uri).await?;
                self.reconnect_attempts = 0;
                Ok(text)
            }
            Err(err) => Err(err),
        }
    }

    async fn invoke_tool(
        &self,
        name: &str,
        args: &serde_json::Value,
    ) -> Result<ToolCallOutcome, McpError> {
        let transport = self.transport.as_ref().ok_or(McpError::NotConnected {
            operation: "tools/call",
        })?;

        let params = serde_json::json!({ "name": name, "arguments": args });
        let label = format!("tools/call {name}");
        let response = timeout::bounded(
            self.options.tool_timeout_ms,
            "mcp",
            &label,
            transport.request("tools/call", Some(params)),
        )
        .await??;

        serde_json::from_value(extract_result(response)?).map_err(|e| McpError::Protocol {
            reason: format!("invalid tools/call result: {e}"),
        })
    }

    async fn invoke_read(&self, uri: &str) -> Result<String, McpError> {
        let transport = self.transport.as_ref().ok_or(McpError::NotConnected {
            operation: "resources/read",
        })?;

        let params = serde_json::json!({ "uri": uri });
        let label = format!("resources/read {uri}");
        let response = timeout::bounded(
            self.options.tool_timeout_ms,
            "mcp",
            &label,
            transport.request("resources/read", Some(params)),
        )
        .await??;

        let read: ResourceReadResult =
            serde_json::from_value(extract_result(response)?).map_err(|e| McpError::Protocol {
                reason: format!("invalid resources/read result: {e}"),
            })?;

        // Inline text wins; anything else is handed back serialized
        if let Some(text) = read.contents.first().and_then(|entry| entry.text.as_ref()) {
            return Ok(text.clone());
        }
        serde_json::to_string(&read.contents).map_err(|e| McpError::Protocol {
            reason: format!("failed to serialize resource contents: {e}"),
        })
    }

    // ─── Status ──────────────────────────────────────────────────────────

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Discovered tools, keyed by name.
    pub fn tools(&self) -> &HashMap<String, ToolDescriptor> {
        &self.tools
    }

    /// Discovered resources, keyed by URI.
    pub fn resources(&self) -> &HashMap<String, ResourceDescriptor> {
        &self.resources
    }

    pub fn tool_count(&self) -> usize {
        self.tools.len()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
