//! MCP client — JSON-RPC tool invocation over stdio or TCP.
//!
//! This module handles:
//! - Spawning a tool-server subprocess or dialing a TCP endpoint
//! - JSON-RPC 2.0 communication, one JSON object per line
//! - Handshake and capability discovery (tools, optional resources)
//! - Call-by-name tool invocation and resource reads with per-call timeouts
//! - Bounded, exponentially backed-off reconnection on transport failures
//!
//! The client is driven by the orchestration loop in `agent_core`, which
//! treats reconnection as invisible latency.

pub mod client;
pub mod errors;
pub mod transport;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports for convenience
pub use client::{ClientOptions, ConnectionState, McpClient};
pub use errors::McpError;
pub use transport::{Transport, TransportFactory};
pub use types::{
    ResourceDescriptor, ToolCallOutcome, ToolDescriptor, TransportConfig, MCP_PROTOCOL_VERSION,
};
