//! Tool catalog filtering.
//!
//! Discovered tools pass through a read-only policy before they are exposed
//! to the reasoning backend. Scheduled reports should never mutate the fleet,
//! so write-capable tools are withheld unless the caller opts in.

use std::collections::HashMap;

use crate::inference::ToolSpec;
use crate::mcp_client::ToolDescriptor;

// ─── Read-Only Policy ───────────────────────────────────────────────────────

/// Name prefixes that mark a tool as read-only.
const READ_ONLY_PREFIXES: [&str; 5] = ["search", "list", "get", "check", "read"];

/// Read-only tools whose names do not follow the prefix convention.
const READ_ONLY_ALLOWLIST: [&str; 2] = ["runLiveQuery", "exportDeviceInventory"];

/// Whether a tool name passes the read-only naming policy.
fn is_read_only(name: &str) -> bool {
    READ_ONLY_ALLOWLIST.contains(&name)
        || READ_ONLY_PREFIXES
            .iter()
            .any(|prefix| name.starts_with(prefix))
}

/// Schema substituted for tools that advertise none.
fn empty_object_schema() -> serde_json::Value {
    serde_json::json!({"type": "object", "properties": {}})
}

// ─── Catalog Filter ─────────────────────────────────────────────────────────

/// Map discovered tools to the catalog sent to the reasoning backend.
///
/// With `include_write_tools` unset, only tools passing the read-only policy
/// survive. Output is sorted by name so the catalog is identical across runs
/// regardless of map iteration order.
pub fn filter_catalog(
    tools: &HashMap<String, ToolDescriptor>,
    include_write_tools: bool,
) -> Vec<ToolSpec> {
    let mut specs: Vec<ToolSpec> = tools
        .values()
        .filter(|tool| include_write_tools || is_read_only(&tool.name))
        .map(|tool| ToolSpec {
            name: tool.name.clone(),
            description: tool.description.clone().unwrap_or_default(),
            input_schema: tool
                .input_schema
                .clone()
                .unwrap_or_else(empty_object_schema),
        })
        .collect();
    specs.sort_by(|a, b| a.name.cmp(&b.name));
    specs
}

// ─── Tests ──────────────────────────────────────────────────────────────────
