//! MCP plugin subsystem.
//!
//! Third-party tools run as child processes speaking JSON-RPC 2.0 over
//! newline-delimited JSON on stdio:
//!
//! - **types**: protocol framing and tool shapes
//! - **client**: per-plugin actor (writer / reader / supervisor tasks)
//! - **manifest**: `omni-glass.plugin.json` parsing and validation
//! - **risk / approval**: consent model bound to a permissions digest
//! - **env_filter / sandbox**: what a plugin process is allowed to see
//! - **loader**: startup scan and the pending-approval queue
//! - **registry**: qualified-name tool store and dispatch
//! - **builtins**: internal tools registered at startup

pub mod approval;
pub mod builtins;
pub mod client;
pub mod env_filter;
pub mod loader;
pub mod manifest;
pub mod registry;
pub mod risk;
pub mod sandbox;
pub mod types;

pub use registry::{ToolRegistry, BUILTIN_PLUGIN_ID};

use crate::llm::types::{ActionResult, ActionResultBody, ResultStatus};

/// Execute a plugin tool and convert the MCP result into an ActionResult.
pub async fn execute_plugin_tool(
    registry: &ToolRegistry,
    action_id: &str,
    arguments: serde_json::Value,
) -> ActionResult {
    match registry.call_plugin_tool(action_id, arguments).await {
        Ok(result) => {
            let text = result.text();
            if result.is_error {
                ActionResult::error(action_id, &format!("Plugin error: {text}"))
            } else {
                ActionResult {
                    status: ResultStatus::Success,
                    action_id: action_id.to_string(),
                    result: ActionResultBody::Text { text },
                    metadata: None,
                }
            }
        }
        Err(e) => {
            tracing::warn!(action_id, error = %e, "plugin tool call failed");
            ActionResult::error(action_id, &format!("Failed to call plugin tool: {e}"))
        }
    }
}
