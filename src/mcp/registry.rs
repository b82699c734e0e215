//! Tool registry: every invokable action, built-in or plugin, under one map.
//!
//! Qualified names (`plugin_id:tool_name`) are globally unique; bare names
//! collide freely and resolve to the first match. The async mutex may be
//! held across awaits for registration, but dispatch clones the client
//! handle and calls outside the lock.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::error::McpError;
use crate::mcp::client::PluginClient;
use crate::mcp::types::{McpTool, ToolCallResult};

pub const BUILTIN_PLUGIN_ID: &str = "builtin";

/// A registered tool, built-in or plugin-backed.
#[derive(Debug, Clone)]
pub struct RegisteredTool {
    pub plugin_id: String,
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub input_schema: Option<serde_json::Value>,
}

impl RegisteredTool {
    pub fn is_builtin(&self) -> bool {
        self.plugin_id == BUILTIN_PLUGIN_ID
    }
}

pub fn qualified_name(plugin_id: &str, tool_name: &str) -> String {
    format!("{plugin_id}:{tool_name}")
}

/// Title Case display name derived from a snake_case tool name.
fn display_name_for(tool_name: &str) -> String {
    tool_name
        .replace('_', " ")
        .split_whitespace()
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Default)]
struct RegistryState {
    tools: HashMap<String, RegisteredTool>,
    clients: HashMap<String, PluginClient>,
}

pub struct ToolRegistry {
    state: Mutex<RegistryState>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { state: Mutex::new(RegistryState::default()) }
    }

    /// Register one built-in tool.
    pub async fn register_builtin(&self, tool: RegisteredTool) {
        let qname = qualified_name(&tool.plugin_id, &tool.name);
        self.state.lock().await.tools.insert(qname, tool);
    }

    /// Register a plugin's discovered tools and store its client handle.
    pub async fn register_plugin(
        &self,
        plugin_id: &str,
        client: PluginClient,
        tools: Vec<McpTool>,
    ) {
        let mut state = self.state.lock().await;
        for tool in tools {
            let qname = qualified_name(plugin_id, &tool.name);
            state.tools.insert(
                qname,
                RegisteredTool {
                    plugin_id: plugin_id.to_string(),
                    display_name: display_name_for(&tool.name),
                    description: tool.description.unwrap_or_default(),
                    input_schema: tool.input_schema,
                    name: tool.name,
                },
            );
        }
        state.clients.insert(plugin_id.to_string(), client);
    }

    /// Drop a plugin's tools and client. Built-ins and other plugins are
    /// untouched.
    pub async fn remove_plugin(&self, plugin_id: &str) {
        let mut state = self.state.lock().await;
        state.tools.retain(|_, t| t.plugin_id != plugin_id);
        state.clients.remove(plugin_id);
        tracing::info!(plugin_id, "plugin removed from registry");
    }

    pub async fn get_tool(&self, qualified: &str) -> Option<RegisteredTool> {
        self.state.lock().await.tools.get(qualified).cloned()
    }

    pub async fn all_tools(&self) -> Vec<RegisteredTool> {
        let mut tools: Vec<RegisteredTool> =
            self.state.lock().await.tools.values().cloned().collect();
        tools.sort_by(|a, b| a.plugin_id.cmp(&b.plugin_id).then_with(|| a.name.cmp(&b.name)));
        tools
    }

    /// Resolve an action id (qualified or bare) to its qualified name.
    pub async fn resolve_action(&self, action_id: &str) -> Option<String> {
        let state = self.state.lock().await;
        if state.tools.contains_key(action_id) {
            return Some(action_id.to_string());
        }
        let mut matches: Vec<&String> = state
            .tools
            .iter()
            .filter(|(_, t)| t.name == action_id)
            .map(|(q, _)| q)
            .collect();
        matches.sort();
        matches.first().map(|q| (*q).to_string())
    }

    /// Does this action id belong to a plugin (not a builtin)?
    pub async fn is_plugin_action(&self, action_id: &str) -> bool {
        let state = self.state.lock().await;
        state
            .tools
            .iter()
            .any(|(qname, t)| (qname == action_id || t.name == action_id) && !t.is_builtin())
    }

    /// Is this action id known at all (builtin or registered plugin tool)?
    pub async fn is_known_action(&self, action_id: &str) -> bool {
        self.resolve_action(action_id).await.is_some()
    }

    /// Plugin tools serialized in action-schema form for the CLASSIFY prompt.
    pub async fn tools_for_prompt(&self) -> String {
        let state = self.state.lock().await;
        let mut plugin_tools: Vec<&RegisteredTool> =
            state.tools.values().filter(|t| !t.is_builtin()).collect();
        plugin_tools.sort_by(|a, b| {
            a.plugin_id.cmp(&b.plugin_id).then_with(|| a.name.cmp(&b.name))
        });

        let mut out = String::new();
        for tool in plugin_tools {
            let qname = qualified_name(&tool.plugin_id, &tool.name);
            out.push_str(&format!(
                "- id: \"{}\", label: \"{}\", description: \"{}\", icon: \"sparkles\", requiresExecution: true\n",
                qname, tool.display_name, tool.description
            ));
        }
        out
    }

    /// Dispatch a tool call to the owning plugin. The registry lock is only
    /// held to resolve the tool and clone the client; the call itself runs
    /// outside it.
    pub async fn call_plugin_tool(
        &self,
        action_id: &str,
        arguments: serde_json::Value,
    ) -> Result<ToolCallResult, McpError> {
        let (tool, client) = {
            let state = self.state.lock().await;
            let tool = state
                .tools
                .iter()
                .find(|(qname, t)| *qname == action_id || t.name == action_id)
                .map(|(_, t)| t.clone())
                .ok_or_else(|| McpError::UnknownTool(action_id.to_string()))?;
            let client = state
                .clients
                .get(&tool.plugin_id)
                .cloned()
                .ok_or_else(|| McpError::NoServer(tool.plugin_id.clone()))?;
            (tool, client)
        };

        client.call_tool(&tool.name, arguments).await
    }

    /// Shutdown every plugin, draining clients from the registry.
    pub async fn shutdown_all(&self) {
        let clients: Vec<PluginClient> = {
            let mut state = self.state.lock().await;
            state.clients.drain().map(|(_, c)| c).collect()
        };
        for client in clients {
            tracing::info!(plugin_id = %client.plugin_id(), "shutting down plugin");
            client.shutdown().await;
        }
    }
}

/// Spawn the listener that reaps exited plugins out of the registry.
pub fn spawn_exit_listener(
    registry: Arc<ToolRegistry>,
    mut exit_rx: tokio::sync::mpsc::UnboundedReceiver<String>,
) {
    tokio::spawn(async move {
        while let Some(plugin_id) = exit_rx.recv().await {
            registry.remove_plugin(&plugin_id).await;
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builtin(name: &str) -> RegisteredTool {
        RegisteredTool {
            plugin_id: BUILTIN_PLUGIN_ID.to_string(),
            name: name.to_string(),
            display_name: display_name_for(name),
            description: format!("{name} description"),
            input_schema: None,
        }
    }

    #[tokio::test]
    async fn builtin_resolution_by_bare_and_qualified_name() {
        let registry = ToolRegistry::new();
        registry.register_builtin(builtin("copy_text")).await;

        assert_eq!(
            registry.resolve_action("copy_text").await.as_deref(),
            Some("builtin:copy_text")
        );
        assert_eq!(
            registry.resolve_action("builtin:copy_text").await.as_deref(),
            Some("builtin:copy_text")
        );
        assert!(registry.is_known_action("copy_text").await);
        assert!(!registry.is_plugin_action("copy_text").await);
        assert!(!registry.is_known_action("astral_project").await);
    }

    #[tokio::test]
    async fn prompt_serialization_skips_builtins() {
        let registry = ToolRegistry::new();
        registry.register_builtin(builtin("copy_text")).await;
        assert!(registry.tools_for_prompt().await.is_empty());
    }

    #[test]
    fn display_names_are_title_cased() {
        assert_eq!(display_name_for("export_csv"), "Export Csv");
        assert_eq!(display_name_for("ping"), "Ping");
    }

    #[tokio::test]
    async fn unknown_tool_call_errors() {
        let registry = ToolRegistry::new();
        let err = registry
            .call_plugin_tool("ghost", serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::UnknownTool(_)));
    }
}
