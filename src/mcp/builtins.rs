//! Built-in actions registered as internal tools.
//!
//! These never cross an MCP boundary: the pipeline dispatches them to Rust
//! handlers directly. Registering them keeps the registry the single source
//! of truth for what the classifier may offer.

use crate::mcp::registry::{RegisteredTool, ToolRegistry, BUILTIN_PLUGIN_ID};

pub async fn register_builtins(registry: &ToolRegistry) {
    let builtins = [
        (
            "copy_text",
            "Copy Text",
            "Copy the extracted text to the clipboard",
        ),
        (
            "search_web",
            "Search Web",
            "Search the web for the extracted text",
        ),
        (
            "explain_error",
            "Explain Error",
            "Explain what this error means and why it occurred",
        ),
        (
            "suggest_fix",
            "Suggest Fix",
            "Analyze the error and suggest a fix (code or command)",
        ),
        (
            "fix_error",
            "Fix Error",
            "Suggest a command that fixes this error",
        ),
        (
            "export_csv",
            "Export CSV",
            "Extract tabular data and export as CSV file",
        ),
        (
            "explain",
            "Explain This",
            "Explain this content clearly and concisely",
        ),
        (
            "explain_code",
            "Explain Code",
            "Explain what this code does",
        ),
        (
            "translate_text",
            "Translate",
            "Translate the text to English (or another target language)",
        ),
    ];

    for (name, display, description) in builtins {
        registry
            .register_builtin(RegisteredTool {
                plugin_id: BUILTIN_PLUGIN_ID.to_string(),
                name: name.to_string(),
                display_name: display.to_string(),
                description: description.to_string(),
                input_schema: None,
            })
            .await;
    }

    tracing::info!(count = builtins.len(), "built-in tools registered");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn builtins_cover_the_fallback_menu() {
        let registry = ToolRegistry::new();
        register_builtins(&registry).await;
        for id in ["copy_text", "explain", "search_web"] {
            assert!(registry.is_known_action(id).await, "{id} missing");
        }
    }
}
