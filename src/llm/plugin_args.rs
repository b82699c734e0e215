//! LLM-to-tool-args bridge.
//!
//! A plugin tool whose input schema is more than `{text}` needs its
//! arguments structured from free-form screen text. One small LLM call maps
//! text onto the schema; trivial schemas skip the call entirely.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::error::LlmError;
use crate::llm::provider::{Provider, ProviderRequest};
use crate::llm::streaming;

const ARGS_SYSTEM_PROMPT: &str = r#"You generate JSON arguments for a tool call. Given the tool's input schema and user-provided text, extract the relevant information and produce a JSON object that matches the schema exactly.

<rules>
1. Output ONLY valid JSON matching the input_schema. No other text.
2. Extract relevant information from the user text to fill schema fields.
3. ALL required fields must be present.
4. Use sensible defaults for optional fields when the text doesn't provide them.
5. Do NOT include fields not defined in the schema.
</rules>"#;

/// True when the schema is `{text}`-only (or empty): no LLM call needed.
pub fn is_trivial_schema(schema: &serde_json::Value) -> bool {
    match schema.get("properties").and_then(|p| p.as_object()) {
        None => true,
        Some(map) => map.len() <= 1 && map.contains_key("text"),
    }
}

/// Generate structured arguments for a plugin tool call.
pub async fn generate_plugin_args(
    provider: &Arc<dyn Provider>,
    tool_name: &str,
    tool_description: &str,
    input_schema: &serde_json::Value,
    extracted_text: &str,
    max_tokens: u32,
) -> Result<serde_json::Value, LlmError> {
    let schema_str = serde_json::to_string_pretty(input_schema).unwrap_or_default();
    let request = ProviderRequest {
        system_prompt: ARGS_SYSTEM_PROMPT.to_string(),
        user_message: format!(
            "Tool: {tool_name}\nDescription: {tool_description}\n\nInput schema:\n{schema_str}\n\nUser text:\n{extracted_text}",
        ),
        max_tokens,
    };

    let (tx, mut rx) = mpsc::channel::<String>(64);
    let stream_provider = Arc::clone(provider);
    let task = tokio::spawn(async move { stream_provider.stream_execute(request, tx).await });

    let mut accumulated = String::new();
    while let Some(chunk) = rx.recv().await {
        accumulated.push_str(&chunk);
    }
    match task.await {
        Ok(res) => res?,
        Err(e) => return Err(LlmError::BadJson(format!("args stream panicked: {e}"))),
    };

    let json = streaming::strip_code_fences(&accumulated);
    let args: serde_json::Value =
        serde_json::from_str(&json).map_err(|e| LlmError::BadJson(e.to_string()))?;

    validate_required_fields(&args, input_schema)?;
    tracing::info!(tool_name, "structured args generated");
    Ok(args)
}

fn validate_required_fields(
    args: &serde_json::Value,
    schema: &serde_json::Value,
) -> Result<(), LlmError> {
    let Some(required) = schema.get("required").and_then(|r| r.as_array()) else {
        return Ok(());
    };
    let obj = args
        .as_object()
        .ok_or_else(|| LlmError::BadJson("generated args must be a json object".into()))?;
    for field in required {
        if let Some(name) = field.as_str() {
            if !obj.contains_key(name) {
                return Err(LlmError::BadJson(format!("missing required field: {name}")));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trivial_schema_detection() {
        assert!(is_trivial_schema(&serde_json::json!({})));
        assert!(is_trivial_schema(&serde_json::json!({
            "type": "object",
            "properties": {"text": {"type": "string"}}
        })));
        assert!(!is_trivial_schema(&serde_json::json!({
            "type": "object",
            "properties": {"title": {"type": "string"}, "body": {"type": "string"}}
        })));
    }

    #[test]
    fn required_field_validation() {
        let schema = serde_json::json!({"required": ["title"]});
        assert!(validate_required_fields(&serde_json::json!({"title": "x"}), &schema).is_ok());
        assert!(validate_required_fields(&serde_json::json!({"body": "x"}), &schema).is_err());
    }
}
