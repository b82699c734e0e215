//! Wire types for the CLASSIFY and EXECUTE phases.
//!
//! The LLM returns JSON that deserializes directly into these; field names
//! are camelCase on the wire.

use serde::{Deserialize, Serialize};

/// Closed content-type tag set. Anything the model invents beyond this list
/// parses as `Unknown` rather than failing the whole menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", from = "String")]
pub enum ContentType {
    Error,
    Code,
    Table,
    List,
    Prose,
    KvPairs,
    Mixed,
    Unknown,
}

impl From<String> for ContentType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "error" => ContentType::Error,
            "code" => ContentType::Code,
            "table" => ContentType::Table,
            "list" => ContentType::List,
            "prose" => ContentType::Prose,
            "kv_pairs" => ContentType::KvPairs,
            "mixed" => ContentType::Mixed,
            _ => ContentType::Unknown,
        }
    }
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Error => "error",
            ContentType::Code => "code",
            ContentType::Table => "table",
            ContentType::List => "list",
            ContentType::Prose => "prose",
            ContentType::KvPairs => "kv_pairs",
            ContentType::Mixed => "mixed",
            ContentType::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single action the user can take on snipped content.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    pub id: String,
    pub label: String,
    pub icon: String,
    pub priority: u8,
    pub description: String,
    pub requires_execution: bool,
}

/// The menu returned by CLASSIFY, rendered near the snip location.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionMenu {
    pub content_type: ContentType,
    pub confidence: f64,
    pub summary: String,
    #[serde(default)]
    pub detected_language: Option<String>,
    pub actions: Vec<Action>,
}

/// Partial menu data emitted from a streaming prefix, before the full
/// ActionMenu is parseable. Emitted at most once per stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionMenuSkeleton {
    pub content_type: String,
    pub summary: String,
}

impl ActionMenu {
    /// Fallback menu for any classify failure. Guarantees the non-empty
    /// action invariant with copy/explain/search.
    pub fn fallback() -> Self {
        Self {
            content_type: ContentType::Unknown,
            confidence: 0.0,
            summary: "Could not analyze content".to_string(),
            detected_language: None,
            actions: vec![
                Action {
                    id: "copy_text".to_string(),
                    label: "Copy Text".to_string(),
                    icon: "clipboard".to_string(),
                    priority: 1,
                    description: "Copy the extracted text to clipboard".to_string(),
                    requires_execution: false,
                },
                Action {
                    id: "explain".to_string(),
                    label: "Explain This".to_string(),
                    icon: "lightbulb".to_string(),
                    priority: 2,
                    description: "Explain what this content means".to_string(),
                    requires_execution: true,
                },
                Action {
                    id: "search_web".to_string(),
                    label: "Search Web".to_string(),
                    icon: "search".to_string(),
                    priority: 3,
                    description: "Search for this text online".to_string(),
                    requires_execution: false,
                },
            ],
        }
    }

    /// Enforce the menu invariants: actions ordered by (priority, id) and a
    /// `copy_text` action always present.
    pub fn normalize(&mut self) {
        if !self.actions.iter().any(|a| a.id == "copy_text") {
            let next_priority = self.actions.iter().map(|a| a.priority).max().unwrap_or(0) + 1;
            self.actions.push(Action {
                id: "copy_text".to_string(),
                label: "Copy Text".to_string(),
                icon: "clipboard".to_string(),
                priority: next_priority,
                description: "Copy the extracted text to clipboard".to_string(),
                requires_execution: false,
            });
        }
        self.actions
            .sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.id.cmp(&b.id)));
    }
}

/// Execution status for an ActionResult.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    Success,
    Error,
    NeedsConfirmation,
}

/// The tagged result body of an EXECUTE call.
///
/// Wire shape matches the EXECUTE prompt's response format: a `type` tag with
/// sibling payload fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ActionResultBody {
    Text {
        text: String,
    },
    File {
        #[serde(rename = "filePath")]
        file_name: String,
        /// Complete file content.
        text: String,
        #[serde(rename = "mimeType", default)]
        mime_type: Option<String>,
    },
    Command {
        command: String,
        /// Human rationale shown above the command in the confirmation modal.
        #[serde(default)]
        text: Option<String>,
    },
    Clipboard {
        #[serde(rename = "clipboardContent", alias = "text")]
        content: String,
    },
}

impl ActionResultBody {
    pub fn kind(&self) -> &'static str {
        match self {
            ActionResultBody::Text { .. } => "text",
            ActionResultBody::File { .. } => "file",
            ActionResultBody::Command { .. } => "command",
            ActionResultBody::Clipboard { .. } => "clipboard",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionResultMetadata {
    #[serde(default)]
    pub tokens_used: Option<u64>,
    #[serde(default)]
    pub processing_note: Option<String>,
}

/// The result of EXECUTE, handed to the result dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionResult {
    pub status: ResultStatus,
    pub action_id: String,
    pub result: ActionResultBody,
    #[serde(default)]
    pub metadata: Option<ActionResultMetadata>,
}

impl ActionResult {
    pub fn error(action_id: &str, message: &str) -> Self {
        Self {
            status: ResultStatus::Error,
            action_id: action_id.to_string(),
            result: ActionResultBody::Text { text: message.to_string() },
            metadata: None,
        }
    }

    pub fn text(action_id: &str, text: String) -> Self {
        Self {
            status: ResultStatus::Success,
            action_id: action_id.to_string(),
            result: ActionResultBody::Text { text },
            metadata: None,
        }
    }
}

/// Token accounting reported by a provider stream.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn menu_parses_from_classify_json() {
        let raw = r#"{
            "contentType": "error",
            "confidence": 0.92,
            "summary": "Python import error",
            "detectedLanguage": null,
            "actions": [
                {"id": "fix_error", "label": "Fix Error", "icon": "wrench",
                 "priority": 1, "description": "Suggest a fix", "requiresExecution": true}
            ]
        }"#;
        let menu: ActionMenu = serde_json::from_str(raw).unwrap();
        assert_eq!(menu.content_type, ContentType::Error);
        assert_eq!(menu.actions[0].id, "fix_error");
        assert!(menu.actions[0].requires_execution);
    }

    #[test]
    fn unknown_content_type_is_tolerated() {
        let raw = r#"{"contentType": "math", "confidence": 0.5, "summary": "s", "actions": []}"#;
        let menu: ActionMenu = serde_json::from_str(raw).unwrap();
        assert_eq!(menu.content_type, ContentType::Unknown);
    }

    #[test]
    fn normalize_sorts_and_synthesizes_copy_text() {
        let raw = r#"{"contentType": "table", "confidence": 0.8, "summary": "s", "actions": [
            {"id": "b_action", "label": "B", "icon": "table", "priority": 2, "description": "", "requiresExecution": true},
            {"id": "a_action", "label": "A", "icon": "table", "priority": 2, "description": "", "requiresExecution": true},
            {"id": "export_csv", "label": "Export", "icon": "download", "priority": 1, "description": "", "requiresExecution": true}
        ]}"#;
        let mut menu: ActionMenu = serde_json::from_str(raw).unwrap();
        menu.normalize();

        let ids: Vec<&str> = menu.actions.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["export_csv", "a_action", "b_action", "copy_text"]);
    }

    #[test]
    fn command_result_parses_with_rationale() {
        let raw = r#"{
            "status": "needs_confirmation",
            "actionId": "suggest_fix",
            "result": {"type": "command", "command": "pip install pandas",
                       "text": "Installs the missing module."}
        }"#;
        let result: ActionResult = serde_json::from_str(raw).unwrap();
        assert_eq!(result.status, ResultStatus::NeedsConfirmation);
        match &result.result {
            ActionResultBody::Command { command, text } => {
                assert_eq!(command, "pip install pandas");
                assert!(text.as_deref().unwrap().contains("missing module"));
            }
            other => panic!("expected command body, got {}", other.kind()),
        }
    }

    #[test]
    fn file_result_parses() {
        let raw = r#"{
            "status": "success",
            "actionId": "export_csv",
            "result": {"type": "file", "filePath": "export.csv",
                       "text": "a,b\n1,2\n", "mimeType": "text/csv"}
        }"#;
        let result: ActionResult = serde_json::from_str(raw).unwrap();
        match &result.result {
            ActionResultBody::File { file_name, text, mime_type } => {
                assert_eq!(file_name, "export.csv");
                assert!(text.starts_with("a,b"));
                assert_eq!(mime_type.as_deref(), Some("text/csv"));
            }
            other => panic!("expected file body, got {}", other.kind()),
        }
    }
}
