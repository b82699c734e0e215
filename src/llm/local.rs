//! Local in-process provider.
//!
//! Fully offline deterministic engine: classification reuses the structural
//! signals plus lexical scanning, execution is rule-templated (real CSV
//! conversion, missing-module fix suggestions). It is both a user-selectable
//! provider and the silent fallback when no remote key is configured.
//!
//! Output is emitted in several chunks so the streaming path — skeleton
//! scanner included — behaves exactly as it does against a cloud stream.

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use tokio::sync::mpsc;

use crate::error::LlmError;
use crate::llm::provider::{Provider, ProviderRequest};
use crate::llm::types::{
    Action, ActionMenu, ActionResult, ActionResultBody, ContentType, ResultStatus, TokenUsage,
};

pub struct LocalProvider;

impl LocalProvider {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LocalProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Provider for LocalProvider {
    fn label(&self) -> &str {
        "local"
    }

    fn is_remote(&self) -> bool {
        false
    }

    async fn stream_classify(
        &self,
        req: ProviderRequest,
        chunks: mpsc::Sender<String>,
    ) -> Result<TokenUsage, LlmError> {
        let text = extract_tag(&req.user_message, "extracted_text").unwrap_or_default();
        let menu = classify_text(&text);
        let json = serde_json::to_string(&menu)
            .map_err(|e| LlmError::BadJson(e.to_string()))?;
        emit_chunked(&json, &chunks).await;
        Ok(estimate_usage(&req.user_message, &json))
    }

    async fn stream_execute(
        &self,
        req: ProviderRequest,
        chunks: mpsc::Sender<String>,
    ) -> Result<TokenUsage, LlmError> {
        let action_id = req
            .user_message
            .lines()
            .next()
            .and_then(|l| l.strip_prefix("Action: "))
            .unwrap_or("explain")
            .trim()
            .to_string();
        let text = extract_tag(&req.user_message, "extracted_text").unwrap_or_default();

        let result = execute_rule(&action_id, &text);
        let json = serde_json::to_string(&result)
            .map_err(|e| LlmError::BadJson(e.to_string()))?;
        emit_chunked(&json, &chunks).await;
        Ok(estimate_usage(&req.user_message, &json))
    }
}

/// Push the document in a handful of pieces, split on char boundaries.
async fn emit_chunked(json: &str, chunks: &mpsc::Sender<String>) {
    let chars: Vec<char> = json.chars().collect();
    let piece = (chars.len() / 3).max(1);
    for window in chars.chunks(piece) {
        if chunks.send(window.iter().collect()).await.is_err() {
            return;
        }
    }
}

fn estimate_usage(input: &str, output: &str) -> TokenUsage {
    TokenUsage {
        input_tokens: (input.len() / 4) as u64,
        output_tokens: (output.len() / 4) as u64,
    }
}

/// Pull the body of an `<tag>...</tag>` section out of the prompt.
fn extract_tag(message: &str, tag: &str) -> Option<String> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = message.find(&open)? + open.len();
    let end = message[start..].find(&close)? + start;
    Some(message[start..end].trim_matches('\n').to_string())
}

lazy_static! {
    static ref ERROR_MARKERS: Regex = Regex::new(
        r"(?m)^(Traceback \(most recent call last\)|\w*Error\b|\w*Exception\b|panic(ked)? at|error\[E\d+\]|fatal:)"
    )
    .unwrap();
    static ref PIP_MISSING: Regex =
        Regex::new(r"ModuleNotFoundError: No module named '([A-Za-z0-9_.\-]+)'").unwrap();
    static ref NPM_MISSING: Regex =
        Regex::new(r"Cannot find module '([^']+)'").unwrap();
    static ref LIST_LINE: Regex = Regex::new(r"^\s*([-*•]|\d+[.)])\s+").unwrap();
    static ref KV_LINE: Regex = Regex::new(r"^\s*[\w ./#-]+:\s+\S").unwrap();
}

fn classify_text(text: &str) -> ActionMenu {
    let flags = crate::heuristics::analyze(text);
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let total = lines.len().max(1);

    let is_error = ERROR_MARKERS.is_match(text);
    let list_lines = lines.iter().filter(|l| LIST_LINE.is_match(l)).count();
    let kv_lines = lines.iter().filter(|l| KV_LINE.is_match(l)).count();

    let content_type = if is_error {
        ContentType::Error
    } else if flags.has_table_structure {
        ContentType::Table
    } else if flags.has_code_structure {
        ContentType::Code
    } else if list_lines * 2 > total {
        ContentType::List
    } else if kv_lines * 2 > total {
        ContentType::KvPairs
    } else if lines.is_empty() {
        ContentType::Unknown
    } else {
        ContentType::Prose
    };

    let summary = summarize(text, content_type);
    let actions = actions_for(content_type);

    ActionMenu {
        content_type,
        confidence: if lines.is_empty() { 0.0 } else { 0.75 },
        summary,
        detected_language: None,
        actions,
    }
}

fn summarize(text: &str, content_type: ContentType) -> String {
    let first_line = text.lines().find(|l| !l.trim().is_empty()).unwrap_or("").trim();
    let head: String = first_line.chars().take(40).collect();
    match content_type {
        ContentType::Error => format!("Error: {head}"),
        ContentType::Table => "Tabular data detected".to_string(),
        ContentType::Code => "Source code snippet".to_string(),
        ContentType::List => "A list of items".to_string(),
        ContentType::KvPairs => "Key-value data".to_string(),
        ContentType::Unknown => "Could not analyze content".to_string(),
        _ => head,
    }
}

fn actions_for(content_type: ContentType) -> Vec<Action> {
    let mut actions = match content_type {
        ContentType::Error => vec![
            action("fix_error", "Suggest Fix", "wrench", 1, "Suggest a command that fixes this error", true),
            action("explain_error", "Explain Error", "lightbulb", 2, "Explain what this error means", true),
        ],
        ContentType::Table => vec![
            action("export_csv", "Export CSV", "download", 1, "Extract the table as a CSV file", true),
            action("explain", "Explain This", "lightbulb", 3, "Explain what this data shows", true),
        ],
        ContentType::Code => vec![
            action("explain_code", "Explain Code", "code", 1, "Explain what this code does", true),
        ],
        _ => vec![
            action("explain", "Explain This", "lightbulb", 2, "Explain what this content means", true),
            action("search_web", "Search Web", "search", 3, "Search for this text online", false),
        ],
    };
    let next = actions.iter().map(|a| a.priority).max().unwrap_or(0) + 1;
    actions.push(action(
        "copy_text",
        "Copy Text",
        "clipboard",
        next,
        "Copy the extracted text to clipboard",
        false,
    ));
    actions
}

fn action(
    id: &str,
    label: &str,
    icon: &str,
    priority: u8,
    description: &str,
    requires_execution: bool,
) -> Action {
    Action {
        id: id.to_string(),
        label: label.to_string(),
        icon: icon.to_string(),
        priority,
        description: description.to_string(),
        requires_execution,
    }
}

fn execute_rule(action_id: &str, text: &str) -> ActionResult {
    match action_id {
        "suggest_fix" | "fix_error" | "fix_syntax" | "fix_code" => suggest_fix(action_id, text),
        "export_csv" | "export_to_csv" | "extract_data" => export_csv(action_id, text),
        "translate_text" | "translate" => ActionResult::text(
            action_id,
            format!("The text appears to already be in English:\n\n{text}"),
        ),
        _ => explain(action_id, text),
    }
}

fn explain(action_id: &str, text: &str) -> ActionResult {
    let lines = text.lines().filter(|l| !l.trim().is_empty()).count();
    let chars = text.chars().count();
    let flags = crate::heuristics::analyze(text);
    let kind = if ERROR_MARKERS.is_match(text) {
        "an error message or stack trace"
    } else if flags.has_table_structure {
        "tabular data"
    } else if flags.has_code_structure {
        "source code"
    } else {
        "plain text"
    };
    ActionResult::text(
        action_id,
        format!("This snip contains {kind} ({lines} lines, {chars} characters). Running offline — switch to a cloud provider for a richer explanation."),
    )
}

fn suggest_fix(action_id: &str, text: &str) -> ActionResult {
    let (command, rationale) = if let Some(caps) = PIP_MISSING.captures(text) {
        let module = caps.get(1).map(|m| m.as_str()).unwrap_or_default().to_string();
        (
            format!("pip install {module}"),
            format!("Python could not import '{module}'. Installing the package with pip is the most common fix."),
        )
    } else if let Some(caps) = NPM_MISSING.captures(text) {
        let module = caps.get(1).map(|m| m.as_str()).unwrap_or_default().to_string();
        (
            format!("npm install {module}"),
            format!("Node.js could not resolve '{module}'. Installing it with npm is the most common fix."),
        )
    } else {
        return ActionResult::error(
            action_id,
            "Could not derive a fix command from this error offline.",
        );
    };

    ActionResult {
        status: ResultStatus::NeedsConfirmation,
        action_id: action_id.to_string(),
        result: ActionResultBody::Command { command, text: Some(rationale) },
        metadata: None,
    }
}

fn export_csv(action_id: &str, text: &str) -> ActionResult {
    let rows: Vec<Vec<String>> = text
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(split_row)
        .collect();

    if rows.len() < 2 {
        return ActionResult::error(action_id, "No tabular rows found to export.");
    }

    let csv: String = rows
        .iter()
        .map(|row| row.iter().map(|f| csv_field(f)).collect::<Vec<_>>().join(","))
        .collect::<Vec<_>>()
        .join("\n");

    ActionResult {
        status: ResultStatus::Success,
        action_id: action_id.to_string(),
        result: ActionResultBody::File {
            file_name: "table_export.csv".to_string(),
            text: format!("{csv}\n"),
            mime_type: Some("text/csv".to_string()),
        },
        metadata: None,
    }
}

fn split_row(line: &str) -> Vec<String> {
    if line.contains('\t') {
        line.split('\t').map(|f| f.trim().to_string()).collect()
    } else if line.contains('|') {
        line.trim_matches('|')
            .split('|')
            .map(|f| f.trim().to_string())
            .collect()
    } else {
        line.split_whitespace().map(|f| f.to_string()).collect()
    }
}

fn csv_field(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::prompts;
    use crate::llm::prompts_execute;

    const TRACEBACK: &str = "Traceback (most recent call last):\n  File \"analysis.py\", line 3\n    import panda as pd\nModuleNotFoundError: No module named 'panda'";
    const TABLE: &str = "Name\tRole\tSalary\nAlice\tEngineer\t150000\nBob\tManager\t180000";

    fn classify_message(text: &str) -> String {
        prompts::build_classify_message(
            text,
            0.9,
            crate::heuristics::analyze(text),
            "linux",
            "unknown",
            "",
        )
    }

    async fn run_classify(text: &str) -> ActionMenu {
        let provider = LocalProvider::new();
        let (tx, mut rx) = mpsc::channel(16);
        let req = ProviderRequest {
            system_prompt: prompts::CLASSIFY_SYSTEM_PROMPT.to_string(),
            user_message: classify_message(text),
            max_tokens: 512,
        };
        provider.stream_classify(req, tx).await.unwrap();

        let mut acc = String::new();
        while let Some(chunk) = rx.recv().await {
            acc.push_str(&chunk);
        }
        serde_json::from_str(&acc).unwrap()
    }

    async fn run_execute(action_id: &str, text: &str) -> ActionResult {
        let provider = LocalProvider::new();
        let (tx, mut rx) = mpsc::channel(16);
        let req = ProviderRequest {
            system_prompt: prompts_execute::EXECUTE_SYSTEM_PROMPT.to_string(),
            user_message: prompts_execute::build_execute_message(action_id, text, "linux", "sh"),
            max_tokens: 1024,
        };
        provider.stream_execute(req, tx).await.unwrap();

        let mut acc = String::new();
        while let Some(chunk) = rx.recv().await {
            acc.push_str(&chunk);
        }
        serde_json::from_str(&acc).unwrap()
    }

    #[tokio::test]
    async fn traceback_classifies_as_error_with_fix_action() {
        let menu = run_classify(TRACEBACK).await;
        assert_eq!(menu.content_type, ContentType::Error);
        assert!(menu.actions.iter().any(|a| a.id == "fix_error"));
        assert!(menu.actions.iter().any(|a| a.id == "copy_text"));
    }

    #[tokio::test]
    async fn table_classifies_with_export_action() {
        let menu = run_classify(TABLE).await;
        assert_eq!(menu.content_type, ContentType::Table);
        assert!(menu.actions.iter().any(|a| a.id == "export_csv"));
    }

    #[tokio::test]
    async fn fix_error_suggests_pip_install() {
        let result = run_execute("fix_error", TRACEBACK).await;
        assert_eq!(result.status, ResultStatus::NeedsConfirmation);
        match result.result {
            ActionResultBody::Command { command, text } => {
                assert_eq!(command, "pip install panda");
                assert!(text.unwrap().contains("panda"));
            }
            other => panic!("expected command, got {}", other.kind()),
        }
    }

    #[tokio::test]
    async fn export_csv_produces_comma_rows() {
        let result = run_execute("export_csv", TABLE).await;
        assert_eq!(result.status, ResultStatus::Success);
        match result.result {
            ActionResultBody::File { file_name, text, mime_type } => {
                assert!(file_name.ends_with(".csv"));
                assert_eq!(mime_type.as_deref(), Some("text/csv"));
                assert!(text.contains("Name,Role,Salary"));
                assert!(text.contains("Alice,Engineer,150000"));
                assert!(text.contains("Bob,Manager,180000"));
            }
            other => panic!("expected file, got {}", other.kind()),
        }
    }

    #[test]
    fn csv_quoting() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn tag_extraction() {
        let msg = "prefix\n<extracted_text>\nhello\nworld\n</extracted_text>\n";
        assert_eq!(extract_tag(msg, "extracted_text").as_deref(), Some("hello\nworld"));
        assert!(extract_tag(msg, "missing").is_none());
    }
}
