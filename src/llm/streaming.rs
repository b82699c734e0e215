//! Streaming helpers for the classify pipeline.
//!
//! The interesting part is skeleton extraction: while the classify JSON is
//! still streaming we scan the partial document for `contentType` and
//! `summary` so the menu can show a useful title well before the action list
//! has finished arriving.

use crate::llm::types::{ActionResult, ActionResultBody, ResultStatus};

/// Try to pull (`contentType`, `summary`) out of a partial JSON document.
///
/// Character-level scanner: tracks string and escape state plus brace depth,
/// and captures the string value following either key at depth 1. Returns
/// `Some` only once both values are complete; the caller is responsible for
/// emitting at most one skeleton per stream.
pub fn try_extract_skeleton(partial: &str) -> Option<(String, String)> {
    #[derive(PartialEq)]
    enum Expect {
        Key,
        Value,
    }

    let mut depth: i32 = 0;
    let mut in_string = false;
    let mut escaped = false;
    let mut current = String::new();
    let mut string_done = false;
    let mut expect = Expect::Key;
    let mut pending_key: Option<String> = None;

    let mut content_type: Option<String> = None;
    let mut summary: Option<String> = None;

    for c in partial.chars() {
        if in_string {
            if escaped {
                current.push(unescape(c));
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
                string_done = true;
            } else {
                current.push(c);
            }
            if !string_done {
                continue;
            }
        }

        if string_done {
            string_done = false;
            let finished = std::mem::take(&mut current);
            match expect {
                Expect::Key if depth == 1 => pending_key = Some(finished),
                Expect::Value if depth == 1 => {
                    match pending_key.as_deref() {
                        Some("contentType") => content_type = Some(finished),
                        Some("summary") => summary = Some(finished),
                        _ => {}
                    }
                    pending_key = None;
                    if let (Some(ct), Some(s)) = (&content_type, &summary) {
                        return Some((ct.clone(), s.clone()));
                    }
                }
                _ => {}
            }
            continue;
        }

        match c {
            '"' => {
                in_string = true;
                current.clear();
            }
            '{' | '[' => {
                depth += 1;
                expect = Expect::Key;
            }
            '}' | ']' => depth -= 1,
            ':' => expect = Expect::Value,
            ',' => expect = Expect::Key,
            _ => {}
        }
    }

    None
}

fn unescape(c: char) -> char {
    match c {
        'n' => '\n',
        't' => '\t',
        'r' => '\r',
        other => other,
    }
}

/// Strip markdown code fences the model sometimes wraps around its JSON.
pub fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    let without_open = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    let without_close = without_open.strip_suffix("```").unwrap_or(without_open);
    without_close.trim().to_string()
}

/// Split complete SSE events (`event: x\ndata: y\n\n`) off the front of the
/// buffer, leaving any partial event in place.
pub fn parse_sse_events(buffer: &mut String) -> Vec<(String, String)> {
    let mut events = Vec::new();

    while let Some(split) = buffer.find("\n\n") {
        let block: String = buffer.drain(..split + 2).collect();
        let mut event_type = String::new();
        let mut data = String::new();
        for line in block.lines() {
            if let Some(rest) = line.strip_prefix("event:") {
                event_type = rest.trim().to_string();
            } else if let Some(rest) = line.strip_prefix("data:") {
                data = rest.trim().to_string();
            }
        }
        if !event_type.is_empty() || !data.is_empty() {
            events.push((event_type, data));
        }
    }

    events
}

/// Extract a string value for `key` from potentially truncated JSON.
///
/// Searches for the pattern as a key (followed by `:`), not a value, and
/// tolerates a missing closing quote at end of input.
pub fn extract_json_string_field(json: &str, key: &str) -> Option<String> {
    let pattern = format!("\"{key}\"");
    let mut search_from = 0;

    loop {
        let key_pos = json[search_from..].find(&pattern)?;
        let abs = search_from + key_pos;
        let after_key = json[abs + pattern.len()..].trim_start();
        if let Some(after_colon) = after_key.strip_prefix(':') {
            let after_colon = after_colon.trim_start();
            let content = after_colon.strip_prefix('"')?;
            let bytes = content.as_bytes();
            let mut end = 0;
            while end < bytes.len() {
                if bytes[end] == b'"' && (end == 0 || bytes[end - 1] != b'\\') {
                    break;
                }
                end += 1;
            }
            let raw = &content[..end];
            return Some(raw.replace("\\\"", "\"").replace("\\n", "\n"));
        }
        search_from = abs + pattern.len();
    }
}

/// Salvage a usable ActionResult from JSON cut off by the token limit.
///
/// Pulls whatever string fields survived; a result without even a `text`
/// field is unrecoverable.
pub fn salvage_action_result(raw: &str, action_id: &str) -> Option<ActionResult> {
    let text = extract_json_string_field(raw, "text")?;
    let result_type =
        extract_json_string_field(raw, "type").unwrap_or_else(|| "text".to_string());
    let status = extract_json_string_field(raw, "status").unwrap_or_else(|| "success".to_string());

    let body = match result_type.as_str() {
        "command" => ActionResultBody::Command {
            command: extract_json_string_field(raw, "command")?,
            text: Some(text),
        },
        "clipboard" => ActionResultBody::Clipboard { content: text },
        _ => ActionResultBody::Text { text },
    };

    let status = match status.as_str() {
        "needs_confirmation" => ResultStatus::NeedsConfirmation,
        "error" => ResultStatus::Error,
        _ => ResultStatus::Success,
    };

    Some(ActionResult {
        status,
        action_id: action_id.to_string(),
        result: body,
        metadata: None,
    })
}
