//! Result dispatcher: routes an ActionResult to its handler and performs
//! the core-side effects.
//!
//! Command results are never executed here — they become a
//! needs-confirmation outcome, and the separate `run_confirmed_command`
//! entry re-checks the blocklist on the byte-identical string right before
//! the shell spawn.

use std::path::PathBuf;

use serde::Serialize;

use crate::error::DispatchError;
use crate::llm::types::{ActionResult, ActionResultBody, ResultStatus};
use crate::safety;

/// What the UI collaborator should render after dispatch.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DispatchOutcome {
    /// Inline markdown; `copy_fix` carries the body of the first fenced code
    /// block when one exists.
    Text { markdown: String, copy_fix: Option<String> },
    FileSaved { path: String },
    CopiedToClipboard { chars: usize },
    /// Modal confirmation: the command shown must be byte-identical to the
    /// string later passed to `run_confirmed_command`.
    NeedsConfirmation { command: String, rationale: Option<String> },
    Error { message: String },
}

/// Captured output of a confirmed shell command.
#[derive(Debug, Clone, Serialize)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

pub struct ResultDispatcher {
    desktop_dir: Option<PathBuf>,
}

impl ResultDispatcher {
    pub fn new() -> Self {
        Self { desktop_dir: dirs::desktop_dir() }
    }

    /// Write file results somewhere else (tests, headless runs).
    pub fn with_desktop_dir(dir: PathBuf) -> Self {
        Self { desktop_dir: Some(dir) }
    }

    pub fn dispatch(&self, result: &ActionResult) -> Result<DispatchOutcome, DispatchError> {
        if result.status == ResultStatus::Error {
            let message = match &result.result {
                ActionResultBody::Text { text } => text.clone(),
                other => format!("action failed ({})", other.kind()),
            };
            return Ok(DispatchOutcome::Error { message });
        }

        match &result.result {
            ActionResultBody::Text { text } => Ok(DispatchOutcome::Text {
                markdown: text.clone(),
                copy_fix: extract_first_code_block(text),
            }),
            ActionResultBody::File { file_name, text, .. } => {
                let path = self.write_to_desktop(file_name, text)?;
                Ok(DispatchOutcome::FileSaved { path })
            }
            ActionResultBody::Clipboard { content } => {
                copy_to_clipboard(content)?;
                Ok(DispatchOutcome::CopiedToClipboard { chars: content.chars().count() })
            }
            ActionResultBody::Command { command, text } => {
                // First of the two mandatory checks; the second runs at spawn.
                let check = safety::is_command_safe(command);
                if !check.safe {
                    let reason = check.reason.unwrap_or_else(|| "unsafe command".to_string());
                    return Ok(DispatchOutcome::Error {
                        message: format!("Command blocked: {reason}"),
                    });
                }
                Ok(DispatchOutcome::NeedsConfirmation {
                    command: command.clone(),
                    rationale: text.clone(),
                })
            }
        }
    }

    /// Write a file result to the desktop (or the configured directory).
    pub fn write_to_desktop(&self, filename: &str, content: &str) -> Result<String, DispatchError> {
        if !safety::is_path_safe(filename) {
            return Err(DispatchError::UnsafePath(filename.to_string()));
        }
        let dir = self.desktop_dir.clone().ok_or(DispatchError::NoDesktopDir)?;
        let path = dir.join(filename);
        std::fs::write(&path, content).map_err(|e| DispatchError::FileWrite {
            path: path.display().to_string(),
            source: e,
        })?;
        let full = path.display().to_string();
        tracing::info!(path = %full, bytes = content.len(), "file result written");
        Ok(full)
    }

    /// Write a file result to a caller-chosen absolute path (save dialog).
    pub fn write_file_to_path(&self, path: &str, content: &str) -> Result<String, DispatchError> {
        if !safety::is_path_safe(path) {
            return Err(DispatchError::UnsafePath(path.to_string()));
        }
        std::fs::write(path, content).map_err(|e| DispatchError::FileWrite {
            path: path.to_string(),
            source: e,
        })?;
        tracing::info!(path, bytes = content.len(), "file written to chosen path");
        Ok(path.to_string())
    }
}

impl Default for ResultDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Copy text to the system clipboard.
pub fn copy_to_clipboard(text: &str) -> Result<(), DispatchError> {
    let mut clipboard =
        arboard::Clipboard::new().map_err(|e| DispatchError::Clipboard(anyhow::anyhow!(e)))?;
    clipboard
        .set_text(text)
        .map_err(|e| DispatchError::Clipboard(anyhow::anyhow!(e)))?;
    tracing::info!(chars = text.chars().count(), "copied to clipboard");
    Ok(())
}

/// Run a command the user explicitly confirmed.
///
/// The blocklist runs a second time on the exact confirmed string. The child
/// gets a null stdin (never an interactive terminal); stdout and stderr are
/// captured separately and the exit code preserved.
pub async fn run_confirmed_command(command: &str) -> Result<CommandOutput, DispatchError> {
    let check = safety::is_command_safe(command);
    if !check.safe {
        return Err(DispatchError::CommandBlocked {
            reason: check.reason.unwrap_or_else(|| "unsafe command".to_string()),
        });
    }

    tracing::info!(command, "running confirmed command");

    let output = tokio::process::Command::new("sh")
        .arg("-c")
        .arg(command)
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .output()
        .await
        .map_err(DispatchError::ShellSpawn)?;

    let result = CommandOutput {
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        exit_code: output.status.code().unwrap_or(-1),
    };

    if result.exit_code == 0 {
        tracing::info!(exit_code = result.exit_code, "confirmed command succeeded");
    } else {
        tracing::warn!(exit_code = result.exit_code, stderr = %result.stderr, "confirmed command failed");
    }
    Ok(result)
}

/// Body of the first fenced code block, if any. The fence's language tag
/// line is dropped.
fn extract_first_code_block(text: &str) -> Option<String> {
    let open = text.find("```")?;
    let after_open = &text[open + 3..];
    let body_start = after_open.find('\n')? + 1;
    let body = &after_open[body_start..];
    let close = body.find("```")?;
    let block = body[..close].trim_end_matches('\n');
    if block.is_empty() {
        None
    } else {
        Some(block.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::types::ActionResultMetadata;

    fn dispatcher(dir: &std::path::Path) -> ResultDispatcher {
        ResultDispatcher::with_desktop_dir(dir.to_path_buf())
    }

    #[test]
    fn text_result_extracts_fix_block() {
        let tmp = tempfile::tempdir().unwrap();
        let result = ActionResult {
            status: ResultStatus::Success,
            action_id: "suggest_fix".into(),
            result: ActionResultBody::Text {
                text: "Change the import:\n```python\nimport pandas as pd\n```\nThat's it.".into(),
            },
            metadata: Some(ActionResultMetadata::default()),
        };
        match dispatcher(tmp.path()).dispatch(&result).unwrap() {
            DispatchOutcome::Text { copy_fix, .. } => {
                assert_eq!(copy_fix.as_deref(), Some("import pandas as pd"));
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn file_result_lands_in_desktop_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let result = ActionResult {
            status: ResultStatus::Success,
            action_id: "export_csv".into(),
            result: ActionResultBody::File {
                file_name: "export.csv".into(),
                text: "a,b\n1,2\n".into(),
                mime_type: Some("text/csv".into()),
            },
            metadata: None,
        };
        match dispatcher(tmp.path()).dispatch(&result).unwrap() {
            DispatchOutcome::FileSaved { path } => {
                assert!(path.ends_with("export.csv"));
                assert_eq!(std::fs::read_to_string(path).unwrap(), "a,b\n1,2\n");
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn traversal_filename_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let err = dispatcher(tmp.path())
            .write_to_desktop("../evil.sh", "boom")
            .unwrap_err();
        assert!(matches!(err, DispatchError::UnsafePath(_)));
    }

    #[test]
    fn safe_command_becomes_confirmation_outcome() {
        let tmp = tempfile::tempdir().unwrap();
        let result = ActionResult {
            status: ResultStatus::NeedsConfirmation,
            action_id: "suggest_fix".into(),
            result: ActionResultBody::Command {
                command: "pip install pandas".into(),
                text: Some("Installs the missing module.".into()),
            },
            metadata: None,
        };
        match dispatcher(tmp.path()).dispatch(&result).unwrap() {
            DispatchOutcome::NeedsConfirmation { command, rationale } => {
                assert_eq!(command, "pip install pandas");
                assert!(rationale.unwrap().contains("missing module"));
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn blocked_command_never_reaches_confirmation() {
        let tmp = tempfile::tempdir().unwrap();
        let result = ActionResult {
            status: ResultStatus::NeedsConfirmation,
            action_id: "suggest_fix".into(),
            result: ActionResultBody::Command { command: "rm -rf /".into(), text: None },
            metadata: None,
        };
        match dispatcher(tmp.path()).dispatch(&result).unwrap() {
            DispatchOutcome::Error { message } => {
                assert!(message.contains("Command blocked"));
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[tokio::test]
    async fn confirmed_command_captures_streams_and_exit_code() {
        let out = run_confirmed_command("echo hello; echo oops >&2; exit 3")
            .await
            .unwrap();
        assert_eq!(out.stdout.trim(), "hello");
        assert_eq!(out.stderr.trim(), "oops");
        assert_eq!(out.exit_code, 3);
    }

    #[tokio::test]
    async fn confirmed_command_rechecks_blocklist() {
        let err = run_confirmed_command("rm -rf /").await.unwrap_err();
        assert!(matches!(err, DispatchError::CommandBlocked { .. }));
    }

    #[test]
    fn no_code_block_means_no_copy_fix() {
        assert!(extract_first_code_block("plain explanation").is_none());
        assert_eq!(
            extract_first_code_block("```sh\npip install x\n``` and more"),
            Some("pip install x".to_string())
        );
    }
}
