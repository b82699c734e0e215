//! Pipeline orchestrator: the snip-to-action state machine.
//!
//! One session walks `ocr → classify → await_click → execute → done`, with
//! `failed` reachable from classify and execute. Classify streams and
//! publishes a skeleton checkpoint before the complete menu; execute waits
//! for full text, safety-checks it, and hands off to the dispatcher.

pub mod text;

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::config::AppConfig;
use crate::dispatch::{DispatchOutcome, ResultDispatcher};
use crate::error::{LlmError, PipelineError};
use crate::events::{EventsTx, PipelineEvent};
use crate::heuristics;
use crate::llm::plugin_args;
use crate::llm::prompts;
use crate::llm::prompts_execute;
use crate::llm::streaming;
use crate::llm::types::{
    ActionMenu, ActionMenuSkeleton, ActionResult, ActionResultBody, ResultStatus, TokenUsage,
};
use crate::llm::{Provider, ProviderRequest};
use crate::mcp::{self, ToolRegistry};
use crate::ocr::{OcrEngine, RecognitionLevel, SnipContext};
use crate::safety;

/// Where a session currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Ocr,
    Classify,
    AwaitClick,
    Execute,
    Done,
    Failed,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Ocr => "ocr",
            Phase::Classify => "classify",
            Phase::AwaitClick => "await_click",
            Phase::Execute => "execute",
            Phase::Done => "done",
            Phase::Failed => "failed",
        }
    }
}

/// Per-snip (or per-typed-command) pipeline state, owned by the
/// orchestrating task.
pub struct PipelineSession {
    pub id: String,
    pub snip: SnipContext,
    pub phase: Phase,
    pub menu: Option<ActionMenu>,
    pub annotations: Vec<String>,
    pub selected_action: Option<String>,
    pub last_result: Option<ActionResult>,
    pub usage: TokenUsage,
}

impl PipelineSession {
    pub fn new(snip: SnipContext) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            snip,
            phase: Phase::Ocr,
            menu: None,
            annotations: Vec::new(),
            selected_action: None,
            last_result: None,
            usage: TokenUsage::default(),
        }
    }
}

/// Actions handled entirely by the orchestrator, no second LLM call.
///
/// The UI could short-circuit these, but routing them through here keeps the
/// safety and audit story uniform.
fn is_local_action(action_id: &str) -> bool {
    matches!(action_id, "copy_text" | "search_web")
}

/// Code-fix actions re-run OCR at the accurate level before executing.
fn needs_accurate_reocr(action_id: &str) -> bool {
    matches!(
        action_id,
        "suggest_fix" | "fix_error" | "fix_syntax" | "fix_code" | "format_code"
    )
}

pub struct Orchestrator {
    pub registry: Arc<ToolRegistry>,
    pub dispatcher: ResultDispatcher,
    pub events: EventsTx,
    pub cfg: AppConfig,
}

impl Orchestrator {
    pub fn new(
        registry: Arc<ToolRegistry>,
        dispatcher: ResultDispatcher,
        events: EventsTx,
        cfg: AppConfig,
    ) -> Self {
        Self { registry, dispatcher, events, cfg }
    }

    /// CLASSIFY phase. Always leaves the session with a valid menu
    /// (fallback on any failure) unless the snip itself was empty.
    pub async fn classify(
        &self,
        provider: &Arc<dyn Provider>,
        session: &mut PipelineSession,
    ) -> Result<(), PipelineError> {
        if session.snip.text.trim().is_empty() {
            session.phase = Phase::Failed;
            self.events.send(PipelineEvent::SessionFailed {
                session_id: session.id.clone(),
                phase: Phase::Ocr.as_str().to_string(),
                message: "no text recognized in the selected region".to_string(),
            });
            return Err(PipelineError::EmptySnip);
        }

        session.phase = Phase::Classify;
        let started = std::time::Instant::now();

        // Redaction gates on the provider capability, never on its identity.
        let prompt_text = if provider.is_remote() {
            let outcome = safety::redact_sensitive_data(&session.snip.text);
            if outcome.any() {
                session
                    .annotations
                    .push(format!("Sensitive data redacted: {}", outcome.labels().join(", ")));
                self.events.send(PipelineEvent::RedactionApplied {
                    session_id: session.id.clone(),
                    counts: outcome.counts.clone(),
                });
            }
            outcome.cleaned_text
        } else {
            session.snip.text.clone()
        };

        let flags = heuristics::analyze(&prompt_text);
        let plugin_tools = self.registry.tools_for_prompt().await;
        let request = ProviderRequest {
            system_prompt: prompts::CLASSIFY_SYSTEM_PROMPT.to_string(),
            user_message: prompts::build_classify_message(
                &prompt_text,
                session.snip.confidence,
                flags,
                &session.snip.platform,
                "unknown",
                &plugin_tools,
            ),
            max_tokens: self.cfg.provider.classify_max_tokens,
        };

        let (tx, mut rx) = mpsc::channel::<String>(64);
        let stream_provider = Arc::clone(provider);
        let stream_task =
            tokio::spawn(async move { stream_provider.stream_classify(request, tx).await });

        let mut accumulated = String::new();
        let mut skeleton_emitted = false;
        while let Some(chunk) = rx.recv().await {
            accumulated.push_str(&chunk);
            if !skeleton_emitted {
                if let Some((content_type, summary)) =
                    streaming::try_extract_skeleton(&accumulated)
                {
                    tracing::info!(
                        session_id = %session.id,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "skeleton ready"
                    );
                    self.events.send(PipelineEvent::ActionMenuSkeleton {
                        session_id: session.id.clone(),
                        skeleton: ActionMenuSkeleton { content_type, summary },
                    });
                    skeleton_emitted = true;
                }
            }
        }

        let stream_result: Result<TokenUsage, LlmError> = match stream_task.await {
            Ok(res) => res,
            Err(e) => Err(LlmError::BadJson(format!("stream task panicked: {e}"))),
        };

        let mut menu = match stream_result {
            Ok(usage) => {
                session.usage = usage;
                let json = streaming::strip_code_fences(&accumulated);
                match serde_json::from_str::<ActionMenu>(&json) {
                    Ok(menu) => menu,
                    Err(e) => {
                        tracing::warn!(
                            session_id = %session.id,
                            error = %e,
                            head = %json.chars().take(200).collect::<String>(),
                            "classify response was not a valid menu, using fallback"
                        );
                        ActionMenu::fallback()
                    }
                }
            }
            Err(e) => {
                tracing::error!(session_id = %session.id, error = %e, "classify stream failed");
                if e.is_transient() {
                    session
                        .annotations
                        .push("Provider unreachable — showing basic actions. Try again.".into());
                }
                ActionMenu::fallback()
            }
        };

        // Menu invariant: only offer ids the registry can actually dispatch.
        let mut known = Vec::with_capacity(menu.actions.len());
        for action in menu.actions.drain(..) {
            if self.registry.is_known_action(&action.id).await {
                known.push(action);
            } else {
                tracing::debug!(action_id = %action.id, "dropping unregistered action from menu");
            }
        }
        menu.actions = known;
        menu.normalize();

        tracing::info!(
            session_id = %session.id,
            content_type = %menu.content_type,
            actions = menu.actions.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            tokens = session.usage.total(),
            "classify complete"
        );

        self.events.send(PipelineEvent::ActionMenuComplete {
            session_id: session.id.clone(),
            menu: menu.clone(),
            annotations: session.annotations.clone(),
        });
        session.menu = Some(menu);
        session.phase = Phase::AwaitClick;
        Ok(())
    }

    /// EXECUTE phase for a clicked action.
    pub async fn execute(
        &self,
        provider: &Arc<dyn Provider>,
        session: &mut PipelineSession,
        action_id: &str,
        ocr: Option<&dyn OcrEngine>,
    ) -> Result<DispatchOutcome, PipelineError> {
        if session.phase != Phase::AwaitClick {
            return Err(PipelineError::WrongPhase {
                phase: session.phase.as_str(),
                expected: Phase::AwaitClick.as_str(),
            });
        }
        if !self.registry.is_known_action(action_id).await {
            return Err(PipelineError::UnknownAction(action_id.to_string()));
        }

        session.phase = Phase::Execute;
        session.selected_action = Some(action_id.to_string());

        let result = if is_local_action(action_id) {
            local_action_result(action_id, &session.snip.text)
        } else if self.registry.is_plugin_action(action_id).await {
            self.execute_plugin(provider, session, action_id).await
        } else {
            self.execute_llm(provider, session, action_id, ocr).await?
        };

        let outcome = self.dispatcher.dispatch(&result)?;
        self.events.send(PipelineEvent::ExecuteComplete {
            session_id: session.id.clone(),
            result: result.clone(),
        });
        session.last_result = Some(result);
        session.phase = Phase::Done;
        Ok(outcome)
    }

    /// Dispatch through MCP, bridging free text into structured args when
    /// the tool's schema calls for it.
    async fn execute_plugin(
        &self,
        provider: &Arc<dyn Provider>,
        session: &PipelineSession,
        action_id: &str,
    ) -> ActionResult {
        let tool = match self.registry.resolve_action(action_id).await {
            Some(qname) => self.registry.get_tool(&qname).await,
            None => None,
        };

        let arguments = match tool.as_ref().and_then(|t| t.input_schema.as_ref()) {
            Some(schema) if !plugin_args::is_trivial_schema(schema) => {
                let tool = tool.as_ref().expect("schema implies tool");
                match plugin_args::generate_plugin_args(
                    provider,
                    &tool.name,
                    &tool.description,
                    schema,
                    &session.snip.text,
                    self.cfg.provider.execute_max_tokens,
                )
                .await
                {
                    Ok(args) => args,
                    Err(e) => {
                        tracing::warn!(action_id, error = %e, "args bridge failed, passing raw text");
                        serde_json::json!({ "text": session.snip.text })
                    }
                }
            }
            _ => serde_json::json!({ "text": session.snip.text }),
        };

        mcp::execute_plugin_tool(&self.registry, action_id, arguments).await
    }

    /// Second LLM call: stream fully, parse strictly, safety-check.
    async fn execute_llm(
        &self,
        provider: &Arc<dyn Provider>,
        session: &mut PipelineSession,
        action_id: &str,
        ocr: Option<&dyn OcrEngine>,
    ) -> Result<ActionResult, PipelineError> {
        // Code fixes need every bracket: re-recognize at accurate level when
        // the classify pass used the fast one.
        let mut exec_text = session.snip.text.clone();
        if needs_accurate_reocr(action_id)
            && session.snip.recognition_level == RecognitionLevel::Fast
        {
            if let (Some(engine), Some(rect)) = (ocr, session.snip.rect) {
                match engine.recognize(rect, RecognitionLevel::Accurate) {
                    Ok(outcome) => {
                        tracing::info!(
                            session_id = %session.id,
                            chars = outcome.char_count(),
                            "re-recognized at accurate level"
                        );
                        exec_text = outcome.text;
                    }
                    Err(e) => {
                        tracing::warn!(session_id = %session.id, error = %e, "accurate re-ocr failed, using fast text")
                    }
                }
            }
        }

        let prompt_text = if provider.is_remote() {
            let outcome = safety::redact_sensitive_data(&exec_text);
            if outcome.any() {
                self.events.send(PipelineEvent::RedactionApplied {
                    session_id: session.id.clone(),
                    counts: outcome.counts.clone(),
                });
            }
            outcome.cleaned_text
        } else {
            exec_text
        };

        let request = ProviderRequest {
            system_prompt: prompts_execute::EXECUTE_SYSTEM_PROMPT.to_string(),
            user_message: prompts_execute::build_execute_message(
                action_id,
                &prompt_text,
                &session.snip.platform,
                &self.cfg.detected_shell,
            ),
            max_tokens: self.cfg.provider.execute_max_tokens,
        };

        // No progressive skeleton here: the user clicked and expects a
        // short wait for the complete result.
        let (tx, mut rx) = mpsc::channel::<String>(64);
        let stream_provider = Arc::clone(provider);
        let stream_task =
            tokio::spawn(async move { stream_provider.stream_execute(request, tx).await });

        let mut accumulated = String::new();
        while let Some(chunk) = rx.recv().await {
            accumulated.push_str(&chunk);
        }

        match stream_task.await {
            Ok(Ok(usage)) => {
                session.usage.input_tokens += usage.input_tokens;
                session.usage.output_tokens += usage.output_tokens;
            }
            Ok(Err(e)) => {
                tracing::error!(session_id = %session.id, error = %e, "execute stream failed");
                return Ok(ActionResult::error(action_id, &format!("Action failed: {e}")));
            }
            Err(e) => {
                return Ok(ActionResult::error(action_id, &format!("Action failed: {e}")));
            }
        }

        let json = streaming::strip_code_fences(&accumulated);
        let mut result = match serde_json::from_str::<ActionResult>(&json) {
            Ok(r) => r,
            Err(e) => match streaming::salvage_action_result(&json, action_id) {
                Some(r) => {
                    tracing::warn!(session_id = %session.id, "salvaged truncated execute result");
                    r
                }
                None => {
                    tracing::error!(
                        session_id = %session.id,
                        error = %e,
                        head = %json.chars().take(200).collect::<String>(),
                        "execute result unparseable"
                    );
                    return Ok(ActionResult::error(
                        action_id,
                        "The model returned an unreadable result. Try again.",
                    ));
                }
            },
        };

        if let ActionResultBody::Command { command, .. } = &result.result {
            let check = safety::is_command_safe(command);
            if !check.safe {
                let reason = check.reason.unwrap_or_else(|| "unsafe command".to_string());
                tracing::warn!(
                    session_id = %session.id,
                    action_id,
                    reason = %reason,
                    "llm command rejected by blocklist"
                );
                return Ok(ActionResult::error(action_id, &format!("Command blocked: {reason}")));
            }
            // A command is only ever surfaced behind the confirmation gate.
            result.status = ResultStatus::NeedsConfirmation;
        }

        Ok(result)
    }
}

/// Results for actions the orchestrator answers itself.
fn local_action_result(action_id: &str, snip_text: &str) -> ActionResult {
    match action_id {
        "copy_text" => ActionResult {
            status: ResultStatus::Success,
            action_id: action_id.to_string(),
            result: ActionResultBody::Clipboard { content: snip_text.to_string() },
            metadata: None,
        },
        "search_web" => {
            let query: String = snip_text.split_whitespace().collect::<Vec<_>>().join("+");
            let query: String = query.chars().take(200).collect();
            ActionResult::text(
                action_id,
                format!("https://duckduckgo.com/?q={query}"),
            )
        }
        other => ActionResult::error(other, "not a local action"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phases_have_stable_names() {
        assert_eq!(Phase::AwaitClick.as_str(), "await_click");
        assert_eq!(Phase::Failed.as_str(), "failed");
    }

    #[test]
    fn local_actions_are_copy_and_search() {
        assert!(is_local_action("copy_text"));
        assert!(is_local_action("search_web"));
        assert!(!is_local_action("explain"));
    }

    #[test]
    fn copy_text_yields_clipboard_body() {
        let result = local_action_result("copy_text", "hello");
        assert!(matches!(result.result, ActionResultBody::Clipboard { .. }));
        assert_eq!(result.status, ResultStatus::Success);
    }

    #[test]
    fn search_web_encodes_spaces() {
        let result = local_action_result("search_web", "rust borrow checker");
        match result.result {
            ActionResultBody::Text { text } => assert!(text.contains("rust+borrow+checker")),
            other => panic!("unexpected body {}", other.kind()),
        }
    }
}
