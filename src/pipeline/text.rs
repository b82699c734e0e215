//! Typed-command path.
//!
//! The launcher accepts plain text instead of a snip: the input is treated
//! exactly as if OCR had produced it, OCR is skipped, and the same
//! CLASSIFY → EXECUTE pipeline runs. The classifier decides the result kind
//! and the dispatcher is unchanged.

use std::sync::Arc;

use crate::dispatch::DispatchOutcome;
use crate::error::PipelineError;
use crate::llm::Provider;
use crate::ocr::SnipContext;
use crate::pipeline::{Orchestrator, PipelineSession};

/// Outcome of one typed command: the session (menu, usage, annotations) plus
/// the dispatched result of the top-ranked action.
pub struct TextCommandOutcome {
    pub session: PipelineSession,
    pub executed_action: Option<String>,
    pub outcome: Option<DispatchOutcome>,
}

impl Orchestrator {
    /// Run a typed command end to end.
    ///
    /// Classifies the text, then executes the top-ranked action. `copy_text`
    /// is skipped during selection — echoing the user's own input back to
    /// the clipboard helps no one.
    pub async fn run_text_command(
        &self,
        provider: &Arc<dyn Provider>,
        text: &str,
    ) -> Result<TextCommandOutcome, PipelineError> {
        let snip = SnipContext::from_typed_text(text, &self.cfg.platform);
        let mut session = PipelineSession::new(snip);

        self.classify(provider, &mut session).await?;

        let chosen = session
            .menu
            .as_ref()
            .and_then(|menu| menu.actions.iter().find(|a| a.id != "copy_text"))
            .map(|a| a.id.clone());

        let Some(action_id) = chosen else {
            return Ok(TextCommandOutcome { session, executed_action: None, outcome: None });
        };

        let outcome = self.execute(provider, &mut session, &action_id, None).await?;
        Ok(TextCommandOutcome {
            session,
            executed_action: Some(action_id),
            outcome: Some(outcome),
        })
    }
}
