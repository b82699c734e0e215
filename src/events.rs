use std::collections::HashMap;

use serde::Serialize;
use tokio::sync::mpsc;

use crate::llm::types::{ActionMenu, ActionMenuSkeleton, ActionResult};

/// Events published to the UI collaborator while a session progresses.
///
/// The skeleton event always precedes the complete event for the same
/// session; nothing is guaranteed across sessions.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum PipelineEvent {
    ActionMenuSkeleton {
        session_id: String,
        skeleton: ActionMenuSkeleton,
    },
    ActionMenuComplete {
        session_id: String,
        menu: ActionMenu,
        annotations: Vec<String>,
    },
    RedactionApplied {
        session_id: String,
        counts: HashMap<String, usize>,
    },
    ExecuteComplete {
        session_id: String,
        result: ActionResult,
    },
    SessionFailed {
        session_id: String,
        phase: String,
        message: String,
    },
}

/// Clone-able handle for publishing pipeline events.
///
/// Headless runs (CLI, tests without a listener) use `EventsTx::disabled()`;
/// sends become no-ops. A closed receiver is also a no-op so a vanished UI
/// never wedges the pipeline.
#[derive(Clone, Default)]
pub struct EventsTx {
    tx: Option<mpsc::UnboundedSender<PipelineEvent>>,
}

impl EventsTx {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<PipelineEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn send(&self, event: PipelineEvent) {
        if let Some(tx) = &self.tx {
            if tx.send(event).is_err() {
                tracing::debug!("pipeline event listener closed, event dropped");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_tx_is_a_noop() {
        let tx = EventsTx::disabled();
        tx.send(PipelineEvent::SessionFailed {
            session_id: "s".into(),
            phase: "classify".into(),
            message: "x".into(),
        });
    }

    #[tokio::test]
    async fn events_arrive_in_send_order() {
        let (tx, mut rx) = EventsTx::channel();
        tx.send(PipelineEvent::ActionMenuSkeleton {
            session_id: "s".into(),
            skeleton: ActionMenuSkeleton {
                content_type: "error".into(),
                summary: "a".into(),
            },
        });
        tx.send(PipelineEvent::SessionFailed {
            session_id: "s".into(),
            phase: "classify".into(),
            message: "b".into(),
        });

        assert!(matches!(
            rx.recv().await.unwrap(),
            PipelineEvent::ActionMenuSkeleton { .. }
        ));
        assert!(matches!(
            rx.recv().await.unwrap(),
            PipelineEvent::SessionFailed { .. }
        ));
    }
}
