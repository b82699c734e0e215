//! Host command facade.
//!
//! Every operation the UI collaborator can invoke lives here as an async
//! method returning a serializable value or a structured error. Window
//! lifecycle (`close_*`) belongs to the render shell, not the core.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, Mutex};

use crate::config::{AppConfig, ProviderSettings};
use crate::dispatch::{self, CommandOutput, DispatchOutcome, ResultDispatcher};
use crate::error::{ApprovalError, ConfigError, PipelineError};
use crate::events::EventsTx;
use crate::llm::provider::{resolve_provider, Provider, ProviderRequest};
use crate::llm::types::ActionMenu;
use crate::mcp::approval::ApprovalLedger;
use crate::mcp::loader::{self, PendingApprovals, PendingPluginInfo};
use crate::mcp::{builtins, registry, ToolRegistry};
use crate::ocr::{MenuAnchor, OcrEngine, RecognitionLevel, SnipContext, SnipRect};
use crate::pipeline::text::TextCommandOutcome;
use crate::pipeline::{Orchestrator, PipelineSession};

/// Provider info for the settings panel.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderView {
    pub id: String,
    pub name: String,
    pub configured: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfigView {
    pub active: String,
    pub providers: Vec<ProviderView>,
}

pub struct Host {
    cfg: AppConfig,
    settings: Mutex<ProviderSettings>,
    registry: Arc<ToolRegistry>,
    ledger: ApprovalLedger,
    pending: PendingApprovals,
    orchestrator: Orchestrator,
    ocr: Option<Arc<dyn OcrEngine>>,
    exit_tx: mpsc::UnboundedSender<String>,
    session: Mutex<Option<PipelineSession>>,
}

impl Host {
    pub fn new(
        cfg: AppConfig,
        ocr: Option<Arc<dyn OcrEngine>>,
        events: EventsTx,
        dispatcher: ResultDispatcher,
    ) -> Result<Arc<Self>, ConfigError> {
        let config_root = cfg.config_root()?;
        let settings = ProviderSettings::load(&config_root);
        let ledger = ApprovalLedger::open(&config_root);
        let registry = Arc::new(ToolRegistry::new());

        let (exit_tx, exit_rx) = mpsc::unbounded_channel();
        registry::spawn_exit_listener(Arc::clone(&registry), exit_rx);

        let orchestrator =
            Orchestrator::new(Arc::clone(&registry), dispatcher, events, cfg.clone());

        Ok(Arc::new(Self {
            cfg,
            settings: Mutex::new(settings),
            registry,
            ledger,
            pending: PendingApprovals::default(),
            orchestrator,
            ocr,
            exit_tx,
            session: Mutex::new(None),
        }))
    }

    /// Startup: register builtins, scan and load plugins.
    pub async fn start(&self) {
        builtins::register_builtins(&self.registry).await;
        loader::load_plugins(
            &self.cfg,
            &self.registry,
            &self.ledger,
            &self.pending,
            &self.exit_tx,
        )
        .await;
    }

    /// App exit: drain plugin processes.
    pub async fn shutdown(&self) {
        self.registry.shutdown_all().await;
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    async fn provider(&self) -> Arc<dyn Provider> {
        let settings = self.settings.lock().await;
        resolve_provider(&self.cfg, &settings)
    }

    // ── provider settings ───────────────────────────────────────────

    pub async fn get_provider_config(&self) -> ProviderConfigView {
        let settings = self.settings.lock().await;
        let active = settings
            .active
            .clone()
            .unwrap_or_else(|| self.cfg.provider.active.clone());
        ProviderConfigView {
            active,
            providers: vec![
                ProviderView {
                    id: "anthropic".into(),
                    name: "Claude Haiku — fast cloud classification".into(),
                    configured: settings.api_key("anthropic").is_some(),
                },
                ProviderView {
                    id: "local".into(),
                    name: "Local — offline, free, rule-based".into(),
                    configured: true,
                },
            ],
        }
    }

    pub async fn set_active_provider(&self, provider_id: &str) -> Result<(), ConfigError> {
        let mut settings = self.settings.lock().await;
        settings.active = Some(provider_id.to_string());
        settings.save(&self.cfg.config_root()?)
    }

    pub async fn save_api_key(&self, provider_id: &str, key: &str) -> Result<(), ConfigError> {
        let mut settings = self.settings.lock().await;
        settings.api_keys.insert(provider_id.to_string(), key.to_string());
        settings.save(&self.cfg.config_root()?)
    }

    /// Minimal end-to-end check that the active provider answers.
    pub async fn test_provider(&self) -> Result<String, PipelineError> {
        let provider = self.provider().await;
        let (tx, mut rx) = tokio::sync::mpsc::channel(16);
        let request = ProviderRequest {
            system_prompt: "Reply with the single word: ok".into(),
            user_message: "ping".into(),
            max_tokens: 16,
        };
        let label = provider.label().to_string();
        provider.stream_classify(request, tx).await?;
        let mut reply = String::new();
        while let Some(chunk) = rx.recv().await {
            reply.push_str(&chunk);
        }
        Ok(format!("{label}: responded ({} chars)", reply.len()))
    }

    // ── pipeline entry points ───────────────────────────────────────

    /// Snip pipeline: OCR the region, then stream classify. Events carry
    /// the skeleton and complete menu; the session is retained for the
    /// follow-up `execute_action`.
    pub async fn process_snip(
        &self,
        rect: SnipRect,
        anchor: MenuAnchor,
    ) -> Result<(), PipelineError> {
        let engine = self.ocr.as_ref().ok_or(PipelineError::Ocr(
            crate::error::OcrError::NoCapture,
        ))?;

        let started = std::time::Instant::now();
        let outcome = engine.recognize(rect, RecognitionLevel::Fast)?;
        tracing::info!(
            chars = outcome.char_count(),
            confidence = outcome.confidence,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "ocr complete"
        );

        let snip = SnipContext {
            text: outcome.text,
            confidence: outcome.confidence,
            recognition_level: RecognitionLevel::Fast,
            platform: self.cfg.platform.clone(),
            anchor,
            rect: Some(rect),
        };

        let mut session = PipelineSession::new(snip);
        let provider = self.provider().await;
        let result = self.orchestrator.classify(&provider, &mut session).await;
        *self.session.lock().await = Some(session);
        result
    }

    /// Typed-command pipeline: same classify → execute flow, OCR skipped.
    pub async fn execute_text_command(
        &self,
        text: &str,
    ) -> Result<TextCommandOutcome, PipelineError> {
        let provider = self.provider().await;
        let outcome = self.orchestrator.run_text_command(&provider, text).await?;
        Ok(outcome)
    }

    /// Execute a clicked action against the stored session.
    pub async fn execute_action(
        &self,
        action_id: &str,
    ) -> Result<DispatchOutcome, PipelineError> {
        let mut slot = self.session.lock().await;
        let session = slot.as_mut().ok_or(PipelineError::NoSession)?;
        let provider = self.provider().await;
        self.orchestrator
            .execute(&provider, session, action_id, self.ocr.as_deref())
            .await
    }

    /// Abort the current session: outstanding streams lose their receiver
    /// and the menu is unpublished. Plugin processes are untouched.
    pub async fn cancel_session(&self) {
        if let Some(session) = self.session.lock().await.take() {
            tracing::info!(session_id = %session.id, phase = session.phase.as_str(), "session cancelled");
        }
    }

    // ── session accessors ───────────────────────────────────────────

    pub async fn get_ocr_text(&self) -> Result<String, PipelineError> {
        let slot = self.session.lock().await;
        slot.as_ref()
            .map(|s| s.snip.text.clone())
            .ok_or(PipelineError::NoSession)
    }

    pub async fn get_action_menu(&self) -> Result<ActionMenu, PipelineError> {
        let slot = self.session.lock().await;
        slot.as_ref()
            .and_then(|s| s.menu.clone())
            .ok_or(PipelineError::NoSession)
    }

    // ── direct result handlers ──────────────────────────────────────

    pub async fn run_confirmed_command(
        &self,
        command: &str,
    ) -> Result<CommandOutput, PipelineError> {
        Ok(dispatch::run_confirmed_command(command).await?)
    }

    pub fn copy_to_clipboard(&self, text: &str) -> Result<(), PipelineError> {
        Ok(dispatch::copy_to_clipboard(text)?)
    }

    pub fn write_to_desktop(&self, filename: &str, content: &str) -> Result<String, PipelineError> {
        Ok(self.orchestrator.dispatcher.write_to_desktop(filename, content)?)
    }

    pub fn write_file_to_path(&self, path: &str, content: &str) -> Result<String, PipelineError> {
        Ok(self.orchestrator.dispatcher.write_file_to_path(path, content)?)
    }

    // ── plugin approval flow ────────────────────────────────────────

    pub async fn get_pending_approvals(&self) -> Vec<PendingPluginInfo> {
        self.pending.list().await
    }

    /// Record the user's decision. Approval loads the plugin immediately;
    /// denial is persisted so the plugin stays off next launch.
    pub async fn approve_plugin(
        &self,
        plugin_id: &str,
        approved: bool,
    ) -> Result<(), PipelineError> {
        let entry = self
            .pending
            .take(plugin_id)
            .await
            .ok_or_else(|| ApprovalError::NotPending(plugin_id.to_string()))?;

        self.ledger.record(&entry.manifest, approved).await?;

        if approved {
            loader::load_approved_plugin(
                &entry.manifest,
                &entry.dir,
                &self.cfg,
                &self.registry,
                &self.exit_tx,
            )
            .await?;
            tracing::info!(plugin_id, "plugin approved and loaded");
        } else {
            tracing::info!(plugin_id, "plugin denied");
        }
        Ok(())
    }
}
