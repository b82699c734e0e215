//! Plugin loader: scan the plugins directory, gate on approvals, spawn
//! approved plugins, queue the rest for the consent flow.
//!
//! Each plugin loads independently; one failure never blocks the others or
//! aborts startup.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, Mutex};

use crate::config::AppConfig;
use crate::error::McpError;
use crate::mcp::approval::{ApprovalLedger, ApprovalStatus};
use crate::mcp::client::{spawn_spec_for, PluginClient};
use crate::mcp::manifest::{self, Permissions, PluginManifest};
use crate::mcp::registry::ToolRegistry;
use crate::mcp::risk::{calculate_risk, RiskLevel};

/// A plugin waiting on a user decision.
pub struct PendingEntry {
    pub manifest: PluginManifest,
    pub dir: PathBuf,
    pub is_update: bool,
}

/// Ordered queue of plugins awaiting approval, consumed one at a time by the
/// approval UI.
#[derive(Default)]
pub struct PendingApprovals {
    queue: Mutex<Vec<PendingEntry>>,
}

/// What the approval prompt renders for one pending plugin.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingPluginInfo {
    pub id: String,
    pub name: String,
    pub version: String,
    pub description: String,
    pub permissions: Permissions,
    pub risk_level: RiskLevel,
    /// True when an earlier approval went stale (permissions changed).
    pub is_update: bool,
}

impl PendingApprovals {
    pub async fn push(&self, entry: PendingEntry) {
        self.queue.lock().await.push(entry);
    }

    pub async fn list(&self) -> Vec<PendingPluginInfo> {
        self.queue
            .lock()
            .await
            .iter()
            .map(|e| PendingPluginInfo {
                id: e.manifest.id.clone(),
                name: e.manifest.name.clone(),
                version: e.manifest.version.clone(),
                description: e.manifest.description.clone(),
                permissions: e.manifest.permissions.clone(),
                risk_level: calculate_risk(&e.manifest.permissions),
                is_update: e.is_update,
            })
            .collect()
    }

    /// Remove and return the entry for a plugin id, if queued.
    pub async fn take(&self, plugin_id: &str) -> Option<PendingEntry> {
        let mut queue = self.queue.lock().await;
        let idx = queue.iter().position(|e| e.manifest.id == plugin_id)?;
        Some(queue.remove(idx))
    }
}

/// Scan and load all plugins at startup.
pub async fn load_plugins(
    cfg: &AppConfig,
    registry: &Arc<ToolRegistry>,
    ledger: &ApprovalLedger,
    pending: &PendingApprovals,
    exit_tx: &mpsc::UnboundedSender<String>,
) {
    let dir = match cfg.plugins_dir() {
        Ok(d) => d,
        Err(e) => {
            tracing::warn!(error = %e, "could not resolve plugins directory, skipping plugins");
            return;
        }
    };

    if !dir.exists() {
        tracing::info!(dir = %dir.display(), "no plugins directory, skipping");
        return;
    }

    let entries = match std::fs::read_dir(&dir) {
        Ok(e) => e,
        Err(e) => {
            tracing::warn!(dir = %dir.display(), error = %e, "failed to read plugins directory");
            return;
        }
    };

    let mut loaded = 0u32;
    let mut queued = 0u32;

    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }

        let manifest = match manifest::load_manifest(&path) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(
                    dir = %path.display(),
                    error = %e,
                    "skipping plugin with invalid manifest"
                );
                continue;
            }
        };

        match ledger.check(&manifest).await {
            ApprovalStatus::Approved => {
                match load_approved_plugin(&manifest, &path, cfg, registry, exit_tx).await {
                    Ok(count) => {
                        loaded += 1;
                        tracing::info!(
                            plugin_id = %manifest.id,
                            version = %manifest.version,
                            tools = count,
                            "plugin loaded"
                        );
                    }
                    Err(e) => {
                        tracing::warn!(plugin_id = %manifest.id, error = %e, "plugin load failed")
                    }
                }
            }
            ApprovalStatus::NeedsApproval => {
                queued += 1;
                pending
                    .push(PendingEntry { manifest, dir: path, is_update: false })
                    .await;
            }
            ApprovalStatus::PermissionsChanged => {
                queued += 1;
                tracing::info!(
                    plugin_id = %manifest.id,
                    "permissions changed since approval, re-prompting"
                );
                pending
                    .push(PendingEntry { manifest, dir: path, is_update: true })
                    .await;
            }
            ApprovalStatus::Denied => {
                tracing::info!(plugin_id = %manifest.id, "plugin denied, not loading");
            }
        }
    }

    tracing::info!(loaded, queued, "plugin scan complete");
}

/// Spawn, handshake, discover, and register one approved plugin.
pub async fn load_approved_plugin(
    manifest: &PluginManifest,
    plugin_dir: &Path,
    cfg: &AppConfig,
    registry: &Arc<ToolRegistry>,
    exit_tx: &mpsc::UnboundedSender<String>,
) -> Result<u32, McpError> {
    let spec = spawn_spec_for(
        manifest,
        plugin_dir,
        Duration::from_secs(cfg.limits.mcp_call_timeout_secs),
        Duration::from_secs(cfg.limits.mcp_shutdown_grace_secs),
    )?;

    let client = PluginClient::spawn(spec, exit_tx.clone())?;
    client.initialize().await?;
    let tools = client.list_tools().await?;
    let count = tools.len() as u32;

    registry.register_plugin(&manifest.id, client, tools).await;
    Ok(count)
}
