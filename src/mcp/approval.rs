//! Plugin approval persistence.
//!
//! One JSON document under the config root, keyed by plugin id. Approvals
//! are bound to a SHA-256 digest of the manifest's permissions block: a
//! plugin that widens its permissions no longer matches and re-prompts.
//! The store lives apart from the plugin directories so approvals survive
//! plugin updates.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

use crate::error::ApprovalError;
use crate::mcp::manifest::{Permissions, PluginManifest};

pub const APPROVALS_FILE: &str = "plugin-approvals.json";

/// Standing of a plugin against the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalStatus {
    Approved,
    Denied,
    NeedsApproval,
    PermissionsChanged,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRecord {
    pub approved: bool,
    pub approved_at: String,
    pub permissions_hash: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApprovalStore {
    #[serde(flatten)]
    pub records: HashMap<String, ApprovalRecord>,
}

impl ApprovalStore {
    /// Check a manifest against the store. A record with a stale hash counts
    /// as not approved regardless of the stored decision.
    pub fn check(&self, manifest: &PluginManifest) -> ApprovalStatus {
        let record = match self.records.get(&manifest.id) {
            Some(r) => r,
            None => return ApprovalStatus::NeedsApproval,
        };
        if record.permissions_hash != hash_permissions(&manifest.permissions) {
            return ApprovalStatus::PermissionsChanged;
        }
        if record.approved {
            ApprovalStatus::Approved
        } else {
            ApprovalStatus::Denied
        }
    }
}

/// SHA-256 over the canonical serde serialization of the permissions block.
/// Field order is fixed by the struct definition, so the digest is stable.
pub fn hash_permissions(permissions: &Permissions) -> String {
    let json = serde_json::to_string(permissions).unwrap_or_default();
    let digest = Sha256::digest(json.as_bytes());
    format!("sha256:{digest:x}")
}

/// Serialized access to the approval file. All writes go through one mutex
/// and land via write-to-temp-then-rename.
pub struct ApprovalLedger {
    path: PathBuf,
    store: Mutex<ApprovalStore>,
}

impl ApprovalLedger {
    pub fn open(config_root: &Path) -> Self {
        let path = config_root.join(APPROVALS_FILE);
        let store = match std::fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_default(),
            Err(_) => ApprovalStore::default(),
        };
        Self { path, store: Mutex::new(store) }
    }

    pub async fn snapshot(&self) -> ApprovalStore {
        self.store.lock().await.clone()
    }

    pub async fn check(&self, manifest: &PluginManifest) -> ApprovalStatus {
        self.store.lock().await.check(manifest)
    }

    /// Record a decision and persist it. Denials are written through too so
    /// a denied plugin stays denied across launches.
    pub async fn record(
        &self,
        manifest: &PluginManifest,
        approved: bool,
    ) -> Result<(), ApprovalError> {
        let mut store = self.store.lock().await;
        store.records.insert(
            manifest.id.clone(),
            ApprovalRecord {
                approved,
                approved_at: chrono::Utc::now().to_rfc3339(),
                permissions_hash: hash_permissions(&manifest.permissions),
            },
        );
        self.persist(&store)
    }

    fn persist(&self, store: &ApprovalStore) -> Result<(), ApprovalError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ApprovalError::Io {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
        let json = serde_json::to_string_pretty(store).map_err(ApprovalError::Serialize)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)
            .map_err(|e| ApprovalError::Io { path: tmp.display().to_string(), source: e })?;
        std::fs::rename(&tmp, &self.path)
            .map_err(|e| ApprovalError::Io { path: self.path.display().to_string(), source: e })
    }
}
