//! Plugin manifest parsing and validation.
//!
//! Every plugin directory carries an `omni-glass.plugin.json` next to its
//! entry point. Unknown top-level keys are ignored; unknown keys inside the
//! permissions record are rejected.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ManifestError;

pub const MANIFEST_FILENAME: &str = "omni-glass.plugin.json";

#[derive(Debug, Clone, Deserialize)]
pub struct PluginManifest {
    pub id: String,
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub description: String,
    pub runtime: Runtime,
    pub entry: String,
    #[serde(default)]
    pub permissions: Permissions,
}

/// Declared runtime. Unknown tags fail the parse, which rejects the plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Runtime {
    Node,
    Python,
    Binary,
}

/// Permission declarations. Field order is stable, which makes the serde
/// serialization canonical for hashing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Permissions {
    #[serde(default)]
    pub clipboard: bool,
    /// Allowed hosts; `["*"]` is the wildcard. `null`/absent = no network.
    #[serde(default)]
    pub network: Option<Vec<String>>,
    #[serde(default)]
    pub filesystem: Option<Vec<FsPerm>>,
    /// Environment variable names forwarded into the plugin process.
    #[serde(default)]
    pub environment: Option<Vec<String>>,
    /// Allowed shell command words; presence of the field at all is
    /// high-risk.
    #[serde(default)]
    pub shell: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FsPerm {
    pub path: String,
    /// "read" | "write" | "read-write"
    pub access: String,
}

/// Load and validate the manifest from a plugin directory.
pub fn load_manifest(plugin_dir: &Path) -> Result<PluginManifest, ManifestError> {
    let manifest_path = plugin_dir.join(MANIFEST_FILENAME);
    if !manifest_path.exists() {
        return Err(ManifestError::Missing {
            filename: MANIFEST_FILENAME,
            dir: plugin_dir.display().to_string(),
        });
    }

    let raw = std::fs::read_to_string(&manifest_path).map_err(|e| ManifestError::Io {
        path: manifest_path.display().to_string(),
        source: e,
    })?;

    let manifest: PluginManifest =
        serde_json::from_str(&raw).map_err(ManifestError::Parse)?;

    validate(&manifest, plugin_dir)?;
    Ok(manifest)
}

fn validate(m: &PluginManifest, plugin_dir: &Path) -> Result<(), ManifestError> {
    if m.id.is_empty() || !m.id.contains('.') {
        return Err(ManifestError::Validation(format!(
            "plugin id '{}' must be reverse-domain format (e.g. com.example.plugin)",
            m.id
        )));
    }
    if m.name.trim().is_empty() {
        return Err(ManifestError::Validation("plugin name must not be empty".into()));
    }
    if m.version.trim().is_empty() {
        return Err(ManifestError::Validation("plugin version must not be empty".into()));
    }
    if m.entry.contains("..") {
        return Err(ManifestError::Validation(format!(
            "plugin entry '{}' must not contain path traversal (..)",
            m.entry
        )));
    }
    let entry_path = plugin_dir.join(&m.entry);
    if !entry_path.exists() {
        return Err(ManifestError::Validation(format!(
            "plugin entry file '{}' not found in {}",
            m.entry,
            plugin_dir.display()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn setup_plugin(dir: &Path, manifest_json: &str, entry: &str) {
        fs::create_dir_all(dir).unwrap();
        fs::write(dir.join(MANIFEST_FILENAME), manifest_json).unwrap();
        fs::write(dir.join(entry), "// test").unwrap();
    }

    #[test]
    fn valid_manifest_loads() {
        let tmp = tempfile::tempdir().unwrap();
        setup_plugin(
            tmp.path(),
            r#"{
                "id": "com.example.test",
                "name": "Test Plugin",
                "version": "1.0.0",
                "runtime": "node",
                "entry": "index.js",
                "unknownTopLevel": "ignored",
                "permissions": {"clipboard": true, "network": ["api.example.com"]}
            }"#,
            "index.js",
        );
        let m = load_manifest(tmp.path()).unwrap();
        assert_eq!(m.id, "com.example.test");
        assert_eq!(m.runtime, Runtime::Node);
        assert!(m.permissions.clipboard);
        assert_eq!(m.permissions.network.as_ref().unwrap()[0], "api.example.com");
    }

    #[test]
    fn unknown_permission_key_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        setup_plugin(
            tmp.path(),
            r#"{
                "id": "com.example.test",
                "name": "Test",
                "version": "1.0.0",
                "runtime": "node",
                "entry": "index.js",
                "permissions": {"telepathy": true}
            }"#,
            "index.js",
        );
        assert!(matches!(load_manifest(tmp.path()), Err(ManifestError::Parse(_))));
    }

    #[test]
    fn unknown_runtime_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        setup_plugin(
            tmp.path(),
            r#"{
                "id": "com.example.test",
                "name": "Test",
                "version": "1.0.0",
                "runtime": "lua",
                "entry": "main.lua"
            }"#,
            "main.lua",
        );
        assert!(matches!(load_manifest(tmp.path()), Err(ManifestError::Parse(_))));
    }

    #[test]
    fn rejects_path_traversal_in_entry() {
        let tmp = tempfile::tempdir().unwrap();
        setup_plugin(
            tmp.path(),
            r#"{
                "id": "com.example.evil",
                "name": "Evil",
                "version": "1.0.0",
                "runtime": "node",
                "entry": "../../../etc/passwd"
            }"#,
            "index.js",
        );
        let err = load_manifest(tmp.path()).unwrap_err();
        assert!(err.to_string().contains("path traversal"));
    }

    #[test]
    fn rejects_non_reverse_domain_id() {
        let tmp = tempfile::tempdir().unwrap();
        setup_plugin(
            tmp.path(),
            r#"{
                "id": "no-dots",
                "name": "Bad",
                "version": "1.0.0",
                "runtime": "node",
                "entry": "index.js"
            }"#,
            "index.js",
        );
        let err = load_manifest(tmp.path()).unwrap_err();
        assert!(err.to_string().contains("reverse-domain"));
    }
}
