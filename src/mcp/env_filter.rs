//! Environment filtering for plugin processes.
//!
//! Plugins are spawned with `env_clear` and receive only this filtered map:
//! a fixed whitelist, a per-plugin temp dir, and exactly the variables the
//! manifest declares. Parent API keys never cross this boundary undeclared.

use std::collections::HashMap;

use crate::mcp::manifest::Permissions;

/// Variables every runtime needs to function at all.
const ESSENTIAL_VARS: &[&str] = &["PATH", "HOME"];

pub fn filter_environment(permissions: &Permissions, plugin_id: &str) -> HashMap<String, String> {
    let mut filtered = HashMap::new();

    for key in ESSENTIAL_VARS {
        if let Ok(val) = std::env::var(key) {
            filtered.insert(key.to_string(), val);
        }
    }

    // Plugin identity plus an isolated temp directory.
    filtered.insert("OMNI_GLASS_PLUGIN_ID".to_string(), plugin_id.to_string());
    filtered.insert(
        "TMPDIR".to_string(),
        std::env::temp_dir().join(format!("omni-glass-{plugin_id}")).display().to_string(),
    );

    if let Some(declared) = &permissions.environment {
        for name in declared {
            if let Ok(val) = std::env::var(name) {
                filtered.insert(name.clone(), val);
            }
        }
    }

    filtered
}
