//! OS-level isolation for plugin processes.
//!
//! Environment filtering is the boundary that works everywhere; on macOS the
//! spawn is additionally wrapped in `sandbox-exec` with a generated profile.
//! Linux and Windows run with the filtered environment only.

use std::path::Path;

use crate::mcp::manifest::PluginManifest;

/// How a plugin's command line should be wrapped before spawning.
#[derive(Debug, Clone)]
pub struct SandboxSpec {
    pub program: String,
    pub args: Vec<String>,
}

/// Compute the wrapped spawn command for a plugin.
#[cfg(target_os = "macos")]
pub fn wrap_command(
    manifest: &PluginManifest,
    plugin_dir: &Path,
    program: &str,
    args: &[String],
) -> SandboxSpec {
    let profile = generate_profile(manifest, plugin_dir);
    let profile_path = std::env::temp_dir().join(format!("omni-glass-{}.sb", manifest.id));
    if std::fs::write(&profile_path, profile).is_err() {
        tracing::warn!(plugin_id = %manifest.id, "sandbox profile write failed, spawning unsandboxed");
        let mut plain = vec![];
        plain.extend(args.iter().cloned());
        return SandboxSpec { program: program.to_string(), args: plain };
    }

    let mut wrapped = vec![
        "-f".to_string(),
        profile_path.display().to_string(),
        program.to_string(),
    ];
    wrapped.extend(args.iter().cloned());
    SandboxSpec { program: "sandbox-exec".to_string(), args: wrapped }
}

/// sandbox-exec profile: deny by default, allow process basics, the plugin's
/// own directory, and the paths its permissions name.
#[cfg(target_os = "macos")]
fn generate_profile(manifest: &PluginManifest, plugin_dir: &Path) -> String {
    let mut profile = String::from(
        "(version 1)\n(deny default)\n(allow process-exec)\n(allow process-fork)\n(allow sysctl-read)\n(allow mach-lookup)\n",
    );
    profile.push_str(&format!(
        "(allow file-read* (subpath \"{}\"))\n",
        plugin_dir.display()
    ));
    profile.push_str("(allow file-read* (subpath \"/usr\") (subpath \"/System\") (subpath \"/Library\") (subpath \"/opt\") (subpath \"/private/tmp\"))\n");
    profile.push_str("(allow file-write* (subpath \"/private/tmp\"))\n");

    if let Some(fs_perms) = &manifest.permissions.filesystem {
        for perm in fs_perms {
            let path = perm.path.replace('~', &home());
            match perm.access.as_str() {
                "read" => profile.push_str(&format!("(allow file-read* (subpath \"{path}\"))\n")),
                _ => profile.push_str(&format!(
                    "(allow file-read* file-write* (subpath \"{path}\"))\n"
                )),
            }
        }
    }

    if manifest.permissions.network.as_ref().map_or(false, |h| !h.is_empty()) {
        profile.push_str("(allow network-outbound)\n(allow system-socket)\n");
    }

    profile
}

#[cfg(target_os = "macos")]
fn home() -> String {
    dirs::home_dir().map(|h| h.display().to_string()).unwrap_or_else(|| "/tmp".into())
}

/// Non-macOS: filtered environment only. Kernel-level confinement for Linux
/// (bubblewrap) is not wired up yet.
#[cfg(not(target_os = "macos"))]
pub fn wrap_command(
    manifest: &PluginManifest,
    _plugin_dir: &Path,
    program: &str,
    args: &[String],
) -> SandboxSpec {
    tracing::debug!(
        plugin_id = %manifest.id,
        "no kernel sandbox on this platform, relying on environment filtering"
    );
    SandboxSpec { program: program.to_string(), args: args.to_vec() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::manifest::{Permissions, Runtime};

    fn manifest() -> PluginManifest {
        PluginManifest {
            id: "com.test.sandbox".into(),
            name: "T".into(),
            version: "1.0.0".into(),
            description: String::new(),
            runtime: Runtime::Node,
            entry: "index.js".into(),
            permissions: Permissions::default(),
        }
    }

    #[test]
    fn wrap_preserves_entry_args() {
        let m = manifest();
        let spec = wrap_command(&m, Path::new("/tmp/p"), "node", &["/tmp/p/index.js".into()]);
        assert!(spec.args.iter().any(|a| a.ends_with("index.js")));
    }
}
