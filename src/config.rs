use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Top-level runtime configuration. Everything has a default so the engine
/// boots with no config file at all.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub provider: ProviderConfig,

    #[serde(default)]
    pub limits: LimitsConfig,

    /// Override for the configuration root (plugins, approvals, settings).
    /// Defaults to `<platform config dir>/omni-glass`.
    #[serde(default)]
    pub config_root: Option<PathBuf>,

    #[serde(default = "default_platform")]
    pub platform: String,

    #[serde(default = "default_shell")]
    pub detected_shell: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            provider: ProviderConfig::default(),
            limits: LimitsConfig::default(),
            config_root: None,
            platform: default_platform(),
            detected_shell: default_shell(),
        }
    }
}

fn default_platform() -> String {
    std::env::consts::OS.to_string()
}

fn default_shell() -> String {
    "sh".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// "anthropic" | "local". Unknown values fall back to local.
    #[serde(default = "default_active_provider")]
    pub active: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_classify_max_tokens")]
    pub classify_max_tokens: u32,

    #[serde(default = "default_execute_max_tokens")]
    pub execute_max_tokens: u32,
}

fn default_active_provider() -> String {
    "anthropic".to_string()
}

fn default_model() -> String {
    "claude-haiku-4-5-20251001".to_string()
}

fn default_classify_max_tokens() -> u32 {
    512
}

fn default_execute_max_tokens() -> u32 {
    1024
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            active: default_active_provider(),
            model: default_model(),
            classify_max_tokens: default_classify_max_tokens(),
            execute_max_tokens: default_execute_max_tokens(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// End-to-end bound on one LLM stream.
    #[serde(default = "default_llm_stream_timeout_secs")]
    pub llm_stream_timeout_secs: u64,

    /// Bound on a single plugin tools/call.
    #[serde(default = "default_mcp_call_timeout_secs")]
    pub mcp_call_timeout_secs: u64,

    /// Grace interval between closing a plugin's stdin and killing it.
    #[serde(default = "default_mcp_shutdown_grace_secs")]
    pub mcp_shutdown_grace_secs: u64,
}

fn default_llm_stream_timeout_secs() -> u64 {
    60
}

fn default_mcp_call_timeout_secs() -> u64 {
    30
}

fn default_mcp_shutdown_grace_secs() -> u64 {
    3
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            llm_stream_timeout_secs: default_llm_stream_timeout_secs(),
            mcp_call_timeout_secs: default_mcp_call_timeout_secs(),
            mcp_shutdown_grace_secs: default_mcp_shutdown_grace_secs(),
        }
    }
}

impl AppConfig {
    /// Resolve the configuration root, creating nothing.
    pub fn config_root(&self) -> Result<PathBuf, ConfigError> {
        if let Some(root) = &self.config_root {
            return Ok(root.clone());
        }
        dirs::config_dir()
            .map(|d| d.join("omni-glass"))
            .ok_or(ConfigError::NoConfigRoot)
    }

    pub fn plugins_dir(&self) -> Result<PathBuf, ConfigError> {
        Ok(self.config_root()?.join("plugins"))
    }

    /// Load `config.json` from the given root, falling back to defaults when
    /// the file is absent.
    pub fn load(root: Option<&Path>) -> Result<Self, ConfigError> {
        let base = match root {
            Some(r) => r.to_path_buf(),
            None => dirs::config_dir()
                .map(|d| d.join("omni-glass"))
                .ok_or(ConfigError::NoConfigRoot)?,
        };
        let path = base.join("config.json");
        let mut cfg = match std::fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str::<AppConfig>(&raw).map_err(ConfigError::Parse)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => AppConfig::default(),
            Err(e) => {
                return Err(ConfigError::Io { path: path.display().to_string(), source: e })
            }
        };
        if cfg.config_root.is_none() && root.is_some() {
            cfg.config_root = root.map(|r| r.to_path_buf());
        }
        Ok(cfg)
    }
}

/// Persisted provider settings (active provider + saved API keys).
///
/// Keychain storage is the shell's concern; the core keeps its own JSON store
/// under the config root so headless runs behave the same way.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderSettings {
    #[serde(default)]
    pub active: Option<String>,

    #[serde(default)]
    pub api_keys: std::collections::HashMap<String, String>,
}

const PROVIDER_SETTINGS_FILE: &str = "provider-settings.json";

impl ProviderSettings {
    pub fn load(config_root: &Path) -> Self {
        let path = config_root.join(PROVIDER_SETTINGS_FILE);
        match std::fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_default(),
            Err(_) => ProviderSettings::default(),
        }
    }

    /// Write-to-temp-then-rename so a crash never leaves a torn file.
    pub fn save(&self, config_root: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_root).map_err(|e| ConfigError::Io {
            path: config_root.display().to_string(),
            source: e,
        })?;
        let path = config_root.join(PROVIDER_SETTINGS_FILE);
        let tmp = config_root.join(format!("{PROVIDER_SETTINGS_FILE}.tmp"));
        let json = serde_json::to_string_pretty(self).map_err(ConfigError::Parse)?;
        std::fs::write(&tmp, json)
            .map_err(|e| ConfigError::Io { path: tmp.display().to_string(), source: e })?;
        std::fs::rename(&tmp, &path)
            .map_err(|e| ConfigError::Io { path: path.display().to_string(), source: e })
    }

    /// Resolve the key for a provider: saved settings first, then the
    /// well-known environment variable.
    pub fn api_key(&self, provider_id: &str) -> Option<String> {
        if let Some(k) = self.api_keys.get(provider_id) {
            if !k.is_empty() {
                return Some(k.clone());
            }
        }
        let env_key = match provider_id {
            "anthropic" => "ANTHROPIC_API_KEY",
            "gemini" => "GOOGLE_API_KEY",
            _ => return None,
        };
        std::env::var(env_key).ok().filter(|k| !k.is_empty())
    }
}
