use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config root could not be determined")]
    NoConfigRoot,

    #[error("config parse error")]
    Parse(#[source] serde_json::Error),

    #[error("config i/o error: {path}")]
    Io { path: String, #[source] source: std::io::Error },
}

#[derive(Debug, Error)]
pub enum OcrError {
    #[error("no capture available")]
    NoCapture,

    #[error("recognition failed: {0}")]
    Recognition(String),
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("no api key configured for provider '{provider}'")]
    MissingKey { provider: String },

    #[error("http request failed")]
    Transport(#[source] reqwest::Error),

    #[error("provider returned status {status}: {body_snippet}")]
    HttpStatus { status: u16, body_snippet: String },

    #[error("stream interrupted")]
    StreamInterrupted(#[source] reqwest::Error),

    #[error("stream timed out after {seconds}s")]
    StreamTimeout { seconds: u64 },

    #[error("response was not valid json: {0}")]
    BadJson(String),
}

impl LlmError {
    /// Transient errors get a retry hint in the UI; nothing retries
    /// automatically.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LlmError::Transport(_) | LlmError::StreamInterrupted(_) | LlmError::StreamTimeout { .. }
        )
    }
}

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("no {filename} found in {dir}")]
    Missing { filename: &'static str, dir: String },

    #[error("manifest read failed: {path}")]
    Io { path: String, #[source] source: std::io::Error },

    #[error("invalid manifest json")]
    Parse(#[source] serde_json::Error),

    #[error("manifest validation failed: {0}")]
    Validation(String),
}

#[derive(Debug, Error)]
pub enum ApprovalError {
    #[error("config root could not be determined")]
    NoConfigRoot,

    #[error("approval store i/o error: {path}")]
    Io { path: String, #[source] source: std::io::Error },

    #[error("approval store serialize error")]
    Serialize(#[source] serde_json::Error),

    #[error("plugin '{0}' is not pending approval")]
    NotPending(String),
}

#[derive(Debug, Error)]
pub enum McpError {
    #[error("failed to spawn plugin '{plugin_id}' ({program})")]
    Spawn { plugin_id: String, program: String, #[source] source: std::io::Error },

    #[error("plugin '{plugin_id}' stdin closed")]
    WriterClosed { plugin_id: String },

    #[error("plugin '{plugin_id}' request {id} timed out after {seconds}s")]
    RequestTimeout { plugin_id: String, id: u64, seconds: u64 },

    #[error("plugin '{plugin_id}' exited before responding")]
    ProcessGone { plugin_id: String },

    #[error("plugin '{plugin_id}' protocol error: {detail}")]
    Protocol { plugin_id: String, detail: String },

    #[error("plugin '{plugin_id}' returned error {code}: {message}")]
    Rpc { plugin_id: String, code: i64, message: String },

    #[error("tool '{0}' not found in registry")]
    UnknownTool(String),

    #[error("no running server for plugin '{0}'")]
    NoServer(String),
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("command blocked: {reason}")]
    CommandBlocked { reason: String },

    #[error("unsafe file path: {0}")]
    UnsafePath(String),

    #[error("clipboard unavailable")]
    Clipboard(#[source] anyhow::Error),

    #[error("file write failed: {path}")]
    FileWrite { path: String, #[source] source: std::io::Error },

    #[error("shell spawn failed")]
    ShellSpawn(#[source] std::io::Error),

    #[error("desktop directory could not be determined")]
    NoDesktopDir,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("empty snip: ocr produced no text")]
    EmptySnip,

    #[error("no active session — snip first")]
    NoSession,

    #[error("session is in phase {phase}, expected {expected}")]
    WrongPhase { phase: &'static str, expected: &'static str },

    #[error("unknown action id '{0}'")]
    UnknownAction(String),

    #[error("ocr error: {0}")]
    Ocr(#[from] OcrError),

    #[error("llm error: {0}")]
    Llm(#[from] LlmError),

    #[error("plugin error: {0}")]
    Mcp(#[from] McpError),

    #[error("approval error: {0}")]
    Approval(#[from] ApprovalError),

    #[error("dispatch error: {0}")]
    Dispatch(#[from] DispatchError),
}
