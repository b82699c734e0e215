//! MCP client: JSON-RPC 2.0 over NDJSON stdio, one actor per plugin.
//!
//! Three tasks own the process: a writer (fed by an in-memory channel,
//! owns stdin), a reader (owns stdout, matches responses to pending waiters
//! by id), and a supervisor (owns the child handle, reaps it on exit,
//! shutdown, or fault). Callers hold a cheap clone-able handle and never
//! touch plugin I/O under any registry lock.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot};

use crate::error::McpError;
use crate::mcp::types::{
    InitializeParams, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, McpTool, ServerInfo,
    ToolCallResult,
};

enum Outbound {
    Line(String),
    /// Drop stdin so the child sees EOF.
    Close,
}

type PendingMap = HashMap<u64, oneshot::Sender<JsonRpcResponse>>;

/// Handle to a live plugin process. Clone freely; all clones share the same
/// actor tasks.
#[derive(Clone)]
pub struct PluginClient {
    plugin_id: String,
    writer_tx: mpsc::Sender<Outbound>,
    shutdown_tx: mpsc::Sender<()>,
    pending: Arc<Mutex<PendingMap>>,
    next_id: Arc<AtomicU64>,
    faulted: Arc<AtomicBool>,
    call_timeout: Duration,
}

/// Everything needed to start a plugin process.
pub struct SpawnSpec {
    pub plugin_id: String,
    pub program: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub cwd: Option<std::path::PathBuf>,
    pub call_timeout: Duration,
    pub shutdown_grace: Duration,
}

impl PluginClient {
    /// Spawn the process and start the actor tasks.
    ///
    /// `exit_tx` fires with the plugin id once the process is gone for any
    /// reason; the listener removes the plugin's tools from the registry.
    pub fn spawn(
        spec: SpawnSpec,
        exit_tx: mpsc::UnboundedSender<String>,
    ) -> Result<Self, McpError> {
        let mut cmd = tokio::process::Command::new(&spec.program);
        cmd.args(&spec.args)
            .env_clear()
            .envs(&spec.env)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &spec.cwd {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|e| McpError::Spawn {
            plugin_id: spec.plugin_id.clone(),
            program: spec.program.clone(),
            source: e,
        })?;

        let mut stdin = child.stdin.take().expect("stdin piped");
        let stdout = child.stdout.take().expect("stdout piped");
        let stderr = child.stderr.take().expect("stderr piped");

        let (writer_tx, mut writer_rx) = mpsc::channel::<Outbound>(64);
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let (fault_tx, mut fault_rx) = mpsc::channel::<String>(1);
        let pending: Arc<Mutex<PendingMap>> = Arc::new(Mutex::new(HashMap::new()));
        let faulted = Arc::new(AtomicBool::new(false));

        // Writer: owns stdin, drains the outbound channel.
        let writer_plugin_id = spec.plugin_id.clone();
        tokio::spawn(async move {
            while let Some(msg) = writer_rx.recv().await {
                match msg {
                    Outbound::Line(line) => {
                        if let Err(e) = stdin.write_all(line.as_bytes()).await {
                            tracing::warn!(plugin_id = %writer_plugin_id, error = %e, "plugin stdin write failed");
                            break;
                        }
                        if let Err(e) = stdin.flush().await {
                            tracing::warn!(plugin_id = %writer_plugin_id, error = %e, "plugin stdin flush failed");
                            break;
                        }
                    }
                    Outbound::Close => break,
                }
            }
            // Dropping stdin signals EOF to the child.
        });

        // Reader: owns stdout, routes responses to waiters. An unparseable
        // line is a protocol fault and terminates the plugin.
        let reader_plugin_id = spec.plugin_id.clone();
        let reader_pending = Arc::clone(&pending);
        let reader_faulted = Arc::clone(&faulted);
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let trimmed = line.trim();
                        if trimmed.is_empty() {
                            continue;
                        }
                        match serde_json::from_str::<JsonRpcResponse>(trimmed) {
                            Ok(resp) => {
                                let Some(id) = resp.id else {
                                    // Server-initiated notification; nothing waits on it.
                                    continue;
                                };
                                let waiter = reader_pending.lock().unwrap().remove(&id);
                                match waiter {
                                    Some(tx) => {
                                        let _ = tx.send(resp);
                                    }
                                    None => tracing::debug!(
                                        plugin_id = %reader_plugin_id,
                                        id,
                                        "response for unknown or expired request id"
                                    ),
                                }
                            }
                            Err(e) => {
                                tracing::error!(
                                    plugin_id = %reader_plugin_id,
                                    error = %e,
                                    line = %trimmed.chars().take(120).collect::<String>(),
                                    "plugin emitted a non-protocol line, faulting"
                                );
                                reader_faulted.store(true, Ordering::SeqCst);
                                let _ = fault_tx.send("protocol error".to_string()).await;
                                break;
                            }
                        }
                    }
                    Ok(None) | Err(_) => break,
                }
            }
            // Fail any waiters still outstanding.
            reader_pending.lock().unwrap().clear();
        });

        // Stderr is forwarded to the host log.
        let stderr_plugin_id = spec.plugin_id.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                tracing::info!(target: "plugin_stderr", plugin_id = %stderr_plugin_id, "{line}");
            }
        });

        // Supervisor: owns the child handle.
        let sup_plugin_id = spec.plugin_id.clone();
        let sup_faulted = Arc::clone(&faulted);
        let grace = spec.shutdown_grace;
        tokio::spawn(async move {
            tokio::select! {
                status = child.wait() => {
                    match status {
                        Ok(s) => tracing::info!(plugin_id = %sup_plugin_id, status = %s, "plugin exited"),
                        Err(e) => tracing::warn!(plugin_id = %sup_plugin_id, error = %e, "plugin wait failed"),
                    }
                }
                reason = fault_rx.recv() => {
                    tracing::warn!(
                        plugin_id = %sup_plugin_id,
                        reason = reason.as_deref().unwrap_or("unknown"),
                        "terminating faulted plugin"
                    );
                    let _ = child.kill().await;
                }
                _ = shutdown_rx.recv() => {
                    // Stdin is already closed by the writer; give the child a
                    // grace interval before the terminating signal.
                    match tokio::time::timeout(grace, child.wait()).await {
                        Ok(Ok(s)) => tracing::info!(plugin_id = %sup_plugin_id, status = %s, "plugin shut down"),
                        _ => {
                            tracing::warn!(plugin_id = %sup_plugin_id, "plugin did not exit in grace period, killing");
                            let _ = child.kill().await;
                        }
                    }
                }
            }
            sup_faulted.store(true, Ordering::SeqCst);
            let _ = exit_tx.send(sup_plugin_id);
        });

        Ok(Self {
            plugin_id: spec.plugin_id,
            writer_tx,
            shutdown_tx,
            pending,
            next_id: Arc::new(AtomicU64::new(1)),
            faulted,
            call_timeout: spec.call_timeout,
        })
    }

    pub fn plugin_id(&self) -> &str {
        &self.plugin_id
    }

    pub fn is_live(&self) -> bool {
        !self.faulted.load(Ordering::SeqCst)
    }

    /// initialize handshake + initialized notification.
    pub async fn initialize(&self) -> Result<ServerInfo, McpError> {
        let params = serde_json::to_value(InitializeParams::current()).expect("static params");
        let result = self.request("initialize", Some(params)).await?;

        let server_info: ServerInfo = result
            .get("serverInfo")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or(ServerInfo { name: None, version: None });

        self.notify("notifications/initialized", None).await?;

        tracing::info!(
            plugin_id = %self.plugin_id,
            server = server_info.name.as_deref().unwrap_or("unknown"),
            version = server_info.version.as_deref().unwrap_or("?"),
            "plugin initialized"
        );
        Ok(server_info)
    }

    /// Discover the plugin's tools.
    pub async fn list_tools(&self) -> Result<Vec<McpTool>, McpError> {
        let result = self.request("tools/list", None).await?;
        let tools_value = result.get("tools").cloned().unwrap_or(serde_json::Value::Array(vec![]));
        let tools: Vec<McpTool> = serde_json::from_value(tools_value).map_err(|e| {
            McpError::Protocol {
                plugin_id: self.plugin_id.clone(),
                detail: format!("bad tools/list result: {e}"),
            }
        })?;

        tracing::info!(
            plugin_id = %self.plugin_id,
            count = tools.len(),
            tools = %tools.iter().map(|t| t.name.as_str()).collect::<Vec<_>>().join(", "),
            "tools discovered"
        );
        Ok(tools)
    }

    /// Execute one tool call.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<ToolCallResult, McpError> {
        let params = serde_json::json!({ "name": name, "arguments": arguments });
        let result = self.request("tools/call", Some(params)).await?;
        serde_json::from_value(result).map_err(|e| McpError::Protocol {
            plugin_id: self.plugin_id.clone(),
            detail: format!("bad tools/call result: {e}"),
        })
    }

    /// Graceful shutdown: close stdin, let the supervisor grace-wait.
    pub async fn shutdown(&self) {
        let _ = self.writer_tx.send(Outbound::Close).await;
        let _ = self.shutdown_tx.send(()).await;
    }

    async fn request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, McpError> {
        if !self.is_live() {
            return Err(McpError::ProcessGone { plugin_id: self.plugin_id.clone() });
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().unwrap().insert(id, tx);

        let req = JsonRpcRequest::new(id, method, params);
        let mut line = serde_json::to_string(&req).expect("request serializes");
        line.push('\n');

        if self.writer_tx.send(Outbound::Line(line)).await.is_err() {
            self.pending.lock().unwrap().remove(&id);
            return Err(McpError::WriterClosed { plugin_id: self.plugin_id.clone() });
        }

        let resp = match tokio::time::timeout(self.call_timeout, rx).await {
            Ok(Ok(resp)) => resp,
            Ok(Err(_)) => {
                // Reader dropped the waiter: process died or protocol fault.
                return Err(McpError::ProcessGone { plugin_id: self.plugin_id.clone() });
            }
            Err(_) => {
                // A slow call frees its waiter but does not kill the plugin.
                self.pending.lock().unwrap().remove(&id);
                tracing::warn!(
                    plugin_id = %self.plugin_id,
                    method,
                    id,
                    timeout_secs = self.call_timeout.as_secs(),
                    "plugin request timed out"
                );
                return Err(McpError::RequestTimeout {
                    plugin_id: self.plugin_id.clone(),
                    id,
                    seconds: self.call_timeout.as_secs(),
                });
            }
        };

        if let Some(err) = resp.error {
            return Err(McpError::Rpc {
                plugin_id: self.plugin_id.clone(),
                code: err.code,
                message: err.message,
            });
        }
        resp.result.ok_or_else(|| McpError::Protocol {
            plugin_id: self.plugin_id.clone(),
            detail: format!("{method}: response had neither result nor error"),
        })
    }

    async fn notify(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<(), McpError> {
        let notif = JsonRpcNotification::new(method, params);
        let mut line = serde_json::to_string(&notif).expect("notification serializes");
        line.push('\n');
        self.writer_tx
            .send(Outbound::Line(line))
            .await
            .map_err(|_| McpError::WriterClosed { plugin_id: self.plugin_id.clone() })
    }
}

/// Convenience used by the loader: spawn with the standard filtered
/// environment and sandbox wrapping for a manifest.
pub fn spawn_spec_for(
    manifest: &crate::mcp::manifest::PluginManifest,
    plugin_dir: &Path,
    call_timeout: Duration,
    shutdown_grace: Duration,
) -> Result<SpawnSpec, McpError> {
    use crate::mcp::manifest::Runtime;

    let entry = plugin_dir.join(&manifest.entry);
    let entry_str = entry.display().to_string();

    let (program, args) = match manifest.runtime {
        Runtime::Node => ("node".to_string(), vec![entry_str]),
        Runtime::Python => ("python3".to_string(), vec![entry_str]),
        Runtime::Binary => (entry_str, vec![]),
    };

    let wrapped = crate::mcp::sandbox::wrap_command(manifest, plugin_dir, &program, &args);
    let env = crate::mcp::env_filter::filter_environment(&manifest.permissions, &manifest.id);

    Ok(SpawnSpec {
        plugin_id: manifest.id.clone(),
        program: wrapped.program,
        args: wrapped.args,
        env,
        cwd: Some(plugin_dir.to_path_buf()),
        call_timeout,
        shutdown_grace,
    })
}
