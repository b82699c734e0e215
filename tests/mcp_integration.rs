//! Plugin lifecycle integration: spawn → handshake → discover → dispatch →
//! shutdown, plus the approval flow end to end.
//!
//! The test plugin is a plain shell script speaking NDJSON JSON-RPC on
//! stdio, so the tests need nothing beyond /bin/sh.
#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use omni_glass::config::AppConfig;
use omni_glass::dispatch::ResultDispatcher;
use omni_glass::events::EventsTx;
use omni_glass::host::Host;
use omni_glass::mcp::client::{PluginClient, SpawnSpec};

/// A well-behaved MCP server exposing one `ping` tool.
const PING_SERVER: &str = r#"#!/bin/sh
while IFS= read -r line; do
  id=$(printf '%s' "$line" | sed -n 's/.*"id":\([0-9][0-9]*\).*/\1/p')
  case "$line" in
    *'"initialize"'*)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"protocolVersion":"2024-11-05","capabilities":{"tools":{}},"serverInfo":{"name":"ping-plugin","version":"0.1.0"}}}\n' "$id" ;;
    *'"tools/list"'*)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"tools":[{"name":"ping","description":"Reply with pong","inputSchema":{"type":"object","properties":{"text":{"type":"string"}}}}]}}\n' "$id" ;;
    *'"tools/call"'*)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"content":[{"type":"text","text":"pong"}],"isError":false}}\n' "$id" ;;
    *) ;;
  esac
done
"#;

/// Handshakes correctly, then answers tools/call with a non-JSON line.
const FAULTY_SERVER: &str = r#"#!/bin/sh
while IFS= read -r line; do
  id=$(printf '%s' "$line" | sed -n 's/.*"id":\([0-9][0-9]*\).*/\1/p')
  case "$line" in
    *'"initialize"'*)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"serverInfo":{"name":"faulty","version":"0.0.1"}}}\n' "$id" ;;
    *'"tools/list"'*)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"tools":[{"name":"boom","description":"explodes"}]}}\n' "$id" ;;
    *'"tools/call"'*)
      printf 'this is not a protocol line\n' ;;
    *) ;;
  esac
done
"#;

/// Reads requests and never answers anything.
const SILENT_SERVER: &str = r#"#!/bin/sh
while IFS= read -r line; do :; done
"#;

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn write_plugin(plugins_root: &Path, id: &str, server_body: &str, permissions: &str) -> PathBuf {
    let dir = plugins_root.join(id);
    std::fs::create_dir_all(&dir).unwrap();
    write_script(&dir, "server.sh", server_body);
    std::fs::write(
        dir.join("omni-glass.plugin.json"),
        format!(
            r#"{{
                "id": "{id}",
                "name": "Test Plugin",
                "version": "1.0.0",
                "description": "integration test plugin",
                "runtime": "binary",
                "entry": "server.sh",
                "permissions": {permissions}
            }}"#
        ),
    )
    .unwrap();
    dir
}

fn spec_for(entry: &Path, plugin_id: &str, timeout: Duration) -> SpawnSpec {
    SpawnSpec {
        plugin_id: plugin_id.to_string(),
        program: entry.display().to_string(),
        args: vec![],
        env: std::collections::HashMap::from([(
            "PATH".to_string(),
            std::env::var("PATH").unwrap_or_default(),
        )]),
        cwd: entry.parent().map(|p| p.to_path_buf()),
        call_timeout: timeout,
        shutdown_grace: Duration::from_secs(2),
    }
}

fn host_for(config_root: &Path) -> std::sync::Arc<Host> {
    let cfg = AppConfig {
        config_root: Some(config_root.to_path_buf()),
        ..Default::default()
    };
    Host::new(
        cfg,
        None,
        EventsTx::disabled(),
        ResultDispatcher::with_desktop_dir(config_root.join("desktop")),
    )
    .unwrap()
}

// ── client level ────────────────────────────────────────────────────

#[tokio::test]
async fn handshake_discover_call_shutdown() {
    let tmp = tempfile::tempdir().unwrap();
    let entry = write_script(tmp.path(), "server.sh", PING_SERVER);
    let (exit_tx, _exit_rx) = tokio::sync::mpsc::unbounded_channel();

    let client = PluginClient::spawn(
        spec_for(&entry, "com.test.ping", Duration::from_secs(10)),
        exit_tx,
    )
    .unwrap();

    let info = client.initialize().await.unwrap();
    assert_eq!(info.name.as_deref(), Some("ping-plugin"));

    let tools = client.list_tools().await.unwrap();
    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0].name, "ping");

    let result = client
        .call_tool("ping", serde_json::json!({"text": "hello"}))
        .await
        .unwrap();
    assert!(!result.is_error);
    assert_eq!(result.text(), "pong");

    client.shutdown().await;
}

#[tokio::test]
async fn slow_call_times_out_but_plugin_stays_live() {
    let tmp = tempfile::tempdir().unwrap();
    let entry = write_script(tmp.path(), "server.sh", SILENT_SERVER);
    let (exit_tx, _exit_rx) = tokio::sync::mpsc::unbounded_channel();

    let client = PluginClient::spawn(
        spec_for(&entry, "com.test.silent", Duration::from_millis(300)),
        exit_tx,
    )
    .unwrap();

    let err = client.call_tool("anything", serde_json::json!({})).await.unwrap_err();
    assert!(matches!(err, omni_glass::error::McpError::RequestTimeout { .. }));
    // A slow call never kills the process.
    assert!(client.is_live());

    client.shutdown().await;
}

#[tokio::test]
async fn protocol_garbage_faults_the_plugin() {
    let tmp = tempfile::tempdir().unwrap();
    let entry = write_script(tmp.path(), "server.sh", FAULTY_SERVER);
    let (exit_tx, mut exit_rx) = tokio::sync::mpsc::unbounded_channel();

    let client = PluginClient::spawn(
        spec_for(&entry, "com.test.faulty", Duration::from_secs(10)),
        exit_tx,
    )
    .unwrap();

    client.initialize().await.unwrap();
    let err = client.call_tool("boom", serde_json::json!({})).await.unwrap_err();
    assert!(matches!(
        err,
        omni_glass::error::McpError::ProcessGone { .. }
            | omni_glass::error::McpError::RequestTimeout { .. }
    ));

    // The supervisor reaps the faulted process and reports the exit.
    let exited = tokio::time::timeout(Duration::from_secs(5), exit_rx.recv())
        .await
        .expect("supervisor should report the exit");
    assert_eq!(exited.as_deref(), Some("com.test.faulty"));
    assert!(!client.is_live());
}

// ── approval flow through the host ──────────────────────────────────

#[tokio::test]
async fn plugin_lifecycle_with_approval_and_permission_change() {
    let tmp = tempfile::tempdir().unwrap();
    let plugins_root = tmp.path().join("plugins");
    let plugin_id = "com.example.ping";
    write_plugin(&plugins_root, plugin_id, PING_SERVER, "{}");

    // First launch: plugin is queued, not loaded.
    let host = host_for(tmp.path());
    host.start().await;

    let pending = host.get_pending_approvals().await;
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, plugin_id);
    assert!(!pending[0].is_update);
    assert!(host.registry().resolve_action("com.example.ping:ping").await.is_none());

    // Approve: the tool registers under its qualified name and shows up in
    // the classify prompt serialization.
    host.approve_plugin(plugin_id, true).await.unwrap();
    assert!(host.registry().resolve_action("com.example.ping:ping").await.is_some());
    let prompt = host.registry().tools_for_prompt().await;
    assert!(prompt.contains("com.example.ping:ping"));

    // And it answers calls.
    let result = host
        .registry()
        .call_plugin_tool("com.example.ping:ping", serde_json::json!({"text": "x"}))
        .await
        .unwrap();
    assert_eq!(result.text(), "pong");
    host.shutdown().await;

    // Second launch with unchanged permissions: loads silently.
    let host = host_for(tmp.path());
    host.start().await;
    assert!(host.get_pending_approvals().await.is_empty());
    assert!(host.registry().resolve_action("com.example.ping:ping").await.is_some());
    host.shutdown().await;

    // Widen the permissions: next launch re-prompts and the tool is absent
    // until re-approved.
    write_plugin(&plugins_root, plugin_id, PING_SERVER, r#"{"clipboard": true}"#);
    let host = host_for(tmp.path());
    host.start().await;

    let pending = host.get_pending_approvals().await;
    assert_eq!(pending.len(), 1);
    assert!(pending[0].is_update);
    assert!(host.registry().resolve_action("com.example.ping:ping").await.is_none());

    host.approve_plugin(plugin_id, true).await.unwrap();
    assert!(host.registry().resolve_action("com.example.ping:ping").await.is_some());
    host.shutdown().await;
}

#[tokio::test]
async fn denied_plugin_stays_denied_across_launches() {
    let tmp = tempfile::tempdir().unwrap();
    let plugins_root = tmp.path().join("plugins");
    let plugin_id = "com.example.denied";
    write_plugin(&plugins_root, plugin_id, PING_SERVER, "{}");

    let host = host_for(tmp.path());
    host.start().await;
    host.approve_plugin(plugin_id, false).await.unwrap();
    assert!(host.registry().resolve_action("com.example.denied:ping").await.is_none());
    host.shutdown().await;

    // Next launch: no re-prompt, no tools.
    let host = host_for(tmp.path());
    host.start().await;
    assert!(host.get_pending_approvals().await.is_empty());
    assert!(host.registry().resolve_action("com.example.denied:ping").await.is_none());
    host.shutdown().await;
}

#[tokio::test]
async fn broken_plugin_does_not_block_the_healthy_one() {
    let tmp = tempfile::tempdir().unwrap();
    let plugins_root = tmp.path().join("plugins");
    write_plugin(&plugins_root, "com.example.good", PING_SERVER, "{}");

    // Invalid manifest in a sibling directory.
    let bad_dir = plugins_root.join("com.example.bad");
    std::fs::create_dir_all(&bad_dir).unwrap();
    std::fs::write(bad_dir.join("omni-glass.plugin.json"), "{ not json").unwrap();

    let host = host_for(tmp.path());
    host.start().await;

    let pending = host.get_pending_approvals().await;
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, "com.example.good");
    host.shutdown().await;
}
