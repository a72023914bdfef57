//! Plugin discovery, spawn, and lifecycle supervision.
//!
//! Startup walks the plugins directory, parses each manifest, and sorts
//! plugins into three buckets: approved (spawned), awaiting decision
//! (queued for the consent flow), and denied (left alone until their
//! permissions change). Load failures are logged and skipped: a broken
//! plugin never aborts startup, and a crashed plugin takes only its own
//! tools down.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, warn};

use omni_glass_core::{GlassHome, ToolDescriptor, env_policy};

use crate::approval::{ApprovalStore, PendingApproval};
use crate::client::{PluginConnection, PluginHealth, SHUTDOWN_GRACE, ToolCallOutcome};
use crate::error::{PluginError, PluginResult};
use crate::manifest::PluginManifest;
use crate::risk::assess_risk;
use crate::sandbox::SandboxProfile;

/// One live, approved plugin.
pub struct PluginState {
    /// Parsed manifest.
    pub manifest: PluginManifest,
    /// The plugin's own directory.
    pub dir: PathBuf,
    /// Tools discovered during the handshake, as registry descriptors.
    pub tools: Vec<ToolDescriptor>,
    connection: PluginConnection,
    child: Mutex<Option<Child>>,
}

impl PluginState {
    /// Current connection health.
    #[must_use]
    pub fn health(&self) -> PluginHealth {
        self.connection.health()
    }

    /// Dispatch a tool call to this plugin.
    pub async fn call_tool(
        &self,
        tool: &str,
        arguments: serde_json::Value,
    ) -> PluginResult<ToolCallOutcome> {
        self.connection.call_tool(tool, arguments).await
    }

    async fn shutdown(&self) {
        self.connection.close();
        tokio::time::sleep(SHUTDOWN_GRACE).await;

        let mut guard = self.child.lock().await;
        if let Some(child) = guard.as_mut() {
            match child.try_wait() {
                Ok(Some(status)) => {
                    info!(
                        plugin_id = %self.manifest.id,
                        status = %status,
                        "plugin exited within the grace interval"
                    );
                },
                _ => {
                    warn!(plugin_id = %self.manifest.id, "terminating plugin process");
                    let _ = child.start_kill();
                    let _ = child.wait().await;
                },
            }
        }
        *guard = None;
    }
}

impl std::fmt::Debug for PluginState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginState")
            .field("plugin_id", &self.manifest.id)
            .field("tools", &self.tools.len())
            .field("health", &self.health())
            .finish_non_exhaustive()
    }
}

/// The set of live plugins.
#[derive(Debug, Default)]
pub struct PluginSet {
    plugins: RwLock<HashMap<String, Arc<PluginState>>>,
}

impl PluginSet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Discover plugins under the home directory, queue unapproved ones,
    /// and spawn the approved ones.
    ///
    /// Returns the states that came up, so the caller can register their
    /// tools. Individual failures are logged and skipped.
    pub async fn load_all(
        &self,
        home: &GlassHome,
        store: &mut ApprovalStore,
    ) -> Vec<Arc<PluginState>> {
        let plugins_dir = home.plugins_dir();
        let entries = match std::fs::read_dir(&plugins_dir) {
            Ok(entries) => entries,
            Err(e) => {
                info!(dir = %plugins_dir.display(), error = %e, "no plugins directory");
                return Vec::new();
            },
        };

        let mut loaded = Vec::new();
        for entry in entries.flatten() {
            let dir = entry.path();
            if !dir.is_dir() {
                continue;
            }
            let manifest = match PluginManifest::load(&dir) {
                Ok(manifest) => manifest,
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "skipping unloadable plugin");
                    continue;
                },
            };

            if store.is_approved(&manifest) {
                match self.spawn(manifest, &dir).await {
                    Ok(state) => loaded.push(state),
                    Err(e) => {
                        error!(dir = %dir.display(), error = %e, "plugin failed to start");
                    },
                }
            } else if store.has_current_decision(&manifest) {
                info!(plugin_id = %manifest.id, "plugin denied; not spawning");
            } else {
                let risk = assess_risk(&manifest.permissions);
                store.enqueue_pending(PendingApproval::from_manifest(&manifest, risk));
            }
        }
        loaded
    }

    /// Spawn one approved plugin and run the MCP handshake.
    pub async fn spawn(
        &self,
        manifest: PluginManifest,
        dir: &Path,
    ) -> PluginResult<Arc<PluginState>> {
        let plugin_id = manifest.id.clone();
        let binary = which::which(manifest.runtime.binary())
            .map_err(|_| PluginError::RuntimeNotFound(manifest.runtime.binary().to_string()))?;

        let profile = SandboxProfile::for_manifest(&manifest, dir);
        let (command, args) =
            profile.wrap_command(&binary.to_string_lossy(), &[manifest.entry.clone()])?;

        let mut cmd = Command::new(&command);
        cmd.args(&args)
            .current_dir(dir)
            .env_clear()
            .envs(env_policy::filtered_spawn_env(
                &manifest.permissions.environment,
            ))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        crate::platform::apply_sandbox_pre_exec(&mut cmd, &profile);

        let mut child = cmd.spawn().map_err(|e| PluginError::SpawnFailed {
            plugin_id: plugin_id.clone(),
            reason: e.to_string(),
        })?;

        let stdin = child.stdin.take().ok_or_else(|| PluginError::SpawnFailed {
            plugin_id: plugin_id.clone(),
            reason: "child stdin unavailable".to_string(),
        })?;
        let stdout = child.stdout.take().ok_or_else(|| PluginError::SpawnFailed {
            plugin_id: plugin_id.clone(),
            reason: "child stdout unavailable".to_string(),
        })?;
        if let Some(stderr) = child.stderr.take() {
            forward_stderr(plugin_id.clone(), stderr);
        }

        let connection = PluginConnection::new(plugin_id.clone(), stdout, stdin);
        let remote_tools = connection.handshake().await.map_err(|e| {
            warn!(plugin_id = %plugin_id, error = %e, "handshake failed; terminating plugin");
            let _ = child.start_kill();
            e
        })?;

        let tools = remote_tools
            .into_iter()
            .map(|t| {
                ToolDescriptor::new(&plugin_id, &t.name)
                    .with_description(t.description)
                    .with_schema(t.input_schema)
            })
            .collect();

        let state = Arc::new(PluginState {
            manifest,
            dir: dir.to_path_buf(),
            tools,
            connection,
            child: Mutex::new(Some(child)),
        });

        let mut plugins = self.plugins.write().await;
        plugins.insert(plugin_id.clone(), Arc::clone(&state));
        info!(plugin_id = %plugin_id, "plugin live");
        Ok(state)
    }

    /// Look up a live plugin.
    pub async fn get(&self, plugin_id: &str) -> Option<Arc<PluginState>> {
        let plugins = self.plugins.read().await;
        plugins.get(plugin_id).cloned()
    }

    /// Dispatch a tool call, removing the plugin from the set when the
    /// call reveals it is faulted.
    ///
    /// The caller is responsible for dropping the plugin's tools from
    /// the registry when this returns a fault-class error.
    pub async fn call_tool(
        &self,
        plugin_id: &str,
        tool: &str,
        arguments: serde_json::Value,
    ) -> PluginResult<ToolCallOutcome> {
        let Some(state) = self.get(plugin_id).await else {
            return Err(PluginError::NotLive {
                plugin_id: plugin_id.to_string(),
            });
        };

        let outcome = state.call_tool(tool, arguments).await;
        if state.health() == PluginHealth::Faulted {
            warn!(plugin_id = %plugin_id, "plugin faulted; removing from the set");
            self.remove(plugin_id).await;
        }
        outcome
    }

    /// Remove and shut down one plugin. Other plugins are untouched.
    pub async fn remove(&self, plugin_id: &str) -> Option<Arc<PluginState>> {
        let removed = {
            let mut plugins = self.plugins.write().await;
            plugins.remove(plugin_id)
        };
        if let Some(state) = &removed {
            state.shutdown().await;
        }
        removed
    }

    /// Ids of the currently live plugins.
    pub async fn live_ids(&self) -> Vec<String> {
        let plugins = self.plugins.read().await;
        plugins.keys().cloned().collect()
    }

    /// Shut every plugin down: close stdin, wait the grace interval,
    /// then signal whatever is still running.
    pub async fn shutdown_all(&self) {
        let drained: Vec<Arc<PluginState>> = {
            let mut plugins = self.plugins.write().await;
            plugins.drain().map(|(_, v)| v).collect()
        };
        for state in drained {
            state.shutdown().await;
        }
    }
}

/// Forward a plugin's stderr lines into the host log.
fn forward_stderr(
    plugin_id: String,
    stderr: impl tokio::io::AsyncRead + Unpin + Send + 'static,
) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            warn!(plugin_id = %plugin_id, "plugin stderr: {line}");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{MANIFEST_FILE, Permissions};

    fn write_plugin_dir(root: &Path, id: &str, manifest_json: &str) -> PathBuf {
        let dir = root.join("plugins").join(id);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(MANIFEST_FILE), manifest_json).unwrap();
        dir
    }

    fn minimal_manifest(id: &str) -> String {
        format!(
            r#"{{
                "id": "{id}", "name": "T", "version": "0.1.0",
                "runtime": "node", "entry": "index.js"
            }}"#
        )
    }

    #[tokio::test]
    async fn undecided_plugins_enter_the_pending_queue() {
        let tmp = tempfile::tempdir().unwrap();
        let home = GlassHome::at(tmp.path());
        write_plugin_dir(tmp.path(), "com.example.a", &minimal_manifest("com.example.a"));

        let mut store = ApprovalStore::load(home.approvals_file()).unwrap();
        let set = PluginSet::new();
        let loaded = set.load_all(&home, &mut store).await;

        assert!(loaded.is_empty());
        assert_eq!(store.pending().len(), 1);
        assert_eq!(store.pending()[0].plugin_id, "com.example.a");
    }

    #[tokio::test]
    async fn denied_plugins_are_not_requeued() {
        let tmp = tempfile::tempdir().unwrap();
        let home = GlassHome::at(tmp.path());
        write_plugin_dir(tmp.path(), "com.example.a", &minimal_manifest("com.example.a"));

        let mut store = ApprovalStore::load(home.approvals_file()).unwrap();
        store
            .decide("com.example.a", false, &Permissions::default())
            .unwrap();

        let set = PluginSet::new();
        let loaded = set.load_all(&home, &mut store).await;
        assert!(loaded.is_empty());
        assert!(store.pending().is_empty());
    }

    #[tokio::test]
    async fn broken_manifests_are_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        let home = GlassHome::at(tmp.path());
        write_plugin_dir(tmp.path(), "broken", "{not json");
        write_plugin_dir(tmp.path(), "com.example.b", &minimal_manifest("com.example.b"));

        let mut store = ApprovalStore::load(home.approvals_file()).unwrap();
        let set = PluginSet::new();
        set.load_all(&home, &mut store).await;

        // Only the parseable plugin reached the queue.
        assert_eq!(store.pending().len(), 1);
        assert_eq!(store.pending()[0].plugin_id, "com.example.b");
    }

    #[tokio::test]
    async fn calling_an_unknown_plugin_errors_cleanly() {
        let set = PluginSet::new();
        let err = set
            .call_tool("com.example.ghost", "ping", serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, PluginError::NotLive { .. }));
    }
}
