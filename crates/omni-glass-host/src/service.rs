//! The host command surface consumed by the UI collaborator.
//!
//! One [`HostService`] per process wires the orchestrator, registry,
//! plugin set, approval store, and dispatcher together. Window
//! lifecycle (`close_*`) stays in the UI layer; every command here
//! returns a JSON-serialisable value or a structured [`HostError`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tracing::{info, warn};
use uuid::Uuid;

use omni_glass_core::{ActionMenu, ActionResult, GlassHome, SnipContext};
use omni_glass_pipeline::{
    CommandOutput, DispatchOutcome, Orchestrator, PipelineEvent, ResultDispatcher, ToolRegistry,
};
use omni_glass_plugins::{ApprovalStore, PendingApproval, PluginManifest, PluginSet};

use crate::config::{GlassConfig, ProviderKind};
use crate::error::{HostError, HostResult};

/// The host service: every command the UI calls lands here.
pub struct HostService {
    home: GlassHome,
    config: Mutex<GlassConfig>,
    orchestrator: Arc<Orchestrator>,
    registry: Arc<ToolRegistry>,
    plugins: Arc<PluginSet>,
    approvals: Mutex<ApprovalStore>,
    dispatcher: ResultDispatcher,
    current_session: Mutex<Option<Uuid>>,
    events: Mutex<Option<mpsc::UnboundedReceiver<PipelineEvent>>>,
}

impl HostService {
    /// Build the service against a home directory. Call
    /// [`HostService::start`] afterwards to bring plugins up.
    pub fn new(home: GlassHome) -> HostResult<Self> {
        home.ensure_layout()?;
        let config = GlassConfig::load(&home)?;
        let provider = config.build_active_provider();
        info!(provider = provider.label(), "provider selected");

        let registry = Arc::new(ToolRegistry::with_builtins());
        let plugins = Arc::new(PluginSet::new());
        let approvals = ApprovalStore::load(home.approvals_file())?;
        let (orchestrator, events) =
            Orchestrator::new(provider, Arc::clone(&registry), Arc::clone(&plugins));

        let dispatcher = ResultDispatcher::new(desktop_dir());

        Ok(Self {
            home,
            config: Mutex::new(config),
            orchestrator: Arc::new(orchestrator),
            registry,
            plugins,
            approvals: Mutex::new(approvals),
            dispatcher,
            current_session: Mutex::new(None),
            events: Mutex::new(Some(events)),
        })
    }

    /// Discover and spawn approved plugins, registering their tools.
    /// Unapproved plugins land in the pending queue for the consent
    /// flow.
    pub async fn start(&self) {
        let loaded = {
            let mut approvals = self.approvals.lock().await;
            self.plugins.load_all(&self.home, &mut approvals).await
        };
        for state in loaded {
            self.registry
                .register_plugin_tools(state.tools.clone())
                .await;
        }
    }

    /// Take the pipeline event stream (skeletons, menus, results).
    /// Yields once; the UI keeps the receiver.
    pub async fn take_events(&self) -> Option<mpsc::UnboundedReceiver<PipelineEvent>> {
        self.events.lock().await.take()
    }

    /// The orchestrator, for embedders that drive it directly.
    #[must_use]
    pub fn orchestrator(&self) -> Arc<Orchestrator> {
        Arc::clone(&self.orchestrator)
    }

    // --- Provider settings -------------------------------------------------

    /// Masked provider configuration for the settings window.
    pub async fn get_provider_config(&self) -> serde_json::Value {
        self.config.lock().await.masked()
    }

    /// Switch the active provider and persist the choice.
    pub async fn set_active_provider(&self, kind: ProviderKind) -> HostResult<()> {
        let mut config = self.config.lock().await;
        config.active_provider = kind;
        config.save(&self.home)?;
        self.orchestrator.set_provider(config.build_active_provider());
        info!(provider = ?kind, "active provider changed");
        Ok(())
    }

    /// Store an API key and rebuild the provider when it is the active
    /// one. The keychain collaborator may replace this storage.
    pub async fn save_api_key(&self, kind: ProviderKind, api_key: String) -> HostResult<()> {
        let mut config = self.config.lock().await;
        config
            .providers
            .entry(kind.as_str().to_string())
            .or_default()
            .api_key = Some(api_key);
        config.save(&self.home)?;
        if config.active_provider == kind {
            self.orchestrator.set_provider(config.build_active_provider());
        }
        Ok(())
    }

    /// Round-trip a short classify request through a provider to verify
    /// its key and endpoint.
    pub async fn test_provider(&self, kind: ProviderKind) -> HostResult<bool> {
        use futures::StreamExt;
        use omni_glass_llm::LlmRequest;

        let provider = self.config.lock().await.build_provider(kind);
        let request = LlmRequest::new(
            "Reply with the single word: ok",
            "EXTRACTED TEXT:\nping",
        )
        .max_tokens(8);

        let mut stream = provider
            .stream_classify(&request)
            .await
            .map_err(|e| HostError::Config(e.to_string()))?;
        let drained = tokio::time::timeout(std::time::Duration::from_secs(15), async {
            while let Some(chunk) = stream.next().await {
                chunk.map_err(|e| HostError::Config(e.to_string()))?;
            }
            Ok::<(), HostError>(())
        })
        .await;

        match drained {
            Ok(Ok(())) => Ok(true),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(HostError::Config("provider test timed out".to_string())),
        }
    }

    // --- Pipeline ----------------------------------------------------------

    /// Process a snip produced by the capture collaborator.
    pub async fn process_snip(&self, snip: SnipContext) -> HostResult<ActionMenu> {
        let (session_id, menu) = self.orchestrator.process_snip(snip).await?;
        *self.current_session.lock().await = Some(session_id);
        Ok(menu)
    }

    /// Process a typed command as if it were OCR output.
    pub async fn execute_text_command(&self, text: &str) -> HostResult<ActionMenu> {
        let (session_id, menu) = self.orchestrator.process_text_command(text).await?;
        *self.current_session.lock().await = Some(session_id);
        Ok(menu)
    }

    /// Execute an action from the current menu and dispatch its result.
    pub async fn execute_action(
        &self,
        action_id: &str,
    ) -> HostResult<(ActionResult, DispatchOutcome)> {
        let session_id = self.require_session().await?;
        let result = self.orchestrator.execute_action(session_id, action_id).await?;
        let outcome = self.dispatcher.dispatch(&result)?;
        Ok((result, outcome))
    }

    /// Run a command the user confirmed in the modal dialog.
    pub async fn run_confirmed_command(&self, command: &str) -> HostResult<CommandOutput> {
        Ok(self.dispatcher.run_confirmed_command(command).await?)
    }

    /// OCR text of the current session.
    pub async fn get_ocr_text(&self) -> HostResult<String> {
        let session_id = self.require_session().await?;
        self.orchestrator
            .ocr_text(session_id)
            .await
            .ok_or(HostError::NoActiveSession)
    }

    /// The current session's action menu.
    pub async fn get_action_menu(&self) -> HostResult<ActionMenu> {
        let session_id = self.require_session().await?;
        self.orchestrator
            .action_menu(session_id)
            .await
            .ok_or(HostError::NoActiveSession)
    }

    /// Cancel the current session (menu dismissed).
    pub async fn cancel_current_session(&self) {
        if let Some(session_id) = self.current_session.lock().await.take() {
            self.orchestrator.cancel_session(session_id).await;
        }
    }

    async fn require_session(&self) -> HostResult<Uuid> {
        self.current_session
            .lock()
            .await
            .as_ref()
            .copied()
            .ok_or(HostError::NoActiveSession)
    }

    // --- Clipboard and files -----------------------------------------------

    /// Copy text to the system clipboard.
    pub fn copy_to_clipboard(&self, text: &str) -> HostResult<()> {
        let mut clipboard =
            arboard::Clipboard::new().map_err(|e| HostError::Clipboard(e.to_string()))?;
        clipboard
            .set_text(text.to_string())
            .map_err(|e| HostError::Clipboard(e.to_string()))?;
        Ok(())
    }

    /// Write a file result to the desktop default location.
    pub fn write_to_desktop(&self, filename: &str, content: &str) -> HostResult<PathBuf> {
        Ok(self.dispatcher.write_to_default(filename, content)?)
    }

    /// Write a file result to an explicit path from a save dialog.
    pub fn write_file_to_path(&self, path: &Path, content: &str) -> HostResult<()> {
        Ok(self.dispatcher.write_file_to_path(path, content)?)
    }

    // --- Plugin approvals --------------------------------------------------

    /// The plugins awaiting a user decision, front of the queue first.
    pub async fn get_pending_approvals(&self) -> Vec<PendingApproval> {
        self.approvals.lock().await.pending()
    }

    /// Record an approval decision; an approval spawns the plugin and
    /// registers its tools immediately.
    pub async fn approve_plugin(&self, plugin_id: &str, approved: bool) -> HostResult<()> {
        let dir = self.home.plugins_dir().join(plugin_id);
        let manifest = PluginManifest::load(&dir)
            .map_err(|_| HostError::UnknownPlugin(plugin_id.to_string()))?;

        {
            let mut approvals = self.approvals.lock().await;
            approvals.decide(plugin_id, approved, &manifest.permissions)?;
        }

        if approved {
            match self.plugins.spawn(manifest, &dir).await {
                Ok(state) => {
                    self.registry
                        .register_plugin_tools(state.tools.clone())
                        .await;
                },
                Err(e) => {
                    warn!(plugin_id = %plugin_id, error = %e, "approved plugin failed to start");
                    return Err(e.into());
                },
            }
        }
        Ok(())
    }

    // --- Shutdown ----------------------------------------------------------

    /// Stop every plugin (close stdin, grace interval, then signal).
    pub async fn shutdown(&self) {
        self.plugins.shutdown_all().await;
    }
}

impl std::fmt::Debug for HostService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostService")
            .field("home", &self.home.root())
            .finish_non_exhaustive()
    }
}

/// The desktop default for `file` results.
fn desktop_dir() -> PathBuf {
    std::env::var("HOME")
        .map(|home| Path::new(&home).join("Desktop"))
        .unwrap_or_else(|_| std::env::temp_dir())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn service_comes_up_against_an_empty_home() {
        let tmp = tempfile::tempdir().unwrap();
        let service = HostService::new(GlassHome::at(tmp.path())).unwrap();
        service.start().await;

        assert!(service.get_pending_approvals().await.is_empty());
        assert!(service.take_events().await.is_some());
        assert!(service.take_events().await.is_none());
    }

    #[tokio::test]
    async fn commands_without_a_session_error_cleanly() {
        let tmp = tempfile::tempdir().unwrap();
        let service = HostService::new(GlassHome::at(tmp.path())).unwrap();

        assert!(matches!(
            service.get_ocr_text().await,
            Err(HostError::NoActiveSession)
        ));
        assert!(matches!(
            service.get_action_menu().await,
            Err(HostError::NoActiveSession)
        ));
    }

    #[tokio::test]
    async fn approving_an_unknown_plugin_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let service = HostService::new(GlassHome::at(tmp.path())).unwrap();
        let err = service.approve_plugin("com.example.ghost", true).await;
        assert!(matches!(err, Err(HostError::UnknownPlugin(_))));
    }

    #[tokio::test]
    async fn provider_settings_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let service = HostService::new(GlassHome::at(tmp.path())).unwrap();

        service
            .set_active_provider(ProviderKind::Local)
            .await
            .unwrap();
        let masked = service.get_provider_config().await;
        assert_eq!(masked["activeProvider"], "local");

        service
            .save_api_key(ProviderKind::Claude, "sk-test".to_string())
            .await
            .unwrap();
        let masked = service.get_provider_config().await.to_string();
        assert!(!masked.contains("sk-test"));
    }
}
