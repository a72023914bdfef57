//! The pipeline orchestrator.
//!
//! One session per snip or typed command, progressing through a fixed
//! state machine:
//!
//! ```text
//! ocr → classify → await_click → execute → done
//!          ↓                        ↓
//!       failed                   failed
//! ```
//!
//! Classify strictly precedes execute within a session; the skeleton
//! event strictly precedes the complete menu event. Across sessions
//! nothing is ordered. Plugin processes are never killed by session
//! cancellation, only by app shutdown or by faulting.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::{Mutex, mpsc};
use tracing::{info, warn};
use uuid::Uuid;

use omni_glass_core::{
    ActionMenu, ActionResult, ActionStatus, PipelinePhase, ResultBody, SnipContext,
    StructuralFlags, TokenUsage,
};
use omni_glass_llm::{ChunkStream, LlmProvider, StreamChunk};
use omni_glass_plugins::{PluginError, PluginSet};
use omni_glass_safety::redact;

use crate::error::{PipelineError, PipelineResult};
use crate::events::PipelineEvent;
use crate::extractor::SkeletonExtractor;
use crate::heuristics::detect_structure;
use crate::prompts::{build_classify_request, build_execute_request};
use crate::registry::{ToolRegistry, ToolTarget};

/// End-to-end bound on one LLM stream.
pub const STREAM_TIMEOUT: Duration = Duration::from_secs(60);

/// Error strings the OCR collaborator uses for a failed recognition.
const OCR_ERROR_MARKERS: &[&str] = &["[OCR_ERROR]", "OCR failed"];

/// Per-session state owned by the orchestrating task.
#[derive(Debug)]
struct Session {
    snip: SnipContext,
    flags: StructuralFlags,
    phase: PipelinePhase,
    menu: Option<ActionMenu>,
    selected: Option<String>,
    usage: TokenUsage,
}

/// The top-level pipeline state machine.
pub struct Orchestrator {
    provider: std::sync::RwLock<Arc<dyn LlmProvider>>,
    registry: Arc<ToolRegistry>,
    plugins: Arc<PluginSet>,
    events: mpsc::UnboundedSender<PipelineEvent>,
    sessions: Mutex<HashMap<Uuid, Session>>,
    stream_timeout: Duration,
}

impl Orchestrator {
    /// Create an orchestrator and the event stream the UI consumes.
    #[must_use]
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        registry: Arc<ToolRegistry>,
        plugins: Arc<PluginSet>,
    ) -> (Self, mpsc::UnboundedReceiver<PipelineEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        (
            Self {
                provider: std::sync::RwLock::new(provider),
                registry,
                plugins,
                events,
                sessions: Mutex::new(HashMap::new()),
                stream_timeout: STREAM_TIMEOUT,
            },
            rx,
        )
    }

    /// The currently selected provider.
    #[must_use]
    pub fn provider(&self) -> Arc<dyn LlmProvider> {
        self.provider
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Swap the active provider. Sessions already streaming keep the
    /// provider they started with.
    pub fn set_provider(&self, provider: Arc<dyn LlmProvider>) {
        let mut slot = self
            .provider
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *slot = provider;
    }

    /// Override the stream timeout (tests use a short one).
    #[must_use]
    pub fn with_stream_timeout(mut self, timeout: Duration) -> Self {
        self.stream_timeout = timeout;
        self
    }

    fn publish(&self, event: PipelineEvent) {
        let _ = self.events.send(event);
    }

    /// Entry point for a snip: validate the OCR output, then classify.
    ///
    /// Returns the session id and the published menu.
    pub async fn process_snip(&self, snip: SnipContext) -> PipelineResult<(Uuid, ActionMenu)> {
        let text = snip.text.trim();
        if text.is_empty() || OCR_ERROR_MARKERS.iter().any(|m| text.starts_with(m)) {
            return Err(PipelineError::EmptySnip);
        }

        let session_id = Uuid::new_v4();
        {
            let mut sessions = self.sessions.lock().await;
            sessions.insert(
                session_id,
                Session {
                    flags: detect_structure(&snip.text),
                    snip,
                    phase: PipelinePhase::Classify,
                    menu: None,
                    selected: None,
                    usage: TokenUsage::default(),
                },
            );
        }

        match self.classify(session_id).await {
            Ok(menu) => Ok((session_id, menu)),
            Err(e) => {
                self.fail_session(session_id, &e).await;
                Err(e)
            },
        }
    }

    /// Typed-command entry point: the query is treated as OCR output and
    /// routed through the same CLASSIFY → EXECUTE pipeline.
    pub async fn process_text_command(&self, text: &str) -> PipelineResult<(Uuid, ActionMenu)> {
        self.process_snip(SnipContext::from_text(text, 1.0)).await
    }

    /// CLASSIFY: redact (remote only), assemble, stream, extract the
    /// skeleton, then strictly parse (falling back on parse failure).
    async fn classify(&self, session_id: Uuid) -> PipelineResult<ActionMenu> {
        let (snip, flags) = {
            let sessions = self.sessions.lock().await;
            let session = sessions
                .get(&session_id)
                .ok_or(PipelineError::UnknownSession(session_id))?;
            (session.snip.clone(), session.flags)
        };

        let (outbound_text, redaction_labels) = self.outbound_text(&snip.text);
        if !redaction_labels.is_empty() {
            self.publish(PipelineEvent::RedactionApplied {
                session_id,
                labels: redaction_labels.clone(),
            });
        }

        let permitted = self.registry.permitted_action_ids().await;
        let tools_block = self.registry.prompt_block().await;
        let request =
            build_classify_request(&snip, flags, &permitted, &tools_block, &outbound_text);

        let stream = self
            .provider()
            .stream_classify(&request)
            .await
            .map_err(|e| PipelineError::from_llm(&e))?;

        let mut extractor = SkeletonExtractor::new();
        let usage = self
            .consume_stream(stream, |delta| {
                if let Some(skeleton) = extractor.push(delta) {
                    self.publish(PipelineEvent::Skeleton {
                        session_id,
                        content_type: skeleton.content_type,
                        summary: skeleton.summary,
                    });
                }
            })
            .await?;

        let (mut menu, parse_failed) = extractor.finish();
        if parse_failed {
            warn!(session_id = %session_id, "classify output unparseable; using fallback menu");
        }

        // Menu invariant: every offered id is built-in or registered.
        let mut known = Vec::new();
        for action in menu.actions.drain(..) {
            if self.registry.is_known(&action.id).await {
                known.push(action);
            } else {
                warn!(action_id = %action.id, "dropping unregistered action from menu");
            }
        }
        menu.actions = known;
        menu.redaction_notices = redaction_labels;
        menu.normalize();

        {
            let mut sessions = self.sessions.lock().await;
            if let Some(session) = sessions.get_mut(&session_id) {
                session.usage.add(usage);
                session.menu = Some(menu.clone());
                session.phase = PipelinePhase::AwaitClick;
            }
        }

        info!(
            session_id = %session_id,
            content_type = menu.content_type.as_str(),
            actions = menu.actions.len(),
            "published action menu"
        );
        self.publish(PipelineEvent::MenuReady {
            session_id,
            menu: menu.clone(),
        });
        Ok(menu)
    }

    /// EXECUTE: dispatch the selected action to its target.
    pub async fn execute_action(
        &self,
        session_id: Uuid,
        action_id: &str,
    ) -> PipelineResult<ActionResult> {
        let (snip, action) = {
            let mut sessions = self.sessions.lock().await;
            let session = sessions
                .get_mut(&session_id)
                .ok_or(PipelineError::UnknownSession(session_id))?;
            if session.phase != PipelinePhase::AwaitClick {
                return Err(PipelineError::WrongPhase {
                    phase: format!("{:?}", session.phase),
                    expected: "AwaitClick".to_string(),
                });
            }
            let action = session
                .menu
                .as_ref()
                .and_then(|m| m.action(action_id))
                .cloned()
                .ok_or_else(|| PipelineError::UnknownAction(action_id.to_string()))?;
            session.phase = PipelinePhase::Execute;
            session.selected = Some(action_id.to_string());
            (session.snip.clone(), action)
        };

        let result = if action.requires_execution {
            self.publish(PipelineEvent::ExecuteStarted {
                session_id,
                action_id: action_id.to_string(),
            });
            self.execute_remote(session_id, action_id, &snip).await
        } else {
            Ok(Self::execute_local(action_id, &snip))
        };

        match result {
            Ok(result) => {
                {
                    let mut sessions = self.sessions.lock().await;
                    if let Some(session) = sessions.get_mut(&session_id) {
                        session.phase = PipelinePhase::Done;
                        if let Some(usage) = result.meta.usage {
                            session.usage.add(usage);
                        }
                    }
                }
                self.publish(PipelineEvent::ResultReady {
                    session_id,
                    result: result.clone(),
                });
                Ok(result)
            },
            Err(e) => {
                self.fail_session(session_id, &e).await;
                Err(e)
            },
        }
    }

    /// Local actions never leave the machine and never reach EXECUTE.
    fn execute_local(action_id: &str, snip: &SnipContext) -> ActionResult {
        match action_id {
            "copy_text" => ActionResult {
                status: ActionStatus::Success,
                action_id: action_id.to_string(),
                result_body: ResultBody::Clipboard {
                    text: snip.text.clone(),
                },
                meta: omni_glass_core::ResultMeta::default(),
            },
            "search_web" => {
                let query: String = snip.text.chars().take(200).collect();
                let encoded = query
                    .split(|c: char| !c.is_ascii_alphanumeric())
                    .filter(|w| !w.is_empty())
                    .collect::<Vec<_>>()
                    .join("+");
                ActionResult::text(
                    action_id,
                    format!("[Search the web](https://duckduckgo.com/?q={encoded})"),
                )
            },
            other => ActionResult::text(
                other,
                "This action is handled by the menu directly.".to_string(),
            ),
        }
    }

    /// Execute an action that needs a second model call or a plugin.
    async fn execute_remote(
        &self,
        session_id: Uuid,
        action_id: &str,
        snip: &SnipContext,
    ) -> PipelineResult<ActionResult> {
        let resolved = self
            .registry
            .resolve(action_id)
            .await
            .ok_or_else(|| PipelineError::UnknownAction(action_id.to_string()))?;

        match resolved.target {
            ToolTarget::Plugin {
                plugin_id,
                tool_name,
            } => self.dispatch_plugin(&plugin_id, &tool_name, action_id, snip).await,
            ToolTarget::Builtin => self.dispatch_builtin(session_id, action_id, snip).await,
        }
    }

    /// Route an action to its plugin over MCP. A faulted plugin loses
    /// its tools; everything else stays available.
    async fn dispatch_plugin(
        &self,
        plugin_id: &str,
        tool_name: &str,
        action_id: &str,
        snip: &SnipContext,
    ) -> PipelineResult<ActionResult> {
        let arguments = serde_json::json!({"text": snip.text});
        match self.plugins.call_tool(plugin_id, tool_name, arguments).await {
            Ok(outcome) => {
                let mut result = ActionResult::text(action_id, outcome.text);
                if outcome.is_error {
                    result.status = ActionStatus::Error;
                }
                Ok(result)
            },
            Err(e) => {
                warn!(plugin_id = %plugin_id, error = %e, "plugin dispatch failed");
                if matches!(
                    e,
                    PluginError::Protocol { .. } | PluginError::NotLive { .. }
                ) {
                    self.registry.remove_plugin(plugin_id).await;
                }
                // Plugin faults are logged, not fatal to the pipeline:
                // the user gets an error result for this click.
                Ok(ActionResult::error(
                    action_id,
                    "The plugin behind this action is unavailable.",
                )
                .with_note(e.to_string()))
            },
        }
    }

    /// Run the EXECUTE model role for a built-in action.
    async fn dispatch_builtin(
        &self,
        session_id: Uuid,
        action_id: &str,
        snip: &SnipContext,
    ) -> PipelineResult<ActionResult> {
        let (outbound_text, redaction_labels) = self.outbound_text(&snip.text);
        if !redaction_labels.is_empty() {
            self.publish(PipelineEvent::RedactionApplied {
                session_id,
                labels: redaction_labels,
            });
        }

        let request = build_execute_request(action_id, snip, &outbound_text);
        let stream = self
            .provider()
            .stream_execute(&request)
            .await
            .map_err(|e| PipelineError::from_llm(&e))?;

        let mut body = String::new();
        let usage = self
            .consume_stream(stream, |delta| body.push_str(delta))
            .await?;

        let mut result = parse_action_result(&body)?;
        result.action_id = action_id.to_string();
        result.meta.usage = Some(usage);

        // The blocklist's first consultation: between the model and the
        // user. The dispatcher consults it again before any spawn.
        let blocked = match &result.result_body {
            ResultBody::Command { command, rationale } => {
                let verdict = omni_glass_safety::classify_command(command);
                verdict
                    .reason
                    .filter(|_| !verdict.safe)
                    .map(|reason| (reason, command.clone(), rationale.clone()))
            },
            _ => None,
        };
        if let Some((reason, command, rationale)) = blocked {
            warn!(
                session_id = %session_id,
                command = %command,
                reason = %reason,
                "blocklist refused model-proposed command"
            );
            result = ActionResult::error(action_id, reason)
                .with_note(format!("blocked command rationale: {rationale}"))
                .with_usage(usage);
        }

        Ok(result)
    }

    /// Redact when (and only when) the selected provider is remote.
    fn outbound_text(&self, text: &str) -> (String, Vec<String>) {
        if self.provider().is_remote() {
            let redaction = redact(text);
            let labels = redaction
                .labels()
                .into_iter()
                .map(ToString::to_string)
                .collect();
            (redaction.text, labels)
        } else {
            (text.to_string(), Vec::new())
        }
    }

    /// Drain a provider stream under the end-to-end timeout.
    async fn consume_stream(
        &self,
        mut stream: ChunkStream,
        mut on_delta: impl FnMut(&str),
    ) -> PipelineResult<TokenUsage> {
        let drained = tokio::time::timeout(self.stream_timeout, async {
            let mut usage = TokenUsage::default();
            while let Some(chunk) = stream.next().await {
                match chunk {
                    Ok(StreamChunk::Delta(delta)) => on_delta(&delta),
                    Ok(StreamChunk::Done { usage: reported }) => usage = reported,
                    Err(e) => return Err(PipelineError::from_llm(&e)),
                }
            }
            Ok(usage)
        })
        .await;

        match drained {
            Ok(result) => result,
            Err(_) => Err(PipelineError::Transient(format!(
                "stream exceeded {}s",
                self.stream_timeout.as_secs()
            ))),
        }
    }

    async fn fail_session(&self, session_id: Uuid, error: &PipelineError) {
        {
            let mut sessions = self.sessions.lock().await;
            if let Some(session) = sessions.get_mut(&session_id) {
                session.phase = PipelinePhase::Failed;
            }
        }
        self.publish(PipelineEvent::SessionFailed {
            session_id,
            message: error.to_string(),
            retryable: matches!(error, PipelineError::Transient(_)),
        });
    }

    /// Drop a session. Outstanding streams are aborted by dropping their
    /// futures; the menu is unpublished by the UI. Plugin processes are
    /// untouched.
    pub async fn cancel_session(&self, session_id: Uuid) {
        let mut sessions = self.sessions.lock().await;
        sessions.remove(&session_id);
    }

    /// Current phase of a session.
    pub async fn phase(&self, session_id: Uuid) -> Option<PipelinePhase> {
        let sessions = self.sessions.lock().await;
        sessions.get(&session_id).map(|s| s.phase)
    }

    /// The most recent menu of a session.
    pub async fn action_menu(&self, session_id: Uuid) -> Option<ActionMenu> {
        let sessions = self.sessions.lock().await;
        sessions.get(&session_id).and_then(|s| s.menu.clone())
    }

    /// The OCR text of a session.
    pub async fn ocr_text(&self, session_id: Uuid) -> Option<String> {
        let sessions = self.sessions.lock().await;
        sessions.get(&session_id).map(|s| s.snip.text.clone())
    }

    /// The action id a session is executing (or executed).
    pub async fn selected_action(&self, session_id: Uuid) -> Option<String> {
        let sessions = self.sessions.lock().await;
        sessions.get(&session_id).and_then(|s| s.selected.clone())
    }

    /// Total token usage of a session so far.
    pub async fn token_usage(&self, session_id: Uuid) -> Option<TokenUsage> {
        let sessions = self.sessions.lock().await;
        sessions.get(&session_id).map(|s| s.usage)
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = self.provider().label().to_string();
        f.debug_struct("Orchestrator")
            .field("provider", &label)
            .finish_non_exhaustive()
    }
}

/// Strictly parse EXECUTE output, tolerating a markdown fence.
///
/// Command bodies are normalized to `needs_confirmation`: the pairing
/// is an invariant of this host, not a courtesy of the model.
fn parse_action_result(body: &str) -> PipelineResult<ActionResult> {
    let cleaned = crate::extractor::strip_code_fences(body.trim());
    let mut result: ActionResult = serde_json::from_str(cleaned)
        .map_err(|e| PipelineError::Parse(format!("execute output: {e}")))?;
    if matches!(result.result_body, ResultBody::Command { .. }) {
        result.status = ActionStatus::NeedsConfirmation;
    }
    Ok(result)
}
