//! The stdio MCP connection.
//!
//! One connection per live plugin, split into three cooperating parts:
//! a writer task owning the child's stdin (fed through an in-memory
//! channel), a reader task owning stdout (matching responses to pending
//! waiters by id), and the caller-facing [`PluginConnection`] handle.
//! Responses may arrive out of send order; each must match an
//! outstanding waiter.
//!
//! The transport is generic over `AsyncRead`/`AsyncWrite` so the wire
//! behaviour is testable against in-memory duplex pipes; the supervisor
//! wires in real child pipes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{PluginError, PluginResult};
use crate::rpc::{MCP_PROTOCOL_VERSION, RemoteTool, RpcRequest, RpcResponse, ToolCallResult};

/// Default per-call timeout. A slow call frees its waiter but does not
/// kill the plugin.
pub const CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Grace interval the supervisor waits after closing stdin before
/// sending a terminating signal.
pub const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

/// Health of a live connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginHealth {
    /// The protocol is intact.
    Live,
    /// The plugin broke the protocol or its pipes closed.
    Faulted,
}

/// The outcome of a `tools/call` dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCallOutcome {
    /// Concatenated text content.
    pub text: String,
    /// Whether the plugin flagged the call as failed.
    pub is_error: bool,
}

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<RpcResponse>>>>;

/// A live NDJSON JSON-RPC connection to one plugin process.
pub struct PluginConnection {
    plugin_id: String,
    writer_tx: mpsc::Sender<String>,
    pending: PendingMap,
    next_id: AtomicU64,
    faulted: Arc<AtomicBool>,
    call_timeout: Duration,
    reader_task: JoinHandle<()>,
    writer_task: JoinHandle<()>,
}

impl PluginConnection {
    /// Start the reader and writer tasks over the given transport halves.
    pub fn new(
        plugin_id: impl Into<String>,
        reader: impl AsyncRead + Unpin + Send + 'static,
        writer: impl AsyncWrite + Unpin + Send + 'static,
    ) -> Self {
        let plugin_id = plugin_id.into();
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let faulted = Arc::new(AtomicBool::new(false));
        let (writer_tx, writer_rx) = mpsc::channel::<String>(32);

        let writer_task = Self::spawn_writer(plugin_id.clone(), writer, writer_rx, &faulted);
        let reader_task = Self::spawn_reader(plugin_id.clone(), reader, &pending, &faulted);

        Self {
            plugin_id,
            writer_tx,
            pending,
            next_id: AtomicU64::new(0),
            faulted,
            call_timeout: CALL_TIMEOUT,
            reader_task,
            writer_task,
        }
    }

    /// Override the per-call timeout (tests use a short one).
    #[must_use]
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    fn spawn_writer(
        plugin_id: String,
        mut writer: impl AsyncWrite + Unpin + Send + 'static,
        mut rx: mpsc::Receiver<String>,
        faulted: &Arc<AtomicBool>,
    ) -> JoinHandle<()> {
        let faulted = Arc::clone(faulted);
        tokio::spawn(async move {
            while let Some(line) = rx.recv().await {
                let write = async {
                    writer.write_all(line.as_bytes()).await?;
                    writer.write_all(b"\n").await?;
                    writer.flush().await
                };
                if let Err(e) = write.await {
                    warn!(plugin_id = %plugin_id, error = %e, "plugin stdin write failed");
                    faulted.store(true, Ordering::SeqCst);
                    break;
                }
            }
            // Channel closed: shutdown. Dropping the writer closes stdin.
        })
    }

    fn spawn_reader(
        plugin_id: String,
        reader: impl AsyncRead + Unpin + Send + 'static,
        pending: &PendingMap,
        faulted: &Arc<AtomicBool>,
    ) -> JoinHandle<()> {
        let pending = Arc::clone(pending);
        let faulted = Arc::clone(faulted);
        tokio::spawn(async move {
            let mut lines = BufReader::new(reader).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        if !Self::dispatch_line(&plugin_id, &line, &pending) {
                            faulted.store(true, Ordering::SeqCst);
                            break;
                        }
                    },
                    Ok(None) => {
                        debug!(plugin_id = %plugin_id, "plugin stdout closed");
                        break;
                    },
                    Err(e) => {
                        warn!(plugin_id = %plugin_id, error = %e, "plugin stdout read failed");
                        faulted.store(true, Ordering::SeqCst);
                        break;
                    },
                }
            }
            // Wake every outstanding waiter by dropping its sender.
            let mut map = pending.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            map.clear();
        })
    }

    /// Handle one inbound line. Returns `false` on a protocol violation.
    fn dispatch_line(plugin_id: &str, line: &str, pending: &PendingMap) -> bool {
        let Ok(value) = serde_json::from_str::<Value>(line) else {
            warn!(plugin_id = %plugin_id, line = %line, "unparseable line from plugin");
            return false;
        };

        // Server-initiated requests and notifications are outside this
        // host's protocol surface; log and move on.
        if value.get("method").is_some() {
            debug!(plugin_id = %plugin_id, "ignoring server-initiated message");
            return true;
        }

        let Ok(response) = serde_json::from_value::<RpcResponse>(value) else {
            warn!(plugin_id = %plugin_id, "malformed response envelope from plugin");
            return false;
        };
        let Some(id) = response.id else {
            warn!(plugin_id = %plugin_id, "response without id from plugin");
            return false;
        };

        let waiter = {
            let mut map = pending.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            map.remove(&id)
        };
        match waiter {
            Some(tx) => {
                let _ = tx.send(response);
            },
            None => {
                // Likely the answer to a call whose waiter timed out.
                debug!(plugin_id = %plugin_id, id, "dropping response with no waiter");
            },
        }
        true
    }

    /// Current health.
    #[must_use]
    pub fn health(&self) -> PluginHealth {
        if self.faulted.load(Ordering::SeqCst) {
            PluginHealth::Faulted
        } else {
            PluginHealth::Live
        }
    }

    /// Send a request and await its response, bounded by the call timeout.
    pub async fn request(&self, method: &str, params: Option<Value>) -> PluginResult<RpcResponse> {
        if self.health() == PluginHealth::Faulted {
            return Err(PluginError::NotLive {
                plugin_id: self.plugin_id.clone(),
            });
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst).wrapping_add(1);
        let (tx, rx) = oneshot::channel();
        {
            let mut map = self
                .pending
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            map.insert(id, tx);
        }

        let line = serde_json::to_string(&RpcRequest::call(id, method, params))?;
        if self.writer_tx.send(line).await.is_err() {
            self.forget_waiter(id);
            return Err(PluginError::NotLive {
                plugin_id: self.plugin_id.clone(),
            });
        }

        match tokio::time::timeout(self.call_timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(PluginError::Protocol {
                plugin_id: self.plugin_id.clone(),
                reason: "connection closed while awaiting response".to_string(),
            }),
            Err(_) => {
                self.forget_waiter(id);
                warn!(
                    plugin_id = %self.plugin_id,
                    method = %method,
                    timeout_secs = self.call_timeout.as_secs(),
                    "plugin call timed out"
                );
                Err(PluginError::CallTimeout {
                    plugin_id: self.plugin_id.clone(),
                    tool: method.to_string(),
                    timeout_secs: self.call_timeout.as_secs(),
                })
            },
        }
    }

    fn forget_waiter(&self, id: u64) {
        let mut map = self
            .pending
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        map.remove(&id);
    }

    /// Send a notification (no response expected).
    pub async fn notify(&self, method: &str, params: Option<Value>) -> PluginResult<()> {
        let line = serde_json::to_string(&RpcRequest::notification(method, params))?;
        self.writer_tx
            .send(line)
            .await
            .map_err(|_| PluginError::NotLive {
                plugin_id: self.plugin_id.clone(),
            })
    }

    /// Run the MCP handshake and discover the plugin's tools.
    ///
    /// `initialize` → `notifications/initialized` → `tools/list`.
    pub async fn handshake(&self) -> PluginResult<Vec<RemoteTool>> {
        let init = self
            .request(
                "initialize",
                Some(json!({
                    "protocolVersion": MCP_PROTOCOL_VERSION,
                    "capabilities": {"tools": {}},
                    "clientInfo": {
                        "name": "omni-glass",
                        "version": env!("CARGO_PKG_VERSION"),
                    },
                })),
            )
            .await?;
        if let Some(error) = init.error {
            return Err(PluginError::HandshakeFailed {
                plugin_id: self.plugin_id.clone(),
                reason: format!("initialize error {}: {}", error.code, error.message),
            });
        }
        if init.result.is_none() {
            return Err(PluginError::HandshakeFailed {
                plugin_id: self.plugin_id.clone(),
                reason: "initialize returned no result".to_string(),
            });
        }

        self.notify("notifications/initialized", None).await?;

        let listed = self.request("tools/list", None).await?;
        if let Some(error) = listed.error {
            return Err(PluginError::HandshakeFailed {
                plugin_id: self.plugin_id.clone(),
                reason: format!("tools/list error {}: {}", error.code, error.message),
            });
        }
        let tools: Vec<RemoteTool> = listed
            .result
            .as_ref()
            .and_then(|r| r.get("tools"))
            .cloned()
            .map(serde_json::from_value)
            .transpose()?
            .unwrap_or_default();

        info!(
            plugin_id = %self.plugin_id,
            tools = tools.len(),
            "plugin handshake complete"
        );
        Ok(tools)
    }

    /// Dispatch a `tools/call` and interpret the MCP result shape.
    pub async fn call_tool(&self, tool: &str, arguments: Value) -> PluginResult<ToolCallOutcome> {
        let response = self
            .request("tools/call", Some(json!({"name": tool, "arguments": arguments})))
            .await
            .map_err(|e| match e {
                PluginError::CallTimeout { plugin_id, .. } => PluginError::CallTimeout {
                    plugin_id,
                    tool: tool.to_string(),
                    timeout_secs: self.call_timeout.as_secs(),
                },
                other => other,
            })?;

        if let Some(error) = response.error {
            return Err(PluginError::Rpc {
                plugin_id: self.plugin_id.clone(),
                code: error.code,
                message: error.message,
            });
        }
        let result: ToolCallResult = response
            .result
            .map(serde_json::from_value)
            .transpose()?
            .unwrap_or_default();

        Ok(ToolCallOutcome {
            text: result.text(),
            is_error: result.is_error,
        })
    }

    /// Close the write half and stop both I/O tasks.
    ///
    /// The supervisor follows this with the grace interval and, if the
    /// child is still running, a terminating signal.
    pub fn close(&self) {
        // Dropping all senders closes the channel; since `self` keeps one
        // clone alive we abort the tasks directly instead.
        self.reader_task.abort();
        self.writer_task.abort();
    }

    /// The plugin this connection belongs to.
    #[must_use]
    pub fn plugin_id(&self) -> &str {
        &self.plugin_id
    }
}

impl Drop for PluginConnection {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    /// Spawn a scripted peer that answers requests like a well-behaved
    /// plugin exposing one `ping` tool.
    fn well_behaved_peer(
        reader: impl AsyncRead + Unpin + Send + 'static,
        mut writer: impl AsyncWrite + Unpin + Send + 'static,
    ) {
        tokio::spawn(async move {
            let mut lines = BufReader::new(reader).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let msg: Value = serde_json::from_str(&line).unwrap();
                let Some(id) = msg.get("id").and_then(Value::as_u64) else {
                    continue; // notification
                };
                let reply = match msg["method"].as_str() {
                    Some("initialize") => json!({
                        "jsonrpc": "2.0", "id": id,
                        "result": {
                            "protocolVersion": MCP_PROTOCOL_VERSION,
                            "capabilities": {"tools": {}},
                        }
                    }),
                    Some("tools/list") => json!({
                        "jsonrpc": "2.0", "id": id,
                        "result": {"tools": [{
                            "name": "ping",
                            "description": "Reply with pong",
                            "inputSchema": {"type": "object"}
                        }]}
                    }),
                    Some("tools/call") => json!({
                        "jsonrpc": "2.0", "id": id,
                        "result": {
                            "content": [{"type": "text", "text": "pong"}],
                            "isError": false
                        }
                    }),
                    _ => json!({
                        "jsonrpc": "2.0", "id": id,
                        "error": {"code": -32601, "message": "method not found"}
                    }),
                };
                writer
                    .write_all(format!("{reply}\n").as_bytes())
                    .await
                    .unwrap();
                writer.flush().await.unwrap();
            }
        });
    }

    fn connected_pair() -> PluginConnection {
        // Two unidirectional pipes: host stdin→plugin and plugin stdout→host.
        let (host_write, plugin_read) = duplex(4096);
        let (plugin_write, host_read) = duplex(4096);
        well_behaved_peer(plugin_read, plugin_write);
        PluginConnection::new("com.example.ping", host_read, host_write)
    }

    #[tokio::test]
    async fn handshake_discovers_tools() {
        let conn = connected_pair();
        let tools = conn.handshake().await.unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "ping");
        assert_eq!(conn.health(), PluginHealth::Live);
    }

    #[tokio::test]
    async fn call_tool_round_trip() {
        let conn = connected_pair();
        conn.handshake().await.unwrap();
        let outcome = conn.call_tool("ping", json!({})).await.unwrap();
        assert_eq!(outcome.text, "pong");
        assert!(!outcome.is_error);
    }

    #[tokio::test]
    async fn out_of_order_responses_match_waiters() {
        let (host_write, plugin_read) = duplex(4096);
        let (mut plugin_write, host_read) = duplex(4096);

        // Peer that holds both requests, then answers them in reverse
        // send order, echoing the method so matching is observable.
        tokio::spawn(async move {
            let mut lines = BufReader::new(plugin_read).lines();
            let mut held: Vec<(u64, String)> = Vec::new();
            while let Ok(Some(line)) = lines.next_line().await {
                let msg: Value = serde_json::from_str(&line).unwrap();
                if let Some(id) = msg.get("id").and_then(Value::as_u64) {
                    held.push((id, msg["method"].as_str().unwrap_or_default().to_string()));
                }
                if held.len() == 2 {
                    for (id, method) in held.iter().rev() {
                        let reply = json!({
                            "jsonrpc": "2.0", "id": id,
                            "result": {"method": method}
                        });
                        plugin_write
                            .write_all(format!("{reply}\n").as_bytes())
                            .await
                            .unwrap();
                    }
                    plugin_write.flush().await.unwrap();
                    break;
                }
            }
        });

        let conn = Arc::new(PluginConnection::new("p", host_read, host_write));
        let first = {
            let conn = Arc::clone(&conn);
            tokio::spawn(async move { conn.request("a", None).await.unwrap() })
        };
        let second = {
            let conn = Arc::clone(&conn);
            tokio::spawn(async move { conn.request("b", None).await.unwrap() })
        };

        let first = first.await.unwrap();
        let second = second.await.unwrap();
        assert_eq!(first.result.unwrap()["method"], "a");
        assert_eq!(second.result.unwrap()["method"], "b");
    }

    #[tokio::test]
    async fn timeout_frees_the_waiter_and_keeps_the_plugin_live() {
        let (host_write, _plugin_read) = duplex(4096);
        let (_plugin_write, host_read) = duplex(4096);

        let conn = PluginConnection::new("p", host_read, host_write)
            .with_call_timeout(Duration::from_millis(50));

        let err = conn.request("slow", None).await.unwrap_err();
        assert!(matches!(err, PluginError::CallTimeout { .. }));
        assert_eq!(conn.health(), PluginHealth::Live);
        assert!(conn.pending.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn garbage_line_faults_the_plugin() {
        let (host_write, _plugin_read) = duplex(4096);
        let (mut plugin_write, host_read) = duplex(4096);

        let conn = PluginConnection::new("p", host_read, host_write)
            .with_call_timeout(Duration::from_millis(200));

        plugin_write.write_all(b"this is not json\n").await.unwrap();
        plugin_write.flush().await.unwrap();

        // Give the reader task a beat to process the line.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(conn.health(), PluginHealth::Faulted);

        let err = conn.request("anything", None).await.unwrap_err();
        assert!(matches!(err, PluginError::NotLive { .. }));
    }

    #[tokio::test]
    async fn late_response_after_timeout_is_dropped() {
        let (host_write, plugin_read) = duplex(4096);
        let (mut plugin_write, host_read) = duplex(4096);

        let conn = PluginConnection::new("p", host_read, host_write)
            .with_call_timeout(Duration::from_millis(50));

        let err = conn.request("slow", None).await.unwrap_err();
        assert!(matches!(err, PluginError::CallTimeout { .. }));

        // The plugin finally answers id 1; nothing is waiting.
        plugin_write
            .write_all(b"{\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{}}\n")
            .await
            .unwrap();
        plugin_write.flush().await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(conn.health(), PluginHealth::Live);
        drop(plugin_read);
    }

    #[tokio::test]
    async fn rpc_error_surfaces_as_plugin_error() {
        let conn = connected_pair();
        conn.handshake().await.unwrap();
        let err = conn
            .request("no/such/method", None)
            .await
            .map(|r| r.error)
            .unwrap();
        assert_eq!(err.unwrap().code, -32601);
    }
}
