//! WebSocket API handler and session management.
//!
//! Each connection owns one whiteboard session. Tool calls arrive as JSON
//! text frames and are queued in arrival order; drawing commands and tool
//! results leave through a single writer task.

use crate::AppState;
use axum::{
    extract::{
        ws::{Message as AxumMessage, WebSocket},
        Extension, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures_util::{stream::SplitSink, SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{collections::HashMap, sync::Arc};
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use uuid::Uuid;
use whiteboard_session::{
    CloseReason, CommandSession, CommandStream, SessionHandle, SessionReport, ToolCallGateway,
    ToolError, ToolOutput,
};
use whiteboard_types::GraphSnapshot;

/// Incoming WebSocket message types.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IncomingMessage {
    /// A function call emitted by the voice agent.
    ToolCall {
        call_id: String,
        name: String,
        #[serde(default)]
        arguments: Value,
    },
    /// Redraw the whole diagram, e.g. after the canvas reloaded.
    Resync,
    Snapshot,
    /// The transcription or agent pipeline failed upstream.
    UpstreamError { message: String },
}

/// Error body of a failed `tool_result`.
#[derive(Debug, Serialize)]
pub struct ToolErrorBody {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed: Option<Vec<&'static str>>,
}

impl From<&ToolError> for ToolErrorBody {
    fn from(err: &ToolError) -> Self {
        Self {
            code: err.code(),
            message: err.to_string(),
            allowed: err.allowed().map(<[&'static str]>::to_vec),
        }
    }
}

/// Outgoing WebSocket message types other than drawing commands.
///
/// Drawing commands are written as their own `{ type, payload }` envelopes.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutgoingMessage {
    ToolResult {
        call_id: String,
        ok: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<ToolErrorBody>,
    },
    Snapshot { payload: GraphSnapshot },
    Error { message: String },
    SessionClosed { reason: CloseReason },
}

impl OutgoingMessage {
    pub fn tool_result(call_id: String, result: Result<ToolOutput, ToolError>) -> Self {
        match result {
            Ok(output) => Self::ToolResult {
                call_id,
                ok: true,
                result: Some(output.to_json()),
                error: None,
            },
            Err(err) => Self::ToolResult {
                call_id,
                ok: false,
                result: None,
                error: Some(ToolErrorBody::from(&err)),
            },
        }
    }
}

/// Tracks live sessions so they can be closed together on shutdown.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<Uuid, SessionHandle>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a session under its own id.
    pub async fn add(&self, handle: SessionHandle) -> Uuid {
        let id = handle.id();
        self.sessions.write().await.insert(id, handle);
        id
    }

    /// Forgets a session. Returns `false` if it was not registered.
    pub async fn remove(&self, id: Uuid) -> bool {
        self.sessions.write().await.remove(&id).is_some()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Closes and forgets every session. Returns how many were closed.
    pub async fn close_all(&self) -> usize {
        let drained: Vec<SessionHandle> = {
            let mut sessions = self.sessions.write().await;
            sessions.drain().map(|(_, handle)| handle).collect()
        };
        for handle in &drained {
            handle.close();
        }
        drained.len()
    }
}

/// Frames waiting for the writer besides drawing commands.
const FRAME_BUFFER: usize = 256;

/// WebSocket handler: `GET /ws`.
pub async fn ws_handler(
    Extension(state): Extension<Arc<AppState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

fn encode(message: &OutgoingMessage) -> Option<String> {
    match serde_json::to_string(message) {
        Ok(json) => Some(json),
        Err(e) => {
            tracing::error!("failed to serialize WebSocket message: {}", e);
            None
        }
    }
}

/// Sends a JSON-serialized error message over the WebSocket sender channel.
fn send_ws_error(tx: &mpsc::Sender<String>, message: String) {
    if let Some(json) = encode(&OutgoingMessage::Error { message }) {
        if let Err(e) = tx.try_send(json) {
            tracing::warn!("failed to send WebSocket error to client: {}", e);
        }
    }
}

async fn send_frame(tx: &mpsc::Sender<String>, message: &OutgoingMessage) {
    if let Some(json) = encode(message) {
        if tx.send(json).await.is_err() {
            tracing::debug!("WebSocket writer gone; dropping frame");
        }
    }
}

/// Handles the WebSocket connection.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (handle, commands, task) =
        CommandSession::start(state.config.session.to_session_config());
    let session_id = state.registry.add(handle.clone()).await;
    tracing::info!(%session_id, "whiteboard websocket connected");

    let (sender, mut receiver) = socket.split();
    let (tx, rx) = mpsc::channel::<String>(FRAME_BUFFER);
    let mut send_task = tokio::spawn(forward_frames(sender, commands, rx, task));
    let gateway = ToolCallGateway::new();

    let writer_result = loop {
        tokio::select! {
            finished = &mut send_task => break Some(finished),
            incoming = receiver.next() => match incoming {
                Some(Ok(AxumMessage::Text(text))) => {
                    handle_text(&handle, gateway, &tx, text.as_str()).await;
                }
                Some(Ok(AxumMessage::Binary(_))) => {
                    send_ws_error(
                        &tx,
                        "binary frames are not accepted; send transcribed tool calls".to_string(),
                    );
                }
                Some(Ok(AxumMessage::Close(_))) | None => break None,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::warn!(%session_id, "websocket receive failed: {}", e);
                    break None;
                }
            },
        }
    };

    state.registry.remove(session_id).await;
    handle.close();
    drop(handle);
    drop(tx);

    let writer_result = match writer_result {
        Some(result) => result,
        None => send_task.await,
    };
    match writer_result {
        Ok(Some(report)) => {
            tracing::info!(
                %session_id,
                reason = report.reason.as_str(),
                applied = report.applied,
                rejected = report.rejected,
                emitted_batches = report.emitted_batches,
                "whiteboard websocket closed"
            );
        }
        Ok(None) => {}
        Err(e) => tracing::error!(%session_id, "websocket writer task failed: {}", e),
    }
}

async fn handle_text(
    handle: &SessionHandle,
    gateway: ToolCallGateway,
    tx: &mpsc::Sender<String>,
    text: &str,
) {
    let session_id = handle.id();
    let incoming = match serde_json::from_str::<IncomingMessage>(text) {
        Ok(incoming) => incoming,
        Err(e) => {
            tracing::warn!(%session_id, "failed to parse incoming WebSocket message: {}", e);
            send_ws_error(tx, "invalid message format".to_string());
            return;
        }
    };

    match incoming {
        IncomingMessage::ToolCall {
            call_id,
            name,
            arguments,
        } => {
            tracing::debug!(%session_id, call_id = %call_id, tool = %name, "tool call received");
            let call = match gateway.parse(&name, &arguments) {
                Ok(call) => call,
                Err(err) => {
                    tracing::debug!(%session_id, call_id = %call_id, error = %err, "tool call rejected");
                    send_frame(tx, &OutgoingMessage::tool_result(call_id, Err(err))).await;
                    return;
                }
            };
            // Enqueue here so calls keep arrival order; only the wait is spawned.
            match handle.enqueue(call).await {
                Ok(pending) => {
                    let tx = tx.clone();
                    tokio::spawn(async move {
                        let result = pending.wait().await;
                        send_frame(&tx, &OutgoingMessage::tool_result(call_id, result)).await;
                    });
                }
                Err(err) => {
                    send_frame(tx, &OutgoingMessage::tool_result(call_id, Err(err))).await;
                }
            }
        }
        IncomingMessage::Resync => match handle.resync().await {
            Ok(commands) => tracing::debug!(%session_id, commands, "resync queued"),
            Err(err) => send_ws_error(tx, format!("resync failed: {err}")),
        },
        IncomingMessage::Snapshot => match handle.snapshot().await {
            Ok(payload) => send_frame(tx, &OutgoingMessage::Snapshot { payload }).await,
            Err(err) => send_ws_error(tx, format!("snapshot failed: {err}")),
        },
        IncomingMessage::UpstreamError { message } => {
            tracing::warn!(%session_id, error = %message, "upstream pipeline failed");
            handle.fail(message);
        }
    }
}

/// Writes drawing commands and reply frames to the socket until the session
/// ends, then reports the close reason to the client.
///
/// Commands are preferred over replies so a shape is always on the wire
/// before the tool result that created it. Tool results are not ordered
/// relative to each other: a call rejected at parse time is answered at
/// once, ahead of earlier calls still being applied. Clients match results
/// to calls by `call_id`.
async fn forward_frames(
    mut sender: SplitSink<WebSocket, AxumMessage>,
    mut commands: CommandStream,
    mut frames: mpsc::Receiver<String>,
    task: JoinHandle<SessionReport>,
) -> Option<SessionReport> {
    let mut connected = true;
    'outer: loop {
        tokio::select! {
            biased;
            batch = commands.recv() => {
                let Some(batch) = batch else { break };
                for command in &batch.commands {
                    let json = match serde_json::to_string(command) {
                        Ok(json) => json,
                        Err(e) => {
                            tracing::error!(seq = batch.seq, "failed to serialize draw command: {}", e);
                            continue;
                        }
                    };
                    if sender.send(AxumMessage::Text(json.into())).await.is_err() {
                        connected = false;
                        break 'outer;
                    }
                }
            }
            Some(frame) = frames.recv() => {
                if sender.send(AxumMessage::Text(frame.into())).await.is_err() {
                    connected = false;
                    break;
                }
            }
        }
    }

    // Dropping the stream lets a still-running session observe ConsumerClosed.
    drop(commands);
    let report = match task.await {
        Ok(report) => Some(report),
        Err(e) => {
            tracing::error!("whiteboard session task failed: {}", e);
            None
        }
    };

    if connected {
        frames.close();
        while let Ok(frame) = frames.try_recv() {
            if sender.send(AxumMessage::Text(frame.into())).await.is_err() {
                return report;
            }
        }
        if let Some(report) = &report {
            let closing = OutgoingMessage::SessionClosed {
                reason: report.reason.clone(),
            };
            if let Some(json) = encode(&closing) {
                let _ = sender.send(AxumMessage::Text(json.into())).await;
            }
        }
        let _ = sender.close().await;
    }
    report
}
