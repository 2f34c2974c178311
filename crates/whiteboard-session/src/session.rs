//! One whiteboard session: a graph store, its apply loop, and the ordered
//! command stream to the drawing surface.
//!
//! Producers talk to the session through cloneable [`SessionHandle`]s. Every
//! request lands in one bounded queue and is applied by a single task, one at
//! a time, in queue order. Each applied request yields at most one
//! [`CommandBatch`] on the bounded outbound queue read by the transport.
//!
//! Each call is planned against the store first. Calls that fail or change
//! nothing are answered at once and never wait for outbound capacity. For
//! the rest the loop reserves an outbound slot before it touches the store,
//! so a request is either fully committed and fully emitted, or not applied
//! at all.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::mpsc::{self, OwnedPermit};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;
use whiteboard_graph::{GraphStore, InvariantViolation};
use whiteboard_types::GraphSnapshot;

use crate::command::{redraw_all, render_effect, CommandBatch, DrawCommand};
use crate::error::{CloseReason, ToolError};
use crate::gateway::{Plan, ToolCall, ToolCallGateway, ToolOutput};
use crate::layout::{Layout, LayoutConfig};

/// Largest inbound or outbound queue a session will allocate.
pub const MAX_QUEUE_CAPACITY: usize = 1 << 20;

/// What the session does when the transport falls behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Stop accepting calls until the transport frees a slot.
    #[default]
    Block,
    /// Close the session with [`CloseReason::QueueOverflow`].
    Fail,
}

impl std::str::FromStr for OverflowPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "block" => Ok(Self::Block),
            "fail" => Ok(Self::Fail),
            other => Err(format!("unknown overflow policy '{other}' (expected block or fail)")),
        }
    }
}

/// Tunables for one session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Requests that may wait before producers are suspended. Clamped to
    /// `1..=MAX_QUEUE_CAPACITY`.
    pub inbound_capacity: usize,
    /// Command batches that may wait for the transport. Clamped like
    /// `inbound_capacity`.
    pub outbound_capacity: usize,
    pub overflow_policy: OverflowPolicy,
    /// Longest a request may wait for outbound capacity under `Block`.
    pub apply_timeout: Duration,
    pub layout: LayoutConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            inbound_capacity: 64,
            outbound_capacity: 256,
            overflow_policy: OverflowPolicy::Block,
            apply_timeout: Duration::from_secs(5),
            layout: LayoutConfig::default(),
        }
    }
}

/// Final record of a session, returned by its task.
///
/// `snapshot` is the last committed graph state, kept for diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub session_id: Uuid,
    pub reason: CloseReason,
    /// Tool calls committed.
    pub applied: u64,
    /// Tool calls answered with a recoverable error.
    pub rejected: u64,
    pub emitted_batches: u64,
    /// Requests still queued at close, never applied.
    pub abandoned: usize,
    pub snapshot: GraphSnapshot,
    pub started_at: DateTime<Utc>,
    pub closed_at: DateTime<Utc>,
}

type Reply<T> = oneshot::Sender<Result<T, ToolError>>;

enum Request {
    Tool { call: ToolCall, reply: Reply<ToolOutput> },
    Resync { reply: Reply<usize> },
    Snapshot { reply: Reply<GraphSnapshot> },
}

/// Receiver side of a queued tool call.
#[derive(Debug)]
pub struct PendingReply(oneshot::Receiver<Result<ToolOutput, ToolError>>);

impl PendingReply {
    /// Waits for the call to be applied or rejected.
    pub async fn wait(self) -> Result<ToolOutput, ToolError> {
        self.0.await.unwrap_or(Err(ToolError::SessionClosed))
    }
}

/// Producer-side handle to a running session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: Uuid,
    requests: mpsc::Sender<Request>,
    control: Arc<watch::Sender<Option<CloseReason>>>,
}

impl SessionHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    async fn send(&self, request: Request) -> Result<(), ToolError> {
        let mut closed = self.control.subscribe();
        if closed.borrow().is_some() {
            return Err(ToolError::SessionClosed);
        }
        tokio::select! {
            sent = self.requests.send(request) => sent.map_err(|_| ToolError::SessionClosed),
            _ = closed.wait_for(Option::is_some) => Err(ToolError::SessionClosed),
        }
    }

    /// Queues a tool call behind every call queued before it.
    ///
    /// Suspends while the inbound queue is full. The returned
    /// [`PendingReply`] resolves once the call has been applied.
    pub async fn enqueue(&self, call: ToolCall) -> Result<PendingReply, ToolError> {
        let (reply, rx) = oneshot::channel();
        self.send(Request::Tool { call, reply }).await?;
        Ok(PendingReply(rx))
    }

    /// Queues a tool call and waits for its result.
    pub async fn submit(&self, call: ToolCall) -> Result<ToolOutput, ToolError> {
        self.enqueue(call).await?.wait().await
    }

    /// Re-emits the whole diagram as one batch. Returns the command count.
    pub async fn resync(&self) -> Result<usize, ToolError> {
        let (reply, rx) = oneshot::channel();
        self.send(Request::Resync { reply }).await?;
        rx.await.unwrap_or(Err(ToolError::SessionClosed))
    }

    /// Committed graph state as of every request queued before this one.
    pub async fn snapshot(&self) -> Result<GraphSnapshot, ToolError> {
        let (reply, rx) = oneshot::channel();
        self.send(Request::Snapshot { reply }).await?;
        rx.await.unwrap_or(Err(ToolError::SessionClosed))
    }

    /// Ends the session. Requests not yet applied are answered with
    /// [`ToolError::SessionClosed`].
    pub fn close(&self) {
        self.terminate(CloseReason::Closed);
    }

    /// Ends the session because the external transport or transcription
    /// pipeline failed.
    pub fn fail(&self, message: impl Into<String>) {
        self.terminate(CloseReason::Upstream {
            message: message.into(),
        });
    }

    fn terminate(&self, reason: CloseReason) {
        request_close(&self.control, reason);
    }

    pub fn is_closed(&self) -> bool {
        self.control.borrow().is_some() || self.requests.is_closed()
    }
}

/// Records the first close reason; later ones are ignored.
fn request_close(control: &watch::Sender<Option<CloseReason>>, reason: CloseReason) {
    control.send_if_modified(|current| {
        if current.is_none() {
            *current = Some(reason);
            true
        } else {
            false
        }
    });
}

/// Resolves once a close reason has been recorded.
async fn cancelled(cancel: &mut watch::Receiver<Option<CloseReason>>) -> CloseReason {
    match cancel.wait_for(Option::is_some).await {
        Ok(reason) => reason.clone().unwrap_or(CloseReason::Closed),
        Err(_) => CloseReason::Closed,
    }
}

/// Consumer side of the outbound command queue.
#[derive(Debug)]
pub struct CommandStream {
    rx: mpsc::Receiver<CommandBatch>,
}

impl CommandStream {
    /// Next batch, or `None` once the session has closed and the queue is
    /// drained.
    pub async fn recv(&mut self) -> Option<CommandBatch> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<CommandBatch> {
        self.rx.try_recv().ok()
    }
}

type InvariantCheck = fn(&GraphStore) -> Result<(), InvariantViolation>;

enum SlotError {
    TimedOut,
    Closed(CloseReason),
}

/// The apply loop's state. Owned by exactly one task.
pub struct CommandSession {
    id: Uuid,
    config: SessionConfig,
    store: GraphStore,
    layout: Layout,
    gateway: ToolCallGateway,
    check: InvariantCheck,
    requests: mpsc::Receiver<Request>,
    commands: mpsc::Sender<CommandBatch>,
    control: Arc<watch::Sender<Option<CloseReason>>>,
    cancel: watch::Receiver<Option<CloseReason>>,
    next_seq: u64,
    applied: u64,
    rejected: u64,
    started_at: DateTime<Utc>,
}

impl CommandSession {
    /// Spawns a session on the current tokio runtime.
    ///
    /// Returns the producer handle, the command stream for the transport, and
    /// the task that resolves to the [`SessionReport`] when the session ends.
    pub fn start(config: SessionConfig) -> (SessionHandle, CommandStream, JoinHandle<SessionReport>) {
        Self::spawn(config, GraphStore::check_invariants)
    }

    /// Like [`start`](Self::start), with `check` run after every commit.
    #[cfg(test)]
    pub(crate) fn start_with_check(
        config: SessionConfig,
        check: InvariantCheck,
    ) -> (SessionHandle, CommandStream, JoinHandle<SessionReport>) {
        Self::spawn(config, check)
    }

    fn spawn(
        mut config: SessionConfig,
        check: InvariantCheck,
    ) -> (SessionHandle, CommandStream, JoinHandle<SessionReport>) {
        config.inbound_capacity = config.inbound_capacity.clamp(1, MAX_QUEUE_CAPACITY);
        config.outbound_capacity = config.outbound_capacity.clamp(1, MAX_QUEUE_CAPACITY);

        let id = Uuid::new_v4();
        let (request_tx, request_rx) = mpsc::channel(config.inbound_capacity);
        let (command_tx, command_rx) = mpsc::channel(config.outbound_capacity);
        let (control_tx, cancel) = watch::channel(None);
        let control = Arc::new(control_tx);

        let session = Self {
            id,
            layout: Layout::new(config.layout),
            config,
            store: GraphStore::new(),
            gateway: ToolCallGateway::new(),
            check,
            requests: request_rx,
            commands: command_tx,
            control: control.clone(),
            cancel,
            next_seq: 0,
            applied: 0,
            rejected: 0,
            started_at: Utc::now(),
        };

        let handle = SessionHandle {
            id,
            requests: request_tx,
            control,
        };
        let task = tokio::spawn(session.run());
        (handle, CommandStream { rx: command_rx }, task)
    }

    async fn run(mut self) -> SessionReport {
        tracing::info!(
            session_id = %self.id,
            policy = ?self.config.overflow_policy,
            outbound_capacity = self.config.outbound_capacity,
            "whiteboard session started"
        );

        let reason = loop {
            let request = tokio::select! {
                biased;
                reason = cancelled(&mut self.cancel) => break reason,
                next = self.requests.recv() => match next {
                    Some(request) => request,
                    None => break CloseReason::ProducerFinished,
                },
            };

            let outcome = match request {
                Request::Tool { call, reply } => self.apply_tool(call, reply).await,
                Request::Resync { reply } => self.resync(reply).await,
                Request::Snapshot { reply } => {
                    let _ = reply.send(Ok(self.store.snapshot()));
                    Ok(())
                }
            };
            if let Err(reason) = outcome {
                break reason;
            }
        };

        self.finish(reason)
    }

    async fn reserve_slot(&mut self) -> Result<OwnedPermit<CommandBatch>, SlotError> {
        let sender = self.commands.clone();
        match self.config.overflow_policy {
            OverflowPolicy::Fail => match sender.try_reserve_owned() {
                Ok(permit) => Ok(permit),
                Err(TrySendError::Full(_)) => Err(SlotError::Closed(CloseReason::QueueOverflow {
                    capacity: self.config.outbound_capacity,
                })),
                Err(TrySendError::Closed(_)) => Err(SlotError::Closed(CloseReason::ConsumerClosed)),
            },
            OverflowPolicy::Block => {
                let timeout = self.config.apply_timeout;
                tokio::select! {
                    biased;
                    reason = cancelled(&mut self.cancel) => Err(SlotError::Closed(reason)),
                    reserved = tokio::time::timeout(timeout, sender.reserve_owned()) => match reserved {
                        Ok(Ok(permit)) => Ok(permit),
                        Ok(Err(_)) => Err(SlotError::Closed(CloseReason::ConsumerClosed)),
                        Err(_) => Err(SlotError::TimedOut),
                    },
                }
            }
        }
    }

    fn timeout_error(&self) -> ToolError {
        ToolError::ApplyTimeout {
            timeout_ms: u64::try_from(self.config.apply_timeout.as_millis()).unwrap_or(u64::MAX),
        }
    }

    fn next_batch(&mut self, commands: Vec<DrawCommand>) -> CommandBatch {
        let seq = self.next_seq;
        self.next_seq += 1;
        CommandBatch { seq, commands }
    }

    async fn apply_tool(
        &mut self,
        call: ToolCall,
        reply: Reply<ToolOutput>,
    ) -> Result<(), CloseReason> {
        let tool = call.name();
        match self.gateway.plan(&self.store, &call) {
            Ok(Plan::Commit) => {}
            Ok(Plan::NoOp(output)) => {
                self.applied += 1;
                tracing::debug!(session_id = %self.id, tool, "tool call changed nothing");
                let _ = reply.send(Ok(output));
                return Ok(());
            }
            Err(err) => {
                tracing::debug!(session_id = %self.id, tool, error = %err, "tool call rejected");
                self.rejected += 1;
                let _ = reply.send(Err(err));
                return Ok(());
            }
        }

        let permit = match self.reserve_slot().await {
            Ok(permit) => permit,
            Err(SlotError::TimedOut) => {
                let err = self.timeout_error();
                tracing::warn!(session_id = %self.id, tool, error = %err, "tool call timed out");
                self.rejected += 1;
                let _ = reply.send(Err(err));
                return Ok(());
            }
            Err(SlotError::Closed(reason)) => {
                let _ = reply.send(Err(ToolError::SessionClosed));
                return Err(reason);
            }
        };

        let applied = match self.gateway.dispatch(&mut self.store, call) {
            Ok(applied) => applied,
            Err(err) => {
                tracing::debug!(session_id = %self.id, tool, error = %err, "tool call rejected");
                self.rejected += 1;
                let _ = reply.send(Err(err));
                return Ok(());
            }
        };

        if let Err(violation) = (self.check)(&self.store) {
            let _ = reply.send(Err(ToolError::SessionClosed));
            return Err(CloseReason::InvariantViolation {
                detail: violation.0,
            });
        }

        let commands = render_effect(&applied.effect, &mut self.layout);
        self.applied += 1;
        tracing::debug!(
            session_id = %self.id,
            tool,
            commands = commands.len(),
            "tool call applied"
        );
        if !commands.is_empty() {
            let batch = self.next_batch(commands);
            permit.send(batch);
        }
        let _ = reply.send(Ok(applied.output));
        Ok(())
    }

    async fn resync(&mut self, reply: Reply<usize>) -> Result<(), CloseReason> {
        let commands = redraw_all(&self.store.snapshot(), &self.layout);
        let count = commands.len();
        if count == 0 {
            let _ = reply.send(Ok(0));
            return Ok(());
        }

        let permit = match self.reserve_slot().await {
            Ok(permit) => permit,
            Err(SlotError::TimedOut) => {
                let _ = reply.send(Err(self.timeout_error()));
                return Ok(());
            }
            Err(SlotError::Closed(reason)) => {
                let _ = reply.send(Err(ToolError::SessionClosed));
                return Err(reason);
            }
        };

        let batch = self.next_batch(commands);
        permit.send(batch);
        tracing::debug!(session_id = %self.id, commands = count, "diagram resynced");
        let _ = reply.send(Ok(count));
        Ok(())
    }

    fn finish(mut self, reason: CloseReason) -> SessionReport {
        request_close(&self.control, reason.clone());

        // Stop intake, then answer whatever was still queued by dropping it.
        self.requests.close();
        let mut abandoned = 0;
        while self.requests.try_recv().is_ok() {
            abandoned += 1;
        }

        let snapshot = self.store.snapshot();
        if reason.is_fatal() {
            tracing::error!(
                session_id = %self.id,
                reason = %reason,
                entities = snapshot.entities.len(),
                connections = snapshot.connections.len(),
                abandoned,
                "whiteboard session failed"
            );
        } else {
            tracing::info!(
                session_id = %self.id,
                reason = %reason,
                entities = snapshot.entities.len(),
                connections = snapshot.connections.len(),
                abandoned,
                "whiteboard session closed"
            );
        }

        SessionReport {
            session_id: self.id,
            reason,
            applied: self.applied,
            rejected: self.rejected,
            emitted_batches: self.next_seq,
            abandoned,
            snapshot,
            started_at: self.started_at,
            closed_at: Utc::now(),
        }
    }
}
