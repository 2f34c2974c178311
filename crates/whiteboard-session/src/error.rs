//! Error types for tool calls and session termination.

use serde::Serialize;
use thiserror::Error;
use whiteboard_types::InvalidEntityKind;

/// Errors returned to the caller of a tool.
///
/// None of these end the session; the agent may correct its input and retry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ToolError {
    /// `draw_item` named a kind outside the recognized set.
    #[error("unsupported item type '{value}'. Allowed: {}", .allowed.join(", "))]
    UnsupportedItemType {
        value: String,
        allowed: Vec<&'static str>,
    },

    /// An id passed to `connect` does not name a live entity.
    #[error("unknown item id: {id}")]
    UnknownEntity { id: String },

    /// `connect` was given the same id twice.
    #[error("cannot connect item {id} to itself")]
    SelfConnection { id: String },

    /// The tool name is not one of the published tools.
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    /// The arguments object is missing fields or has the wrong shape.
    #[error("invalid arguments for {tool}: {reason}")]
    InvalidArguments { tool: &'static str, reason: String },

    /// The call could not be applied within the configured window.
    ///
    /// The graph is unchanged; later calls are still processed.
    #[error("tool call was not applied within {timeout_ms} ms")]
    ApplyTimeout { timeout_ms: u64 },

    /// The session ended before the call was applied.
    #[error("whiteboard session is closed")]
    SessionClosed,
}

impl ToolError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnsupportedItemType { .. } => "unsupported_item_type",
            Self::UnknownEntity { .. } => "unknown_entity",
            Self::SelfConnection { .. } => "self_connection",
            Self::UnknownTool(_) => "unknown_tool",
            Self::InvalidArguments { .. } => "invalid_arguments",
            Self::ApplyTimeout { .. } => "apply_timeout",
            Self::SessionClosed => "session_closed",
        }
    }

    /// The accepted item types, for `UnsupportedItemType`.
    pub fn allowed(&self) -> Option<&[&'static str]> {
        match self {
            Self::UnsupportedItemType { allowed, .. } => Some(allowed),
            _ => None,
        }
    }
}

impl From<InvalidEntityKind> for ToolError {
    fn from(err: InvalidEntityKind) -> Self {
        Self::UnsupportedItemType {
            value: err.value,
            allowed: err.allowed,
        }
    }
}

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CloseReason {
    /// Explicit close requested through a handle.
    #[error("session closed")]
    Closed,

    /// Every producer handle was dropped and the queue was drained.
    #[error("producer finished")]
    ProducerFinished,

    /// The drawing surface stopped reading commands.
    #[error("command consumer went away")]
    ConsumerClosed,

    /// The drawing surface fell behind with the `fail` overflow policy.
    #[error("outbound command queue overflowed (capacity {capacity})")]
    QueueOverflow { capacity: usize },

    /// The external transport or transcription pipeline failed.
    #[error("upstream failure: {message}")]
    Upstream { message: String },

    /// The graph store detected a broken invariant.
    #[error("graph invariant violated: {detail}")]
    InvariantViolation { detail: String },
}

impl CloseReason {
    /// `true` for faults, `false` for orderly shutdown.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::QueueOverflow { .. } | Self::Upstream { .. } | Self::InvariantViolation { .. }
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::ProducerFinished => "producer_finished",
            Self::ConsumerClosed => "consumer_closed",
            Self::QueueOverflow { .. } => "queue_overflow",
            Self::Upstream { .. } => "upstream",
            Self::InvariantViolation { .. } => "invariant_violation",
        }
    }
}
