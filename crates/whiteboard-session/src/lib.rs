//! Per-session command pipeline for the whiteboard service.
//!
//! A session turns structured tool calls from a voice agent into an ordered
//! stream of drawing commands:
//!
//! - [`gateway`] validates tool calls and applies them to the graph store.
//! - [`command`] renders committed effects as drawing commands.
//! - [`layout`] decides where new shapes land on the canvas.
//! - [`session`] runs the single-writer apply loop and its bounded queues.

pub mod command;
pub mod error;
pub mod gateway;
pub mod layout;
pub mod session;

pub use command::{CommandBatch, DrawCommand};
pub use error::{CloseReason, ToolError};
pub use gateway::{tool_definitions, Plan, ToolCall, ToolCallGateway, ToolDefinition, ToolOutput};
pub use layout::LayoutConfig;
pub use session::{
    CommandSession, CommandStream, OverflowPolicy, PendingReply, SessionConfig, SessionHandle,
    SessionReport, MAX_QUEUE_CAPACITY,
};
