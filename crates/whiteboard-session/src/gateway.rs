//! The tool contract exposed to the voice agent.
//!
//! Three tools exist: `draw_item`, `connect` and `delete_item`. Incoming
//! invocations are parsed once into a [`ToolCall`] and then dispatched
//! against a [`GraphStore`]. The gateway never builds drawing primitives; it
//! reports what changed as an [`Effect`] and leaves rendering to the session.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use whiteboard_graph::{GraphError, GraphStore, Removal};
use whiteboard_types::{Connection, Entity, EntityId, EntityKind, Position};

use crate::error::ToolError;

pub const DRAW_ITEM: &str = "draw_item";
pub const CONNECT: &str = "connect";
pub const DELETE_ITEM: &str = "delete_item";

/// A validated tool invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolCall {
    DrawItem {
        kind: EntityKind,
        position: Option<Position>,
    },
    Connect {
        item1: String,
        item2: String,
    },
    DeleteItem {
        item: String,
    },
}

impl ToolCall {
    pub fn name(&self) -> &'static str {
        match self {
            Self::DrawItem { .. } => DRAW_ITEM,
            Self::Connect { .. } => CONNECT,
            Self::DeleteItem { .. } => DELETE_ITEM,
        }
    }

    pub fn draw(kind: EntityKind) -> Self {
        Self::DrawItem {
            kind,
            position: None,
        }
    }

    pub fn connect(item1: impl ToString, item2: impl ToString) -> Self {
        Self::Connect {
            item1: item1.to_string(),
            item2: item2.to_string(),
        }
    }

    pub fn delete(item: impl ToString) -> Self {
        Self::DeleteItem {
            item: item.to_string(),
        }
    }
}

/// What a successful tool returns to the agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolOutput {
    /// `draw_item`: the new entity's id, to be echoed back verbatim.
    ItemDrawn(EntityId),
    Connected,
    Deleted,
}

impl ToolOutput {
    /// JSON result: the id string for `draw_item`, `null` otherwise.
    pub fn to_json(&self) -> Value {
        match self {
            Self::ItemDrawn(id) => Value::String(id.to_string()),
            Self::Connected | Self::Deleted => Value::Null,
        }
    }

    pub fn entity_id(&self) -> Option<EntityId> {
        match self {
            Self::ItemDrawn(id) => Some(*id),
            _ => None,
        }
    }
}

/// The state change a tool call committed.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Created {
        entity: Entity,
        position: Option<Position>,
    },
    Connected {
        connection: Connection,
        created: bool,
    },
    Deleted(Removal),
}

/// Outcome of [`ToolCallGateway::dispatch`].
#[derive(Debug, Clone, PartialEq)]
pub struct Applied {
    pub output: ToolOutput,
    pub effect: Effect,
}

#[derive(Debug, Deserialize)]
struct DrawItemArgs {
    item_type: String,
    #[serde(default)]
    x: Option<f64>,
    #[serde(default)]
    y: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ConnectArgs {
    #[serde(alias = "item1_uuid")]
    item1_id: String,
    #[serde(alias = "item2_uuid")]
    item2_id: String,
}

#[derive(Debug, Deserialize)]
struct DeleteItemArgs {
    #[serde(alias = "item_uuid")]
    item_id: String,
}

fn decode_args<T: serde::de::DeserializeOwned>(
    tool: &'static str,
    arguments: &Value,
) -> Result<T, ToolError> {
    // Realtime agent APIs deliver arguments as a JSON-encoded string.
    let decoded = match arguments {
        Value::String(raw) => serde_json::from_str(raw),
        Value::Null => serde_json::from_value(json!({})),
        other => serde_json::from_value(other.clone()),
    };
    decoded.map_err(|e| ToolError::InvalidArguments {
        tool,
        reason: e.to_string(),
    })
}

/// What applying a call would do, decided without touching the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Plan {
    /// The call changes the store and produces drawing commands.
    Commit,
    /// The call succeeds without changing anything.
    NoOp(ToolOutput),
}

/// Validates and applies agent tool calls.
#[derive(Debug, Clone, Copy, Default)]
pub struct ToolCallGateway;

impl ToolCallGateway {
    pub fn new() -> Self {
        Self
    }

    /// Parses a raw invocation into a [`ToolCall`].
    ///
    /// # Errors
    ///
    /// `UnknownTool`, `InvalidArguments`, or `UnsupportedItemType` when
    /// `item_type` is not a recognized kind.
    pub fn parse(&self, name: &str, arguments: &Value) -> Result<ToolCall, ToolError> {
        match name {
            DRAW_ITEM => {
                let args: DrawItemArgs = decode_args(DRAW_ITEM, arguments)?;
                let kind = args.item_type.parse::<EntityKind>()?;
                let position = match (args.x, args.y) {
                    (Some(x), Some(y)) => Some(Position::new(x, y)),
                    (None, None) => None,
                    _ => {
                        return Err(ToolError::InvalidArguments {
                            tool: DRAW_ITEM,
                            reason: "x and y must be given together".to_string(),
                        })
                    }
                };
                Ok(ToolCall::DrawItem { kind, position })
            }
            CONNECT => {
                let args: ConnectArgs = decode_args(CONNECT, arguments)?;
                Ok(ToolCall::Connect {
                    item1: args.item1_id,
                    item2: args.item2_id,
                })
            }
            DELETE_ITEM => {
                let args: DeleteItemArgs = decode_args(DELETE_ITEM, arguments)?;
                Ok(ToolCall::DeleteItem { item: args.item_id })
            }
            other => Err(ToolError::UnknownTool(other.to_string())),
        }
    }

    /// Decides, read-only, whether `call` would change `store`.
    ///
    /// Calls that fail or change nothing are settled here, so the caller
    /// only needs outbound capacity for [`Plan::Commit`].
    ///
    /// # Errors
    ///
    /// The same recoverable errors [`dispatch`](Self::dispatch) would return.
    pub fn plan(&self, store: &GraphStore, call: &ToolCall) -> Result<Plan, ToolError> {
        match call {
            ToolCall::DrawItem { .. } => Ok(Plan::Commit),
            ToolCall::Connect { item1, item2 } => {
                let a = resolve_live(store, item1)?;
                let b = resolve_live(store, item2)?;
                if a == b {
                    return Err(ToolError::SelfConnection { id: item1.clone() });
                }
                if store.is_connected(a, b) {
                    Ok(Plan::NoOp(ToolOutput::Connected))
                } else {
                    Ok(Plan::Commit)
                }
            }
            ToolCall::DeleteItem { item } => match item.parse::<EntityId>() {
                Ok(id) if store.contains(id) => Ok(Plan::Commit),
                _ => Ok(Plan::NoOp(ToolOutput::Deleted)),
            },
        }
    }

    /// Applies a parsed call to `store`.
    ///
    /// On error the store is unchanged.
    pub fn dispatch(&self, store: &mut GraphStore, call: ToolCall) -> Result<Applied, ToolError> {
        match call {
            ToolCall::DrawItem { kind, position } => {
                let id = store.create_entity(kind);
                Ok(Applied {
                    output: ToolOutput::ItemDrawn(id),
                    effect: Effect::Created {
                        entity: Entity { id, kind },
                        position,
                    },
                })
            }
            ToolCall::Connect { item1, item2 } => {
                let a = resolve_id(&item1)?;
                let b = resolve_id(&item2)?;
                let outcome = store.connect(a, b).map_err(|e| match e {
                    GraphError::UnknownEntity(missing) => ToolError::UnknownEntity {
                        id: if missing == a { item1.clone() } else { item2.clone() },
                    },
                    GraphError::SelfConnection(_) => ToolError::SelfConnection { id: item1.clone() },
                })?;
                Ok(Applied {
                    output: ToolOutput::Connected,
                    effect: Effect::Connected {
                        connection: outcome.connection,
                        created: outcome.created,
                    },
                })
            }
            ToolCall::DeleteItem { item } => {
                // A malformed id cannot name a live entity, so it deletes nothing.
                let removal = match item.parse::<EntityId>() {
                    Ok(id) => store.delete_entity(id),
                    Err(_) => Removal::default(),
                };
                Ok(Applied {
                    output: ToolOutput::Deleted,
                    effect: Effect::Deleted(removal),
                })
            }
        }
    }
}

fn resolve_id(raw: &str) -> Result<EntityId, ToolError> {
    raw.parse::<EntityId>()
        .map_err(|_| ToolError::UnknownEntity { id: raw.to_string() })
}

fn resolve_live(store: &GraphStore, raw: &str) -> Result<EntityId, ToolError> {
    let id = resolve_id(raw)?;
    if store.contains(id) {
        Ok(id)
    } else {
        Err(ToolError::UnknownEntity { id: raw.to_string() })
    }
}

/// Published description of one tool.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub input_schema: Value,
}

/// The manifest of tools offered to the agent.
pub fn tool_definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: DRAW_ITEM,
            description: "Draw an item on the whiteboard. Returns the item's id; reuse it verbatim in later calls.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "item_type": { "type": "string", "enum": EntityKind::allowed() },
                    "x": { "type": "number", "description": "X coordinate in pixels" },
                    "y": { "type": "number", "description": "Y coordinate in pixels" }
                },
                "required": ["item_type"]
            }),
        },
        ToolDefinition {
            name: CONNECT,
            description: "Connect two items previously returned by draw_item.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "item1_id": { "type": "string" },
                    "item2_id": { "type": "string" }
                },
                "required": ["item1_id", "item2_id"]
            }),
        },
        ToolDefinition {
            name: DELETE_ITEM,
            description: "Delete an item and every connection attached to it.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "item_id": { "type": "string" }
                },
                "required": ["item_id"]
            }),
        },
    ]
}
