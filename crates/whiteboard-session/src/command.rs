//! Drawing commands emitted to the surface.

use serde::Serialize;
use whiteboard_shapes::{self as shapes, ConnectionPrimitive, EntityPrimitive, RemovalPrimitive};
use whiteboard_types::GraphSnapshot;

use crate::gateway::Effect;
use crate::layout::Layout;

/// One drawing instruction.
///
/// Serializes as the transport envelope `{ "type": ..., "payload": ... }`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum DrawCommand {
    DrawItem(EntityPrimitive),
    DrawConnection(ConnectionPrimitive),
    RemoveItem(RemovalPrimitive),
}

impl DrawCommand {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DrawItem(_) => "draw_item",
            Self::DrawConnection(_) => "draw_connection",
            Self::RemoveItem(_) => "remove_item",
        }
    }

    /// Id of the shape or arrow the command targets.
    pub fn target_id(&self) -> &str {
        match self {
            Self::DrawItem(p) => &p.id,
            Self::DrawConnection(p) => &p.id,
            Self::RemoveItem(p) => &p.id,
        }
    }
}

/// The commands produced by one applied request, in emission order.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandBatch {
    /// Commit sequence number, strictly increasing within a session.
    pub seq: u64,
    pub commands: Vec<DrawCommand>,
}

/// Translates a committed effect into drawing commands.
///
/// Cascaded connection removals come before the entity removal. Effects
/// that changed nothing produce no commands.
pub fn render_effect(effect: &Effect, layout: &mut Layout) -> Vec<DrawCommand> {
    match effect {
        Effect::Created { entity, position } => {
            let at = layout.place(entity.id, *position);
            vec![DrawCommand::DrawItem(shapes::entity_primitive(
                entity.kind,
                entity.id,
                at,
            ))]
        }
        Effect::Connected {
            connection,
            created: true,
        } => vec![DrawCommand::DrawConnection(shapes::connection_primitive(
            connection.source,
            connection.target,
        ))],
        Effect::Connected { created: false, .. } => Vec::new(),
        Effect::Deleted(removal) => {
            let mut commands: Vec<DrawCommand> = removal
                .connections
                .iter()
                .map(|c| DrawCommand::RemoveItem(shapes::removal(&c.id)))
                .collect();
            if let Some(entity) = &removal.entity {
                layout.forget(entity.id);
                commands.push(DrawCommand::RemoveItem(shapes::removal(entity.id)));
            }
            commands
        }
    }
}

/// Commands that redraw an entire graph: every shape, then every arrow.
pub fn redraw_all(snapshot: &GraphSnapshot, layout: &Layout) -> Vec<DrawCommand> {
    let shapes_iter = snapshot.entities.iter().map(|entity| {
        let at = layout.position_of(entity.id).unwrap_or_else(|| layout.origin());
        DrawCommand::DrawItem(shapes::entity_primitive(entity.kind, entity.id, at))
    });
    let arrows_iter = snapshot.connections.iter().map(|connection| {
        DrawCommand::DrawConnection(shapes::connection_primitive(
            connection.source,
            connection.target,
        ))
    });
    shapes_iter.chain(arrows_iter).collect()
}
