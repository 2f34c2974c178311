//! Mapping from diagram entities and connections to drawing primitives.
//!
//! Every function here is pure: the output depends only on the arguments and
//! the static template table, so the same input always yields the same
//! primitive. The drawing surface relies on that to de-duplicate redraws.

mod primitive;
mod template;

use std::fmt::Display;

use whiteboard_types::{EntityKind, Position};

pub use primitive::{
    Anchor, ArrowProps, Binding, ConnectionPrimitive, EntityPrimitive, GeoProps, RemovalPrimitive,
};
pub use template::{template_for, ShapeTemplate, FALLBACK_TEMPLATE};

/// Arrow color for connections.
pub const CONNECTION_COLOR: &str = "black";
/// Arrow stroke size for connections.
pub const CONNECTION_SIZE: &str = "m";

/// The kind of shape to draw.
///
/// `Unrecognized` exists for callers that bypass the tool gateway; it maps
/// to the generic fallback template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeKind<'a> {
    Known(EntityKind),
    Unrecognized(&'a str),
}

impl From<EntityKind> for ShapeKind<'_> {
    fn from(kind: EntityKind) -> Self {
        Self::Known(kind)
    }
}

/// Builds the shape primitive for an entity at `position`.
///
/// Never fails: unrecognized kinds get [`FALLBACK_TEMPLATE`] and a
/// `"{kind}: {entity_id}"` label.
pub fn entity_primitive<'a>(
    kind: impl Into<ShapeKind<'a>>,
    entity_id: impl Display,
    position: Position,
) -> EntityPrimitive {
    let id = entity_id.to_string();
    let (template, text) = match kind.into() {
        ShapeKind::Known(kind) => (template_for(kind), id.clone()),
        ShapeKind::Unrecognized(label) => (&FALLBACK_TEMPLATE, format!("{label}: {id}")),
    };

    EntityPrimitive {
        id,
        shape_type: "geo",
        x: position.x,
        y: position.y,
        props: GeoProps {
            geo: template.geo,
            w: template.w,
            h: template.h,
            fill: template.fill,
            color: template.color,
            text,
        },
    }
}

/// Builds the arrow primitive joining two entities.
///
/// The id is `connection_{entity1}_{entity2}`, matching
/// [`whiteboard_types::ConnectionId::from_pair`].
pub fn connection_primitive(entity1_id: impl Display, entity2_id: impl Display) -> ConnectionPrimitive {
    let start = entity1_id.to_string();
    let end = entity2_id.to_string();
    ConnectionPrimitive {
        id: format!("connection_{start}_{end}"),
        shape_type: "arrow",
        props: ArrowProps {
            start: Binding::to_shape(start),
            end: Binding::to_shape(end),
            color: CONNECTION_COLOR,
            size: CONNECTION_SIZE,
        },
    }
}

/// Builds the removal record for a shape or arrow id.
pub fn removal(id: impl Display) -> RemovalPrimitive {
    RemovalPrimitive {
        command: "remove_item",
        id: id.to_string(),
    }
}
