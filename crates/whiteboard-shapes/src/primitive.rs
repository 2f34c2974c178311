//! Drawing primitive records, serialized as tldraw shape JSON.

use serde::Serialize;

/// Props of a `geo` shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeoProps {
    pub geo: &'static str,
    pub w: u32,
    pub h: u32,
    pub fill: &'static str,
    pub color: &'static str,
    pub text: String,
}

/// A shape standing for one entity.
///
/// Serializes as `{ id, type, x, y, props }`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityPrimitive {
    pub id: String,
    #[serde(rename = "type")]
    pub shape_type: &'static str,
    pub x: f64,
    pub y: f64,
    pub props: GeoProps,
}

/// Normalized attachment point on a bound shape; (0.5, 0.5) is the center.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Anchor {
    pub x: f64,
    pub y: f64,
}

impl Anchor {
    pub const CENTER: Anchor = Anchor { x: 0.5, y: 0.5 };
}

/// One end of an arrow, bound to a shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Binding {
    #[serde(rename = "type")]
    pub binding_type: &'static str,
    pub bound_shape_id: String,
    pub normalized_anchor: Anchor,
}

impl Binding {
    pub fn to_shape(shape_id: String) -> Self {
        Self {
            binding_type: "binding",
            bound_shape_id: shape_id,
            normalized_anchor: Anchor::CENTER,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArrowProps {
    pub start: Binding,
    pub end: Binding,
    pub color: &'static str,
    pub size: &'static str,
}

/// An arrow standing for one connection.
///
/// Serializes as `{ id, type: "arrow", props: { start, end, color, size } }`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionPrimitive {
    pub id: String,
    #[serde(rename = "type")]
    pub shape_type: &'static str,
    pub props: ArrowProps,
}

/// Instruction to remove a shape or arrow.
///
/// Serializes as `{ type: "remove_item", id }`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RemovalPrimitive {
    #[serde(rename = "type")]
    pub command: &'static str,
    pub id: String,
}
