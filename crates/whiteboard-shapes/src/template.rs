//! Static visual templates, one per entity kind.

use whiteboard_types::EntityKind;

/// Visual parameters of a tldraw `geo` shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShapeTemplate {
    pub geo: &'static str,
    pub w: u32,
    pub h: u32,
    pub fill: &'static str,
    pub color: &'static str,
}

const DATABASE: ShapeTemplate = ShapeTemplate {
    geo: "ellipse",
    w: 120,
    h: 80,
    fill: "solid",
    color: "blue",
};

const SERVER: ShapeTemplate = ShapeTemplate {
    geo: "rectangle",
    w: 100,
    h: 60,
    fill: "solid",
    color: "green",
};

const PERSON: ShapeTemplate = ShapeTemplate {
    geo: "ellipse",
    w: 80,
    h: 80,
    fill: "solid",
    color: "orange",
};

const LLM: ShapeTemplate = ShapeTemplate {
    geo: "hexagon",
    w: 100,
    h: 80,
    fill: "solid",
    color: "violet",
};

const FRONTEND: ShapeTemplate = ShapeTemplate {
    geo: "rectangle",
    w: 120,
    h: 80,
    fill: "solid",
    color: "light-violet",
};

/// Template for kinds the table does not know.
pub const FALLBACK_TEMPLATE: ShapeTemplate = ShapeTemplate {
    geo: "rectangle",
    w: 100,
    h: 60,
    fill: "solid",
    color: "grey",
};

/// Looks up the template for a recognized kind.
pub fn template_for(kind: EntityKind) -> &'static ShapeTemplate {
    match kind {
        EntityKind::Database => &DATABASE,
        EntityKind::Server => &SERVER,
        EntityKind::Person => &PERSON,
        EntityKind::Llm => &LLM,
        EntityKind::Frontend => &FRONTEND,
    }
}
