//! Shared types for the whiteboard command service.
//!
//! This crate provides the foundational vocabulary used across the workspace:
//! the closed set of entity kinds, entity and connection identifiers, canvas
//! positions, and the immutable snapshot records handed out by the graph
//! store.
//!
//! Every other crate depends on `whiteboard-types` for these definitions so
//! that the graph, the shape mapper and the session agree on one model.

use serde::{Deserialize, Serialize};
use thiserror::Error;

mod ids;
pub use ids::{ConnectionId, EntityId, InvalidEntityId};

/// Version of the entity kind table.
///
/// Bumped whenever a kind is added or removed so that clients can detect a
/// changed tool manifest.
pub const KIND_TABLE_VERSION: u32 = 1;

/// Semantic kinds of diagram entities the agent may draw.
///
/// The set is fixed at build time. Agent input is parsed into this enum once,
/// at the tool boundary; downstream code matches on it exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    /// A data store.
    Database,
    /// A human participant (also accepted as `user`).
    Person,
    /// A backend service.
    Server,
    /// A language model.
    Llm,
    /// A client-facing application.
    Frontend,
}

impl EntityKind {
    /// Every recognized kind, in manifest order.
    pub const ALL: [EntityKind; 5] = [
        Self::Database,
        Self::Person,
        Self::Server,
        Self::Llm,
        Self::Frontend,
    ];

    /// Returns the canonical lowercase label for this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Database => "database",
            Self::Person => "person",
            Self::Server => "server",
            Self::Llm => "llm",
            Self::Frontend => "frontend",
        }
    }

    /// Canonical labels of every recognized kind.
    pub fn allowed() -> Vec<&'static str> {
        Self::ALL.iter().map(|kind| kind.as_str()).collect()
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EntityKind {
    type Err = InvalidEntityKind;

    /// Parses a kind case-insensitively, ignoring surrounding whitespace.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "database" => Ok(Self::Database),
            "person" | "user" => Ok(Self::Person),
            "server" => Ok(Self::Server),
            "llm" => Ok(Self::Llm),
            "frontend" => Ok(Self::Frontend),
            _ => Err(InvalidEntityKind {
                value: s.to_string(),
                allowed: Self::allowed(),
            }),
        }
    }
}

/// Error returned when a string does not name a recognized [`EntityKind`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported item type '{value}'. Allowed: {}", .allowed.join(", "))]
pub struct InvalidEntityKind {
    /// The rejected input, verbatim.
    pub value: String,
    /// Labels of the accepted kinds.
    pub allowed: Vec<&'static str>,
}

/// A point on the drawing canvas, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// A drawable diagram node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Entity {
    /// Store-generated identifier.
    pub id: EntityId,
    /// Semantic kind.
    pub kind: EntityKind,
}

/// An edge between two entities.
///
/// Visually undirected; `source`/`target` keep the order of the original
/// `connect` call so the derived primitive id is stable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Connection {
    pub id: ConnectionId,
    pub source: EntityId,
    pub target: EntityId,
}

impl Connection {
    /// Builds a connection whose id is derived from the ordered pair.
    pub fn between(source: EntityId, target: EntityId) -> Self {
        Self {
            id: ConnectionId::from_pair(source, target),
            source,
            target,
        }
    }

    /// Returns `true` if either endpoint is `id`.
    pub fn touches(&self, id: EntityId) -> bool {
        self.source == id || self.target == id
    }
}

/// Point-in-time copy of a graph's contents, in creation order.
///
/// Owned data: holding a snapshot never grants access to the store.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub entities: Vec<Entity>,
    pub connections: Vec<Connection>,
}

impl GraphSnapshot {
    /// Returns `true` if every connection endpoint is present in `entities`.
    pub fn is_consistent(&self) -> bool {
        self.connections.iter().all(|c| {
            self.entities.iter().any(|e| e.id == c.source)
                && self.entities.iter().any(|e| e.id == c.target)
        })
    }
}
