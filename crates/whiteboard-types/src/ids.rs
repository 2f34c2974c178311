//! Entity and connection identifiers.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Opaque identifier of an entity: a random 128-bit UUID v4.
///
/// Rendered as the canonical hyphenated lowercase string, which is what the
/// agent receives from `draw_item` and must echo back verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(Uuid);

impl EntityId {
    /// Generates a fresh random identifier.
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl From<Uuid> for EntityId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}

impl std::str::FromStr for EntityId {
    type Err = InvalidEntityId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|_| InvalidEntityId(s.to_string()))
    }
}

/// Error returned when a string is not a well-formed entity id.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed entity id: {0}")]
pub struct InvalidEntityId(pub String);

/// Identifier of a connection, derived from its ordered endpoint pair.
///
/// Format: `connection_{source}_{target}`. The same pair always yields the
/// same id, which lets the drawing surface de-duplicate redraws.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn from_pair(source: EntityId, target: EntityId) -> Self {
        Self(format!("connection_{source}_{target}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
