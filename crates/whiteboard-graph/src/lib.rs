//! Authoritative graph store for one whiteboard session.
//!
//! Holds the entities and connections of a diagram and exposes the only
//! operations that may change them: [`GraphStore::create_entity`],
//! [`GraphStore::connect`] and [`GraphStore::delete_entity`]. Readers get
//! owned snapshots, never references into the store.
//!
//! The store is a plain synchronous value. Exclusive access is expressed by
//! `&mut self`; the session that owns it is responsible for running every
//! mutation from a single logical writer.

use std::collections::{BTreeMap, HashMap, HashSet};

use whiteboard_types::{Connection, Entity, EntityId, EntityKind, GraphSnapshot};

/// Errors returned by graph store operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    /// An operation referenced an entity that is not in the store.
    #[error("unknown entity: {0}")]
    UnknownEntity(EntityId),

    /// `connect` was asked to join an entity to itself.
    #[error("cannot connect entity {0} to itself")]
    SelfConnection(EntityId),
}

/// The store's internal bookkeeping disagrees with itself.
///
/// This is a programming error, never a user error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("graph invariant violated: {0}")]
pub struct InvariantViolation(pub String);

/// Result of a `connect` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectOutcome {
    /// The connection joining the pair, new or pre-existing.
    pub connection: Connection,
    /// `false` when the pair was already connected and nothing changed.
    pub created: bool,
}

/// Everything a `delete_entity` call removed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Removal {
    /// The deleted entity, or `None` if the id was unknown.
    pub entity: Option<Entity>,
    /// Connections removed by the cascade, in creation order.
    pub connections: Vec<Connection>,
}

impl Removal {
    /// Returns `true` if the call changed nothing.
    pub fn is_empty(&self) -> bool {
        self.entity.is_none() && self.connections.is_empty()
    }
}

/// Unordered key for a pair of entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct PairKey(EntityId, EntityId);

impl PairKey {
    fn new(a: EntityId, b: EntityId) -> Self {
        if a <= b {
            Self(a, b)
        } else {
            Self(b, a)
        }
    }
}

/// In-memory entity/connection store.
///
/// Entities and connections are kept in creation order, keyed by a
/// monotonically increasing sequence number, with hash indexes for lookup.
#[derive(Debug, Default)]
pub struct GraphStore {
    next_seq: u64,
    entities: BTreeMap<u64, Entity>,
    entity_index: HashMap<EntityId, u64>,
    connections: BTreeMap<u64, Connection>,
    pair_index: HashMap<PairKey, u64>,
    /// Ids of deleted entities. Never handed out again.
    retired: HashSet<EntityId>,
}

impl GraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn bump_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    fn fresh_id(&self) -> EntityId {
        loop {
            let id = EntityId::new_random();
            if !self.entity_index.contains_key(&id) && !self.retired.contains(&id) {
                return id;
            }
        }
    }

    /// Adds an entity of `kind` under a freshly generated id.
    ///
    /// There is no per-kind limit. Unrecognized kind strings are rejected
    /// earlier, when they are parsed into [`EntityKind`].
    pub fn create_entity(&mut self, kind: EntityKind) -> EntityId {
        let id = self.fresh_id();
        let seq = self.bump_seq();
        self.entities.insert(seq, Entity { id, kind });
        self.entity_index.insert(id, seq);
        tracing::trace!(entity_id = %id, kind = %kind, "entity created");
        id
    }

    /// Connects two existing entities.
    ///
    /// Self-connections are rejected. Connecting a pair that is already
    /// connected, in either order, returns the existing connection with
    /// `created == false` and leaves the store untouched.
    ///
    /// # Errors
    ///
    /// [`GraphError::UnknownEntity`] naming the first missing id, or
    /// [`GraphError::SelfConnection`].
    pub fn connect(&mut self, a: EntityId, b: EntityId) -> Result<ConnectOutcome, GraphError> {
        for id in [a, b] {
            if !self.entity_index.contains_key(&id) {
                return Err(GraphError::UnknownEntity(id));
            }
        }
        if a == b {
            return Err(GraphError::SelfConnection(a));
        }

        let key = PairKey::new(a, b);
        if let Some(connection) = self
            .pair_index
            .get(&key)
            .and_then(|seq| self.connections.get(seq))
        {
            return Ok(ConnectOutcome {
                connection: connection.clone(),
                created: false,
            });
        }

        let connection = Connection::between(a, b);
        let seq = self.bump_seq();
        self.connections.insert(seq, connection.clone());
        self.pair_index.insert(key, seq);
        tracing::trace!(connection_id = %connection.id, "connection created");
        Ok(ConnectOutcome {
            connection,
            created: true,
        })
    }

    /// Deletes an entity and every connection touching it.
    ///
    /// Unknown ids are a no-op. The entity and its connections leave the
    /// store within this one call, so no caller can observe a dangling
    /// connection.
    pub fn delete_entity(&mut self, id: EntityId) -> Removal {
        let Some(seq) = self.entity_index.remove(&id) else {
            return Removal::default();
        };
        let entity = self.entities.remove(&seq);
        self.retired.insert(id);

        let doomed: Vec<u64> = self
            .connections
            .iter()
            .filter(|(_, c)| c.touches(id))
            .map(|(seq, _)| *seq)
            .collect();

        let mut connections = Vec::with_capacity(doomed.len());
        for seq in doomed {
            if let Some(connection) = self.connections.remove(&seq) {
                self.pair_index
                    .remove(&PairKey::new(connection.source, connection.target));
                connections.push(connection);
            }
        }

        tracing::trace!(
            entity_id = %id,
            cascaded = connections.len(),
            "entity deleted"
        );
        Removal {
            entity,
            connections,
        }
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.entity_index.contains_key(&id)
    }

    /// Returns `true` if `a` and `b` are joined, in either order.
    pub fn is_connected(&self, a: EntityId, b: EntityId) -> bool {
        self.pair_index.contains_key(&PairKey::new(a, b))
    }

    pub fn get_entity(&self, id: EntityId) -> Option<Entity> {
        self.entity_index
            .get(&id)
            .and_then(|seq| self.entities.get(seq))
            .cloned()
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Entities in creation order.
    pub fn list_entities(&self) -> Vec<Entity> {
        self.entities.values().cloned().collect()
    }

    /// Connections in creation order.
    pub fn list_connections(&self) -> Vec<Connection> {
        self.connections.values().cloned().collect()
    }

    pub fn snapshot(&self) -> GraphSnapshot {
        GraphSnapshot {
            entities: self.list_entities(),
            connections: self.list_connections(),
        }
    }

    /// Verifies the store's structural invariants.
    ///
    /// # Errors
    ///
    /// [`InvariantViolation`] describing the first problem found.
    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        if self.entity_index.len() != self.entities.len() {
            return Err(InvariantViolation(format!(
                "entity index has {} entries for {} entities",
                self.entity_index.len(),
                self.entities.len()
            )));
        }
        if self.pair_index.len() != self.connections.len() {
            return Err(InvariantViolation(format!(
                "pair index has {} entries for {} connections",
                self.pair_index.len(),
                self.connections.len()
            )));
        }
        for connection in self.connections.values() {
            for endpoint in [connection.source, connection.target] {
                if !self.entity_index.contains_key(&endpoint) {
                    return Err(InvariantViolation(format!(
                        "connection {} references missing entity {endpoint}",
                        connection.id
                    )));
                }
            }
        }
        if let Some(id) = self.entity_index.keys().find(|id| self.retired.contains(id)) {
            return Err(InvariantViolation(format!(
                "retired entity id {id} is live again"
            )));
        }
        Ok(())
    }
}
