//! Placement of entities on the canvas.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use whiteboard_types::{EntityId, Position};

/// Grid parameters for automatic placement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    pub origin_x: f64,
    pub origin_y: f64,
    pub spacing_x: f64,
    pub spacing_y: f64,
    /// Shapes per row before wrapping.
    pub columns: u32,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            origin_x: 100.0,
            origin_y: 100.0,
            spacing_x: 200.0,
            spacing_y: 150.0,
            columns: 4,
        }
    }
}

/// Session-owned record of where each entity is drawn.
///
/// Auto-placed entities fill grid slots left to right, top to bottom. Slots
/// are not reused after a delete, so a redraw never stacks two shapes.
#[derive(Debug)]
pub struct Layout {
    config: LayoutConfig,
    next_slot: u64,
    placements: HashMap<EntityId, Position>,
}

impl Layout {
    pub fn new(config: LayoutConfig) -> Self {
        Self {
            config,
            next_slot: 0,
            placements: HashMap::new(),
        }
    }

    pub fn origin(&self) -> Position {
        Position::new(self.config.origin_x, self.config.origin_y)
    }

    fn slot_position(&self, slot: u64) -> Position {
        let columns = u64::from(self.config.columns.max(1));
        let col = (slot % columns) as f64;
        let row = (slot / columns) as f64;
        Position::new(
            self.config.origin_x + col * self.config.spacing_x,
            self.config.origin_y + row * self.config.spacing_y,
        )
    }

    /// Records a position for `id`: `requested` if given, else the next slot.
    pub fn place(&mut self, id: EntityId, requested: Option<Position>) -> Position {
        let position = match requested {
            Some(position) => position,
            None => {
                let position = self.slot_position(self.next_slot);
                self.next_slot += 1;
                position
            }
        };
        self.placements.insert(id, position);
        position
    }

    pub fn position_of(&self, id: EntityId) -> Option<Position> {
        self.placements.get(&id).copied()
    }

    pub fn forget(&mut self, id: EntityId) {
        self.placements.remove(&id);
    }
}
