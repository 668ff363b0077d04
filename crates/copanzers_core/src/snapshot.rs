//! Immutable per-tick state records.
//!
//! A [`Snapshot`] is produced at the end of every tick and handed out as an
//! `Arc`, so renderers, network layers and recorders on other threads can
//! hold on to it without copying or locking.

use serde::{Deserialize, Serialize};

use crate::components::{Entity, EntityId, EntityKind, TeamId};
use crate::error::{GameError, Result};
use crate::events::{DestructionEvent, GameEvent};
use crate::math::{fixed_serde, Fixed, Vec2Fixed};

/// One entity's externally visible state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntitySnapshot {
    /// Entity id.
    pub id: EntityId,
    /// Entity kind.
    pub kind: EntityKind,
    /// World position.
    pub position: Vec2Fixed,
    /// Orientation in radians.
    #[serde(with = "fixed_serde")]
    pub orientation: Fixed,
    /// Current health (tanks only).
    pub health: Option<u32>,
    /// Team (tanks only).
    pub team: Option<TeamId>,
}

impl From<&Entity> for EntitySnapshot {
    fn from(entity: &Entity) -> Self {
        let tank = entity.as_tank();
        Self {
            id: entity.id,
            kind: entity.kind(),
            position: entity.position,
            orientation: entity.orientation,
            health: tank.map(|t| t.health.current),
            team: tank.map(|t| t.team),
        }
    }
}

/// Fully resolved state after a tick.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Snapshot {
    /// Tick index (0 before the first tick).
    pub tick: u64,
    /// Live entities in ascending id order.
    pub entities: Vec<EntitySnapshot>,
    /// Entities removed during this tick.
    pub destroyed: Vec<DestructionEvent>,
    /// Events raised during this tick, in phase order.
    pub events: Vec<GameEvent>,
}

impl Snapshot {
    /// Look up an entity by id.
    #[must_use]
    pub fn entity(&self, id: EntityId) -> Option<&EntitySnapshot> {
        self.entities
            .binary_search_by_key(&id, |e| e.id)
            .ok()
            .map(|index| &self.entities[index])
    }

    /// Tanks still alive.
    pub fn tanks(&self) -> impl Iterator<Item = &EntitySnapshot> {
        self.entities.iter().filter(|e| e.kind == EntityKind::Tank)
    }

    /// Binary encoding, for byte-level comparison and transport.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self)
            .map_err(|e| GameError::InvalidState(format!("Failed to serialize snapshot: {e}")))
    }

    /// Decode a snapshot produced by [`to_bytes`](Self::to_bytes).
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not a valid snapshot.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes)
            .map_err(|e| GameError::InvalidState(format!("Failed to deserialize snapshot: {e}")))
    }
}
