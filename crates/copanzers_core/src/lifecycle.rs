//! Entity lifecycle: id allocation, spawning and destruction.
//!
//! The [`EntityManager`] is the authoritative entity arena. Entities are kept
//! in a `BTreeMap` so iteration is always in ascending id order.
//!
//! Inside a tick, removals and spawns are deferred: phases *mark* entities
//! for destruction and *queue* new entities, and [`EntityManager::commit`]
//! applies both at the end of the tick. Marked entities stay visible until
//! then, so every phase sees the same set.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::components::{Entity, EntityBody, EntityId, Shape};
use crate::error::{GameError, Result};
use crate::events::{DestructionCause, DestructionEvent};
use crate::math::{fixed_serde, normalize_angle, Fixed, Vec2Fixed};

/// Initial state for a new entity. The id is assigned by the manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityInit {
    /// Spawn position.
    pub position: Vec2Fixed,
    /// Initial orientation in radians.
    #[serde(with = "fixed_serde")]
    pub orientation: Fixed,
    /// Initial velocity.
    pub velocity: Vec2Fixed,
    /// Bounding shape.
    pub shape: Shape,
    /// Kind-specific data.
    pub body: EntityBody,
}

impl EntityInit {
    fn into_entity(self, id: EntityId) -> Entity {
        Entity {
            id,
            position: self.position,
            previous_position: self.position,
            orientation: normalize_angle(self.orientation),
            velocity: self.velocity,
            angular_velocity: Fixed::ZERO,
            shape: self.shape,
            body: self.body,
        }
    }
}

/// Owns every entity and hands out ids.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityManager {
    entities: BTreeMap<EntityId, Entity>,
    next_id: EntityId,
    pending_spawns: Vec<Entity>,
    doomed: BTreeMap<EntityId, DestructionCause>,
    destroyed: Vec<DestructionEvent>,
}

impl EntityManager {
    /// Create an empty manager. The first id handed out is 1.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entities: BTreeMap::new(),
            next_id: 1,
            pending_spawns: Vec::new(),
            doomed: BTreeMap::new(),
            destroyed: Vec::new(),
        }
    }

    fn allocate_id(&mut self) -> EntityId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Id the next spawn will receive.
    #[must_use]
    pub const fn next_id(&self) -> EntityId {
        self.next_id
    }

    /// Insert a new entity immediately. Used between ticks.
    pub fn spawn(&mut self, init: EntityInit) -> EntityId {
        let id = self.allocate_id();
        let entity = init.into_entity(id);
        tracing::debug!(id, kind = ?entity.kind(), "Spawned entity");
        self.entities.insert(id, entity);
        id
    }

    /// Allocate an id now and insert the entity at the next [`commit`](Self::commit).
    pub fn spawn_deferred(&mut self, init: EntityInit) -> EntityId {
        let id = self.allocate_id();
        self.pending_spawns.push(init.into_entity(id));
        id
    }

    /// Flag an entity for removal at the end of the tick.
    ///
    /// The first cause recorded wins. Unknown ids are ignored.
    pub fn mark_destroyed(&mut self, id: EntityId, cause: DestructionCause) {
        if self.entities.contains_key(&id) {
            self.doomed.entry(id).or_insert(cause);
        }
    }

    /// Whether the entity is flagged for removal this tick.
    #[must_use]
    pub fn is_doomed(&self, id: EntityId) -> bool {
        self.doomed.contains_key(&id)
    }

    /// Remove an entity right away, recording a destruction event.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::EntityNotFound`] if no such entity exists.
    pub fn destroy(&mut self, id: EntityId, cause: DestructionCause) -> Result<DestructionEvent> {
        let entity = self
            .entities
            .remove(&id)
            .ok_or(GameError::EntityNotFound(id))?;
        self.doomed.remove(&id);
        let event = DestructionEvent {
            id,
            kind: entity.kind(),
            cause,
            position: entity.position,
        };
        tracing::debug!(id, cause = ?cause, "Destroyed entity");
        self.destroyed.push(event);
        Ok(event)
    }

    /// Apply deferred removals (ascending id) then deferred spawns (allocation order).
    pub fn commit(&mut self) {
        let doomed = std::mem::take(&mut self.doomed);
        for (id, cause) in doomed {
            // Only entities present when marked are in the set.
            let _ = self.destroy(id, cause);
        }
        for entity in std::mem::take(&mut self.pending_spawns) {
            self.entities.insert(entity.id, entity);
        }
    }

    /// Drain destruction events recorded since the last call.
    pub fn take_destroyed(&mut self) -> Vec<DestructionEvent> {
        std::mem::take(&mut self.destroyed)
    }

    /// Get an entity by id.
    #[must_use]
    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    /// Get a mutable entity by id.
    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(&id)
    }

    /// Check if an entity exists.
    #[must_use]
    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    /// Number of live entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Whether there are no live entities.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Live ids in ascending order.
    #[must_use]
    pub fn ids(&self) -> Vec<EntityId> {
        self.entities.keys().copied().collect()
    }

    /// Iterate entities in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    /// Iterate mutably in ascending id order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Entity> {
        self.entities.values_mut()
    }
}

impl Default for EntityManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{EntityKind, Obstacle};

    fn rock(x: i32) -> EntityInit {
        EntityInit {
            position: Vec2Fixed::from_ints(x, 0),
            orientation: Fixed::ZERO,
            velocity: Vec2Fixed::ZERO,
            shape: Shape::circle(Fixed::ONE),
            body: EntityBody::Obstacle(Obstacle { integrity: None }),
        }
    }

    #[test]
    fn test_ids_are_monotonic_and_never_reused() {
        let mut manager = EntityManager::new();
        let a = manager.spawn(rock(0));
        let b = manager.spawn(rock(1));
        assert_eq!((a, b), (1, 2));
        manager.destroy(b, DestructionCause::Removed).unwrap();
        let c = manager.spawn(rock(2));
        assert_eq!(c, 3);
        assert!(!manager.contains(b));
    }

    #[test]
    fn test_destroy_unknown_errors() {
        let mut manager = EntityManager::new();
        assert!(matches!(
            manager.destroy(9, DestructionCause::Removed),
            Err(GameError::EntityNotFound(9))
        ));
    }

    #[test]
    fn test_deferred_operations_apply_on_commit() {
        let mut manager = EntityManager::new();
        let a = manager.spawn(rock(0));
        let pending = manager.spawn_deferred(rock(5));
        manager.mark_destroyed(a, DestructionCause::Killed { by: 77 });
        manager.mark_destroyed(a, DestructionCause::Removed);
        manager.mark_destroyed(1234, DestructionCause::Removed);

        assert!(manager.contains(a));
        assert!(!manager.contains(pending));
        assert!(manager.is_doomed(a));

        manager.commit();
        assert!(!manager.contains(a));
        assert!(manager.contains(pending));

        let events = manager.take_destroyed();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EntityKind::Obstacle);
        assert_eq!(events[0].cause, DestructionCause::Killed { by: 77 });
        assert!(manager.take_destroyed().is_empty());
    }
}
