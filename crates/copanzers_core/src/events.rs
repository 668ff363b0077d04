//! Events emitted by a tick.
//!
//! Everything observable about a tick that is not plain entity state ends up
//! here: shots fired, hits, contacts, rejected commands and destructions.
//! Events are collected in the order the phases produce them and published
//! with the tick's snapshot.

use serde::{Deserialize, Serialize};

use crate::components::{EntityId, EntityKind};
use crate::math::Vec2Fixed;

/// Why a command (or the fire part of it) was dropped.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RejectReason {
    /// No entity with that id exists.
    UnknownEntity,
    /// The id names something other than a tank.
    NotATank,
    /// A command for this tank was already accepted this tick.
    DuplicateCommand,
    /// Weapon still cooling down.
    CooldownActive {
        /// Ticks left before the weapon is ready.
        remaining: u32,
    },
    /// The tank was destroyed earlier in the same tick.
    TankDestroyed,
    /// The tank's weapon is not in the weapon table.
    UnknownWeapon(String),
}

/// Why an entity left the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DestructionCause {
    /// Health or integrity reached zero.
    Killed {
        /// Entity credited with the kill.
        by: EntityId,
    },
    /// Projectile struck a tank.
    Impact {
        /// The tank that was hit.
        target: EntityId,
    },
    /// Projectile struck terrain.
    Absorbed {
        /// The obstacle that was hit.
        obstacle: EntityId,
    },
    /// Projectile ran out of ticks.
    LifetimeExpired,
    /// Projectile used up its travel distance.
    RangeExhausted,
    /// Projectile left the arena.
    OutOfBounds,
    /// Removed through the public API.
    Removed,
}

/// An entity removal, published with the snapshot of the tick it happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DestructionEvent {
    /// Removed entity.
    pub id: EntityId,
    /// What it was.
    pub kind: EntityKind,
    /// Why it was removed.
    pub cause: DestructionCause,
    /// Where it was when removed.
    pub position: Vec2Fixed,
}

/// A tick event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GameEvent {
    /// A tank fired.
    Fired {
        /// Firing tank.
        tank: EntityId,
        /// The new projectile.
        projectile: EntityId,
        /// Weapon used.
        weapon: String,
    },
    /// A command was dropped.
    CommandRejected {
        /// The id the command was addressed to.
        tank: EntityId,
        /// Why.
        reason: RejectReason,
    },
    /// Damage was dealt by a projectile.
    Hit {
        /// Projectile that caused the damage.
        projectile: EntityId,
        /// Tank that fired the projectile.
        owner: EntityId,
        /// Entity damaged.
        target: EntityId,
        /// Damage actually dealt after armor.
        damage: u32,
        /// Whether this was splash rather than the direct hit.
        splash: bool,
    },
    /// A splash projectile exploded.
    Detonation {
        /// The projectile.
        projectile: EntityId,
        /// Blast center.
        position: Vec2Fixed,
    },
    /// Two solid bodies touched and were separated.
    Collision {
        /// Lower-id tank.
        a: EntityId,
        /// Other tank or the obstacle.
        b: EntityId,
        /// Ramming damage dealt to each tank (0 when the rule is off).
        damage: u32,
    },
}

impl GameEvent {
    /// Shorthand for a rejection.
    #[must_use]
    pub const fn rejected(tank: EntityId, reason: RejectReason) -> Self {
        Self::CommandRejected { tank, reason }
    }
}
