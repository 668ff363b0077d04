//! Error types for the tank simulation.
//!
//! Only [`ConfigError`] is fatal. Problems that arise while a tick runs
//! (unknown ids, cooldowns, duplicate commands) never abort the tick; they are
//! reported as [`crate::events::GameEvent::CommandRejected`] instead.

use thiserror::Error;

use crate::components::EntityId;

/// Result type alias using [`GameError`].
pub type Result<T> = std::result::Result<T, GameError>;

/// Top-level error type for all simulation errors.
#[derive(Debug, Error)]
pub enum GameError {
    /// Configuration rejected at startup.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Invalid entity reference.
    #[error("Entity not found: {0}")]
    EntityNotFound(EntityId),

    /// Entity exists but is not the kind the operation needs.
    #[error("Entity {id} is not a {expected}")]
    WrongEntityKind {
        /// The entity that was referenced.
        id: EntityId,
        /// The kind the operation expected.
        expected: &'static str,
    },

    /// Spawn request outside the arena or otherwise unusable.
    #[error("Invalid spawn: {0}")]
    InvalidSpawn(String),

    /// Invalid game state (serialization, corrupt replay, ...).
    #[error("Invalid game state: {0}")]
    InvalidState(String),

    /// Desync detected during replay verification.
    #[error("Desync detected at tick {tick}: expected hash {expected_hash}, got {actual_hash}")]
    DesyncDetected {
        /// Tick where desync occurred.
        tick: u64,
        /// Hash recorded when the game was played.
        expected_hash: u64,
        /// Hash produced by re-simulation.
        actual_hash: u64,
    },
}

/// Fatal configuration problems, detected before the first tick.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Tick duration must be strictly positive.
    #[error("tick duration must be positive")]
    NonPositiveTickDuration,

    /// Arena width and height must be strictly positive.
    #[error("arena dimensions must be positive, got {width}x{height}")]
    InvalidArena {
        /// Configured width.
        width: String,
        /// Configured height.
        height: String,
    },

    /// The spatial index cell size must be strictly positive.
    #[error("spatial cell size must be positive")]
    InvalidCellSize,

    /// Weapon table is empty.
    #[error("weapon table is empty")]
    EmptyWeaponTable,

    /// A weapon entry failed validation.
    #[error("weapon '{weapon}': {reason}")]
    InvalidWeapon {
        /// Weapon name.
        weapon: String,
        /// What is wrong with it.
        reason: String,
    },

    /// A referenced weapon does not exist in the weapon table.
    #[error("unknown weapon '{0}'")]
    UnknownWeapon(String),

    /// Tank defaults failed validation.
    #[error("tank defaults: {0}")]
    InvalidTankDefaults(String),

    /// Ramming rule failed validation.
    #[error("ram damage rule: {0}")]
    InvalidRamRule(String),

    /// Configuration text could not be parsed.
    #[error("failed to parse configuration: {0}")]
    Parse(String),
}
