//! Entity data definitions.
//!
//! Entities are a tagged variant: the shared kinematic state lives on
//! [`Entity`], and kind-specific data lives in [`EntityBody`]. Relationships
//! between entities (projectile owner, team) are stored as ids and resolved
//! against the entity arena, never as references.

use serde::{Deserialize, Serialize};

use crate::math::{fixed_serde, option_fixed_serde, Fixed, Vec2Fixed};

/// Unique identifier for entities. Never reused within a simulation run.
pub type EntityId = u64;

/// Team / faction identifier.
pub type TeamId = u8;

// ============================================================================
// Classification
// ============================================================================

/// Entity kind, as exposed in snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityKind {
    /// A controllable tank.
    Tank,
    /// A shell in flight.
    Projectile,
    /// Static terrain geometry.
    Obstacle,
}

/// Armor class of a tank. Scales incoming damage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ArmorClass {
    /// No damage reduction.
    #[default]
    Light,
    /// 15% damage reduction.
    Medium,
    /// 30% damage reduction.
    Heavy,
}

impl ArmorClass {
    /// Percentage of incoming damage that gets through.
    #[must_use]
    pub const fn damage_percent(self) -> u32 {
        match self {
            ArmorClass::Light => 100,
            ArmorClass::Medium => 85,
            ArmorClass::Heavy => 70,
        }
    }
}

/// How splash damage decays between the blast center and the blast radius.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Falloff {
    /// Full damage at the center, zero at the radius, straight line between.
    #[default]
    Linear,
    /// Full damage anywhere strictly inside the radius.
    Constant,
    /// `1 - (d/r)²`: stays high near the center, drops off at the rim.
    Quadratic,
}

// ============================================================================
// Shapes
// ============================================================================

/// Bounding shape of an entity, in its local frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Shape {
    /// Circle centered on the entity position.
    Circle {
        /// Circle radius.
        #[serde(with = "fixed_serde")]
        radius: Fixed,
    },
    /// Box centered on the entity position, rotated by its orientation.
    Rect {
        /// Half width (x) and half height (y) before rotation.
        half_extents: Vec2Fixed,
    },
}

impl Shape {
    /// Circle helper.
    #[must_use]
    pub const fn circle(radius: Fixed) -> Self {
        Self::Circle { radius }
    }

    /// Box helper from half extents.
    #[must_use]
    pub const fn rect(half_width: Fixed, half_height: Fixed) -> Self {
        Self::Rect {
            half_extents: Vec2Fixed::new(half_width, half_height),
        }
    }

    /// Radius of the smallest circle around the entity position containing the shape.
    #[must_use]
    pub fn bounding_radius(&self) -> Fixed {
        match *self {
            Shape::Circle { radius } => radius,
            Shape::Rect { half_extents } => half_extents.length(),
        }
    }
}

// ============================================================================
// Health
// ============================================================================

/// Health (tanks) or structural integrity (destructible obstacles).
///
/// Invariant: `0 <= current <= max`. There is no healing rule, so `current`
/// only ever goes down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Health {
    /// Current health points.
    pub current: u32,
    /// Maximum health points.
    pub max: u32,
}

impl Health {
    /// Create new health component at full health.
    #[must_use]
    pub const fn new(max: u32) -> Self {
        Self { current: max, max }
    }

    /// Check if entity is dead (health == 0).
    #[must_use]
    pub const fn is_dead(&self) -> bool {
        self.current == 0
    }

    /// Apply damage, returning actual damage dealt.
    /// Uses saturating subtraction to prevent underflow.
    pub fn apply_damage(&mut self, amount: u32) -> u32 {
        let actual = amount.min(self.current);
        self.current = self.current.saturating_sub(actual);
        actual
    }
}

// ============================================================================
// Commands
// ============================================================================

/// One tank's input for one tick.
///
/// `move_vector` is the desired world-space velocity in units per second and
/// `turn_input` the desired angular velocity in radians per second. Both are
/// clamped to the tank's limits, never rejected for being too large.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TankCommand {
    /// Tank receiving the command.
    pub tank_id: EntityId,
    /// Desired velocity.
    pub move_vector: Vec2Fixed,
    /// Desired angular velocity.
    #[serde(with = "fixed_serde")]
    pub turn_input: Fixed,
    /// Fire the equipped weapon this tick.
    pub fire: bool,
}

impl TankCommand {
    /// A command that only fires, holding position and heading.
    #[must_use]
    pub const fn fire_only(tank_id: EntityId) -> Self {
        Self {
            tank_id,
            move_vector: Vec2Fixed::ZERO,
            turn_input: Fixed::ZERO,
            fire: true,
        }
    }

    /// A movement command without firing.
    #[must_use]
    pub const fn drive(tank_id: EntityId, move_vector: Vec2Fixed, turn_input: Fixed) -> Self {
        Self {
            tank_id,
            move_vector,
            turn_input,
            fire: false,
        }
    }
}

/// Control input a tank keeps applying until the next command arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ControlState {
    /// Commanded velocity, already clamped to max speed.
    pub desired_velocity: Vec2Fixed,
    /// Commanded angular velocity, already clamped to max turn rate.
    #[serde(with = "fixed_serde")]
    pub turn_rate: Fixed,
}

// ============================================================================
// Entity bodies
// ============================================================================

/// Tank-specific state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tank {
    /// Hull health.
    pub health: Health,
    /// Armor class.
    pub armor: ArmorClass,
    /// Team the tank fights for.
    pub team: TeamId,
    /// Equipped weapon (key into the weapon table).
    pub weapon: String,
    /// Ticks until the weapon may fire again. Fire is allowed only at 0.
    pub cooldown: u32,
    /// Top speed in units per second.
    #[serde(with = "fixed_serde")]
    pub max_speed: Fixed,
    /// Top turn rate in radians per second.
    #[serde(with = "fixed_serde")]
    pub max_turn_rate: Fixed,
    /// Acceleration limit in units/s² (`None` = reach commanded velocity instantly).
    #[serde(with = "option_fixed_serde")]
    pub acceleration: Option<Fixed>,
    /// Held control input.
    pub control: ControlState,
}

impl Tank {
    /// Check if the weapon is ready.
    #[must_use]
    pub const fn can_fire(&self) -> bool {
        self.cooldown == 0 && !self.health.is_dead()
    }

    /// Tick down the cooldown by one.
    pub fn tick_cooldown(&mut self) {
        self.cooldown = self.cooldown.saturating_sub(1);
    }
}

/// Projectile-specific state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Projectile {
    /// Tank that fired this projectile.
    pub owner: EntityId,
    /// Team of the owner at the time of firing.
    pub owner_team: TeamId,
    /// Weapon that fired it.
    pub weapon: String,
    /// Damage on direct hit (and at the blast center).
    pub damage: u32,
    /// Splash radius, 0 for direct-hit-only weapons.
    #[serde(with = "fixed_serde")]
    pub blast_radius: Fixed,
    /// Splash falloff curve.
    pub falloff: Falloff,
    /// Remaining lifetime in ticks, if the weapon limits it.
    pub ticks_remaining: Option<u32>,
    /// Remaining travel distance, if the weapon limits it.
    #[serde(with = "option_fixed_serde")]
    pub distance_remaining: Option<Fixed>,
}

impl Projectile {
    /// Whether the projectile deals splash damage.
    #[must_use]
    pub fn is_splash(&self) -> bool {
        self.blast_radius > Fixed::ZERO
    }
}

/// Static terrain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Obstacle {
    /// Structural integrity; `None` for indestructible terrain.
    pub integrity: Option<Health>,
}

/// Kind-specific data.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityBody {
    /// Tank data.
    Tank(Tank),
    /// Projectile data.
    Projectile(Projectile),
    /// Obstacle data.
    Obstacle(Obstacle),
}

// ============================================================================
// Entity
// ============================================================================

/// A simulated entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Entity {
    /// Unique identifier for this entity.
    pub id: EntityId,
    /// World position (center of the shape).
    pub position: Vec2Fixed,
    /// Position at the start of the current tick, used for swept collision.
    pub previous_position: Vec2Fixed,
    /// Orientation in radians, CCW from +x, kept in `[-π, π)`.
    #[serde(with = "fixed_serde")]
    pub orientation: Fixed,
    /// Velocity in units per second.
    pub velocity: Vec2Fixed,
    /// Angular velocity in radians per second.
    #[serde(with = "fixed_serde")]
    pub angular_velocity: Fixed,
    /// Bounding shape.
    pub shape: Shape,
    /// Kind-specific data.
    pub body: EntityBody,
}

impl Entity {
    /// Entity kind.
    #[must_use]
    pub const fn kind(&self) -> EntityKind {
        match self.body {
            EntityBody::Tank(_) => EntityKind::Tank,
            EntityBody::Projectile(_) => EntityKind::Projectile,
            EntityBody::Obstacle(_) => EntityKind::Obstacle,
        }
    }

    /// Tank data, if this is a tank.
    #[must_use]
    pub const fn as_tank(&self) -> Option<&Tank> {
        match &self.body {
            EntityBody::Tank(tank) => Some(tank),
            _ => None,
        }
    }

    /// Mutable tank data, if this is a tank.
    pub fn as_tank_mut(&mut self) -> Option<&mut Tank> {
        match &mut self.body {
            EntityBody::Tank(tank) => Some(tank),
            _ => None,
        }
    }

    /// Projectile data, if this is a projectile.
    #[must_use]
    pub const fn as_projectile(&self) -> Option<&Projectile> {
        match &self.body {
            EntityBody::Projectile(projectile) => Some(projectile),
            _ => None,
        }
    }

    /// Team of a tank, or of the firing tank for a projectile.
    #[must_use]
    pub fn team(&self) -> Option<TeamId> {
        match &self.body {
            EntityBody::Tank(tank) => Some(tank.team),
            EntityBody::Projectile(projectile) => Some(projectile.owner_team),
            EntityBody::Obstacle(_) => None,
        }
    }

    /// Damageable state: tank health or destructible obstacle integrity.
    #[must_use]
    pub fn health(&self) -> Option<&Health> {
        match &self.body {
            EntityBody::Tank(tank) => Some(&tank.health),
            EntityBody::Obstacle(obstacle) => obstacle.integrity.as_ref(),
            EntityBody::Projectile(_) => None,
        }
    }

    /// Mutable damageable state.
    pub fn health_mut(&mut self) -> Option<&mut Health> {
        match &mut self.body {
            EntityBody::Tank(tank) => Some(&mut tank.health),
            EntityBody::Obstacle(obstacle) => obstacle.integrity.as_mut(),
            EntityBody::Projectile(_) => None,
        }
    }

    /// Unit vector the entity is facing.
    #[must_use]
    pub fn facing(&self) -> Vec2Fixed {
        Vec2Fixed::from_angle(self.orientation)
    }
}
