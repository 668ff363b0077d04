//! Core simulation loop.
//!
//! The simulation advances in fixed logical ticks and processes all game
//! logic deterministically. Each tick runs the same phases in the same order:
//!
//! 1. Commands (validate, store control input, collect fire requests)
//! 2. Motion integration
//! 3. Spatial index rebuild
//! 4. Collision detection and resolution
//! 5. Combat (impacts, expiries, ramming, then weapon fire)
//! 6. Lifecycle (cooldowns, removals, spawns)
//! 7. Snapshot
//!
//! # Determinism
//!
//! - No floating-point math (uses fixed-point via [`Fixed`])
//! - No randomness
//! - Entities are iterated in ascending id order
//! - Same configuration and command stream always produce the same snapshots
//!
//! # Example
//!
//! ```
//! use copanzers_core::config::SimConfig;
//! use copanzers_core::components::TankCommand;
//! use copanzers_core::math::{Fixed, Vec2Fixed};
//! use copanzers_core::simulation::{Simulation, TankSpawn};
//!
//! let mut sim = Simulation::new(SimConfig::default()).unwrap();
//! let tank = sim.spawn_tank(TankSpawn::new(0, Vec2Fixed::from_ints(100, 100))).unwrap();
//!
//! sim.submit_command(TankCommand::drive(tank, Vec2Fixed::from_ints(30, 0), Fixed::ZERO));
//! let snapshot = sim.tick();
//! assert_eq!(snapshot.tick, 1);
//! ```

use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeSet;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::collision::{self, index_bounds};
use crate::combat::{self, CombatPhase};
use crate::components::{
    ArmorClass, ControlState, Entity, EntityBody, EntityId, Health, Obstacle, Projectile, Shape,
    Tank, TankCommand, TeamId,
};
use crate::config::SimConfig;
use crate::error::{ConfigError, GameError, Result};
use crate::events::{DestructionCause, DestructionEvent, GameEvent, RejectReason};
use crate::geometry::Aabb;
use crate::lifecycle::{EntityInit, EntityManager};
use crate::math::{Fixed, Vec2Fixed};
use crate::motion;
use crate::snapshot::{EntitySnapshot, Snapshot};
use crate::spatial::SpatialGrid;

/// Parameters for spawning a tank. Unset fields fall back to the
/// configured tank defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TankSpawn {
    /// Team.
    pub team: TeamId,
    /// Spawn position.
    pub position: Vec2Fixed,
    /// Initial heading in radians.
    pub orientation: Fixed,
    /// Weapon override.
    pub weapon: Option<String>,
    /// Armor override.
    pub armor: Option<ArmorClass>,
    /// Max health override.
    pub max_health: Option<u32>,
}

impl TankSpawn {
    /// A tank of `team` at `position`, facing +x.
    #[must_use]
    pub fn new(team: TeamId, position: Vec2Fixed) -> Self {
        Self {
            team,
            position,
            orientation: Fixed::ZERO,
            weapon: None,
            armor: None,
            max_health: None,
        }
    }

    /// Set the initial heading.
    #[must_use]
    pub fn facing(mut self, orientation: Fixed) -> Self {
        self.orientation = orientation;
        self
    }

    /// Equip a specific weapon.
    #[must_use]
    pub fn with_weapon(mut self, weapon: impl Into<String>) -> Self {
        self.weapon = Some(weapon.into());
        self
    }

    /// Use a specific armor class.
    #[must_use]
    pub fn with_armor(mut self, armor: ArmorClass) -> Self {
        self.armor = Some(armor);
        self
    }

    /// Use a specific max health.
    #[must_use]
    pub fn with_health(mut self, max_health: u32) -> Self {
        self.max_health = Some(max_health);
        self
    }
}

/// Parameters for spawning static terrain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObstacleSpawn {
    /// Center position.
    pub position: Vec2Fixed,
    /// Rotation in radians.
    pub orientation: Fixed,
    /// Collision shape.
    pub shape: Shape,
    /// Integrity for destructible terrain, `None` for indestructible.
    pub integrity: Option<u32>,
}

/// The authoritative simulation state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Simulation {
    config: SimConfig,
    tick: u64,
    entities: EntityManager,
    pending_commands: Vec<TankCommand>,
    last_events: Vec<GameEvent>,
    last_destroyed: Vec<DestructionEvent>,
    #[serde(skip)]
    index: SpatialGrid,
}

impl Simulation {
    /// Create an empty simulation at tick 0.
    ///
    /// # Errors
    ///
    /// Returns the first configuration problem found.
    pub fn new(config: SimConfig) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        let index = SpatialGrid::new(config.spatial_cell_size);
        Ok(Self {
            config,
            tick: 0,
            entities: EntityManager::new(),
            pending_commands: Vec::new(),
            last_events: Vec::new(),
            last_destroyed: Vec::new(),
            index,
        })
    }

    /// Current tick number. Starts at 0 and increments once per tick.
    #[must_use]
    pub const fn get_tick(&self) -> u64 {
        self.tick
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &SimConfig {
        &self.config
    }

    /// The entity arena.
    #[must_use]
    pub const fn entities(&self) -> &EntityManager {
        &self.entities
    }

    /// Get an entity by id.
    #[must_use]
    pub fn get_entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(id)
    }

    /// Ids whose bounds intersect `area`, as of the end of the last tick.
    #[must_use]
    pub fn query_region(&self, area: &Aabb) -> Vec<EntityId> {
        self.index.query_region(area)
    }

    // ------------------------------------------------------------------------
    // Spawning / removal
    // ------------------------------------------------------------------------

    /// Insert any entity. The position must lie inside the arena.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::InvalidSpawn`] for positions outside the arena.
    pub fn spawn(&mut self, init: EntityInit) -> Result<EntityId> {
        if !self.config.arena.contains(init.position) {
            return Err(GameError::InvalidSpawn(format!(
                "position ({}, {}) is outside the arena",
                init.position.x, init.position.y
            )));
        }
        let id = self.entities.spawn(init);
        if let Some(entity) = self.entities.get(id) {
            self.index.update(id, index_bounds(entity));
        }
        Ok(id)
    }

    /// Spawn a tank using the configured defaults.
    ///
    /// The hull is nudged inward if it would overlap the arena edge.
    ///
    /// # Errors
    ///
    /// Fails for positions outside the arena or unknown weapons.
    pub fn spawn_tank(&mut self, spawn: TankSpawn) -> Result<EntityId> {
        let defaults = &self.config.tanks;
        let weapon = spawn.weapon.unwrap_or_else(|| defaults.weapon.clone());
        if self.config.weapon(&weapon).is_none() {
            return Err(ConfigError::UnknownWeapon(weapon).into());
        }
        if !self.config.arena.contains(spawn.position) {
            return Err(GameError::InvalidSpawn(format!(
                "tank position ({}, {}) is outside the arena",
                spawn.position.x, spawn.position.y
            )));
        }
        let max_health = spawn.max_health.unwrap_or(defaults.max_health);
        if max_health == 0 {
            return Err(GameError::InvalidSpawn("tank max health must be positive".into()));
        }

        let position = self.config.arena.clamp_circle(spawn.position, defaults.radius);
        let init = EntityInit {
            position,
            orientation: spawn.orientation,
            velocity: Vec2Fixed::ZERO,
            shape: defaults.shape(),
            body: EntityBody::Tank(Tank {
                health: Health::new(max_health),
                armor: spawn.armor.unwrap_or(defaults.armor),
                team: spawn.team,
                weapon,
                cooldown: 0,
                max_speed: defaults.max_speed,
                max_turn_rate: defaults.max_turn_rate,
                acceleration: defaults.acceleration,
                control: ControlState::default(),
            }),
        };
        let id = self.spawn(init)?;
        tracing::info!(id, team = spawn.team, "Tank spawned");
        Ok(id)
    }

    /// Spawn static terrain.
    ///
    /// # Errors
    ///
    /// Fails for positions outside the arena or a zero integrity.
    pub fn spawn_obstacle(&mut self, spawn: ObstacleSpawn) -> Result<EntityId> {
        if spawn.integrity == Some(0) {
            return Err(GameError::InvalidSpawn(
                "obstacle integrity must be positive".into(),
            ));
        }
        self.spawn(EntityInit {
            position: spawn.position,
            orientation: spawn.orientation,
            velocity: Vec2Fixed::ZERO,
            shape: spawn.shape,
            body: EntityBody::Obstacle(Obstacle {
                integrity: spawn.integrity.map(Health::new),
            }),
        })
    }

    /// Place a projectile from `owner`'s weapon at `position`, flying along
    /// `heading`. Ignores the owner's cooldown.
    ///
    /// # Errors
    ///
    /// Fails if `owner` is not a live tank or the position is outside the arena.
    pub fn spawn_projectile(
        &mut self,
        owner: EntityId,
        position: Vec2Fixed,
        heading: Fixed,
    ) -> Result<EntityId> {
        let tank = self
            .entities
            .get(owner)
            .ok_or(GameError::EntityNotFound(owner))?
            .as_tank()
            .ok_or(GameError::WrongEntityKind {
                id: owner,
                expected: "tank",
            })?;
        let weapon = self
            .config
            .weapon(&tank.weapon)
            .ok_or_else(|| ConfigError::UnknownWeapon(tank.weapon.clone()))?;

        let init = EntityInit {
            position,
            orientation: heading,
            velocity: Vec2Fixed::from_angle(heading).scale(weapon.projectile_speed),
            shape: Shape::circle(weapon.projectile_radius),
            body: EntityBody::Projectile(Projectile {
                owner,
                owner_team: tank.team,
                weapon: tank.weapon.clone(),
                damage: weapon.damage,
                blast_radius: weapon.blast_radius,
                falloff: weapon.falloff,
                ticks_remaining: weapon.max_ticks,
                distance_remaining: weapon.max_range,
            }),
        };
        self.spawn(init)
    }

    /// Remove an entity immediately. The destruction event is published with
    /// the next tick's snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::EntityNotFound`] if the entity does not exist.
    pub fn destroy(&mut self, id: EntityId) -> Result<()> {
        self.entities.destroy(id, DestructionCause::Removed)?;
        self.index.remove(id);
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Ticking
    // ------------------------------------------------------------------------

    /// Buffer a command for the next tick.
    pub fn submit_command(&mut self, command: TankCommand) {
        self.pending_commands.push(command);
    }

    /// Drain buffered commands and advance one tick.
    pub fn tick(&mut self) -> Arc<Snapshot> {
        let commands = std::mem::take(&mut self.pending_commands);
        self.advance(&commands)
    }

    /// Advance one tick with the given commands and return the new snapshot.
    ///
    /// Malformed commands never abort the tick; they are dropped and
    /// reported as [`GameEvent::CommandRejected`].
    pub fn advance(&mut self, commands: &[TankCommand]) -> Arc<Snapshot> {
        let mut events = Vec::new();

        // 1. Commands
        let fire_requests = self.accept_commands(commands, &mut events);

        // 2. Motion
        let expired = motion::integrate(&mut self.entities, &self.config);

        // 3. Spatial index
        self.rebuild_index();

        // 4. Collisions
        let report =
            collision::resolve_contacts(&mut self.entities, &self.index, &self.config.arena);

        // 5. Combat
        {
            let mut phase = CombatPhase {
                entities: &mut self.entities,
                index: &self.index,
                config: &self.config,
                events: &mut events,
            };
            phase.resolve_impacts(&report.impacts);
            phase.resolve_expiries(&expired, &report.impacts);
            phase.apply_contacts(&report.contacts);
            phase.fire(&fire_requests);
        }

        // 6. Lifecycle
        combat::tick_cooldowns(&mut self.entities);
        self.entities.commit();
        self.last_destroyed = self.entities.take_destroyed();
        self.last_events = events;
        self.rebuild_index();

        self.tick += 1;

        #[cfg(debug_assertions)]
        {
            let hash = self.state_hash();
            tracing::debug!(tick = self.tick, state_hash = hash, "Simulation state hash");
        }

        // 7. Snapshot
        Arc::new(self.snapshot())
    }

    fn accept_commands(
        &mut self,
        commands: &[TankCommand],
        events: &mut Vec<GameEvent>,
    ) -> Vec<TankCommand> {
        let mut seen = BTreeSet::new();
        let mut fire_requests = Vec::new();

        for command in commands {
            let outcome = match self.entities.get_mut(command.tank_id) {
                None => Err(RejectReason::UnknownEntity),
                Some(entity) => match entity.as_tank_mut() {
                    None => Err(RejectReason::NotATank),
                    Some(_) if !seen.insert(command.tank_id) => Err(RejectReason::DuplicateCommand),
                    Some(tank) => {
                        motion::apply_command(tank, command);
                        Ok(())
                    }
                },
            };
            match outcome {
                Ok(()) if command.fire => fire_requests.push(*command),
                Ok(()) => {}
                Err(reason) => {
                    tracing::debug!(tank = command.tank_id, reason = ?reason, "Command rejected");
                    events.push(GameEvent::rejected(command.tank_id, reason));
                }
            }
        }
        fire_requests
    }

    fn rebuild_index(&mut self) {
        self.index
            .rebuild(self.entities.iter().map(|e| (e.id, index_bounds(e))));
    }

    // ------------------------------------------------------------------------
    // Inspection / persistence
    // ------------------------------------------------------------------------

    /// Current state without advancing. Before the first tick this is the
    /// tick 0 snapshot with no events.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            tick: self.tick,
            entities: self.entities.iter().map(EntitySnapshot::from).collect(),
            destroyed: self.last_destroyed.clone(),
            events: self.last_events.clone(),
        }
    }

    /// Calculate a hash of the current simulation state.
    ///
    /// Used for desync detection and replay verification. Two simulations
    /// with identical state produce identical hashes.
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.tick.hash(&mut hasher);
        self.entities.next_id().hash(&mut hasher);
        self.entities.len().hash(&mut hasher);
        for entity in self.entities.iter() {
            entity.hash(&mut hasher);
        }
        hasher.finish()
    }

    /// Serialize the simulation state for replay or save games.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        bincode::serialize(self)
            .map_err(|e| GameError::InvalidState(format!("Failed to serialize simulation: {e}")))
    }

    /// Deserialize simulation state from bytes and rebuild the spatial index.
    ///
    /// # Errors
    ///
    /// Returns an error if deserialization fails or the embedded
    /// configuration is invalid.
    pub fn deserialize(data: &[u8]) -> Result<Self> {
        let mut sim: Self = bincode::deserialize(data).map_err(|e| {
            GameError::InvalidState(format!("Failed to deserialize simulation: {e}"))
        })?;
        sim.config.validate()?;
        sim.index = SpatialGrid::new(sim.config.spatial_cell_size);
        sim.rebuild_index();
        Ok(sim)
    }
}
