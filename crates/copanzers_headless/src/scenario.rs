//! Scenario loading and configuration.
//!
//! A scenario is a RON file holding the simulation configuration, the
//! starting placement of tanks and terrain, who controls each team, any
//! scripted commands, and a tick limit.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use copanzers_core::components::{ArmorClass, EntityId, Shape, TankCommand, TeamId};
use copanzers_core::config::SimConfig;
use copanzers_core::error::{ConfigError, GameError};
use copanzers_core::math::{decimal_serde, Fixed, Vec2Fixed, PI};
use copanzers_core::simulation::{ObstacleSpawn, Simulation, TankSpawn};

use crate::ai::Controller;

/// Error type for scenario operations.
#[derive(Error, Debug)]
pub enum ScenarioError {
    /// File not found.
    #[error("Scenario file not found: {0}")]
    FileNotFound(String),
    /// Failed to read file.
    #[error("Failed to read scenario file: {0}")]
    ReadError(#[from] std::io::Error),
    /// Failed to parse RON.
    #[error("Failed to parse scenario: {0}")]
    ParseError(#[from] ron::error::SpannedError),
    /// The embedded configuration is invalid.
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
    /// A placement was rejected by the simulation.
    #[error("Invalid placement: {0}")]
    Placement(#[from] GameError),
    /// A scripted command names a tank index that does not exist.
    #[error("Scripted command at tick {tick} refers to tank #{index}, but only {count} tanks are placed")]
    UnknownTank {
        /// Tick of the offending command.
        tick: u64,
        /// Index into the tank list.
        index: usize,
        /// Number of placed tanks.
        count: usize,
    },
}

/// A tank placement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TankPlacement {
    /// Team.
    pub team: TeamId,
    /// X coordinate.
    #[serde(with = "decimal_serde")]
    pub x: Fixed,
    /// Y coordinate.
    #[serde(with = "decimal_serde")]
    pub y: Fixed,
    /// Initial heading in radians.
    #[serde(default, with = "decimal_serde")]
    pub heading: Fixed,
    /// Weapon override.
    #[serde(default)]
    pub weapon: Option<String>,
    /// Armor override.
    #[serde(default)]
    pub armor: Option<ArmorClass>,
    /// Max health override.
    #[serde(default)]
    pub health: Option<u32>,
}

impl TankPlacement {
    /// A default tank of `team` at integer coordinates.
    #[must_use]
    pub fn new(team: TeamId, x: i32, y: i32) -> Self {
        Self {
            team,
            x: Fixed::from_num(x),
            y: Fixed::from_num(y),
            heading: Fixed::ZERO,
            weapon: None,
            armor: None,
            health: None,
        }
    }

    /// Set the initial heading.
    #[must_use]
    pub fn facing(mut self, heading: Fixed) -> Self {
        self.heading = heading;
        self
    }

    fn to_spawn(&self) -> TankSpawn {
        let mut spawn =
            TankSpawn::new(self.team, Vec2Fixed::new(self.x, self.y)).facing(self.heading);
        spawn.weapon.clone_from(&self.weapon);
        spawn.armor = self.armor;
        spawn.max_health = self.health;
        spawn
    }
}

/// Terrain outline in a scenario file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObstacleShape {
    /// Round pillar.
    Circle {
        /// Radius.
        #[serde(with = "decimal_serde")]
        radius: Fixed,
    },
    /// Rectangular block, rotated by the placement's rotation.
    Rect {
        /// Half width.
        #[serde(with = "decimal_serde")]
        half_width: Fixed,
        /// Half height.
        #[serde(with = "decimal_serde")]
        half_height: Fixed,
    },
}

impl ObstacleShape {
    const fn to_shape(self) -> Shape {
        match self {
            Self::Circle { radius } => Shape::circle(radius),
            Self::Rect {
                half_width,
                half_height,
            } => Shape::rect(half_width, half_height),
        }
    }
}

/// A terrain placement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObstaclePlacement {
    /// Center x.
    #[serde(with = "decimal_serde")]
    pub x: Fixed,
    /// Center y.
    #[serde(with = "decimal_serde")]
    pub y: Fixed,
    /// Rotation in radians.
    #[serde(default, with = "decimal_serde")]
    pub rotation: Fixed,
    /// Outline.
    pub shape: ObstacleShape,
    /// Integrity for destructible terrain.
    #[serde(default)]
    pub integrity: Option<u32>,
}

/// A command issued at a fixed tick, addressed by placement index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptedCommand {
    /// Tick the command applies in.
    pub tick: u64,
    /// Index into [`Scenario::tanks`].
    pub tank: usize,
    /// Desired velocity, x component.
    #[serde(default, with = "decimal_serde")]
    pub move_x: Fixed,
    /// Desired velocity, y component.
    #[serde(default, with = "decimal_serde")]
    pub move_y: Fixed,
    /// Desired turn rate.
    #[serde(default, with = "decimal_serde")]
    pub turn: Fixed,
    /// Fire this tick.
    #[serde(default)]
    pub fire: bool,
}

/// A complete scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Scenario name.
    pub name: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Simulation configuration.
    #[serde(default)]
    pub config: SimConfig,
    /// Tanks, spawned in list order.
    pub tanks: Vec<TankPlacement>,
    /// Terrain, spawned before the tanks.
    #[serde(default)]
    pub obstacles: Vec<ObstaclePlacement>,
    /// Controller per team. Teams without an entry are idle.
    #[serde(default)]
    pub controllers: BTreeMap<TeamId, Controller>,
    /// Scripted commands, used by teams with the `Scripted` controller.
    #[serde(default)]
    pub script: Vec<ScriptedCommand>,
    /// Stop after this many ticks.
    #[serde(default = "default_tick_limit")]
    pub tick_limit: u64,
}

const fn default_tick_limit() -> u64 {
    3600
}

/// A scenario turned into a live simulation.
#[derive(Debug, Clone)]
pub struct Battle {
    /// The simulation, before its first tick.
    pub simulation: Simulation,
    /// Entity id of each tank placement, in placement order.
    pub tank_ids: Vec<EntityId>,
}

impl Default for Scenario {
    fn default() -> Self {
        Self::duel()
    }
}

impl Scenario {
    /// Load a scenario from a RON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ScenarioError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ScenarioError::FileNotFound(path.display().to_string()));
        }
        let contents = std::fs::read_to_string(path)?;
        Self::from_ron_str(&contents)
    }

    /// Load from a RON string (useful for embedded scenarios).
    pub fn from_ron_str(ron: &str) -> Result<Self, ScenarioError> {
        let scenario: Scenario = ron::from_str(ron)?;
        Ok(scenario)
    }

    /// Two gunners facing each other across an open arena.
    #[must_use]
    pub fn duel() -> Self {
        Self {
            name: "duel".to_string(),
            description: "One tank per team, both under gunner AI".to_string(),
            config: SimConfig::default(),
            tanks: vec![
                TankPlacement::new(0, 150, 300),
                TankPlacement::new(1, 650, 300).facing(PI),
            ],
            obstacles: Vec::new(),
            controllers: [(0, Controller::Gunner), (1, Controller::Gunner)]
                .into_iter()
                .collect(),
            script: Vec::new(),
            tick_limit: default_tick_limit(),
        }
    }

    /// Check the scenario without keeping the simulation.
    pub fn validate(&self) -> Result<(), ScenarioError> {
        self.build().map(|_| ())
    }

    /// Build the simulation: terrain first, then tanks in list order.
    pub fn build(&self) -> Result<Battle, ScenarioError> {
        let mut simulation = Simulation::new(self.config.clone())?;

        for obstacle in &self.obstacles {
            simulation.spawn_obstacle(ObstacleSpawn {
                position: Vec2Fixed::new(obstacle.x, obstacle.y),
                orientation: obstacle.rotation,
                shape: obstacle.shape.to_shape(),
                integrity: obstacle.integrity,
            })?;
        }

        let tank_ids = self
            .tanks
            .iter()
            .map(|tank| simulation.spawn_tank(tank.to_spawn()))
            .collect::<Result<Vec<_>, _>>()?;

        if let Some(bad) = self.script.iter().find(|c| c.tank >= tank_ids.len()) {
            return Err(ScenarioError::UnknownTank {
                tick: bad.tick,
                index: bad.tank,
                count: tank_ids.len(),
            });
        }

        tracing::info!(
            scenario = %self.name,
            tanks = tank_ids.len(),
            obstacles = self.obstacles.len(),
            "Scenario built"
        );
        Ok(Battle {
            simulation,
            tank_ids,
        })
    }

    /// Controller for a team.
    #[must_use]
    pub fn controller(&self, team: TeamId) -> Controller {
        self.controllers.get(&team).copied().unwrap_or_default()
    }

    /// Scripted commands for `tick`, resolved to entity ids.
    #[must_use]
    pub fn script_at(&self, tick: u64, tank_ids: &[EntityId]) -> Vec<TankCommand> {
        self.script
            .iter()
            .filter(|c| c.tick == tick)
            .filter_map(|c| {
                let tank_id = *tank_ids.get(c.tank)?;
                let team = self.tanks.get(c.tank)?.team;
                (self.controller(team) == Controller::Scripted).then_some(TankCommand {
                    tank_id,
                    move_vector: Vec2Fixed::new(c.move_x, c.move_y),
                    turn_input: c.turn,
                    fire: c.fire,
                })
            })
            .collect()
    }
}
