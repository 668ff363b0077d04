//! # Copanzers Core
//!
//! Deterministic 2D tank-combat simulation.
//!
//! This crate contains **only** deterministic logic:
//! - No rendering
//! - No IO outside replay files
//! - No randomness
//! - No floating-point math in the simulation (uses fixed-point)
//!
//! Identical initial state plus identical command streams produce
//! byte-identical snapshots on every platform, which is what lockstep
//! networking, replays and the determinism tests rely on.
//!
//! ## Tick pipeline
//!
//! commands → [`motion`] → [`spatial`] rebuild → [`collision`] →
//! [`combat`] → [`lifecycle`] commit → [`snapshot`]
//!
//! [`simulation::Simulation`] owns the authoritative state and runs that
//! pipeline; [`scheduler::FixedTimestep`] maps wall-clock time onto ticks.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod collision;
pub mod combat;
pub mod components;
pub mod config;
pub mod error;
pub mod events;
pub mod geometry;
pub mod lifecycle;
pub mod math;
pub mod motion;
pub mod replay;
pub mod scheduler;
pub mod simulation;
pub mod snapshot;
pub mod spatial;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::components::*;
    pub use crate::config::{Arena, RamDamageRule, SimConfig, TankDefaults, WeaponSpec};
    pub use crate::error::{ConfigError, GameError, Result};
    pub use crate::events::{DestructionCause, DestructionEvent, GameEvent, RejectReason};
    pub use crate::math::{Fixed, Vec2Fixed, PI};
    pub use crate::replay::{Replay, ReplayPlayer};
    pub use crate::scheduler::{CommandQueue, CommandSender, FixedTimestep, StopSignal};
    pub use crate::simulation::{ObstacleSpawn, Simulation, TankSpawn};
    pub use crate::snapshot::{EntitySnapshot, Snapshot};
}
