//! Test fixtures and helpers.
//!
//! Pre-built arenas and command streams for consistent testing.

use copanzers_core::components::{ArmorClass, EntityId, Shape, TankCommand};
use copanzers_core::config::SimConfig;
use copanzers_core::math::{Fixed, Vec2Fixed, PI};
use copanzers_core::simulation::{ObstacleSpawn, Simulation, TankSpawn};
use fixed::types::I32F32;

/// Create a fixed-point number from an integer.
#[must_use]
pub fn fixed(n: i32) -> I32F32 {
    I32F32::from_num(n)
}

/// Create a fixed-point number from a float (for tests only).
///
/// Note: In real simulation code, never use floats.
/// This is only for convenient test setup.
#[must_use]
pub fn fixed_f(n: f64) -> I32F32 {
    I32F32::from_num(n)
}

/// Create a vector from integer coordinates.
#[must_use]
pub fn vec2(x: i32, y: i32) -> Vec2Fixed {
    Vec2Fixed::from_ints(x, y)
}

/// Default configuration with a quarter-second tick, so positions after a
/// few ticks are exact binary fractions.
#[must_use]
pub fn quarter_tick_config() -> SimConfig {
    SimConfig {
        tick_duration: fixed(1) / fixed(4),
        ..SimConfig::default()
    }
}

/// Empty simulation with the default configuration.
///
/// # Panics
///
/// Panics if the default configuration is invalid.
#[must_use]
pub fn empty_sim() -> Simulation {
    Simulation::new(SimConfig::default()).expect("default config is valid")
}

/// Two tanks facing each other across the arena's middle row.
///
/// Team 0 at (200, 300) facing +x, team 1 at (600, 300) facing -x.
///
/// # Panics
///
/// Panics if the default configuration rejects the placements.
#[must_use]
pub fn duel() -> Simulation {
    let mut sim = empty_sim();
    sim.spawn_tank(TankSpawn::new(0, vec2(200, 300)))
        .expect("left tank");
    sim.spawn_tank(TankSpawn::new(1, vec2(600, 300)).facing(PI))
        .expect("right tank");
    sim
}

/// A crowded battle: `per_team` tanks on each side, mixed weapons and armor,
/// with a wall and a destructible crate between the lines.
///
/// # Panics
///
/// Panics if the default configuration rejects the placements.
#[must_use]
pub fn skirmish(per_team: u32) -> Simulation {
    let mut sim = empty_sim();
    let armors = [ArmorClass::Light, ArmorClass::Medium, ArmorClass::Heavy];

    sim.spawn_obstacle(ObstacleSpawn {
        position: vec2(400, 200),
        orientation: Fixed::ZERO,
        shape: Shape::rect(fixed(10), fixed(60)),
        integrity: None,
    })
    .expect("wall");
    sim.spawn_obstacle(ObstacleSpawn {
        position: vec2(400, 420),
        orientation: fixed_f(0.5),
        shape: Shape::rect(fixed(12), fixed(12)),
        integrity: Some(60),
    })
    .expect("crate");

    for i in 0..per_team {
        let row = 60 + (i as i32 % 10) * 50;
        let column = (i as i32 / 10) * 30;
        let armor = armors[i as usize % armors.len()];
        let weapon = if i % 3 == 2 { "mortar" } else { "cannon" };

        sim.spawn_tank(
            TankSpawn::new(0, vec2(100 + column, row))
                .with_armor(armor)
                .with_weapon(weapon),
        )
        .expect("team 0 tank");
        sim.spawn_tank(
            TankSpawn::new(1, vec2(700 - column, row))
                .facing(PI)
                .with_armor(armor)
                .with_weapon(weapon),
        )
        .expect("team 1 tank");
    }
    sim
}

/// Deterministic pseudo-input for every live tank, derived only from the
/// tick counter and tank ids.
///
/// Tanks weave up and down, turn slowly, and fire on a staggered schedule.
#[must_use]
pub fn scripted_commands(sim: &Simulation) -> Vec<TankCommand> {
    let tick = sim.get_tick();
    sim.snapshot()
        .tanks()
        .map(|tank| scripted_command(tank.id, tick))
        .collect()
}

/// The scripted command for one tank at one tick.
#[must_use]
pub fn scripted_command(tank_id: EntityId, tick: u64) -> TankCommand {
    let phase = (tick / 30 + tank_id) % 4;
    let (dx, dy) = match phase {
        0 => (20, 0),
        1 => (0, 25),
        2 => (-20, 0),
        _ => (0, -25),
    };
    let turn = if (tick / 45) % 2 == 0 {
        fixed_f(0.5)
    } else {
        fixed_f(-0.5)
    };
    TankCommand {
        tank_id,
        move_vector: vec2(dx, dy),
        turn_input: turn,
        fire: (tick + tank_id * 7) % 20 == 0,
    }
}

/// Run `ticks` ticks of [`scripted_commands`].
pub fn run_scripted(sim: &mut Simulation, ticks: u64) {
    for _ in 0..ticks {
        let commands = scripted_commands(sim);
        sim.advance(&commands);
    }
}
