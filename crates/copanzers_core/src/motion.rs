//! Motion integration.
//!
//! Tanks steer towards their held control input, every dynamic entity moves by
//! `velocity × dt`, and projectiles spend their lifetime and range budgets.
//! Obstacles never move.

use crate::components::{Entity, EntityBody, EntityId, Projectile, Tank, TankCommand};
use crate::config::{Arena, SimConfig};
use crate::events::DestructionCause;
use crate::lifecycle::EntityManager;
use crate::math::{normalize_angle, Fixed, Vec2Fixed};

/// A projectile whose flight ended during integration.
///
/// Expiry is only reported here; the simulation decides after collision
/// detection whether the projectile hit something first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Expiry {
    /// The projectile.
    pub projectile: EntityId,
    /// `LifetimeExpired`, `RangeExhausted` or `OutOfBounds`.
    pub cause: DestructionCause,
}

/// Store a command as the tank's held control input, clamped to its limits.
pub fn apply_command(tank: &mut Tank, command: &TankCommand) {
    tank.control.desired_velocity = command.move_vector.clamp_length(tank.max_speed);
    tank.control.turn_rate = command
        .turn_input
        .clamp(-tank.max_turn_rate, tank.max_turn_rate);
}

/// Advance every dynamic entity by one tick.
pub fn integrate(entities: &mut EntityManager, config: &SimConfig) -> Vec<Expiry> {
    let dt = config.tick_duration;
    let mut expired = Vec::new();

    for entity in entities.iter_mut() {
        entity.previous_position = entity.position;
        let radius = entity.shape.bounding_radius();
        match &mut entity.body {
            EntityBody::Tank(tank) => {
                steer(tank, &mut entity.velocity, &mut entity.angular_velocity, dt);
                entity.position += entity.velocity.scale(dt);
                entity.orientation =
                    normalize_angle(entity.orientation + entity.angular_velocity * dt);
                clamp_to_arena(&config.arena, &mut entity.position, &mut entity.velocity, radius);
            }
            EntityBody::Projectile(projectile) => {
                let step = entity.velocity.scale(dt);
                let (travel, cause) = spend_budgets(projectile, step);
                entity.position += travel;
                let cause = if config.arena.contains(entity.position) {
                    cause
                } else {
                    Some(DestructionCause::OutOfBounds)
                };
                if let Some(cause) = cause {
                    expired.push(Expiry {
                        projectile: entity.id,
                        cause,
                    });
                }
            }
            EntityBody::Obstacle(_) => {}
        }
    }

    expired
}

/// Keep a tank's bounding circle inside the arena, zeroing velocity into walls.
pub fn clamp_tank(arena: &Arena, entity: &mut Entity) {
    let radius = entity.shape.bounding_radius();
    clamp_to_arena(arena, &mut entity.position, &mut entity.velocity, radius);
}

fn clamp_to_arena(arena: &Arena, position: &mut Vec2Fixed, velocity: &mut Vec2Fixed, radius: Fixed) {
    let clamped = arena.clamp_circle(*position, radius);
    if clamped.x != position.x {
        velocity.x = Fixed::ZERO;
    }
    if clamped.y != position.y {
        velocity.y = Fixed::ZERO;
    }
    *position = clamped;
}

fn steer(tank: &Tank, velocity: &mut Vec2Fixed, angular_velocity: &mut Fixed, dt: Fixed) {
    let desired = tank.control.desired_velocity;
    *velocity = match tank.acceleration {
        None => desired,
        Some(accel) => *velocity + (desired - *velocity).clamp_length(accel * dt),
    };
    *angular_velocity = tank.control.turn_rate;
}

/// Tick down lifetime and range. Returns the actual travel for this tick
/// (shortened when the range runs out) and the expiry cause, if any.
fn spend_budgets(projectile: &mut Projectile, step: Vec2Fixed) -> (Vec2Fixed, Option<DestructionCause>) {
    let mut cause = None;
    if let Some(ticks) = projectile.ticks_remaining.as_mut() {
        *ticks = ticks.saturating_sub(1);
        if *ticks == 0 {
            cause = Some(DestructionCause::LifetimeExpired);
        }
    }

    let mut travel = step;
    if let Some(remaining) = projectile.distance_remaining.as_mut() {
        let length = step.length();
        if length >= *remaining {
            travel = step.clamp_length(*remaining);
            *remaining = Fixed::ZERO;
            cause = Some(DestructionCause::RangeExhausted);
        } else {
            *remaining -= length;
        }
    }
    (travel, cause)
}
