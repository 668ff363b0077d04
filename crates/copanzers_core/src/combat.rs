//! Damage model: armor, splash falloff, impacts, ramming and weapon fire.
//!
//! This module implements:
//! - Armor scaling with a minimum of one damage per non-zero hit
//! - Splash falloff from blast center to blast radius
//! - Impact resolution (direct hit plus splash around the impact point)
//! - Optional ramming damage
//! - Fire requests gated by weapon cooldown
//!
//! Damage never heals: health only goes down, and a target at zero is marked
//! for destruction and removed by the lifecycle manager at the end of the tick.

use crate::collision::{BodyContact, ContactKind, Impact};
use crate::components::{
    ArmorClass, Entity, EntityBody, EntityId, EntityKind, Falloff, Projectile, Shape, TankCommand,
};
use crate::config::SimConfig;
use crate::events::{DestructionCause, GameEvent, RejectReason};
use crate::geometry::Aabb;
use crate::lifecycle::{EntityInit, EntityManager};
use crate::math::{Fixed, Vec2Fixed};
use crate::motion::Expiry;
use crate::spatial::SpatialGrid;

/// Minimum damage for any non-zero hit after armor.
pub const MIN_DAMAGE: u32 = 1;

/// Scale raw damage by armor class.
///
/// ```text
/// Final = floor(amount × armor%)   (minimum 1 when amount > 0)
/// ```
#[must_use]
pub fn armor_scaled(amount: u32, armor: ArmorClass) -> u32 {
    if amount == 0 {
        return 0;
    }
    let scaled = u64::from(amount) * u64::from(armor.damage_percent()) / 100;
    u32::try_from(scaled).unwrap_or(u32::MAX).max(MIN_DAMAGE)
}

/// Splash damage at `distance` from the blast center.
///
/// Zero at or beyond `radius`. With [`Falloff::Linear`], damage 50 and
/// radius 5 gives 50 at the center, 25 at 2.5 and 0 at 5.
#[must_use]
pub fn splash_damage(damage: u32, radius: Fixed, distance: Fixed, falloff: Falloff) -> u32 {
    if radius <= Fixed::ZERO {
        return if distance <= Fixed::ZERO { damage } else { 0 };
    }
    if distance >= radius {
        return 0;
    }
    let ratio = distance.max(Fixed::ZERO) / radius;
    let factor = match falloff {
        Falloff::Linear => Fixed::ONE - ratio,
        Falloff::Constant => Fixed::ONE,
        Falloff::Quadratic => Fixed::ONE - ratio * ratio,
    };
    Fixed::saturating_from_num(damage)
        .saturating_mul(factor)
        .floor()
        .saturating_to_num::<u32>()
}

/// Result of a successful [`apply_damage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DamageOutcome {
    /// Damage actually removed from health/integrity.
    pub dealt: u32,
    /// Whether the target reached zero and was marked for destruction.
    pub killed: bool,
}

/// Damage a tank or destructible obstacle.
///
/// Tanks scale `amount` by their armor. Health is clamped at zero; reaching
/// zero marks the target destroyed with [`DestructionCause::Killed`] crediting
/// `source`. Returns `None` for unknown ids, entities already marked this
/// tick, projectiles and indestructible terrain.
pub fn apply_damage(
    entities: &mut EntityManager,
    target: EntityId,
    amount: u32,
    source: EntityId,
) -> Option<DamageOutcome> {
    if entities.is_doomed(target) {
        return None;
    }
    let entity = entities.get_mut(target)?;
    let amount = match &entity.body {
        EntityBody::Tank(tank) => armor_scaled(amount, tank.armor),
        _ => amount,
    };
    let health = entity.health_mut()?;
    let dealt = health.apply_damage(amount);
    let killed = health.is_dead();
    if killed {
        tracing::debug!(target, by = source, "Entity killed");
        entities.mark_destroyed(target, DestructionCause::Killed { by: source });
    }
    Some(DamageOutcome { dealt, killed })
}

/// Whether friendly-fire rules stop `projectile` from hurting `target`.
#[must_use]
pub fn shielded_by_team(config: &SimConfig, projectile: &Projectile, target: &Entity) -> bool {
    !config.friendly_fire
        && target.kind() == EntityKind::Tank
        && target.team() == Some(projectile.owner_team)
}

/// Shared state for the combat phase of one tick.
pub struct CombatPhase<'a> {
    /// Entity arena.
    pub entities: &'a mut EntityManager,
    /// Index built this tick, used for blast queries.
    pub index: &'a SpatialGrid,
    /// Configuration.
    pub config: &'a SimConfig,
    /// Event sink for the tick.
    pub events: &'a mut Vec<GameEvent>,
}

impl CombatPhase<'_> {
    /// Apply every projectile impact in projectile id order.
    pub fn resolve_impacts(&mut self, impacts: &[Impact]) {
        for impact in impacts {
            let Some(projectile) = self
                .entities
                .get(impact.projectile)
                .and_then(Entity::as_projectile)
                .cloned()
            else {
                continue;
            };

            let cause = match impact.target_kind {
                EntityKind::Obstacle => DestructionCause::Absorbed {
                    obstacle: impact.target,
                },
                _ => DestructionCause::Impact {
                    target: impact.target,
                },
            };
            self.entities.mark_destroyed(impact.projectile, cause);

            self.damage_from(impact.projectile, &projectile, impact.target, projectile.damage, false);
            if projectile.is_splash() {
                self.detonate(impact.projectile, &projectile, impact.point, Some(impact.target));
            }
        }
    }

    /// Remove projectiles whose flight ended without hitting anything.
    ///
    /// Splash rounds detonate where they stopped, unless they left the arena.
    pub fn resolve_expiries(&mut self, expired: &[Expiry], impacts: &[Impact]) {
        for expiry in expired {
            if impacts.iter().any(|i| i.projectile == expiry.projectile) {
                continue;
            }
            let Some(entity) = self.entities.get(expiry.projectile) else {
                continue;
            };
            let position = entity.position;
            let projectile = entity.as_projectile().cloned();
            self.entities.mark_destroyed(expiry.projectile, expiry.cause);

            if let Some(projectile) = projectile {
                if projectile.is_splash() && expiry.cause != DestructionCause::OutOfBounds {
                    self.detonate(expiry.projectile, &projectile, position, None);
                }
            }
        }
    }

    fn detonate(
        &mut self,
        projectile_id: EntityId,
        projectile: &Projectile,
        center: Vec2Fixed,
        direct: Option<EntityId>,
    ) {
        self.events.push(GameEvent::Detonation {
            projectile: projectile_id,
            position: center,
        });

        // Bodies may have been nudged by contact resolution since the index
        // was built; widen the query by a tank radius to cover that.
        let reach = projectile.blast_radius + self.config.tanks.radius;
        let area = Aabb::around_circle(center, reach);
        for id in self.index.query_region(&area) {
            if Some(id) == direct || id == projectile_id {
                continue;
            }
            let Some(target) = self.entities.get(id) else {
                continue;
            };
            if target.kind() == EntityKind::Projectile {
                continue;
            }
            let distance = target.position.distance(center);
            let amount = splash_damage(
                projectile.damage,
                projectile.blast_radius,
                distance,
                projectile.falloff,
            );
            if amount > 0 {
                self.damage_from(projectile_id, projectile, id, amount, true);
            }
        }
    }

    fn damage_from(
        &mut self,
        projectile_id: EntityId,
        projectile: &Projectile,
        target: EntityId,
        amount: u32,
        splash: bool,
    ) {
        let Some(entity) = self.entities.get(target) else {
            return;
        };
        if shielded_by_team(self.config, projectile, entity) {
            return;
        }
        if let Some(outcome) = apply_damage(self.entities, target, amount, projectile.owner) {
            self.events.push(GameEvent::Hit {
                projectile: projectile_id,
                owner: projectile.owner,
                target,
                damage: outcome.dealt,
                splash,
            });
        }
    }

    /// Whether two tanks are teammates shielded from each other by the
    /// friendly-fire setting.
    fn allies_shielded(&self, a: EntityId, b: EntityId) -> bool {
        if self.config.friendly_fire {
            return false;
        }
        let team = |id| self.entities.get(id).and_then(Entity::team);
        matches!((team(a), team(b)), (Some(x), Some(y)) if x == y)
    }

    /// Report solid contacts and apply the ramming rule when configured.
    ///
    /// Ramming between teammates follows the friendly-fire setting.
    pub fn apply_contacts(&mut self, contacts: &[BodyContact]) {
        for contact in contacts {
            let damage = match (contact.kind, self.config.ram_damage) {
                (ContactKind::TankTank, Some(rule))
                    if contact.closing_speed > rule.min_closing_speed
                        && !self.allies_shielded(contact.a, contact.b) =>
                {
                    (rule.damage_per_speed * contact.closing_speed)
                        .floor()
                        .saturating_to_num::<u32>()
                }
                _ => 0,
            };
            if damage > 0 {
                apply_damage(self.entities, contact.a, damage, contact.b);
                apply_damage(self.entities, contact.b, damage, contact.a);
            }
            self.events.push(GameEvent::Collision {
                a: contact.a,
                b: contact.b,
                damage,
            });
        }
    }

    /// Evaluate fire requests, in ascending tank id.
    ///
    /// Runs after impact damage, so a tank killed this tick cannot fire.
    pub fn fire(&mut self, requests: &[TankCommand]) {
        let mut tanks: Vec<EntityId> = requests.iter().filter(|c| c.fire).map(|c| c.tank_id).collect();
        tanks.sort_unstable();

        for tank_id in tanks {
            if let Err(reason) = self.fire_one(tank_id) {
                tracing::debug!(tank = tank_id, reason = ?reason, "Fire rejected");
                self.events.push(GameEvent::rejected(tank_id, reason));
            }
        }
    }

    fn fire_one(&mut self, tank_id: EntityId) -> Result<(), RejectReason> {
        let doomed = self.entities.is_doomed(tank_id);
        let entity = self
            .entities
            .get_mut(tank_id)
            .ok_or(RejectReason::UnknownEntity)?;
        let facing = entity.facing();
        let (position, orientation, hull) = (entity.position, entity.orientation, entity.shape.bounding_radius());
        let tank = entity.as_tank_mut().ok_or(RejectReason::NotATank)?;

        if doomed || tank.health.is_dead() {
            return Err(RejectReason::TankDestroyed);
        }
        if tank.cooldown > 0 {
            return Err(RejectReason::CooldownActive {
                remaining: tank.cooldown,
            });
        }
        let weapon = self
            .config
            .weapon(&tank.weapon)
            .ok_or_else(|| RejectReason::UnknownWeapon(tank.weapon.clone()))?;

        tank.cooldown = weapon.cooldown_ticks;
        let team = tank.team;
        let weapon_name = tank.weapon.clone();

        // A tank hugging a wall still fires; the shell starts on the edge and
        // leaves the arena on its first step.
        let muzzle = self
            .config
            .arena
            .clamp_circle(position + facing.scale(hull + weapon.projectile_radius), Fixed::ZERO);
        let projectile_id = self.entities.spawn_deferred(EntityInit {
            position: muzzle,
            orientation,
            velocity: facing.scale(weapon.projectile_speed),
            shape: Shape::circle(weapon.projectile_radius),
            body: EntityBody::Projectile(Projectile {
                owner: tank_id,
                owner_team: team,
                weapon: weapon_name.clone(),
                damage: weapon.damage,
                blast_radius: weapon.blast_radius,
                falloff: weapon.falloff,
                ticks_remaining: weapon.max_ticks,
                distance_remaining: weapon.max_range,
            }),
        });

        self.events.push(GameEvent::Fired {
            tank: tank_id,
            projectile: projectile_id,
            weapon: weapon_name,
        });
        Ok(())
    }
}

/// Count every tank's weapon cooldown down by one tick.
pub fn tick_cooldowns(entities: &mut EntityManager) {
    for entity in entities.iter_mut() {
        if let Some(tank) = entity.as_tank_mut() {
            tank.tick_cooldown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{ControlState, Health, Obstacle, Tank};

    fn fx(n: f64) -> Fixed {
        Fixed::from_num(n)
    }

    #[test]
    fn test_linear_splash_falloff() {
        assert_eq!(splash_damage(50, fx(5.0), fx(0.0), Falloff::Linear), 50);
        assert_eq!(splash_damage(50, fx(5.0), fx(2.5), Falloff::Linear), 25);
        assert_eq!(splash_damage(50, fx(5.0), fx(5.0), Falloff::Linear), 0);
        assert_eq!(splash_damage(50, fx(5.0), fx(7.0), Falloff::Linear), 0);
    }

    #[test]
    fn test_other_falloffs() {
        assert_eq!(splash_damage(40, fx(4.0), fx(3.0), Falloff::Constant), 40);
        assert_eq!(splash_damage(40, fx(4.0), fx(4.0), Falloff::Constant), 0);
        // 1 - (2/4)² = 0.75
        assert_eq!(splash_damage(40, fx(4.0), fx(2.0), Falloff::Quadratic), 30);
        assert_eq!(splash_damage(40, Fixed::ZERO, Fixed::ZERO, Falloff::Linear), 40);
    }

    #[test]
    fn test_splash_saturates_instead_of_overflowing() {
        let capped = i32::MAX as u32;
        assert_eq!(splash_damage(u32::MAX, fx(4.0), fx(0.0), Falloff::Constant), capped);
        assert!(splash_damage(3_000_000_000, fx(4.0), fx(2.0), Falloff::Linear) < capped);
    }

    #[test]
    fn test_armor_scaling() {
        assert_eq!(armor_scaled(30, ArmorClass::Light), 30);
        assert_eq!(armor_scaled(30, ArmorClass::Medium), 25);
        assert_eq!(armor_scaled(30, ArmorClass::Heavy), 21);
        assert_eq!(armor_scaled(1, ArmorClass::Heavy), 1);
        assert_eq!(armor_scaled(0, ArmorClass::Heavy), 0);
    }

    fn spawn_tank(entities: &mut EntityManager, health: u32, armor: ArmorClass) -> EntityId {
        entities.spawn(EntityInit {
            position: Vec2Fixed::from_ints(50, 50),
            orientation: Fixed::ZERO,
            velocity: Vec2Fixed::ZERO,
            shape: Shape::circle(fx(10.0)),
            body: EntityBody::Tank(Tank {
                health: Health::new(health),
                armor,
                team: 1,
                weapon: "cannon".into(),
                cooldown: 0,
                max_speed: fx(10.0),
                max_turn_rate: Fixed::ONE,
                acceleration: None,
                control: ControlState::default(),
            }),
        })
    }

    #[test]
    fn test_apply_damage_clamps_and_marks() {
        let mut entities = EntityManager::new();
        let tank = spawn_tank(&mut entities, 40, ArmorClass::Light);

        let first = apply_damage(&mut entities, tank, 30, 99).unwrap();
        assert_eq!(first, DamageOutcome { dealt: 30, killed: false });

        let second = apply_damage(&mut entities, tank, 30, 99).unwrap();
        assert_eq!(second, DamageOutcome { dealt: 10, killed: true });
        assert!(entities.is_doomed(tank));

        // Already marked: further damage is ignored.
        assert!(apply_damage(&mut entities, tank, 30, 99).is_none());
        entities.commit();
        let destroyed = entities.take_destroyed();
        assert_eq!(destroyed[0].cause, DestructionCause::Killed { by: 99 });
    }

    #[test]
    fn test_indestructible_obstacle_takes_no_damage() {
        let mut entities = EntityManager::new();
        let rock = entities.spawn(EntityInit {
            position: Vec2Fixed::ZERO,
            orientation: Fixed::ZERO,
            velocity: Vec2Fixed::ZERO,
            shape: Shape::circle(Fixed::ONE),
            body: EntityBody::Obstacle(Obstacle { integrity: None }),
        });
        assert!(apply_damage(&mut entities, rock, 10, 1).is_none());
    }

    #[test]
    fn test_heavy_armor_reduces_hit() {
        let mut entities = EntityManager::new();
        let tank = spawn_tank(&mut entities, 100, ArmorClass::Heavy);
        let outcome = apply_damage(&mut entities, tank, 30, 7).unwrap();
        assert_eq!(outcome.dealt, 21);
        let health = entities.get(tank).and_then(Entity::health).unwrap();
        assert_eq!(health.current, 79);
    }
}
