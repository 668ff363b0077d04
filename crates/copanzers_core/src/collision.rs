//! Collision detection and resolution.
//!
//! Detection is a complete pass over the post-integration state before any
//! effect is applied:
//!
//! - tank-tank and tank-obstacle overlaps (exact shape tests on spatial index
//!   candidates)
//! - projectile sweeps from `previous_position` to `position`; the earliest
//!   time of impact wins, ties go to the lower target id
//!
//! Resolution then separates overlapping bodies and removes the approaching
//! velocity component. Projectile impacts are returned to the caller; their
//! damage is the combat model's job.

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::components::{Entity, EntityBody, EntityId, EntityKind};
use crate::config::Arena;
use crate::geometry::{overlap, sweep_circle, Aabb, Placed};
use crate::lifecycle::EntityManager;
use crate::math::{Fixed, Vec2Fixed};
use crate::motion::clamp_tank;
use crate::spatial::SpatialGrid;

/// What kind of solid contact this is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactKind {
    /// Two tanks. Separation is split evenly.
    TankTank,
    /// Tank against terrain. The tank takes the whole correction.
    TankObstacle,
}

/// A solid-body overlap found during detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BodyContact {
    /// The tank (lower id for tank-tank).
    pub a: EntityId,
    /// The other tank or the obstacle.
    pub b: EntityId,
    /// Contact kind.
    pub kind: ContactKind,
    /// Unit normal from `a` to `b`.
    pub normal: Vec2Fixed,
    /// Penetration depth.
    pub depth: Fixed,
    /// Approach speed along the normal before resolution (0 if separating).
    pub closing_speed: Fixed,
}

/// A projectile's first hit this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Impact {
    /// The projectile.
    pub projectile: EntityId,
    /// What it hit.
    pub target: EntityId,
    /// Kind of the target.
    pub target_kind: EntityKind,
    /// Where along its path the projectile struck.
    pub point: Vec2Fixed,
}

/// Everything detection found in one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollisionReport {
    /// Solid contacts, already resolved when returned.
    pub contacts: Vec<BodyContact>,
    /// Projectile impacts in ascending projectile id.
    pub impacts: Vec<Impact>,
}

fn placed(entity: &Entity) -> Placed<'_> {
    Placed {
        shape: &entity.shape,
        position: entity.position,
        direction: entity.facing(),
    }
}

/// Index bounds for an entity: projectiles cover their whole swept path.
#[must_use]
pub fn index_bounds(entity: &Entity) -> Aabb {
    match entity.body {
        EntityBody::Projectile(_) => Aabb::swept_circle(
            entity.previous_position,
            entity.position,
            entity.shape.bounding_radius(),
        ),
        _ => Aabb::of_shape(&entity.shape, entity.position, entity.facing()),
    }
}

/// Detect every contact and impact, then push overlapping bodies apart.
pub fn resolve_contacts(
    entities: &mut EntityManager,
    index: &SpatialGrid,
    arena: &Arena,
) -> CollisionReport {
    let contacts = detect_body_contacts(entities, index);
    let impacts = detect_impacts(entities, index);

    for contact in &contacts {
        separate(entities, contact);
    }
    // Separation can push a tank through a wall; put it back.
    for contact in &contacts {
        for id in [contact.a, contact.b] {
            if let Some(entity) = entities.get_mut(id) {
                if entity.kind() == EntityKind::Tank {
                    clamp_tank(arena, entity);
                }
            }
        }
    }

    CollisionReport { contacts, impacts }
}

/// Tank-tank (each pair once, `a < b`) and tank-obstacle overlaps.
#[must_use]
pub fn detect_body_contacts(entities: &EntityManager, index: &SpatialGrid) -> Vec<BodyContact> {
    let mut contacts = Vec::new();
    let tanks = entities
        .iter()
        .filter(|e| e.kind() == EntityKind::Tank && !entities.is_doomed(e.id));

    for tank in tanks {
        let area = index_bounds(tank);
        for other_id in index.query_region(&area) {
            if other_id == tank.id || entities.is_doomed(other_id) {
                continue;
            }
            let Some(other) = entities.get(other_id) else {
                continue;
            };
            let kind = match other.kind() {
                EntityKind::Tank if other_id > tank.id => ContactKind::TankTank,
                EntityKind::Obstacle => ContactKind::TankObstacle,
                _ => continue,
            };
            let Some(contact) = overlap(placed(tank), placed(other)) else {
                continue;
            };
            let approach = match kind {
                ContactKind::TankTank => -(other.velocity - tank.velocity).dot(contact.normal),
                ContactKind::TankObstacle => tank.velocity.dot(contact.normal),
            };
            contacts.push(BodyContact {
                a: tank.id,
                b: other_id,
                kind,
                normal: contact.normal,
                depth: contact.depth,
                closing_speed: approach.max(Fixed::ZERO),
            });
        }
    }
    contacts
}

/// First impact of every live projectile, in projectile id order.
#[must_use]
pub fn detect_impacts(entities: &EntityManager, index: &SpatialGrid) -> Vec<Impact> {
    let projectiles: Vec<&Entity> = entities
        .iter()
        .filter(|e| e.kind() == EntityKind::Projectile && !entities.is_doomed(e.id))
        .collect();

    #[cfg(feature = "parallel")]
    let hits: Vec<Option<Impact>> = projectiles
        .par_iter()
        .map(|projectile| sweep_projectile(entities, index, projectile))
        .collect();

    #[cfg(not(feature = "parallel"))]
    let hits: Vec<Option<Impact>> = projectiles
        .iter()
        .map(|projectile| sweep_projectile(entities, index, projectile))
        .collect();

    hits.into_iter().flatten().collect()
}

fn sweep_projectile(
    entities: &EntityManager,
    index: &SpatialGrid,
    projectile: &Entity,
) -> Option<Impact> {
    let owner = projectile.as_projectile()?.owner;
    let start = projectile.previous_position;
    let end = projectile.position;
    let radius = projectile.shape.bounding_radius();

    let mut best: Option<(Fixed, &Entity)> = None;
    for id in index.query_region(&index_bounds(projectile)) {
        if id == projectile.id || id == owner || entities.is_doomed(id) {
            continue;
        }
        let Some(target) = entities.get(id) else {
            continue;
        };
        if target.kind() == EntityKind::Projectile {
            continue;
        }
        let Some(t) = sweep_circle(start, end, radius, placed(target)) else {
            continue;
        };
        // Candidates arrive in ascending id order, so strict `<` keeps the
        // lower id on ties.
        if best.map_or(true, |(best_t, _)| t < best_t) {
            best = Some((t, target));
        }
    }

    best.map(|(t, target)| Impact {
        projectile: projectile.id,
        target: target.id,
        target_kind: target.kind(),
        point: start.lerp(end, t),
    })
}

fn separate(entities: &mut EntityManager, contact: &BodyContact) {
    let (Some(a), Some(b)) = (entities.get(contact.a), entities.get(contact.b)) else {
        return;
    };
    let n = contact.normal;
    let (mut pos_a, mut vel_a) = (a.position, a.velocity);
    let (mut pos_b, mut vel_b) = (b.position, b.velocity);

    match contact.kind {
        ContactKind::TankTank => {
            let push = n.scale(contact.depth / Fixed::from_num(2));
            pos_a -= push;
            pos_b += push;
            let relative = (vel_b - vel_a).dot(n);
            if relative < Fixed::ZERO {
                let correction = n.scale(relative / Fixed::from_num(2));
                vel_a += correction;
                vel_b -= correction;
            }
        }
        ContactKind::TankObstacle => {
            pos_a -= n.scale(contact.depth);
            let into = vel_a.dot(n);
            if into > Fixed::ZERO {
                vel_a -= n.scale(into);
            }
        }
    }

    if let Some(a) = entities.get_mut(contact.a) {
        a.position = pos_a;
        a.velocity = vel_a;
    }
    if contact.kind == ContactKind::TankTank {
        if let Some(b) = entities.get_mut(contact.b) {
            b.position = pos_b;
            b.velocity = vel_b;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{
        ArmorClass, ControlState, Falloff, Health, Obstacle, Projectile, Shape, Tank,
    };
    use crate::lifecycle::EntityInit;

    fn tank_at(manager: &mut EntityManager, x: i32, y: i32, velocity: Vec2Fixed) -> EntityId {
        manager.spawn(EntityInit {
            position: Vec2Fixed::from_ints(x, y),
            orientation: Fixed::ZERO,
            velocity,
            shape: Shape::circle(Fixed::from_num(10)),
            body: EntityBody::Tank(Tank {
                health: Health::new(100),
                armor: ArmorClass::Light,
                team: 0,
                weapon: "cannon".into(),
                cooldown: 0,
                max_speed: Fixed::from_num(50),
                max_turn_rate: Fixed::ONE,
                acceleration: None,
                control: ControlState::default(),
            }),
        })
    }

    fn wall_at(manager: &mut EntityManager, x: i32, y: i32) -> EntityId {
        manager.spawn(EntityInit {
            position: Vec2Fixed::from_ints(x, y),
            orientation: Fixed::ZERO,
            velocity: Vec2Fixed::ZERO,
            shape: Shape::rect(Fixed::from_num(5), Fixed::from_num(50)),
            body: EntityBody::Obstacle(Obstacle { integrity: None }),
        })
    }

    fn shell(manager: &mut EntityManager, owner: EntityId, from: Vec2Fixed, to: Vec2Fixed) -> EntityId {
        let id = manager.spawn(EntityInit {
            position: from,
            orientation: Fixed::ZERO,
            velocity: Vec2Fixed::ZERO,
            shape: Shape::circle(Fixed::ONE),
            body: EntityBody::Projectile(Projectile {
                owner,
                owner_team: 0,
                weapon: "cannon".into(),
                damage: 30,
                blast_radius: Fixed::ZERO,
                falloff: Falloff::Linear,
                ticks_remaining: None,
                distance_remaining: None,
            }),
        });
        manager.get_mut(id).unwrap().position = to;
        id
    }

    fn index_of(manager: &EntityManager) -> SpatialGrid {
        let mut grid = SpatialGrid::new(Fixed::from_num(32));
        grid.rebuild(manager.iter().map(|e| (e.id, index_bounds(e))));
        grid
    }

    #[test]
    fn test_head_on_tanks_are_separated() {
        let mut manager = EntityManager::new();
        let speed = Fixed::from_num(20);
        let a = tank_at(&mut manager, 100, 100, Vec2Fixed::new(speed, Fixed::ZERO));
        let b = tank_at(&mut manager, 116, 100, Vec2Fixed::new(-speed, Fixed::ZERO));
        let grid = index_of(&manager);

        let report = resolve_contacts(&mut manager, &grid, &Arena::default());
        assert_eq!(report.contacts.len(), 1);
        assert_eq!(report.contacts[0].closing_speed, Fixed::from_num(40));

        let (ea, eb) = (manager.get(a).unwrap(), manager.get(b).unwrap());
        assert_eq!(ea.position, Vec2Fixed::from_ints(98, 100));
        assert_eq!(eb.position, Vec2Fixed::from_ints(118, 100));
        assert_eq!(ea.velocity.x, Fixed::ZERO);
        assert_eq!(eb.velocity.x, Fixed::ZERO);
    }

    #[test]
    fn test_tank_obstacle_pushes_tank_only() {
        let mut manager = EntityManager::new();
        let tank = tank_at(&mut manager, 100, 100, Vec2Fixed::from_ints(10, 3));
        let wall = wall_at(&mut manager, 112, 100);
        let grid = index_of(&manager);

        let report = resolve_contacts(&mut manager, &grid, &Arena::default());
        assert_eq!(report.contacts[0].kind, ContactKind::TankObstacle);
        let t = manager.get(tank).unwrap();
        assert_eq!(t.position, Vec2Fixed::from_ints(97, 100));
        assert_eq!(t.velocity, Vec2Fixed::from_ints(0, 3));
        assert_eq!(manager.get(wall).unwrap().position, Vec2Fixed::from_ints(112, 100));
    }

    #[test]
    fn test_projectile_takes_nearest_hit_and_skips_owner() {
        let mut manager = EntityManager::new();
        let owner = tank_at(&mut manager, 50, 300, Vec2Fixed::ZERO);
        let near = tank_at(&mut manager, 150, 300, Vec2Fixed::ZERO);
        let _far = tank_at(&mut manager, 200, 300, Vec2Fixed::ZERO);
        let p = shell(&mut manager, owner, Vec2Fixed::from_ints(44, 300), Vec2Fixed::from_ints(300, 300));
        let grid = index_of(&manager);

        let impacts = detect_impacts(&manager, &grid);
        assert_eq!(impacts.len(), 1);
        assert_eq!(impacts[0].projectile, p);
        assert_eq!(impacts[0].target, near);
        assert_eq!(impacts[0].point, Vec2Fixed::from_ints(139, 300));
    }

    #[test]
    fn test_projectile_stopped_by_wall_in_front_of_tank() {
        let mut manager = EntityManager::new();
        let owner = tank_at(&mut manager, 20, 100, Vec2Fixed::ZERO);
        let _target = tank_at(&mut manager, 200, 100, Vec2Fixed::ZERO);
        let wall = wall_at(&mut manager, 100, 100);
        shell(&mut manager, owner, Vec2Fixed::from_ints(40, 100), Vec2Fixed::from_ints(220, 100));
        let grid = index_of(&manager);

        let impacts = detect_impacts(&manager, &grid);
        assert_eq!(impacts[0].target, wall);
        assert_eq!(impacts[0].target_kind, EntityKind::Obstacle);
    }

    #[test]
    fn test_equidistant_targets_tie_break_by_id() {
        let mut manager = EntityManager::new();
        let owner = tank_at(&mut manager, 20, 20, Vec2Fixed::ZERO);
        let upper = tank_at(&mut manager, 100, 108, Vec2Fixed::ZERO);
        let _lower = tank_at(&mut manager, 100, 92, Vec2Fixed::ZERO);
        shell(&mut manager, owner, Vec2Fixed::from_ints(60, 100), Vec2Fixed::from_ints(140, 100));
        let grid = index_of(&manager);

        let impacts = detect_impacts(&manager, &grid);
        assert_eq!(impacts[0].target, upper);
    }
}
