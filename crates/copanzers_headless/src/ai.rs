//! Built-in tank controllers.
//!
//! Controllers read the latest snapshot and produce commands for their
//! team's tanks. They only look at snapshot data, so they behave the same
//! whether they run inline in the headless loop or on a separate thread in
//! realtime mode.

use serde::{Deserialize, Serialize};

use copanzers_core::components::{EntityId, TankCommand, TeamId};
use copanzers_core::math::{Fixed, Vec2Fixed};
use copanzers_core::snapshot::{EntitySnapshot, Snapshot};

use crate::scenario::Scenario;

/// Who drives a team.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Controller {
    /// Tanks hold still and never fire.
    #[default]
    Idle,
    /// Tanks follow the scenario's script.
    Scripted,
    /// Tanks hunt the nearest enemy.
    Gunner,
}

/// Tuning for the gunner controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GunnerTuning {
    /// Distance the gunner tries to keep from its target.
    pub engage_range: Fixed,
    /// Forward speed while closing in.
    pub advance_speed: Fixed,
    /// Turn rate used while aiming.
    pub turn_rate: Fixed,
    /// Fire when the sine of the aiming error is below this.
    pub aim_tolerance: Fixed,
}

impl Default for GunnerTuning {
    fn default() -> Self {
        Self {
            engage_range: Fixed::from_num(180),
            advance_speed: Fixed::from_num(40),
            turn_rate: Fixed::from_num(2),
            aim_tolerance: Fixed::from_num(0.05),
        }
    }
}

/// Nearest living tank of another team; ties go to the lower id.
#[must_use]
pub fn nearest_enemy<'a>(snapshot: &'a Snapshot, me: &EntitySnapshot) -> Option<&'a EntitySnapshot> {
    let my_team = me.team?;
    snapshot
        .tanks()
        .filter(|t| t.team.is_some_and(|team| team != my_team))
        .min_by_key(|t| (t.position.distance_squared(me.position), t.id))
}

/// Gunner decision for one tank: turn toward the nearest enemy, drive until
/// within engage range, fire once lined up.
#[must_use]
pub fn gunner_command(snapshot: &Snapshot, me: &EntitySnapshot, tuning: &GunnerTuning) -> TankCommand {
    let Some(target) = nearest_enemy(snapshot, me) else {
        return TankCommand::drive(me.id, Vec2Fixed::ZERO, Fixed::ZERO);
    };

    let facing = Vec2Fixed::from_angle(me.orientation);
    let to_target = (target.position - me.position).normalize();
    let side = facing.cross(to_target);
    let ahead = facing.dot(to_target) > Fixed::ZERO;

    let turn = if side.abs() <= tuning.aim_tolerance && ahead {
        Fixed::ZERO
    } else if side < Fixed::ZERO {
        -tuning.turn_rate
    } else {
        tuning.turn_rate
    };

    let distance = target.position.distance(me.position);
    let move_vector = if distance > tuning.engage_range && ahead {
        facing.scale(tuning.advance_speed)
    } else {
        Vec2Fixed::ZERO
    };

    TankCommand {
        tank_id: me.id,
        move_vector,
        turn_input: turn,
        fire: ahead && side.abs() <= tuning.aim_tolerance,
    }
}

/// Produces every team's commands for a tick.
#[derive(Debug, Clone)]
pub struct Pilot {
    scenario: Scenario,
    tank_ids: Vec<EntityId>,
    tuning: GunnerTuning,
}

impl Pilot {
    /// Create a pilot for a built scenario.
    #[must_use]
    pub fn new(scenario: Scenario, tank_ids: Vec<EntityId>) -> Self {
        Self {
            scenario,
            tank_ids,
            tuning: GunnerTuning::default(),
        }
    }

    /// Override the gunner tuning.
    #[must_use]
    pub fn with_tuning(mut self, tuning: GunnerTuning) -> Self {
        self.tuning = tuning;
        self
    }

    fn controller_of(&self, team: Option<TeamId>) -> Controller {
        team.map_or(Controller::Idle, |t| self.scenario.controller(t))
    }

    /// Commands to apply in the tick that follows `snapshot`.
    ///
    /// Scripted commands come first, then gunner commands in tank id order.
    #[must_use]
    pub fn commands(&self, snapshot: &Snapshot) -> Vec<TankCommand> {
        let mut commands = self.scenario.script_at(snapshot.tick, &self.tank_ids);
        commands.extend(
            snapshot
                .tanks()
                .filter(|t| self.controller_of(t.team) == Controller::Gunner)
                .map(|t| gunner_command(snapshot, t, &self.tuning)),
        );
        commands
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use copanzers_core::components::EntityKind;
    use copanzers_core::math::PI;

    fn tank(id: EntityId, team: TeamId, x: i32, y: i32, orientation: Fixed) -> EntitySnapshot {
        EntitySnapshot {
            id,
            kind: EntityKind::Tank,
            position: Vec2Fixed::from_ints(x, y),
            orientation,
            health: Some(100),
            team: Some(team),
        }
    }

    fn snapshot(entities: Vec<EntitySnapshot>) -> Snapshot {
        Snapshot {
            tick: 0,
            entities,
            destroyed: Vec::new(),
            events: Vec::new(),
        }
    }

    #[test]
    fn test_nearest_enemy_ignores_allies() {
        let snap = snapshot(vec![
            tank(1, 0, 100, 100, Fixed::ZERO),
            tank(2, 0, 110, 100, Fixed::ZERO),
            tank(3, 1, 300, 100, Fixed::ZERO),
            tank(4, 1, 100, 300, Fixed::ZERO),
        ]);
        let me = &snap.entities[0];
        assert_eq!(nearest_enemy(&snap, me).map(|t| t.id), Some(3));
    }

    #[test]
    fn test_nearest_enemy_tie_prefers_lower_id() {
        let snap = snapshot(vec![
            tank(1, 0, 100, 100, Fixed::ZERO),
            tank(5, 1, 200, 100, Fixed::ZERO),
            tank(4, 1, 0, 100, Fixed::ZERO),
        ]);
        assert_eq!(nearest_enemy(&snap, &snap.entities[0]).map(|t| t.id), Some(4));
    }

    #[test]
    fn test_gunner_fires_when_aligned() {
        let snap = snapshot(vec![
            tank(1, 0, 100, 100, Fixed::ZERO),
            tank(2, 1, 200, 100, PI),
        ]);
        let cmd = gunner_command(&snap, &snap.entities[0], &GunnerTuning::default());
        assert!(cmd.fire);
        assert_eq!(cmd.turn_input, Fixed::ZERO);
        // Already inside engage range.
        assert_eq!(cmd.move_vector, Vec2Fixed::ZERO);
    }

    #[test]
    fn test_gunner_turns_toward_target() {
        let snap = snapshot(vec![
            tank(1, 0, 100, 100, Fixed::ZERO),
            tank(2, 1, 100, 400, Fixed::ZERO),
        ]);
        let cmd = gunner_command(&snap, &snap.entities[0], &GunnerTuning::default());
        assert!(!cmd.fire);
        assert!(cmd.turn_input > Fixed::ZERO);
    }

    #[test]
    fn test_gunner_advances_when_far() {
        let snap = snapshot(vec![
            tank(1, 0, 100, 100, Fixed::ZERO),
            tank(2, 1, 700, 100, Fixed::ZERO),
        ]);
        let cmd = gunner_command(&snap, &snap.entities[0], &GunnerTuning::default());
        assert_eq!(cmd.move_vector, Vec2Fixed::from_ints(40, 0));
        assert!(cmd.fire);
    }

    #[test]
    fn test_gunner_idles_without_enemies() {
        let snap = snapshot(vec![tank(1, 0, 100, 100, Fixed::ZERO)]);
        let cmd = gunner_command(&snap, &snap.entities[0], &GunnerTuning::default());
        assert!(!cmd.fire);
        assert_eq!(cmd.move_vector, Vec2Fixed::ZERO);
    }

    #[test]
    fn test_pilot_drives_only_gunner_teams() {
        let mut scenario = Scenario::duel();
        scenario.controllers.insert(1, Controller::Idle);
        let battle = scenario.build().unwrap();
        let pilot = Pilot::new(scenario, battle.tank_ids.clone());

        let commands = pilot.commands(&battle.simulation.snapshot());
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].tank_id, battle.tank_ids[0]);
    }

    #[test]
    fn test_pilot_uses_custom_tuning() {
        let scenario = Scenario::duel();
        let battle = scenario.build().unwrap();
        let snapshot = battle.simulation.snapshot();

        let eager = Pilot::new(scenario.clone(), battle.tank_ids.clone());
        assert!(eager.commands(&snapshot).iter().all(|c| c.move_vector != Vec2Fixed::ZERO));

        let patient = Pilot::new(scenario, battle.tank_ids).with_tuning(GunnerTuning {
            engage_range: Fixed::from_num(1000),
            ..GunnerTuning::default()
        });
        assert!(patient.commands(&snapshot).iter().all(|c| c.move_vector == Vec2Fixed::ZERO));
    }
}
