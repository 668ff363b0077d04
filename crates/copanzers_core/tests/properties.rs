//! Property tests for simulation invariants under random command streams.

use copanzers_core::prelude::*;
use copanzers_test_utils::determinism::strategies::{arb_command_stream, arb_tank_list};
use proptest::prelude::*;

fn spawn_all(params: &[copanzers_test_utils::determinism::strategies::TestTankParams]) -> Simulation {
    let mut sim = Simulation::new(SimConfig::default()).unwrap();
    for p in params {
        sim.spawn_tank(
            TankSpawn::new(p.team, p.position)
                .facing(p.heading)
                .with_armor(p.armor),
        )
        .unwrap();
    }
    sim
}

fn healths(snapshot: &Snapshot) -> Vec<(EntityId, u32)> {
    snapshot
        .tanks()
        .filter_map(|t| t.health.map(|h| (t.id, h)))
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_tanks_stay_inside_arena(
        tanks in arb_tank_list(8),
        stream in arb_command_stream((1..10).collect(), 120),
    ) {
        let mut sim = spawn_all(&tanks);
        let arena = sim.config().arena;
        let radius = sim.config().tanks.radius;

        for commands in &stream {
            let snapshot = sim.advance(commands);
            for tank in snapshot.tanks() {
                prop_assert!(tank.position.x >= radius);
                prop_assert!(tank.position.y >= radius);
                prop_assert!(tank.position.x <= arena.width - radius);
                prop_assert!(tank.position.y <= arena.height - radius);
            }
            for entity in &snapshot.entities {
                prop_assert!(arena.contains(entity.position));
            }
        }
    }

    #[test]
    fn prop_health_never_increases(
        tanks in arb_tank_list(8),
        stream in arb_command_stream((1..10).collect(), 150),
    ) {
        let mut sim = spawn_all(&tanks);
        let mut previous = healths(&sim.snapshot());

        for commands in &stream {
            let snapshot = sim.advance(commands);
            for (id, health) in healths(&snapshot) {
                let before = previous.iter().find(|(p, _)| *p == id).map(|(_, h)| *h);
                prop_assert!(before.map_or(true, |b| health <= b));
            }
            previous = healths(&snapshot);
        }
    }

    #[test]
    fn prop_idle_ticks_never_fire(tanks in arb_tank_list(8), ticks in 1u32..60) {
        let mut sim = spawn_all(&tanks);
        for _ in 0..ticks {
            let snapshot = sim.tick();
            prop_assert!(!snapshot.events.iter().any(|e| matches!(e, GameEvent::Fired { .. })), "idle tick fired");
            prop_assert!(!snapshot.events.iter().any(|e| matches!(e, GameEvent::Hit { .. })), "idle tick hit");
        }
    }

    #[test]
    fn prop_random_streams_are_deterministic(
        tanks in arb_tank_list(6),
        stream in arb_command_stream((1..8).collect(), 60),
    ) {
        let mut a = spawn_all(&tanks);
        let mut b = spawn_all(&tanks);
        for commands in &stream {
            let left = a.advance(commands);
            let right = b.advance(commands);
            prop_assert_eq!(left.to_bytes().unwrap(), right.to_bytes().unwrap());
        }
    }

    #[test]
    fn prop_ids_are_never_reused(
        tanks in arb_tank_list(6),
        stream in arb_command_stream((1..8).collect(), 200),
    ) {
        let mut sim = spawn_all(&tanks);
        let mut seen_destroyed = std::collections::BTreeSet::new();
        for commands in &stream {
            let snapshot = sim.advance(commands);
            for entity in &snapshot.entities {
                prop_assert!(!seen_destroyed.contains(&entity.id));
            }
            seen_destroyed.extend(snapshot.destroyed.iter().map(|d| d.id));
        }
    }
}
