//! Determinism: identical inputs must give byte-identical snapshots.

use copanzers_core::prelude::*;
use copanzers_test_utils::determinism::{
    find_first_divergence, run_parallel_simulations, scripted_step,
    verify_serialization_determinism, verify_simulation_determinism,
};
use copanzers_test_utils::fixtures::{duel, run_scripted, scripted_commands, skirmish};

#[test]
fn test_snapshots_are_byte_identical() {
    let mut a = skirmish(10);
    let mut b = skirmish(10);

    for _ in 0..600 {
        let commands = scripted_commands(&a);
        let left = a.advance(&commands);
        let right = b.advance(&commands);
        assert_eq!(left.to_bytes().unwrap(), right.to_bytes().unwrap());
    }
    assert_eq!(a.state_hash(), b.state_hash());
}

#[test]
fn test_no_divergence_over_long_battle() {
    assert_eq!(find_first_divergence(|| skirmish(12), 900), None);
}

#[test]
fn test_threads_agree() {
    run_parallel_simulations(|| skirmish(8), 6, 300).assert_deterministic();
}

#[test]
fn test_save_load_mid_battle() {
    assert!(verify_serialization_determinism(|| skirmish(8), 200));
    assert!(verify_simulation_determinism(duel, 400));
}

#[test]
fn test_replay_of_scripted_battle_verifies() {
    let mut sim = skirmish(6);
    let mut replay = Replay::new("skirmish", &sim).unwrap();
    for _ in 0..300 {
        let tick = sim.get_tick();
        let commands = scripted_commands(&sim);
        replay.record_tick(tick, &commands);
        sim.advance(&commands);
        if sim.get_tick() % 60 == 0 {
            replay.record_checkpoint(sim.get_tick(), sim.state_hash());
        }
    }
    replay.finalize(sim.get_tick(), sim.state_hash());

    let mut player = ReplayPlayer::new(replay).unwrap();
    player.verify().unwrap();
    assert_eq!(player.simulation().state_hash(), sim.state_hash());
}

#[test]
fn test_state_hash_tracks_changes() {
    let mut a = duel();
    let b = duel();
    assert_eq!(a.state_hash(), b.state_hash());

    scripted_step(&mut a);
    assert_ne!(a.state_hash(), b.state_hash());
}

#[test]
fn test_command_order_within_tick_does_not_matter_for_fire() {
    let mut a = skirmish(4);
    let mut b = skirmish(4);
    run_scripted(&mut a, 10);
    run_scripted(&mut b, 10);

    let ids: Vec<EntityId> = a.snapshot().tanks().map(|t| t.id).collect();
    let forward: Vec<TankCommand> = ids.iter().map(|&id| TankCommand::fire_only(id)).collect();
    let mut backward = forward.clone();
    backward.reverse();

    let left = a.advance(&forward);
    let right = b.advance(&backward);
    assert_eq!(left.entities, right.entities);
}
