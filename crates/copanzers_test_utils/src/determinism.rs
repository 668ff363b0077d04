//! Determinism testing utilities.
//!
//! Provides a harness for verifying that the simulation
//! produces identical results given identical inputs.
//!
//! # Testing Strategy
//!
//! Lockstep peers and replays only work if the simulation is 100%
//! deterministic. Sources of non-determinism include:
//!
//! - **Floating-point math**: Different CPUs can produce different results.
//!   We use fixed-point arithmetic via [`copanzers_core::math::Fixed`],
//!   including for trigonometry and square roots.
//!
//! - **HashMap iteration order**: Rust's default hasher is randomized.
//!   Entities live in a `BTreeMap` and are always visited in id order.
//!
//! - **Parallel phases**: the optional rayon sweep must merge its results in
//!   id order, so thread scheduling cannot leak into the state.
//!
//! # Test Levels
//!
//! 1. **Unit tests**: Individual phase determinism (motion, collision, combat)
//! 2. **Property tests**: Random command streams still produce deterministic outputs
//! 3. **Integration tests**: Full scenarios produce byte-identical snapshots
//! 4. **Parallel tests**: Running N simulations on threads all match

use std::thread;

use copanzers_core::simulation::Simulation;

use crate::fixtures::scripted_commands;

/// Result of a determinism test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeterminismResult {
    /// Whether all runs produced identical results.
    pub is_deterministic: bool,
    /// Hashes from each run.
    pub hashes: Vec<u64>,
    /// Number of ticks simulated.
    pub ticks: u64,
}

impl DeterminismResult {
    /// Get all unique hashes (should be 1 for deterministic simulation).
    #[must_use]
    pub fn unique_hashes(&self) -> Vec<u64> {
        let mut unique: Vec<u64> = self.hashes.clone();
        unique.sort_unstable();
        unique.dedup();
        unique
    }

    /// Assert that the simulation was deterministic, with a detailed error message.
    ///
    /// # Panics
    ///
    /// Panics if the simulation produced different hashes across runs.
    pub fn assert_deterministic(&self) {
        if !self.is_deterministic {
            let unique = self.unique_hashes();
            panic!(
                "Simulation is non-deterministic!\n\
                 Runs: {}\n\
                 Ticks: {}\n\
                 Unique hashes: {} (expected 1)\n\
                 All hashes: {:?}",
                self.hashes.len(),
                self.ticks,
                unique.len(),
                self.hashes
            );
        }
    }
}

/// Run a simulation multiple times and verify determinism.
///
/// # Arguments
///
/// * `runs` - Number of times to run the simulation
/// * `ticks` - Number of ticks to simulate per run
/// * `setup` - Function to create initial simulation state
/// * `step` - Function to advance simulation by one tick
/// * `hash` - Function to compute state hash
pub fn verify_determinism<S, Setup, Step, HashFn>(
    runs: usize,
    ticks: u64,
    setup: Setup,
    step: Step,
    hash: HashFn,
) -> DeterminismResult
where
    Setup: Fn() -> S,
    Step: Fn(&mut S),
    HashFn: Fn(&S) -> u64,
{
    let mut hashes = Vec::with_capacity(runs);

    for _ in 0..runs {
        let mut state = setup();

        for _ in 0..ticks {
            step(&mut state);
        }

        hashes.push(hash(&state));
    }

    let is_deterministic = hashes.windows(2).all(|w| w[0] == w[1]);

    DeterminismResult {
        is_deterministic,
        hashes,
        ticks,
    }
}

/// Advance one tick driven by [`scripted_commands`].
pub fn scripted_step(sim: &mut Simulation) {
    let commands = scripted_commands(sim);
    sim.advance(&commands);
}

/// Run the simulation twice under the scripted command stream and compare
/// final state hashes.
pub fn verify_simulation_determinism<F>(setup_fn: F, num_ticks: u64) -> bool
where
    F: Fn() -> Simulation,
{
    verify_determinism(2, num_ticks, &setup_fn, scripted_step, Simulation::state_hash)
        .is_deterministic
}

/// Run two simulations side by side and compare the encoded snapshot of
/// every tick.
///
/// # Returns
///
/// `None` if every snapshot matched byte for byte, `Some(tick)` for the first
/// tick whose snapshots differ (tick 0 is the initial state).
pub fn find_first_divergence<F>(setup_fn: F, num_ticks: u64) -> Option<u64>
where
    F: Fn() -> Simulation,
{
    let mut sim1 = setup_fn();
    let mut sim2 = setup_fn();

    if snapshot_bytes(&sim1) != snapshot_bytes(&sim2) {
        return Some(0);
    }

    for _ in 0..num_ticks {
        let commands = scripted_commands(&sim1);
        let a = sim1.advance(&commands);
        let b = sim2.advance(&commands);

        if a.to_bytes().ok() != b.to_bytes().ok() {
            tracing::warn!(tick = a.tick, "Snapshots diverged");
            return Some(a.tick);
        }
    }

    None
}

fn snapshot_bytes(sim: &Simulation) -> Option<Vec<u8>> {
    sim.snapshot().to_bytes().ok()
}

/// Run N simulations on separate threads and collect final hashes.
///
/// Catches non-determinism that only manifests under thread scheduling
/// variations or memory layout differences.
pub fn run_parallel_simulations<F>(setup_fn: F, num_sims: usize, num_ticks: u64) -> DeterminismResult
where
    F: Fn() -> Simulation + Sync,
{
    let hashes: Vec<u64> = thread::scope(|s| {
        let handles: Vec<_> = (0..num_sims)
            .map(|_| {
                s.spawn(|| {
                    let mut sim = setup_fn();
                    for _ in 0..num_ticks {
                        scripted_step(&mut sim);
                    }
                    sim.state_hash()
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|h| h.join().expect("simulation thread panicked"))
            .collect()
    });

    DeterminismResult {
        is_deterministic: hashes.windows(2).all(|w| w[0] == w[1]),
        hashes,
        ticks: num_ticks,
    }
}

/// Verify that a save/load round trip preserves the simulation exactly: the
/// restored copy must hash the same and produce the same next snapshot.
pub fn verify_serialization_determinism<F>(setup_fn: F, num_ticks: u64) -> bool
where
    F: Fn() -> Simulation,
{
    let mut sim = setup_fn();
    for _ in 0..num_ticks {
        scripted_step(&mut sim);
    }

    let Ok(bytes) = sim.serialize() else {
        return false;
    };
    let Ok(mut restored) = Simulation::deserialize(&bytes) else {
        return false;
    };

    if sim.state_hash() != restored.state_hash() {
        return false;
    }

    let commands = scripted_commands(&sim);
    let original = sim.advance(&commands);
    let replayed = restored.advance(&commands);
    original.to_bytes().ok() == replayed.to_bytes().ok()
}

/// Proptest strategies for simulation inputs.
///
/// These strategies generate random but reproducible inputs for
/// property-based testing of simulation invariants.
pub mod strategies {
    use copanzers_core::components::{ArmorClass, EntityId, TankCommand};
    use copanzers_core::math::{Fixed, Vec2Fixed};
    use proptest::prelude::*;

    /// Generate a coordinate inside the default 800x600 arena, away from the
    /// walls by at least a tank radius.
    pub fn arb_arena_position() -> impl Strategy<Value = Vec2Fixed> {
        (10i32..790, 10i32..590).prop_map(|(x, y)| Vec2Fixed::from_ints(x, y))
    }

    /// Generate a heading in radians (whole hundredths in `[-3.14, 3.14]`).
    pub fn arb_heading() -> impl Strategy<Value = Fixed> {
        (-314i32..=314).prop_map(|h| Fixed::from_num(h) / Fixed::from_num(100))
    }

    /// Generate a desired velocity, including values beyond the speed cap.
    pub fn arb_move_vector() -> impl Strategy<Value = Vec2Fixed> {
        (-120i32..=120, -120i32..=120).prop_map(|(x, y)| Vec2Fixed::from_ints(x, y))
    }

    /// Generate an armor class.
    pub fn arb_armor() -> impl Strategy<Value = ArmorClass> {
        prop_oneof![
            Just(ArmorClass::Light),
            Just(ArmorClass::Medium),
            Just(ArmorClass::Heavy),
        ]
    }

    /// Generate health values (1-1000).
    pub fn arb_health() -> impl Strategy<Value = u32> {
        1u32..1000u32
    }

    /// Generate damage values (1-100).
    pub fn arb_damage() -> impl Strategy<Value = u32> {
        1u32..100u32
    }

    /// Generate a command for one of `ids`. Ids outside the live set are
    /// fine: the simulation must reject them gracefully.
    pub fn arb_command(ids: Vec<EntityId>) -> impl Strategy<Value = TankCommand> {
        (
            proptest::sample::select(ids),
            arb_move_vector(),
            -6i32..=6,
            any::<bool>(),
        )
            .prop_map(|(tank_id, move_vector, turn, fire)| TankCommand {
                tank_id,
                move_vector,
                turn_input: Fixed::from_num(turn),
                fire,
            })
    }

    /// Generate `ticks` batches of commands for tanks with the given ids.
    pub fn arb_command_stream(
        ids: Vec<EntityId>,
        ticks: usize,
    ) -> impl Strategy<Value = Vec<Vec<TankCommand>>> {
        proptest::collection::vec(
            proptest::collection::vec(arb_command(ids), 0..4),
            ticks,
        )
    }

    /// Parameters for spawning a test tank.
    #[derive(Debug, Clone)]
    pub struct TestTankParams {
        /// Team.
        pub team: u8,
        /// Position.
        pub position: Vec2Fixed,
        /// Heading.
        pub heading: Fixed,
        /// Armor class.
        pub armor: ArmorClass,
    }

    /// Generate parameters for a test tank.
    pub fn arb_tank_params() -> impl Strategy<Value = TestTankParams> {
        (0u8..2, arb_arena_position(), arb_heading(), arb_armor()).prop_map(
            |(team, position, heading, armor)| TestTankParams {
                team,
                position,
                heading,
                armor,
            },
        )
    }

    /// Generate a list of tank spawn parameters.
    pub fn arb_tank_list(max_tanks: usize) -> impl Strategy<Value = Vec<TestTankParams>> {
        proptest::collection::vec(arb_tank_params(), 1..max_tanks)
    }
}
