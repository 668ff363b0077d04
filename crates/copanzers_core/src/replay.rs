//! Replay system for recording and playing back matches.
//!
//! Replays store the serialized initial simulation and the stream of commands
//! issued during the match. Since the simulation is deterministic, that is
//! enough to recreate every tick; the recorded state hashes let playback
//! detect a divergence and name the tick where it happened.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::components::TankCommand;
use crate::error::{GameError, Result};
use crate::simulation::Simulation;

/// A single command record for replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayCommand {
    /// Tick the command was applied in (the simulation's tick counter before
    /// that tick ran).
    pub tick: u64,
    /// The command that was issued.
    pub command: TankCommand,
}

impl ReplayCommand {
    /// Create a new replay command record.
    #[must_use]
    pub const fn new(tick: u64, command: TankCommand) -> Self {
        Self { tick, command }
    }
}

/// Replay file format version for compatibility.
pub const REPLAY_VERSION: u32 = 1;

/// Complete replay data structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Replay {
    /// Replay format version.
    pub version: u32,
    /// Scenario identifier or name.
    pub scenario_id: String,
    /// Serialized initial simulation state.
    pub initial_state: Vec<u8>,
    /// Tick counter of the initial state.
    pub start_tick: u64,
    /// Stream of commands in tick order.
    pub commands: Vec<ReplayCommand>,
    /// Intermediate `(tick, state_hash)` pairs, ascending by tick.
    pub checkpoints: Vec<(u64, u64)>,
    /// Final tick when the match ended.
    pub final_tick: u64,
    /// Final state hash for verification.
    pub final_hash: u64,
}

impl Replay {
    /// Create a new replay from a simulation's initial state.
    ///
    /// # Errors
    /// Returns an error if the simulation cannot be serialized.
    pub fn new(scenario_id: impl Into<String>, initial_state: &Simulation) -> Result<Self> {
        let state_bytes = initial_state.serialize()?;
        let start_tick = initial_state.get_tick();
        Ok(Self {
            version: REPLAY_VERSION,
            scenario_id: scenario_id.into(),
            initial_state: state_bytes,
            start_tick,
            commands: Vec::new(),
            checkpoints: Vec::new(),
            final_tick: start_tick,
            final_hash: initial_state.state_hash(),
        })
    }

    /// Record a command for replay.
    pub fn record_command(&mut self, tick: u64, command: TankCommand) {
        self.commands.push(ReplayCommand::new(tick, command));
    }

    /// Record every command of one tick.
    pub fn record_tick(&mut self, tick: u64, commands: &[TankCommand]) {
        self.commands
            .extend(commands.iter().map(|&c| ReplayCommand::new(tick, c)));
    }

    /// Record the state hash reached after `tick`.
    pub fn record_checkpoint(&mut self, tick: u64, hash: u64) {
        self.checkpoints.push((tick, hash));
    }

    /// Finalize the replay with end-of-match state.
    pub fn finalize(&mut self, final_tick: u64, final_hash: u64) {
        self.final_tick = final_tick;
        self.final_hash = final_hash;
    }

    /// Save the replay to a file.
    ///
    /// # Errors
    /// Returns an error if serialization or file writing fails.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let bytes = bincode::serialize(self)
            .map_err(|e| GameError::InvalidState(format!("Failed to serialize replay: {e}")))?;
        std::fs::write(path.as_ref(), bytes)
            .map_err(|e| GameError::InvalidState(format!("Failed to write replay file: {e}")))?;
        Ok(())
    }

    /// Load a replay from a file.
    ///
    /// # Errors
    /// Returns an error if file reading or deserialization fails, or if the
    /// file was written by an incompatible version.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bytes = std::fs::read(path.as_ref())
            .map_err(|e| GameError::InvalidState(format!("Failed to read replay file: {e}")))?;
        let replay: Self = bincode::deserialize(&bytes)
            .map_err(|e| GameError::InvalidState(format!("Failed to deserialize replay: {e}")))?;

        if replay.version != REPLAY_VERSION {
            return Err(GameError::InvalidState(format!(
                "Replay version mismatch: expected {REPLAY_VERSION}, got {}",
                replay.version
            )));
        }

        Ok(replay)
    }

    /// Get the initial simulation state for playback.
    ///
    /// # Errors
    /// Returns an error if state deserialization fails.
    pub fn restore_initial_state(&self) -> Result<Simulation> {
        Simulation::deserialize(&self.initial_state)
    }

    /// Commands applied in a specific tick, in recorded order.
    #[must_use]
    pub fn commands_at_tick(&self, tick: u64) -> Vec<TankCommand> {
        self.commands
            .iter()
            .filter(|record| record.tick == tick)
            .map(|record| record.command)
            .collect()
    }

    /// Number of ticks covered by the replay.
    #[must_use]
    pub const fn duration(&self) -> u64 {
        self.final_tick.saturating_sub(self.start_tick)
    }

    /// Get the total number of commands in the replay.
    #[must_use]
    pub fn command_count(&self) -> usize {
        self.commands.len()
    }
}

/// Replay playback controller.
#[derive(Debug)]
pub struct ReplayPlayer {
    replay: Replay,
    simulation: Simulation,
    /// Index into the command stream.
    command_index: usize,
    /// Whether playback is paused.
    pub paused: bool,
}

impl ReplayPlayer {
    /// Create a new replay player from a replay.
    ///
    /// # Errors
    /// Returns an error if the initial state cannot be restored.
    pub fn new(replay: Replay) -> Result<Self> {
        let simulation = replay.restore_initial_state()?;
        Ok(Self {
            replay,
            simulation,
            command_index: 0,
            paused: false,
        })
    }

    /// Run one tick with its recorded commands.
    fn step(&mut self) {
        let tick = self.simulation.get_tick();
        let commands = &self.replay.commands;
        let start = self.command_index;
        while self.command_index < commands.len() && commands[self.command_index].tick <= tick {
            self.command_index += 1;
        }
        let batch: Vec<TankCommand> = commands[start..self.command_index]
            .iter()
            .filter(|record| record.tick == tick)
            .map(|record| record.command)
            .collect();
        self.simulation.advance(&batch);
    }

    /// Advance the replay by one tick.
    ///
    /// Returns true if there are more ticks to play.
    pub fn advance(&mut self) -> bool {
        if !self.paused && !self.is_finished() {
            self.step();
        }
        !self.is_finished()
    }

    /// Seek to a specific tick by replaying from the initial state.
    ///
    /// # Errors
    /// Returns an error if state restoration fails.
    pub fn seek(&mut self, target_tick: u64) -> Result<()> {
        self.simulation = self.replay.restore_initial_state()?;
        self.command_index = 0;

        let target = target_tick.min(self.replay.final_tick);
        while self.simulation.get_tick() < target {
            self.step();
        }
        Ok(())
    }

    /// Get the current tick.
    #[must_use]
    pub const fn current_tick(&self) -> u64 {
        self.simulation.get_tick()
    }

    /// Get a reference to the current simulation state.
    #[must_use]
    pub const fn simulation(&self) -> &Simulation {
        &self.simulation
    }

    /// Get the replay being played.
    #[must_use]
    pub const fn replay(&self) -> &Replay {
        &self.replay
    }

    /// Check if the replay has finished.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        self.simulation.get_tick() >= self.replay.final_tick
    }

    /// Re-simulate the whole replay and compare every recorded hash.
    ///
    /// # Errors
    /// Returns [`GameError::DesyncDetected`] naming the first tick whose hash
    /// differs, or an error if the initial state cannot be restored.
    pub fn verify(&mut self) -> Result<()> {
        self.seek(self.replay.start_tick)?;

        let checkpoints = self.replay.checkpoints.clone();
        for (tick, expected_hash) in checkpoints {
            while self.simulation.get_tick() < tick.min(self.replay.final_tick) {
                self.step();
            }
            if self.simulation.get_tick() != tick {
                continue;
            }
            self.check_hash(tick, expected_hash)?;
        }

        while !self.is_finished() {
            self.step();
        }
        self.check_hash(self.replay.final_tick, self.replay.final_hash)
    }

    fn check_hash(&self, tick: u64, expected_hash: u64) -> Result<()> {
        let actual_hash = self.simulation.state_hash();
        if actual_hash == expected_hash {
            Ok(())
        } else {
            tracing::warn!(tick, expected_hash, actual_hash, "Replay desync");
            Err(GameError::DesyncDetected {
                tick,
                expected_hash,
                actual_hash,
            })
        }
    }

    /// Toggle pause state.
    pub fn toggle_pause(&mut self) {
        self.paused = !self.paused;
    }

    /// Get progress as a percentage (0-100).
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn progress_percent(&self) -> f64 {
        let total = self.replay.duration();
        if total == 0 {
            100.0
        } else {
            let done = self
                .simulation
                .get_tick()
                .saturating_sub(self.replay.start_tick);
            (done as f64 / total as f64) * 100.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;
    use crate::math::{Fixed, Vec2Fixed};
    use crate::simulation::TankSpawn;

    fn create_test_simulation() -> (Simulation, u64, u64) {
        let mut sim = Simulation::new(SimConfig::default()).unwrap();
        let a = sim
            .spawn_tank(TankSpawn::new(0, Vec2Fixed::from_ints(100, 300)))
            .unwrap();
        let b = sim
            .spawn_tank(TankSpawn::new(1, Vec2Fixed::from_ints(400, 300)).facing(crate::math::PI))
            .unwrap();
        (sim, a, b)
    }

    fn record_match(ticks: u64) -> Replay {
        let (mut sim, a, b) = create_test_simulation();
        let mut replay = Replay::new("duel", &sim).unwrap();
        for _ in 0..ticks {
            let tick = sim.get_tick();
            let commands = if tick % 50 == 0 {
                vec![
                    TankCommand::fire_only(a),
                    TankCommand::drive(b, Vec2Fixed::from_ints(-20, 0), Fixed::ZERO),
                ]
            } else {
                Vec::new()
            };
            replay.record_tick(tick, &commands);
            sim.advance(&commands);
            if sim.get_tick() % 20 == 0 {
                replay.record_checkpoint(sim.get_tick(), sim.state_hash());
            }
        }
        replay.finalize(sim.get_tick(), sim.state_hash());
        replay
    }

    #[test]
    fn test_replay_create() {
        let (sim, _, _) = create_test_simulation();
        let replay = Replay::new("test_scenario", &sim).unwrap();
        assert_eq!(replay.version, REPLAY_VERSION);
        assert_eq!(replay.scenario_id, "test_scenario");
        assert!(replay.commands.is_empty());
        assert_eq!(replay.duration(), 0);
    }

    #[test]
    fn test_replay_record_commands() {
        let (sim, a, b) = create_test_simulation();
        let mut replay = Replay::new("test_scenario", &sim).unwrap();

        replay.record_command(0, TankCommand::fire_only(a));
        replay.record_command(5, TankCommand::fire_only(b));
        replay.record_command(5, TankCommand::drive(a, Vec2Fixed::ZERO, Fixed::ONE));

        assert_eq!(replay.command_count(), 3);
        assert_eq!(replay.commands_at_tick(0).len(), 1);
        assert_eq!(replay.commands_at_tick(5).len(), 2);
        assert!(replay.commands_at_tick(7).is_empty());
    }

    #[test]
    fn test_replay_save_load() {
        let replay = record_match(30);
        let temp_path = std::env::temp_dir().join("copanzers_test_replay.bin");
        replay.save(&temp_path).unwrap();

        let loaded = Replay::load(&temp_path).unwrap();
        assert_eq!(loaded.scenario_id, "duel");
        assert_eq!(loaded.command_count(), replay.command_count());
        assert_eq!(loaded.duration(), 30);
        assert_eq!(loaded.final_hash, replay.final_hash);

        let _ = std::fs::remove_file(temp_path);
    }

    #[test]
    fn test_replay_rejects_other_version() {
        let mut replay = record_match(1);
        replay.version = REPLAY_VERSION + 1;
        let temp_path = std::env::temp_dir().join("copanzers_test_replay_version.bin");
        replay.save(&temp_path).unwrap();

        assert!(matches!(
            Replay::load(&temp_path),
            Err(GameError::InvalidState(_))
        ));
        let _ = std::fs::remove_file(temp_path);
    }

    #[test]
    fn test_replay_verifies() {
        let replay = record_match(120);
        let mut player = ReplayPlayer::new(replay).unwrap();
        player.verify().unwrap();
        assert!(player.is_finished());
    }

    #[test]
    fn test_replay_detects_desync() {
        let mut replay = record_match(120);
        let (tick, hash) = replay.checkpoints[2];
        replay.checkpoints[2] = (tick, hash ^ 1);

        let mut player = ReplayPlayer::new(replay).unwrap();
        match player.verify() {
            Err(GameError::DesyncDetected {
                tick: at,
                expected_hash,
                actual_hash,
            }) => {
                assert_eq!(at, tick);
                assert_eq!(expected_hash, hash ^ 1);
                assert_eq!(actual_hash, hash);
            }
            other => panic!("expected desync, got {other:?}"),
        }
    }

    #[test]
    fn test_replay_dropped_command_desyncs() {
        let mut replay = record_match(120);
        replay.commands.remove(0);
        let mut player = ReplayPlayer::new(replay).unwrap();
        assert!(matches!(
            player.verify(),
            Err(GameError::DesyncDetected { .. })
        ));
    }

    #[test]
    fn test_replay_player_advance_and_pause() {
        let replay = record_match(10);
        let mut player = ReplayPlayer::new(replay).unwrap();

        for _ in 0..5 {
            assert!(player.advance());
        }
        assert_eq!(player.current_tick(), 5);

        player.toggle_pause();
        player.advance();
        assert_eq!(player.current_tick(), 5);
        player.toggle_pause();

        while player.advance() {}
        assert!(player.is_finished());
        assert_eq!(player.current_tick(), 10);
    }

    #[test]
    fn test_replay_player_seek_and_progress() {
        let replay = record_match(100);
        let mut player = ReplayPlayer::new(replay).unwrap();
        assert!((player.progress_percent() - 0.0).abs() < 0.01);

        player.seek(50).unwrap();
        assert_eq!(player.current_tick(), 50);
        assert!((player.progress_percent() - 50.0).abs() < 0.01);

        player.seek(10).unwrap();
        assert_eq!(player.current_tick(), 10);

        player.seek(500).unwrap();
        assert_eq!(player.current_tick(), 100);
        assert!((player.progress_percent() - 100.0).abs() < 0.01);
    }
}
