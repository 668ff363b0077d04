//! Headless and realtime battle runners.
//!
//! Both modes build the scenario, let the [`Pilot`] drive the tanks, write
//! every snapshot as a JSON line, and optionally record a replay.
//!
//! - **Headless** runs ticks back to back on the calling thread.
//! - **Realtime** paces ticks against the wall clock with
//!   [`FixedTimestep`]. The pilot runs on its own thread, reading snapshots
//!   and sending commands through a [`CommandSender`]; with `stdin_commands`
//!   a second producer thread forwards JSON commands from stdin.

use std::collections::BTreeMap;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;

use copanzers_core::components::{TankCommand, TeamId};
use copanzers_core::error::GameError;
use copanzers_core::replay::Replay;
use copanzers_core::scheduler::{CommandQueue, CommandSender, FixedTimestep, StopSignal};
use copanzers_core::simulation::Simulation;
use copanzers_core::snapshot::Snapshot;

use crate::ai::Pilot;
use crate::protocol::{Message, PlayerCommand, RunSummary};
use crate::scenario::{Battle, Scenario, ScenarioError};

/// Ticks between recorded replay checkpoints.
pub const CHECKPOINT_INTERVAL: u64 = 60;

/// Error type for runs.
#[derive(Error, Debug)]
pub enum RunError {
    /// The scenario could not be loaded or built.
    #[error(transparent)]
    Scenario(#[from] ScenarioError),
    /// Simulation or replay failure.
    #[error(transparent)]
    Game(#[from] GameError),
    /// Writing output failed.
    #[error("Failed to write output: {0}")]
    Io(#[from] io::Error),
}

/// Run settings.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Override the scenario's tick limit.
    pub tick_limit: Option<u64>,
    /// Pace ticks against the wall clock.
    pub realtime: bool,
    /// Write a replay here when the run ends.
    pub record: Option<PathBuf>,
    /// Realtime only: also accept JSON commands on stdin.
    pub stdin_commands: bool,
}

/// Live tank count per team.
#[must_use]
pub fn teams_alive(snapshot: &Snapshot) -> BTreeMap<TeamId, u32> {
    let mut teams = BTreeMap::new();
    for team in snapshot.tanks().filter_map(|t| t.team) {
        *teams.entry(team).or_insert(0) += 1;
    }
    teams
}

/// Runs one scenario.
#[derive(Debug, Clone)]
pub struct HeadlessRunner {
    scenario: Scenario,
    options: RunOptions,
}

/// Per-run bookkeeping shared by both modes.
struct Session<'a, W: Write> {
    out: &'a mut W,
    recorder: Option<Replay>,
    starting_teams: usize,
    limit: u64,
    published: u64,
}

impl<W: Write> Session<'_, W> {
    fn record(&mut self, tick: u64, commands: &[TankCommand]) {
        if let Some(replay) = self.recorder.as_mut() {
            replay.record_tick(tick, commands);
        }
    }

    /// Whether the run ends at `snapshot`: the tick limit is reached, or a
    /// battle that started with two or more teams has at most one left.
    fn is_over(&self, snapshot: &Snapshot) -> bool {
        snapshot.tick >= self.limit
            || (self.starting_teams >= 2 && teams_alive(snapshot).len() <= 1)
    }

    fn publish(&mut self, sim: &Simulation, snapshot: &Snapshot) -> io::Result<()> {
        let hash = sim.state_hash();
        self.out
            .write_all(Message::snapshot(snapshot, hash).to_json_line().as_bytes())?;
        if let Some(replay) = self.recorder.as_mut() {
            if snapshot.tick % CHECKPOINT_INTERVAL == 0 {
                replay.record_checkpoint(snapshot.tick, hash);
            }
        }
        self.published = snapshot.tick;
        Ok(())
    }

    /// Publish the current state unless its tick already went out, hand it
    /// to the pilot, and report whether the run is over.
    ///
    /// The hash must be taken while the simulation still sits on the
    /// snapshot's tick, so realtime frames call this between ticks rather
    /// than after a batch.
    fn settle(&mut self, sim: &Simulation, pilot: &mpsc::Sender<Arc<Snapshot>>) -> io::Result<bool> {
        let snapshot = Arc::new(sim.snapshot());
        if snapshot.tick > self.published {
            self.publish(sim, &snapshot)?;
            let _ = pilot.send(Arc::clone(&snapshot));
        }
        Ok(self.is_over(&snapshot))
    }
}

/// Fold a settle result into the loop state. Returns true to keep ticking.
fn keep_going(result: io::Result<bool>, stop: &StopSignal, failure: &mut Option<io::Error>) -> bool {
    match result {
        Ok(false) => true,
        Ok(true) => {
            stop.stop();
            false
        }
        Err(e) => {
            *failure = Some(e);
            stop.stop();
            false
        }
    }
}

impl HeadlessRunner {
    /// Create a runner.
    #[must_use]
    pub fn new(scenario: Scenario, options: RunOptions) -> Self {
        Self { scenario, options }
    }

    /// Run to completion, writing JSON lines to `out`.
    pub fn run<W: Write>(&self, out: &mut W) -> Result<RunSummary, RunError> {
        let Battle {
            mut simulation,
            tank_ids,
        } = self.scenario.build()?;
        let pilot = Pilot::new(self.scenario.clone(), tank_ids);

        let initial = simulation.snapshot();
        let mut session = Session {
            out,
            recorder: match self.options.record {
                Some(_) => Some(Replay::new(self.scenario.name.clone(), &simulation)?),
                None => None,
            },
            starting_teams: teams_alive(&initial).len(),
            limit: self.options.tick_limit.unwrap_or(self.scenario.tick_limit),
            published: initial.tick,
        };
        session
            .out
            .write_all(Message::ready(&self.scenario.name, initial.tick).to_json_line().as_bytes())?;

        tracing::info!(
            scenario = %self.scenario.name,
            realtime = self.options.realtime,
            tick_limit = session.limit,
            "Starting run"
        );

        let lag_frames = if self.options.realtime {
            self.run_realtime(&mut simulation, pilot, initial, &mut session)?
        } else {
            Self::run_headless(&mut simulation, &pilot, initial, &mut session)?;
            0
        };

        let final_hash = simulation.state_hash();
        let last = simulation.snapshot();
        let alive = teams_alive(&last);
        let summary = RunSummary {
            ticks: simulation.get_tick(),
            winner: match (session.starting_teams >= 2, alive.len()) {
                (true, 1) => alive.keys().next().copied(),
                _ => None,
            },
            survivors: alive.into_iter().collect(),
            final_hash,
            lag_frames,
        };

        if let (Some(mut replay), Some(path)) = (session.recorder.take(), &self.options.record) {
            replay.finalize(simulation.get_tick(), final_hash);
            replay.save(path)?;
            tracing::info!(path = %path.display(), commands = replay.command_count(), "Replay saved");
        }

        session
            .out
            .write_all(Message::Summary(summary.clone()).to_json_line().as_bytes())?;
        session.out.flush()?;
        tracing::info!(ticks = summary.ticks, winner = ?summary.winner, "Run finished");
        Ok(summary)
    }

    fn run_headless<W: Write>(
        simulation: &mut Simulation,
        pilot: &Pilot,
        initial: Snapshot,
        session: &mut Session<'_, W>,
    ) -> Result<(), RunError> {
        let mut snapshot = Arc::new(initial);
        while !session.is_over(&snapshot) {
            let commands = pilot.commands(&snapshot);
            session.record(simulation.get_tick(), &commands);
            snapshot = simulation.advance(&commands);
            session.publish(simulation, &snapshot)?;
        }
        Ok(())
    }

    fn run_realtime<W: Write>(
        &self,
        simulation: &mut Simulation,
        pilot: Pilot,
        initial: Snapshot,
        session: &mut Session<'_, W>,
    ) -> Result<u64, RunError> {
        let mut stepper = FixedTimestep::from_config(simulation.config());
        let stop = StopSignal::new();
        let (sender, queue) = CommandQueue::channel();
        let (snapshot_tx, snapshot_rx) = mpsc::channel::<Arc<Snapshot>>();

        let pilot_sender = sender.clone();
        let pilot_thread = thread::spawn(move || {
            for snapshot in snapshot_rx {
                for command in pilot.commands(&snapshot) {
                    if !pilot_sender.send(command) {
                        return;
                    }
                }
            }
        });
        if self.options.stdin_commands {
            spawn_stdin_reader(sender.clone(), stop.clone());
        }
        drop(sender);

        let mut failure = None;
        let _ = snapshot_tx.send(Arc::new(initial));
        keep_going(session.settle(simulation, &snapshot_tx), &stop, &mut failure);
        let mut last = Instant::now();

        while !stop.is_stopped() {
            let now = Instant::now();
            stepper.advance(simulation, now - last, &stop, |sim| {
                if keep_going(session.settle(sim, &snapshot_tx), &stop, &mut failure) {
                    let commands = queue.drain();
                    session.record(sim.get_tick(), &commands);
                    for command in commands {
                        sim.submit_command(command);
                    }
                }
            });
            last = now;

            if keep_going(session.settle(simulation, &snapshot_tx), &stop, &mut failure) {
                let wait = stepper.step().saturating_sub(stepper.accumulated());
                thread::sleep(wait.max(Duration::from_millis(1)));
            }
        }

        drop(snapshot_tx);
        if pilot_thread.join().is_err() {
            tracing::error!("Pilot thread panicked");
        }
        if let Some(e) = failure {
            return Err(e.into());
        }
        Ok(stepper.lag_frames())
    }
}

/// Forward JSON commands from stdin until EOF or stop.
///
/// The thread is detached: a blocking read cannot be interrupted, so it is
/// left to end with the process.
fn spawn_stdin_reader(sender: CommandSender, stop: StopSignal) {
    thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if stop.is_stopped() {
                break;
            }
            if line.trim().is_empty() {
                continue;
            }
            match PlayerCommand::from_json(&line) {
                Ok(command) => {
                    if !sender.send(command.to_command()) {
                        break;
                    }
                }
                Err(e) => tracing::warn!(error = %e, line = %line, "Ignoring malformed command"),
            }
        }
    });
}
