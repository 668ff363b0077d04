//! Headless tank battle runner.
//!
//! # Usage
//!
//! ```bash
//! # Run the built-in duel
//! tanks run
//!
//! # Run a scenario in real time, accepting commands on stdin
//! tanks run scenarios/skirmish.ron --realtime --stdin
//!
//! # Check a scenario or bare config file
//! tanks validate scenarios/skirmish.ron
//! tanks validate --config sim.ron
//!
//! # Verify a recorded replay
//! tanks replay skirmish.replay
//! ```
//!
//! Stdout carries the JSON-lines protocol; logs go to stderr.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use copanzers_core::config::SimConfig;
use copanzers_core::replay::{Replay, ReplayPlayer};
use copanzers_headless::runner::{HeadlessRunner, RunOptions};
use copanzers_headless::scenario::Scenario;

#[derive(Parser)]
#[command(name = "tanks")]
#[command(about = "Deterministic headless tank battles")]
#[command(version)]
struct Cli {
    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a battle
    Run {
        /// Scenario file (defaults to the built-in duel)
        scenario: Option<PathBuf>,

        /// Pace ticks against the wall clock
        #[arg(long)]
        realtime: bool,

        /// Accept JSON tank commands on stdin (realtime only)
        #[arg(long, requires = "realtime")]
        stdin: bool,

        /// Record a replay to this file
        #[arg(long)]
        record: Option<PathBuf>,

        /// Write JSON lines here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Override the scenario's tick limit
        #[arg(short, long)]
        ticks: Option<u64>,
    },

    /// Check a scenario or configuration file
    Validate {
        /// File to check
        path: PathBuf,

        /// Treat the file as a bare simulation config
        #[arg(long)]
        config: bool,
    },

    /// Verify a recorded replay
    Replay {
        /// Replay file path
        file: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Logs go to stderr; stdout is for the protocol.
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    match cli.command {
        Commands::Run {
            scenario,
            realtime,
            stdin,
            record,
            output,
            ticks,
        } => cmd_run(
            scenario,
            RunOptions {
                tick_limit: ticks,
                realtime,
                record,
                stdin_commands: stdin,
            },
            output,
        ),
        Commands::Validate { path, config } => cmd_validate(&path, config),
        Commands::Replay { file } => cmd_replay(&file),
    }
}

/// Run a battle
fn cmd_run(scenario: Option<PathBuf>, options: RunOptions, output: Option<PathBuf>) -> ExitCode {
    let scenario = match scenario {
        Some(path) => match Scenario::load(&path) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("Failed to load scenario: {e}");
                return ExitCode::FAILURE;
            }
        },
        None => Scenario::duel(),
    };

    let mut out: Box<dyn Write> = match output {
        Some(path) => match File::create(&path) {
            Ok(file) => Box::new(BufWriter::new(file)),
            Err(e) => {
                eprintln!("Failed to create {}: {e}", path.display());
                return ExitCode::FAILURE;
            }
        },
        None => Box::new(io::stdout().lock()),
    };

    match HeadlessRunner::new(scenario, options).run(&mut out) {
        Ok(summary) => {
            match summary.winner {
                Some(team) => eprintln!("Team {team} wins after {} ticks", summary.ticks),
                None => eprintln!("No winner after {} ticks", summary.ticks),
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Run failed: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Check a scenario or bare config
fn cmd_validate(path: &Path, config_only: bool) -> ExitCode {
    let result = if config_only {
        std::fs::read_to_string(path)
            .map_err(|e| e.to_string())
            .and_then(|text| SimConfig::from_ron_str(&text).map(|_| ()).map_err(|e| e.to_string()))
    } else {
        Scenario::load(path)
            .and_then(|scenario| scenario.validate())
            .map_err(|e| e.to_string())
    };

    match result {
        Ok(()) => {
            eprintln!("OK: {}", path.display());
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("INVALID: {}: {e}", path.display());
            ExitCode::FAILURE
        }
    }
}

/// Verify a recorded replay
fn cmd_replay(file: &Path) -> ExitCode {
    tracing::info!("Verifying replay: {}", file.display());

    let replay = match Replay::load(file) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Failed to load replay: {e}");
            return ExitCode::FAILURE;
        }
    };

    eprintln!("Loaded replay:");
    eprintln!("  Scenario: {}", replay.scenario_id);
    eprintln!("  Commands: {}", replay.command_count());
    eprintln!("  Checkpoints: {}", replay.checkpoints.len());
    eprintln!("  Duration: {} ticks", replay.duration());

    let mut player = match ReplayPlayer::new(replay) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Failed to create replay player: {e}");
            return ExitCode::FAILURE;
        }
    };

    match player.verify() {
        Ok(()) => {
            eprintln!("PASS: Replay verification successful");
            eprintln!("  Final hash: {:016x}", player.replay().final_hash);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("FAIL: {e}");
            ExitCode::FAILURE
        }
    }
}
