//! Headless tank battle runner.
//!
//! Loads a scenario, drives every team with its configured controller, and
//! streams the battle as JSON lines:
//!
//! - **stdout** (or `--output`): `ready`, one `snapshot` per tick, `summary`
//! - **stdin** (realtime mode with `--stdin`): external tank commands
//! - **stderr**: logs
//!
//! Runs can be recorded to a replay file and verified later.
//!
//! # Example
//!
//! ```bash
//! # Play the built-in duel as fast as possible
//! cargo run -p copanzers_headless -- run
//!
//! # Pace a scenario in real time and record it
//! cargo run -p copanzers_headless -- run crates/copanzers_headless/scenarios/skirmish.ron \
//!     --realtime --record skirmish.replay
//!
//! # Check the recording reproduces
//! cargo run -p copanzers_headless -- replay skirmish.replay
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod ai;
pub mod protocol;
pub mod runner;
pub mod scenario;

pub use ai::{Controller, GunnerTuning, Pilot};
pub use protocol::{Message, PlayerCommand, RunSummary};
pub use runner::{HeadlessRunner, RunError, RunOptions};
pub use scenario::{Battle, Scenario, ScenarioError};
