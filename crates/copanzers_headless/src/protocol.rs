//! JSON-lines protocol for the headless runner.
//!
//! The runner writes one JSON object per line:
//!
//! **Output (stdout or `--output`):** a `ready` line, one `snapshot` line per
//! tick, and a closing `summary` line.
//! **Input (stdin, realtime mode only):** tank commands from an external
//! controller.
//!
//! # Example Session
//!
//! ```text
//! <- {"type":"ready","version":"1.0","scenario":"duel","tick":0}
//! -> {"tank_id":1,"move_x":30.0,"move_y":0.0,"turn":0.0,"fire":true}
//! <- {"type":"snapshot","tick":1,"hash":...,"entities":[...],"destroyed":[],"events":[...]}
//! <- {"type":"summary","ticks":600,"winner":0,"final_hash":...,"survivors":[...]}
//! ```
//!
//! Coordinates are converted from fixed-point to `f64` for readability only;
//! the binary snapshot encoding in the core is the exact form.

use serde::{Deserialize, Serialize};

use copanzers_core::components::{EntityId, EntityKind, TankCommand, TeamId};
use copanzers_core::events::{DestructionEvent, GameEvent};
use copanzers_core::math::{decimal_serde, Fixed, Vec2Fixed};
use copanzers_core::snapshot::Snapshot;

/// Protocol version reported in the `ready` line.
pub const PROTOCOL_VERSION: &str = "1.0";

// ============================================================================
// Input Commands (controller -> runner)
// ============================================================================

/// A tank command as sent by an external controller.
///
/// Numbers outside the fixed-point range fail to parse rather than being
/// silently clamped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerCommand {
    /// Tank to control.
    pub tank_id: EntityId,
    /// Desired velocity, x component.
    #[serde(default, with = "decimal_serde")]
    pub move_x: Fixed,
    /// Desired velocity, y component.
    #[serde(default, with = "decimal_serde")]
    pub move_y: Fixed,
    /// Desired turn rate in radians per second.
    #[serde(default, with = "decimal_serde")]
    pub turn: Fixed,
    /// Fire this tick.
    #[serde(default)]
    pub fire: bool,
}

impl PlayerCommand {
    /// Parse from a JSON line.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Convert into a simulation command.
    #[must_use]
    pub fn to_command(&self) -> TankCommand {
        TankCommand {
            tank_id: self.tank_id,
            move_vector: Vec2Fixed::new(self.move_x, self.move_y),
            turn_input: self.turn,
            fire: self.fire,
        }
    }
}

// ============================================================================
// Output Messages (runner -> consumer)
// ============================================================================

/// Lines written by the runner.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    /// Runner loaded the scenario and is about to tick.
    Ready {
        /// Protocol version.
        version: String,
        /// Scenario name.
        scenario: String,
        /// Starting tick.
        tick: u64,
    },

    /// State after one tick.
    Snapshot {
        /// Tick index.
        tick: u64,
        /// Simulation state hash after the tick.
        hash: u64,
        /// Live entities.
        entities: Vec<EntityState>,
        /// Entities removed this tick.
        destroyed: Vec<DestructionEvent>,
        /// Events raised this tick.
        events: Vec<GameEvent>,
    },

    /// The run is over.
    Summary(RunSummary),
}

/// Externally visible state of one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityState {
    /// Entity id.
    pub id: EntityId,
    /// Entity kind.
    pub kind: EntityKind,
    /// X coordinate.
    pub x: f64,
    /// Y coordinate.
    pub y: f64,
    /// Orientation in radians.
    pub orientation: f64,
    /// Health (tanks only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health: Option<u32>,
    /// Team (tanks only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team: Option<TeamId>,
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Ticks executed.
    pub ticks: u64,
    /// Last team with tanks standing, if exactly one remains.
    pub winner: Option<TeamId>,
    /// Live tank count per team, ascending by team.
    pub survivors: Vec<(TeamId, u32)>,
    /// State hash after the last tick.
    pub final_hash: u64,
    /// Frames in which the realtime scheduler fell behind.
    pub lag_frames: u64,
}

// ============================================================================
// Helpers
// ============================================================================

impl Message {
    /// Create a ready message.
    pub fn ready(scenario: impl Into<String>, tick: u64) -> Self {
        Self::Ready {
            version: PROTOCOL_VERSION.to_string(),
            scenario: scenario.into(),
            tick,
        }
    }

    /// Render a core snapshot.
    #[must_use]
    pub fn snapshot(snapshot: &Snapshot, hash: u64) -> Self {
        Self::Snapshot {
            tick: snapshot.tick,
            hash,
            entities: snapshot
                .entities
                .iter()
                .map(|e| EntityState {
                    id: e.id,
                    kind: e.kind,
                    x: e.position.x.to_num(),
                    y: e.position.y.to_num(),
                    orientation: e.orientation.to_num(),
                    health: e.health,
                    team: e.team,
                })
                .collect(),
            destroyed: snapshot.destroyed.clone(),
            events: snapshot.events.clone(),
        }
    }

    /// Serialize to JSON line (with newline).
    pub fn to_json_line(&self) -> String {
        let mut json = serde_json::to_string(self).unwrap_or_else(|e| {
            format!(r#"{{"type":"error","message":"Serialization failed: {e}"}}"#)
        });
        json.push('\n');
        json
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use copanzers_core::snapshot::EntitySnapshot;

    #[test]
    fn test_parse_player_command() {
        let json = r#"{"tank_id":3,"move_x":12.5,"fire":true}"#;
        let cmd = PlayerCommand::from_json(json).unwrap();
        assert_eq!(cmd.tank_id, 3);
        assert!(cmd.fire);

        let command = cmd.to_command();
        assert_eq!(command.move_vector.x, Fixed::from_num(12.5));
        assert_eq!(command.move_vector.y, Fixed::ZERO);
        assert_eq!(command.turn_input, Fixed::ZERO);
    }

    #[test]
    fn test_reject_malformed_command() {
        assert!(PlayerCommand::from_json(r#"{"move_x":1.0}"#).is_err());
        assert!(PlayerCommand::from_json("not json").is_err());
        assert!(PlayerCommand::from_json(r#"{"tank_id":1,"move_x":1e30}"#).is_err());
    }

    #[test]
    fn test_serialize_snapshot_message() {
        let snapshot = Snapshot {
            tick: 42,
            entities: vec![EntitySnapshot {
                id: 1,
                kind: EntityKind::Tank,
                position: Vec2Fixed::from_ints(100, 50),
                orientation: Fixed::ZERO,
                health: Some(70),
                team: Some(1),
            }],
            destroyed: Vec::new(),
            events: Vec::new(),
        };
        let json = Message::snapshot(&snapshot, 7).to_json_line();
        assert!(json.ends_with('\n'));
        assert!(json.contains(r#""type":"snapshot""#));
        assert!(json.contains(r#""tick":42"#));
        assert!(json.contains(r#""x":100.0"#));
        assert!(json.contains(r#""health":70"#));
    }

    #[test]
    fn test_projectiles_omit_tank_fields() {
        let state = EntityState {
            id: 9,
            kind: EntityKind::Projectile,
            x: 1.0,
            y: 2.0,
            orientation: 0.0,
            health: None,
            team: None,
        };
        let json = serde_json::to_string(&state).unwrap();
        assert!(!json.contains("health"));
        assert!(!json.contains("team"));
    }

    #[test]
    fn test_summary_round_trip() {
        let summary = Message::Summary(RunSummary {
            ticks: 600,
            winner: Some(0),
            survivors: vec![(0, 2), (1, 0)],
            final_hash: 99,
            lag_frames: 0,
        });
        let line = summary.to_json_line();
        assert!(line.contains(r#""type":"summary""#));
        let back: Message = serde_json::from_str(line.trim()).unwrap();
        assert!(matches!(back, Message::Summary(s) if s.winner == Some(0)));
    }
}
