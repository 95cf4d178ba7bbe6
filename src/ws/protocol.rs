//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use serde::{Deserialize, Serialize};

use crate::game::character::CharacterId;
use crate::game::game_state::{GameStateEvent, GameStateSnapshot};
use crate::game::input::InputEvent;
use crate::game::snapshot::CharacterSnapshot;
use crate::game::weapon::{Shot, WeaponKind};

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Spawn a character in the session
    JoinSession {
        /// Team the player fights for
        team_id: i32,
        /// Weapon to spawn with
        #[serde(default)]
        weapon: WeaponKind,
    },

    /// Named input samples gathered since the last message
    Input {
        /// Sequence number for ordering
        seq: u32,
        events: Vec<InputEvent>,
    },

    /// Ping for latency measurement
    Ping {
        /// Client timestamp
        t: u64,
    },

    /// Leave current session
    LeaveSession,
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Welcome message after connection
    Welcome {
        character_id: CharacterId,
        server_time: u64,
    },

    /// Confirmation of session join
    SessionJoined {
        character_id: CharacterId,
        /// Seed for deterministic random generation
        seed: u64,
    },

    /// Character left the session
    CharacterLeft {
        character_id: CharacterId,
        reason: String,
    },

    /// Full session state
    Snapshot {
        /// Server tick number
        tick: u64,
        game_state: GameStateSnapshot,
        characters: Vec<CharacterSnapshot>,
    },

    /// State changed since the previous delta
    Delta {
        tick: u64,
        /// Present only when the record changed
        game_state: Option<GameStateSnapshot>,
        characters: Vec<CharacterSnapshot>,
        removed: Vec<CharacterId>,
        /// Events that occurred since last delta
        events: Vec<GameEvent>,
    },

    /// A game state setter fired
    GameState {
        change: GameStateEvent,
    },

    /// Broadcast death: every copy hides and disables the character
    CharacterDied {
        character_id: CharacterId,
    },

    /// Owner-targeted game over
    GameOver {
        character_id: CharacterId,
        defeated_team_id: i32,
    },

    /// Error addressed to one connection
    Error {
        character_id: CharacterId,
        code: String,
        message: String,
    },

    /// Pong response
    Pong {
        character_id: CharacterId,
        /// Echo back client timestamp
        t: u64,
    },
}

/// Game events (shots, damage, respawns)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum GameEvent {
    /// Weapon fired on the authority
    Shot(Shot),

    /// Health reduced on the authority
    Damaged {
        character_id: CharacterId,
        amount: f32,
        health: f32,
    },

    /// Health restored to max
    Respawned {
        character_id: CharacterId,
        health: f32,
    },
}
