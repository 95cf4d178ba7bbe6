//! Replicated session record: player counts and match phase

use serde::{Deserialize, Serialize};

use super::observer::{Observers, SubscriptionId};

/// Match phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPhase {
    /// Waiting for players
    #[default]
    Waiting,
    /// Match in progress
    InProgress,
    /// A side has been defeated
    GameOver,
}

/// Notifications fired by the game state setters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum GameStateEvent {
    MatchPhaseChanged { phase: MatchPhase },
    MaxPlayersChanged { max_players: i32 },
    PlayerJoined { current_players: i32 },
}

/// Read-only copy of the record sent to observers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GameStateSnapshot {
    pub current_players: i32,
    pub max_players: i32,
    pub match_phase: MatchPhase,
}

/// Authoritative game state for one session.
///
/// The setters are the only way to change a field. Each call overwrites the
/// field and fires exactly one event, whether or not the value changed.
/// Nothing here checks `current_players <= max_players`.
#[derive(Debug, Default)]
pub struct GameState {
    current_players: i32,
    max_players: i32,
    match_phase: MatchPhase,
    observers: Observers<GameStateEvent>,
}

impl GameState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_players_in_session(&self) -> i32 {
        self.current_players
    }

    pub fn max_players_in_session(&self) -> i32 {
        self.max_players
    }

    pub fn match_phase(&self) -> MatchPhase {
        self.match_phase
    }

    pub fn set_player_in_session(&mut self, new_player_count: i32) {
        self.current_players = new_player_count;
        self.observers.notify(&GameStateEvent::PlayerJoined {
            current_players: new_player_count,
        });
    }

    pub fn set_max_player_in_session(&mut self, new_max_player_count: i32) {
        self.max_players = new_max_player_count;
        self.observers.notify(&GameStateEvent::MaxPlayersChanged {
            max_players: new_max_player_count,
        });
    }

    pub fn set_match_phase(&mut self, new_phase: MatchPhase) {
        self.match_phase = new_phase;
        self.observers
            .notify(&GameStateEvent::MatchPhaseChanged { phase: new_phase });
    }

    /// Register a listener for every setter notification
    pub fn subscribe<F>(&mut self, listener: F) -> SubscriptionId
    where
        F: FnMut(&GameStateEvent) + Send + 'static,
    {
        self.observers.subscribe(listener)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.observers.unsubscribe(id)
    }

    pub fn snapshot(&self) -> GameStateSnapshot {
        GameStateSnapshot {
            current_players: self.current_players,
            max_players: self.max_players,
            match_phase: self.match_phase,
        }
    }
}
