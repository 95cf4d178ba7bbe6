//! Snapshot and delta building for replication to clients

use std::collections::HashMap;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::ws::protocol::{GameEvent, ServerMsg};

use super::character::{Character, CharacterId, Lifecycle, Replicable};
use super::game_state::GameStateSnapshot;

/// Who may write a replicated field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldAccess {
    /// Written on the authority, read-only everywhere else
    AuthorityWritable,
    /// Computed locally on each copy, never sent
    Derived,
}

/// Fields covered by the replication contract
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicatedField {
    TeamId,
    /// Current and max health
    Health,
    Hidden,
    CollisionEnabled,
    GravityEnabled,
    Lifecycle,
    Position,
    Velocity,
    ControlRotation,
    CurrentPlayers,
    MaxPlayers,
    MatchPhase,
    LocallyControlled,
    CameraRig,
}

impl ReplicatedField {
    /// Per-character fields, in the order a proxy applies them
    pub const CHARACTER: [ReplicatedField; 11] = [
        ReplicatedField::TeamId,
        ReplicatedField::Position,
        ReplicatedField::Velocity,
        ReplicatedField::ControlRotation,
        ReplicatedField::Health,
        ReplicatedField::Hidden,
        ReplicatedField::CollisionEnabled,
        ReplicatedField::GravityEnabled,
        ReplicatedField::Lifecycle,
        ReplicatedField::LocallyControlled,
        ReplicatedField::CameraRig,
    ];

    pub fn access(self) -> FieldAccess {
        match self {
            ReplicatedField::LocallyControlled | ReplicatedField::CameraRig => FieldAccess::Derived,
            _ => FieldAccess::AuthorityWritable,
        }
    }
}

/// Character state in a snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterSnapshot {
    pub id: CharacterId,
    pub display_name: String,
    pub team_id: i32,
    pub position: Vec3,
    pub velocity: Vec3,
    /// Control rotation in degrees
    pub yaw: f32,
    pub pitch: f32,
    pub health: f32,
    pub max_health: f32,
    pub hidden: bool,
    pub collision_enabled: bool,
    pub gravity_enabled: bool,
    pub lifecycle: Lifecycle,
}

/// Builds snapshots for network transmission
pub struct SnapshotBuilder {
    /// Tick counter since last snapshot
    ticks_since_snapshot: u32,
    /// Snapshot interval in ticks
    snapshot_interval: u32,
    /// Last state sent, for delta calculation
    last_characters: HashMap<CharacterId, CharacterSnapshot>,
    last_game_state: Option<GameStateSnapshot>,
}

impl SnapshotBuilder {
    pub fn new(snapshot_interval: u32) -> Self {
        Self {
            ticks_since_snapshot: 0,
            snapshot_interval: snapshot_interval.max(1),
            last_characters: HashMap::new(),
            last_game_state: None,
        }
    }

    /// Check if it's time to send a snapshot
    pub fn should_send(&mut self) -> bool {
        self.ticks_since_snapshot += 1;
        if self.ticks_since_snapshot >= self.snapshot_interval {
            self.ticks_since_snapshot = 0;
            true
        } else {
            false
        }
    }

    /// Force snapshot on next check (used for important events)
    pub fn force_next(&mut self) {
        self.ticks_since_snapshot = self.snapshot_interval;
    }

    /// Full state, sent to players when they join
    pub fn build_full(
        &self,
        tick: u64,
        game_state: GameStateSnapshot,
        characters: &HashMap<CharacterId, Character>,
    ) -> ServerMsg {
        ServerMsg::Snapshot {
            tick,
            game_state,
            characters: characters.values().map(Replicable::snapshot).collect(),
        }
    }

    /// Only what changed since the previous delta
    pub fn build_delta(
        &mut self,
        tick: u64,
        game_state: GameStateSnapshot,
        characters: &HashMap<CharacterId, Character>,
        events: Vec<GameEvent>,
    ) -> ServerMsg {
        let mut changed = Vec::new();
        let mut current = HashMap::with_capacity(characters.len());

        for character in characters.values() {
            let snapshot = character.snapshot();
            if self.last_characters.get(&snapshot.id) != Some(&snapshot) {
                changed.push(snapshot.clone());
            }
            current.insert(snapshot.id, snapshot);
        }

        let removed: Vec<CharacterId> = self
            .last_characters
            .keys()
            .filter(|id| !current.contains_key(id))
            .copied()
            .collect();

        let game_state_changed = if self.last_game_state != Some(game_state) {
            Some(game_state)
        } else {
            None
        };

        self.last_characters = current;
        self.last_game_state = Some(game_state);

        ServerMsg::Delta {
            tick,
            game_state: game_state_changed,
            characters: changed,
            removed,
            events,
        }
    }
}
