//! Session state and authoritative tick loop

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use glam::Vec3;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::interval;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::util::time::{tick_delta, SIMULATION_TPS, SNAPSHOT_TPS};
use crate::ws::protocol::{ClientMsg, GameEvent, ServerMsg};

use super::authority::{NetRole, RemoteCall, RpcPolicy};
use super::character::{
    BeginPlay, Character, CharacterError, CharacterId, ClientCall, ClientCallQueue, Controller,
    Damageable, GameOver, GameOverBinding, Replicable,
};
use super::game_state::{GameState, GameStateSnapshot, MatchPhase};
use super::input::{Dispatch, InputBindings, InputEvent};
use super::observer::Observers;
use super::physics::Rotator;
use super::snapshot::{CharacterSnapshot, SnapshotBuilder};
use super::weapon::{DefaultWeaponFactory, WeaponKind};
use super::PlayerInput;

/// Spawn positions are picked inside this radius
const ARENA_RADIUS: f32 = 2000.0;

/// Everything the session task accepts
#[derive(Debug)]
pub enum SessionCommand {
    /// Message from a connected player
    Client(PlayerInput),
    /// Pushed by the game mode when a side is defeated
    GameOver { defeated_team_id: i32 },
    SetMaxPlayers(i32),
    SetMatchPhase(MatchPhase),
    Damage { character: CharacterId, amount: f32 },
    Respawn { character: CharacterId },
    Status(oneshot::Sender<SessionStatus>),
}

/// Read-only view returned to the HTTP layer
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub id: Uuid,
    pub tick: u64,
    pub game_state: GameStateSnapshot,
    pub characters: Vec<CharacterSnapshot>,
}

/// Session state (owned by the session task)
pub struct SessionState {
    pub id: Uuid,
    pub seed: u64,
    pub tick: u64,
    pub config: SessionConfig,
    pub game_state: GameState,
    pub characters: HashMap<CharacterId, Character>,
    pub game_over: Observers<GameOver>,
    pub client_calls: ClientCallQueue,
    pub bindings: InputBindings,
    /// Authorization predicates handed to every spawned character
    pub policy: RpcPolicy,
    pub weapon_factory: DefaultWeaponFactory,
    pub last_input_seq: HashMap<CharacterId, u32>,
    pub events: Vec<GameEvent>,
    pub rng: ChaCha8Rng,
}

impl SessionState {
    pub fn new(id: Uuid, seed: u64, config: SessionConfig) -> Self {
        Self {
            id,
            seed,
            tick: 0,
            config,
            game_state: GameState::new(),
            characters: HashMap::new(),
            game_over: Observers::new(),
            client_calls: ClientCallQueue::default(),
            bindings: InputBindings::character_defaults(),
            policy: RpcPolicy::allow_all(),
            weapon_factory: DefaultWeaponFactory,
            last_input_seq: HashMap::new(),
            events: Vec::new(),
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Generate a spawn position and heading for a new character
    pub fn generate_spawn(&mut self) -> (Vec3, f32) {
        let angle = self.rng.gen_range(0.0..std::f32::consts::TAU);
        let distance = self.rng.gen_range(0.0..ARENA_RADIUS);
        let yaw = self.rng.gen_range(0.0..360.0);
        (
            Vec3::new(angle.cos() * distance, angle.sin() * distance, 0.0),
            yaw,
        )
    }
}

/// Handle to the running session
#[derive(Clone)]
pub struct SessionHandle {
    pub id: Uuid,
    pub input_tx: mpsc::Sender<SessionCommand>,
    pub snapshot_tx: broadcast::Sender<ServerMsg>,
    pub player_count: Arc<AtomicUsize>,
}

impl SessionHandle {
    pub fn player_count(&self) -> usize {
        self.player_count.load(Ordering::Relaxed)
    }

    /// Queue a command, fire-and-forget
    pub async fn send(&self, command: SessionCommand) -> Result<(), SessionError> {
        self.input_tx
            .send(command)
            .await
            .map_err(|_| SessionError::Closed)
    }

    pub async fn status(&self) -> Result<SessionStatus, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.send(SessionCommand::Status(tx)).await?;
        rx.await.map_err(|_| SessionError::Closed)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session task has stopped")]
    Closed,
}

/// The authoritative game session
pub struct GameSession {
    state: SessionState,
    input_rx: mpsc::Receiver<SessionCommand>,
    snapshot_tx: broadcast::Sender<ServerMsg>,
    snapshot_builder: SnapshotBuilder,
    player_count: Arc<AtomicUsize>,
}

impl GameSession {
    /// Create a new session
    pub fn new(id: Uuid, seed: u64, config: SessionConfig) -> (Self, SessionHandle) {
        let (input_tx, input_rx) = mpsc::channel(256);
        let (snapshot_tx, _) = broadcast::channel(256);
        let player_count = Arc::new(AtomicUsize::new(0));

        let handle = SessionHandle {
            id,
            input_tx,
            snapshot_tx: snapshot_tx.clone(),
            player_count: player_count.clone(),
        };

        let mut state = SessionState::new(id, seed, config);

        // UI observers learn about every setter call
        let ui_tx = snapshot_tx.clone();
        state.game_state.subscribe(move |change| {
            let _ = ui_tx.send(ServerMsg::GameState { change: *change });
        });
        state
            .game_state
            .set_max_player_in_session(state.config.max_players);
        state.game_state.set_match_phase(MatchPhase::Waiting);

        let snapshot_interval = SIMULATION_TPS / SNAPSHOT_TPS;
        let session = Self {
            state,
            input_rx,
            snapshot_tx,
            snapshot_builder: SnapshotBuilder::new(snapshot_interval),
            player_count,
        };

        (session, handle)
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Run the authoritative tick loop until every handle is dropped
    pub async fn run(mut self) {
        info!(session_id = %self.state.id, "Session started");

        let tick_duration = Duration::from_micros(1_000_000 / SIMULATION_TPS as u64);
        let mut tick_interval = interval(tick_duration);
        tick_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tick_interval.tick().await;

            // Drain command queue
            if !self.process_commands() {
                info!(session_id = %self.state.id, "All handles dropped, ending session");
                break;
            }

            let events = self.run_tick();

            if self.snapshot_builder.should_send() {
                let delta = self.snapshot_builder.build_delta(
                    self.state.tick,
                    self.state.game_state.snapshot(),
                    &self.state.characters,
                    events,
                );
                let _ = self.snapshot_tx.send(delta);
            } else {
                // Keep events for the next delta
                self.state.events.extend(events);
            }
        }
    }

    /// Returns false once the command channel is closed and drained
    fn process_commands(&mut self) -> bool {
        loop {
            match self.input_rx.try_recv() {
                Ok(command) => self.handle_command(command),
                Err(mpsc::error::TryRecvError::Empty) => return true,
                Err(mpsc::error::TryRecvError::Disconnected) => return false,
            }
        }
    }

    pub fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Client(input) => match input.msg {
                ClientMsg::JoinSession { team_id, weapon } => {
                    self.handle_join(input.user_id, team_id, weapon);
                }
                ClientMsg::Input { seq, events } => {
                    self.handle_input(input.user_id, seq, &events);
                }
                ClientMsg::Ping { t } => {
                    let _ = self.snapshot_tx.send(ServerMsg::Pong {
                        character_id: input.user_id,
                        t,
                    });
                }
                ClientMsg::LeaveSession => {
                    self.handle_leave(input.user_id);
                }
            },
            SessionCommand::GameOver { defeated_team_id } => self.handle_game_over(defeated_team_id),
            SessionCommand::SetMaxPlayers(max) => self.state.game_state.set_max_player_in_session(max),
            SessionCommand::SetMatchPhase(phase) => self.state.game_state.set_match_phase(phase),
            SessionCommand::Damage { character, amount } => self.handle_damage(character, amount),
            SessionCommand::Respawn { character } => self.handle_respawn(character),
            SessionCommand::Status(reply) => {
                let _ = reply.send(self.status());
            }
        }
    }

    fn status(&self) -> SessionStatus {
        SessionStatus {
            id: self.state.id,
            tick: self.state.tick,
            game_state: self.state.game_state.snapshot(),
            characters: self
                .state
                .characters
                .values()
                .map(Replicable::snapshot)
                .collect(),
        }
    }

    /// Handle player join request
    fn handle_join(&mut self, id: CharacterId, team_id: i32, weapon: WeaponKind) {
        if self.state.characters.contains_key(&id) {
            warn!(character_id = %id, "Character already in session");
            return;
        }

        let max = self.state.game_state.max_players_in_session();
        if self.state.characters.len() as i32 >= max {
            let _ = self.snapshot_tx.send(ServerMsg::Error {
                character_id: id,
                code: "session_full".to_string(),
                message: "Session is full".to_string(),
            });
            return;
        }

        let (spawn, yaw) = self.state.generate_spawn();
        let mut character =
            Character::new(id, NetRole::Authority).with_policy(self.state.policy.clone());
        character.team_id = team_id;
        character.set_position(spawn);
        character.possess(Controller::new(Rotator::new(0.0, yaw, 0.0)));

        let state = &mut self.state;
        let result = character.begin_play(BeginPlay {
            weapon_factory: &mut state.weapon_factory,
            weapon_kind: weapon,
            hud: None,
            max_health: state.config.max_health,
            game_over: Some(GameOverBinding {
                observers: &mut state.game_over,
                deliver: state.client_calls.clone(),
            }),
        });
        if let Err(e) = result {
            warn!(character_id = %id, error = %e, "Character spawned incomplete");
        }

        state.characters.insert(id, character);
        let count = state.characters.len();
        self.player_count.store(count, Ordering::Relaxed);
        state.game_state.set_player_in_session(count as i32);

        let _ = self.snapshot_tx.send(ServerMsg::SessionJoined {
            character_id: id,
            seed: state.seed,
        });
        let _ = self.snapshot_tx.send(self.snapshot_builder.build_full(
            state.tick,
            state.game_state.snapshot(),
            &state.characters,
        ));

        info!(
            session_id = %state.id,
            character_id = %id,
            role = ?state.characters[&id].role(),
            player_count = count,
            "Character joined session"
        );

        if state.game_state.match_phase() == MatchPhase::Waiting
            && count as i32 >= state.config.min_players
        {
            state.game_state.set_match_phase(MatchPhase::InProgress);
        }
    }

    /// Handle player leave
    fn handle_leave(&mut self, id: CharacterId) {
        let Some(character) = self.state.characters.remove(&id) else {
            return;
        };

        if let Some(subscription) = character.game_over_subscription() {
            self.state.game_over.unsubscribe(subscription);
        }
        self.state.last_input_seq.remove(&id);

        let count = self.state.characters.len();
        self.player_count.store(count, Ordering::Relaxed);
        self.state.game_state.set_player_in_session(count as i32);

        let _ = self.snapshot_tx.send(ServerMsg::CharacterLeft {
            character_id: id,
            reason: "disconnected".to_string(),
        });

        info!(session_id = %self.state.id, character_id = %id, "Character left session");
    }

    /// Route named input to the character and serve its remote calls
    fn handle_input(&mut self, id: CharacterId, seq: u32, events: &[InputEvent]) {
        let Some(character) = self.state.characters.get_mut(&id) else {
            debug!(character_id = %id, "Input before join dropped");
            return;
        };

        let last = self.state.last_input_seq.entry(id).or_insert(0);
        if seq != 0 && seq <= *last {
            debug!(character_id = %id, seq, "Stale input dropped");
            return;
        }
        *last = seq;

        let dt = tick_delta();
        for event in events {
            match self.state.bindings.dispatch(character, event, dt) {
                Dispatch::Handled => {}
                Dispatch::Unbound => debug!(character_id = %id, ?event, "Unbound input"),
                Dispatch::InputDisabled => {
                    debug!(character_id = %id, "Input disabled, dropping batch");
                    break;
                }
            }
        }

        for call in character.take_remote_calls() {
            match call {
                RemoteCall::ServerShoot { .. } => match character.server_shoot() {
                    Ok(Some(shot)) => self.state.events.push(GameEvent::Shot(shot)),
                    Ok(None) => {}
                    Err(e) => warn!(character_id = %id, error = %e, "Server shoot failed"),
                },
            }
        }
    }

    /// Notify every subscribed character and end the match
    fn handle_game_over(&mut self, defeated_team_id: i32) {
        self.state.game_over.notify(&GameOver { defeated_team_id });

        let calls: Vec<ClientCall> = self.state.client_calls.lock().drain(..).collect();
        for call in calls {
            let ClientCall::GameOver {
                character,
                defeated_team_id,
            } = call;
            let Some(target) = self.state.characters.get_mut(&character) else {
                continue;
            };
            match target.client_game_over(defeated_team_id) {
                Ok(()) => {
                    let _ = self.snapshot_tx.send(ServerMsg::GameOver {
                        character_id: character,
                        defeated_team_id,
                    });
                }
                Err(e) => warn!(character_id = %character, error = %e, "Game over rejected"),
            }
        }

        self.state.game_state.set_match_phase(MatchPhase::GameOver);
        self.snapshot_builder.force_next();
        info!(session_id = %self.state.id, defeated_team_id, "Game over");
    }

    fn handle_damage(&mut self, id: CharacterId, amount: f32) {
        let Some(character) = self.state.characters.get_mut(&id) else {
            warn!(character_id = %id, "Damage for unknown character");
            return;
        };

        match character.take_damage(amount) {
            Ok(depleted) => {
                self.state.events.push(GameEvent::Damaged {
                    character_id: id,
                    amount,
                    health: character.health(),
                });
                if depleted {
                    self.kill(id);
                }
            }
            Err(e) => warn!(character_id = %id, error = %e, "Damage not applied"),
        }
    }

    fn kill(&mut self, id: CharacterId) {
        let Some(character) = self.state.characters.get_mut(&id) else {
            return;
        };
        match character.multicast_die() {
            Ok(()) => {
                let _ = self
                    .snapshot_tx
                    .send(ServerMsg::CharacterDied { character_id: id });
                self.snapshot_builder.force_next();
            }
            Err(CharacterError::Rejected(action)) => {
                warn!(character_id = %id, %action, "Death broadcast rejected");
            }
            Err(e) => warn!(character_id = %id, error = %e, "Death failed"),
        }
    }

    fn handle_respawn(&mut self, id: CharacterId) {
        let Some(character) = self.state.characters.get_mut(&id) else {
            warn!(character_id = %id, "Respawn for unknown character");
            return;
        };
        character.respawn();
        self.state.events.push(GameEvent::Respawned {
            character_id: id,
            health: character.health(),
        });
    }

    /// Run a single simulation tick
    pub fn run_tick(&mut self) -> Vec<GameEvent> {
        self.state.tick += 1;
        let dt = tick_delta();
        for character in self.state.characters.values_mut() {
            character.tick(dt);
        }
        std::mem::take(&mut self.state.events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::authority::RpcAction;
    use crate::game::character::{Lifecycle, Movable};
    use crate::game::input::{MOVE_FORWARD, SHOOT};

    fn session() -> (GameSession, SessionHandle, broadcast::Receiver<ServerMsg>) {
        let config = SessionConfig {
            min_players: 2,
            max_players: 3,
            max_health: 100.0,
        };
        let (session, handle) = GameSession::new(Uuid::new_v4(), 7, config);
        let rx = handle.snapshot_tx.subscribe();
        (session, handle, rx)
    }

    fn client(id: CharacterId, msg: ClientMsg) -> SessionCommand {
        SessionCommand::Client(PlayerInput { user_id: id, msg })
    }

    fn join(session: &mut GameSession, team_id: i32) -> CharacterId {
        let id = CharacterId(Uuid::new_v4());
        session.handle_command(client(
            id,
            ClientMsg::JoinSession {
                team_id,
                weapon: WeaponKind::Rifle,
            },
        ));
        id
    }

    fn drain(rx: &mut broadcast::Receiver<ServerMsg>) -> Vec<ServerMsg> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    #[test]
    fn joining_updates_counts_and_starts_match() {
        let (mut session, handle, _rx) = session();
        join(&mut session, 1);
        assert_eq!(session.state().game_state.match_phase(), MatchPhase::Waiting);

        join(&mut session, 2);
        let gs = &session.state().game_state;
        assert_eq!(gs.current_players_in_session(), 2);
        assert_eq!(gs.max_players_in_session(), 3);
        assert_eq!(gs.match_phase(), MatchPhase::InProgress);
        assert_eq!(handle.player_count(), 2);
    }

    #[test]
    fn full_session_rejects_join() {
        let (mut session, _handle, mut rx) = session();
        for team in 0..3 {
            join(&mut session, team);
        }
        drain(&mut rx);

        join(&mut session, 4);
        assert_eq!(session.state().characters.len(), 3);
        assert!(drain(&mut rx)
            .iter()
            .any(|m| matches!(m, ServerMsg::Error { code, .. } if code == "session_full")));
    }

    #[test]
    fn shoot_input_reaches_weapon_on_authority() {
        let (mut session, _handle, _rx) = session();
        let id = join(&mut session, 1);

        session.handle_command(client(
            id,
            ClientMsg::Input {
                seq: 1,
                events: vec![InputEvent::Action {
                    name: SHOOT.to_string(),
                    pressed: true,
                }],
            },
        ));

        let events = session.run_tick();
        assert!(events
            .iter()
            .any(|e| matches!(e, GameEvent::Shot(shot) if shot.shooter_id == id)));
    }

    fn shoot_batch(seq: u32) -> ClientMsg {
        ClientMsg::Input {
            seq,
            events: vec![InputEvent::Action {
                name: SHOOT.to_string(),
                pressed: true,
            }],
        }
    }

    #[test]
    fn dead_character_cannot_fire() {
        let (mut session, _handle, _rx) = session();
        let id = join(&mut session, 1);

        session.handle_command(SessionCommand::Damage {
            character: id,
            amount: 200.0,
        });
        assert_eq!(session.state().characters[&id].lifecycle(), Lifecycle::Disabled);

        session.handle_command(client(id, shoot_batch(1)));
        let events = session.run_tick();
        assert!(!events.iter().any(|e| matches!(e, GameEvent::Shot(_))));
        assert_eq!(session.state().characters[&id].weapon().unwrap().shots_fired, 0);
    }

    #[test]
    fn session_policy_reaches_spawned_characters() {
        let (mut session, _handle, _rx) = session();
        session.state.policy =
            RpcPolicy::allow_all().with_rule(RpcAction::ServerShoot, |_| false);
        let id = join(&mut session, 1);

        session.handle_command(client(id, shoot_batch(1)));
        let events = session.run_tick();
        assert!(!events.iter().any(|e| matches!(e, GameEvent::Shot(_))));
    }

    #[test]
    fn input_before_join_leaves_no_sequence_state() {
        let (mut session, _handle, _rx) = session();
        let stranger = CharacterId(Uuid::new_v4());

        session.handle_command(client(stranger, shoot_batch(3)));
        assert!(session.state().last_input_seq.is_empty());
    }

    #[test]
    fn ping_and_rejection_are_addressed() {
        let (mut session, _handle, mut rx) = session();
        for team in 0..3 {
            join(&mut session, team);
        }
        drain(&mut rx);

        let late = join(&mut session, 4);
        session.handle_command(client(late, ClientMsg::Ping { t: 9 }));
        let msgs = drain(&mut rx);
        assert!(msgs.iter().any(|m| matches!(
            m,
            ServerMsg::Error { character_id, .. } if *character_id == late
        )));
        assert!(msgs.iter().any(|m| matches!(
            m,
            ServerMsg::Pong { character_id, t: 9 } if *character_id == late
        )));
    }

    #[test]
    fn stale_input_is_ignored() {
        let (mut session, _handle, _rx) = session();
        let id = join(&mut session, 1);
        let forward = |seq| {
            client(
                id,
                ClientMsg::Input {
                    seq,
                    events: vec![InputEvent::Axis {
                        name: MOVE_FORWARD.to_string(),
                        value: 1.0,
                    }],
                },
            )
        };

        session.handle_command(forward(5));
        session.handle_command(forward(4));

        let pending = session.state().characters[&id].pending_movement_input();
        assert!((pending.length() - 1.0).abs() < 1e-5);

        let before = session.state().characters[&id].kinematics().position;
        session.run_tick();
        let after = session.state().characters[&id].kinematics().position;
        assert!((after - before).length() > 0.0);
    }

    #[test]
    fn lethal_damage_kills_and_broadcasts() {
        let (mut session, _handle, mut rx) = session();
        let id = join(&mut session, 1);
        drain(&mut rx);

        session.handle_command(SessionCommand::Damage {
            character: id,
            amount: 150.0,
        });

        let character = &session.state().characters[&id];
        assert_eq!(character.lifecycle(), Lifecycle::Disabled);
        assert!(character.visibility().hidden);
        assert!(drain(&mut rx)
            .iter()
            .any(|m| matches!(m, ServerMsg::CharacterDied { character_id } if *character_id == id)));

        session.handle_command(SessionCommand::Respawn { character: id });
        let character = &session.state().characters[&id];
        assert_eq!(character.health(), 100.0);
        assert!(character.visibility().hidden);
    }

    #[test]
    fn game_over_reaches_every_character() {
        let (mut session, _handle, mut rx) = session();
        let a = join(&mut session, 1);
        let b = join(&mut session, 2);
        drain(&mut rx);

        session.handle_command(SessionCommand::GameOver {
            defeated_team_id: 2,
        });

        let msgs = drain(&mut rx);
        for id in [a, b] {
            assert!(!session.state().characters[&id].input_enabled());
            assert!(msgs.iter().any(|m| matches!(
                m,
                ServerMsg::GameOver { character_id, defeated_team_id: 2 } if *character_id == id
            )));
        }
        assert_eq!(session.state().game_state.match_phase(), MatchPhase::GameOver);
    }

    #[test]
    fn leaving_drops_subscription_and_count() {
        let (mut session, _handle, _rx) = session();
        let a = join(&mut session, 1);
        join(&mut session, 2);
        assert_eq!(session.state().game_over.len(), 2);

        session.handle_command(client(a, ClientMsg::LeaveSession));
        assert_eq!(session.state().game_over.len(), 1);
        assert_eq!(session.state().game_state.current_players_in_session(), 1);
    }

    #[test]
    fn max_player_setter_is_unvalidated() {
        let (mut session, _handle, mut rx) = session();
        join(&mut session, 1);
        join(&mut session, 2);
        drain(&mut rx);

        session.handle_command(SessionCommand::SetMaxPlayers(1));
        assert_eq!(session.state().game_state.max_players_in_session(), 1);
        let changes: Vec<_> = drain(&mut rx)
            .into_iter()
            .filter(|m| matches!(m, ServerMsg::GameState { .. }))
            .collect();
        assert_eq!(changes.len(), 1);
    }

    #[test]
    fn stopped_session_reports_closed() {
        let (session, handle, _rx) = session();
        drop(session);
        let result = tokio_test::block_on(handle.status());
        assert!(matches!(result, Err(SessionError::Closed)));
    }

    #[tokio::test]
    async fn running_session_answers_status() {
        let (session, handle, _rx) = session();
        let task = tokio::spawn(session.run());

        let id = CharacterId(Uuid::new_v4());
        handle
            .send(client(
                id,
                ClientMsg::JoinSession {
                    team_id: 1,
                    weapon: WeaponKind::Pistol,
                },
            ))
            .await
            .unwrap();

        let status = handle.status().await.unwrap();
        assert_eq!(status.characters.len(), 1);
        assert_eq!(status.game_state.current_players, 1);

        drop(handle);
        task.await.unwrap();
    }
}
