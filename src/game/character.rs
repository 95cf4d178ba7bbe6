//! Player character: movement input, weapon, health and death

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use glam::Vec3;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::authority::{NetRole, RemoteCall, RpcAction, RpcContext, RpcPolicy};
use super::health::HealthTracker;
use super::observer::{Observers, SubscriptionId};
use super::physics::{CameraRig, Capsule, Kinematics, MovementTuning, PhysicsSystem, Rotator};
use super::snapshot::{CharacterSnapshot, FieldAccess, ReplicatedField};
use super::weapon::{AimSource, Shot, Weapon, WeaponFactory, WeaponKind};

/// Identity of a character, the id of the owning connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CharacterId(pub Uuid);

impl fmt::Display for CharacterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Player controller possessing a character
#[derive(Debug, Clone)]
pub struct Controller {
    pub control_rotation: Rotator,
    input_enabled: bool,
}

impl Controller {
    pub fn new(control_rotation: Rotator) -> Self {
        Self {
            control_rotation,
            input_enabled: true,
        }
    }

    pub fn add_yaw_input(&mut self, degrees: f32) {
        self.control_rotation.yaw = (self.control_rotation.yaw + degrees).rem_euclid(360.0);
    }

    pub fn add_pitch_input(&mut self, degrees: f32) {
        self.control_rotation.pitch = (self.control_rotation.pitch + degrees).clamp(-89.0, 89.0);
    }

    pub fn input_enabled(&self) -> bool {
        self.input_enabled
    }

    pub fn disable_input(&mut self) {
        self.input_enabled = false;
    }
}

impl Default for Controller {
    fn default() -> Self {
        Self::new(Rotator::default())
    }
}

/// Interactive lifetime of a character
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    #[default]
    Alive,
    Dying,
    /// Terminal until something outside the character revives it
    Disabled,
}

/// Render/collision flags toggled by death
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Visibility {
    pub hidden: bool,
    pub collision_enabled: bool,
    pub gravity_enabled: bool,
    pub gravity_scale: f32,
}

impl Default for Visibility {
    fn default() -> Self {
        Self {
            hidden: false,
            collision_enabled: true,
            gravity_enabled: true,
            gravity_scale: 1.0,
        }
    }
}

/// Player heads-up display, only present on the owning client
pub trait Hud: Send {
    /// Bind the health bar to a tracker
    fn set_health_source(&mut self, health: Arc<HealthTracker>);
    fn update_defeated_team(&mut self, defeated: bool);
    fn set_game_over_visible(&mut self, visible: bool);
}

/// Screen-space health bar floating above characters that are not locally controlled
#[derive(Debug, Clone)]
pub struct WorldHealthWidget {
    pub health: Arc<HealthTracker>,
}

/// Where a character's health is displayed
#[derive(Debug, Clone, Default)]
pub enum HealthDisplay {
    #[default]
    None,
    /// Pushed to the owning player's HUD
    Hud,
    WorldSpace(WorldHealthWidget),
}

/// Session-level game-over notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameOver {
    pub defeated_team_id: i32,
}

/// Owner-targeted call queued by a game-over subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientCall {
    GameOver {
        character: CharacterId,
        defeated_team_id: i32,
    },
}

pub type ClientCallQueue = Arc<Mutex<VecDeque<ClientCall>>>;

/// Session hooks a character registers with on the authority
pub struct GameOverBinding<'a> {
    pub observers: &'a mut Observers<GameOver>,
    pub deliver: ClientCallQueue,
}

/// Everything `begin_play` needs from the world
pub struct BeginPlay<'a> {
    pub weapon_factory: &'a mut dyn WeaponFactory,
    pub weapon_kind: WeaponKind,
    pub hud: Option<Box<dyn Hud>>,
    pub max_health: f32,
    pub game_over: Option<GameOverBinding<'a>>,
}

#[derive(Debug, thiserror::Error)]
pub enum CharacterError {
    #[error("{0} may only run on the authority")]
    NotAuthority(RpcAction),

    #[error("{0} rejected by policy")]
    Rejected(RpcAction),

    #[error("character {0} has no weapon")]
    MissingWeapon(CharacterId),

    #[error("character {0} is not alive")]
    NotAlive(CharacterId),

    #[error("weapon spawn failed for character {0}")]
    WeaponSpawnFailed(CharacterId),

    #[error("health of character {0} is only writable on the authority")]
    HealthNotAuthoritative(CharacterId),

    #[error("the authority does not accept replicated state")]
    SnapshotOnAuthority,
}

/// Something that takes movement input and is advanced by the movement step
pub trait Movable {
    fn add_movement_input(&mut self, direction: Vec3, scale: f32);
    fn step_movement(&mut self, dt: f32);
    fn kinematics(&self) -> Kinematics;
}

/// Something with health that the authority can damage
pub trait Damageable {
    fn health(&self) -> f32;
    /// Returns true when this call depleted health
    fn take_damage(&mut self, amount: f32) -> Result<bool, CharacterError>;
}

/// Something whose authoritative fields are pushed to proxies
pub trait Replicable {
    type Snapshot;
    fn snapshot(&self) -> Self::Snapshot;
    fn apply_snapshot(&mut self, snapshot: &Self::Snapshot) -> Result<(), CharacterError>;
}

/// A player character
pub struct Character {
    id: CharacterId,
    pub display_name: String,
    pub team_id: i32,
    role: NetRole,

    controller: Option<Controller>,
    policy: RpcPolicy,

    pub camera: CameraRig,
    pub capsule: Capsule,
    pub movement: MovementTuning,

    health: Arc<HealthTracker>,
    max_health: f32,
    weapon: Option<Weapon>,
    hud: Option<Box<dyn Hud>>,
    health_display: HealthDisplay,
    game_over_subscription: Option<SubscriptionId>,

    kinematics: Kinematics,
    pending_input: Vec3,
    jump_requested: bool,
    visibility: Visibility,
    lifecycle: Lifecycle,

    outbox: Vec<RemoteCall>,
}

impl Character {
    pub fn new(id: CharacterId, role: NetRole) -> Self {
        Self {
            id,
            display_name: format!("Player_{}", &id.0.to_string()[..8]),
            team_id: 0,
            role,
            controller: None,
            policy: RpcPolicy::allow_all(),
            camera: CameraRig::default(),
            capsule: Capsule::default(),
            movement: MovementTuning::default(),
            health: Arc::new(HealthTracker::new()),
            max_health: 0.0,
            weapon: None,
            hud: None,
            health_display: HealthDisplay::None,
            game_over_subscription: None,
            kinematics: Kinematics::default(),
            pending_input: Vec3::ZERO,
            jump_requested: false,
            visibility: Visibility::default(),
            lifecycle: Lifecycle::Alive,
            outbox: Vec::new(),
        }
    }

    pub fn with_policy(mut self, policy: RpcPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn id(&self) -> CharacterId {
        self.id
    }

    pub fn role(&self) -> NetRole {
        self.role
    }

    pub fn is_locally_controlled(&self) -> bool {
        match self.role {
            NetRole::AutonomousProxy => true,
            NetRole::Authority | NetRole::SimulatedProxy => false,
        }
    }

    pub fn possess(&mut self, controller: Controller) {
        self.controller = Some(controller);
    }

    pub fn controller(&self) -> Option<&Controller> {
        self.controller.as_ref()
    }

    pub fn input_enabled(&self) -> bool {
        self.controller
            .as_ref()
            .map(Controller::input_enabled)
            .unwrap_or(false)
    }

    pub fn health_tracker(&self) -> &Arc<HealthTracker> {
        &self.health
    }

    pub fn weapon(&self) -> Option<&Weapon> {
        self.weapon.as_ref()
    }

    pub fn health_display(&self) -> &HealthDisplay {
        &self.health_display
    }

    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn game_over_subscription(&self) -> Option<SubscriptionId> {
        self.game_over_subscription
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.kinematics.position = position;
    }

    /// Spawn-time setup: weapon, HUD, health and the game-over subscription.
    ///
    /// A failed weapon spawn does not stop the rest of the setup; it is
    /// reported once everything else is in place and the character stays
    /// weaponless.
    pub fn begin_play(&mut self, ctx: BeginPlay<'_>) -> Result<(), CharacterError> {
        // A character keeps its first weapon for its whole lifetime
        if self.weapon.is_none() {
            self.weapon = ctx.weapon_factory.spawn_weapon(ctx.weapon_kind, self.id);
        } else {
            debug!(character_id = %self.id, "Weapon already spawned, keeping it");
        }
        let weapon_missing = self.weapon.is_none();

        self.hud = ctx.hud;
        self.max_health = ctx.max_health;

        if self.role.has_authority() {
            self.health.initialize_health(ctx.max_health);

            if let Some(binding) = ctx.game_over {
                let character = self.id;
                let deliver = binding.deliver;
                let id = binding
                    .observers
                    .subscribe_unique(character.to_string(), move |event: &GameOver| {
                        deliver.lock().push_back(ClientCall::GameOver {
                            character,
                            defeated_team_id: event.defeated_team_id,
                        });
                    });
                self.game_over_subscription = Some(id);
            }

            info!(character_id = %self.id, max_health = ctx.max_health, "Health initialized");
        }

        if self.is_locally_controlled() {
            if let Some(hud) = self.hud.as_mut() {
                hud.set_health_source(self.health.clone());
                self.health_display = HealthDisplay::Hud;
            }
        } else {
            self.health_display = HealthDisplay::WorldSpace(WorldHealthWidget {
                health: self.health.clone(),
            });
        }

        if weapon_missing {
            warn!(character_id = %self.id, "Weapon spawn failed, character is unarmed");
            return Err(CharacterError::WeaponSpawnFailed(self.id));
        }
        Ok(())
    }

    /// Queue movement along the controller's forward axis
    pub fn move_forward(&mut self, value: f32) {
        let Some(controller) = self.controller.as_ref() else {
            return;
        };
        if value == 0.0 {
            return;
        }
        let direction = controller.control_rotation.yaw_only().forward();
        self.add_movement_input(direction, value);
    }

    /// Queue movement along the controller's right axis
    pub fn move_right(&mut self, value: f32) {
        let Some(controller) = self.controller.as_ref() else {
            return;
        };
        if value == 0.0 {
            return;
        }
        let direction = controller.control_rotation.yaw_only().right();
        self.add_movement_input(direction, value);
    }

    pub fn turn_at_rate(&mut self, rate: f32, dt: f32) {
        let delta = rate * self.movement.turn_rate_gamepad * dt;
        self.add_controller_yaw_input(delta);
    }

    pub fn look_up_at_rate(&mut self, rate: f32, dt: f32) {
        let delta = rate * self.movement.turn_rate_gamepad * dt;
        self.add_controller_pitch_input(delta);
    }

    pub fn add_controller_yaw_input(&mut self, degrees: f32) {
        if let Some(controller) = self.controller.as_mut() {
            controller.add_yaw_input(degrees);
        }
    }

    pub fn add_controller_pitch_input(&mut self, degrees: f32) {
        if let Some(controller) = self.controller.as_mut() {
            controller.add_pitch_input(degrees);
        }
    }

    pub fn jump(&mut self) {
        self.jump_requested = true;
    }

    pub fn stop_jumping(&mut self) {
        self.jump_requested = false;
    }

    /// Ask the authority to fire. No local effect until state comes back.
    pub fn shoot(&mut self) {
        self.outbox.push(RemoteCall::ServerShoot { character: self.id });
    }

    /// Reserved for automatic fire
    pub fn stop_shoot(&mut self) {}

    /// Drain requests queued for the authority
    pub fn take_remote_calls(&mut self) -> Vec<RemoteCall> {
        std::mem::take(&mut self.outbox)
    }

    /// Camera transform the weapon traces from
    pub fn aim_source(&self) -> AimSource {
        let rotation = self
            .controller
            .as_ref()
            .map(|c| c.control_rotation)
            .unwrap_or_default();
        let pivot = self.kinematics.position + Vec3::Z * self.capsule.half_height;
        AimSource {
            location: self.camera.camera_location(pivot, &rotation),
            rotation,
        }
    }

    /// Authority side of `shoot`
    pub fn server_shoot(&mut self) -> Result<Option<Shot>, CharacterError> {
        self.check(RpcAction::ServerShoot, None)?;
        if !self.role.has_authority() {
            return Err(CharacterError::NotAuthority(RpcAction::ServerShoot));
        }
        if self.lifecycle != Lifecycle::Alive {
            debug!(character_id = %self.id, lifecycle = ?self.lifecycle, "Shoot from a dead character");
            return Err(CharacterError::NotAlive(self.id));
        }

        let aim = self.aim_source();
        let Some(weapon) = self.weapon.as_mut() else {
            warn!(character_id = %self.id, "Shoot requested without a weapon");
            return Err(CharacterError::MissingWeapon(self.id));
        };

        let shot = weapon.shoot(&aim);
        if shot.is_none() {
            debug!(character_id = %self.id, "Weapon cooling down");
        }
        Ok(shot)
    }

    /// Show the game-over screen and stop taking input
    pub fn client_game_over(&mut self, defeated_team_id: i32) -> Result<(), CharacterError> {
        self.check(RpcAction::ClientGameOver, Some(defeated_team_id))?;

        if let Some(hud) = self.hud.as_mut() {
            hud.update_defeated_team(true);
            hud.set_game_over_visible(true);
        }

        match self.controller.as_mut() {
            Some(controller) => controller.disable_input(),
            None => debug!(character_id = %self.id, "Game over with no controller"),
        }

        info!(character_id = %self.id, defeated_team_id, "Game over");
        Ok(())
    }

    /// Runs on every copy of the character: hide it and take it out of the world
    pub fn multicast_die(&mut self) -> Result<(), CharacterError> {
        self.check(RpcAction::MulticastDie, None)?;
        self.lifecycle = Lifecycle::Dying;

        if self.is_locally_controlled() {
            if let Some(controller) = self.controller.as_mut() {
                controller.disable_input();
            }
        }

        self.visibility.hidden = true;
        self.visibility.gravity_enabled = false;
        self.visibility.gravity_scale = 0.0;
        self.visibility.collision_enabled = false;
        self.kinematics.velocity = Vec3::ZERO;
        self.pending_input = Vec3::ZERO;

        self.lifecycle = Lifecycle::Disabled;
        info!(character_id = %self.id, role = ?self.role, "Character died");
        Ok(())
    }

    /// Restore health to max. Visibility, collision and input stay as they are.
    pub fn respawn(&mut self) {
        self.health.initialize_health(self.max_health);
    }

    pub fn pending_movement_input(&self) -> Vec3 {
        self.pending_input
    }

    /// Advance weapon cooldown and movement
    pub fn tick(&mut self, dt: f32) {
        if let Some(weapon) = self.weapon.as_mut() {
            weapon.tick(dt);
        }
        self.step_movement(dt);
    }

    fn check(&self, action: RpcAction, team_id: Option<i32>) -> Result<(), CharacterError> {
        let ctx = RpcContext {
            action,
            character: self.id,
            role: self.role,
            team_id,
        };
        if self.policy.authorize(&ctx) {
            Ok(())
        } else {
            warn!(character_id = %self.id, %action, "Remote call rejected");
            Err(CharacterError::Rejected(action))
        }
    }
}

impl Movable for Character {
    fn add_movement_input(&mut self, direction: Vec3, scale: f32) {
        self.pending_input += direction * scale;
    }

    fn step_movement(&mut self, dt: f32) {
        let input = std::mem::take(&mut self.pending_input);
        let jump = std::mem::take(&mut self.jump_requested);
        if self.lifecycle != Lifecycle::Alive {
            return;
        }
        self.kinematics = PhysicsSystem::step(
            self.kinematics,
            input,
            jump,
            self.visibility.gravity_scale,
            &self.movement,
            dt,
        );
    }

    fn kinematics(&self) -> Kinematics {
        self.kinematics
    }
}

impl Damageable for Character {
    fn health(&self) -> f32 {
        self.health.current()
    }

    fn take_damage(&mut self, amount: f32) -> Result<bool, CharacterError> {
        if !self.role.has_authority() {
            return Err(CharacterError::HealthNotAuthoritative(self.id));
        }
        let was_depleted = self.health.is_depleted();
        let (_, depleted) = self.health.apply_damage(amount);
        Ok(depleted && !was_depleted)
    }
}

impl Replicable for Character {
    type Snapshot = CharacterSnapshot;

    fn snapshot(&self) -> CharacterSnapshot {
        let rotation = self
            .controller
            .as_ref()
            .map(|c| c.control_rotation)
            .unwrap_or_default();
        CharacterSnapshot {
            id: self.id,
            display_name: self.display_name.clone(),
            team_id: self.team_id,
            position: self.kinematics.position,
            velocity: self.kinematics.velocity,
            yaw: rotation.yaw,
            pitch: rotation.pitch,
            health: self.health.current(),
            max_health: self.health.max(),
            hidden: self.visibility.hidden,
            collision_enabled: self.visibility.collision_enabled,
            gravity_enabled: self.visibility.gravity_enabled,
            lifecycle: self.lifecycle,
        }
    }

    fn apply_snapshot(&mut self, snapshot: &CharacterSnapshot) -> Result<(), CharacterError> {
        if self.role.has_authority() {
            return Err(CharacterError::SnapshotOnAuthority);
        }
        for field in ReplicatedField::CHARACTER {
            if field.access() == FieldAccess::AuthorityWritable {
                self.apply_field(field, snapshot);
            }
        }
        Ok(())
    }
}

impl Character {
    /// Copy one authority-written field out of a snapshot
    fn apply_field(&mut self, field: ReplicatedField, snapshot: &CharacterSnapshot) {
        match field {
            ReplicatedField::TeamId => self.team_id = snapshot.team_id,
            ReplicatedField::Position => self.kinematics.position = snapshot.position,
            ReplicatedField::Velocity => self.kinematics.velocity = snapshot.velocity,
            ReplicatedField::Health => self.health.replicate(snapshot.health, snapshot.max_health),
            ReplicatedField::Hidden => self.visibility.hidden = snapshot.hidden,
            ReplicatedField::CollisionEnabled => {
                self.visibility.collision_enabled = snapshot.collision_enabled
            }
            ReplicatedField::GravityEnabled => {
                self.visibility.gravity_enabled = snapshot.gravity_enabled;
                self.visibility.gravity_scale = if snapshot.gravity_enabled { 1.0 } else { 0.0 };
            }
            ReplicatedField::Lifecycle => self.lifecycle = snapshot.lifecycle,
            ReplicatedField::ControlRotation => {
                // Owners keep their own aim
                if self.is_locally_controlled() {
                    return;
                }
                if let Some(controller) = self.controller.as_mut() {
                    controller.control_rotation.yaw = snapshot.yaw;
                    controller.control_rotation.pitch = snapshot.pitch;
                }
            }
            ReplicatedField::LocallyControlled
            | ReplicatedField::CameraRig
            | ReplicatedField::CurrentPlayers
            | ReplicatedField::MaxPlayers
            | ReplicatedField::MatchPhase => {}
        }
    }
}

impl fmt::Debug for Character {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Character")
            .field("id", &self.id)
            .field("role", &self.role)
            .field("health", &self.health.current())
            .field("lifecycle", &self.lifecycle)
            .field("visibility", &self.visibility)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::weapon::DefaultWeaponFactory;

    #[derive(Default, Clone)]
    struct HudLog {
        health_bound: bool,
        defeated: bool,
        game_over_visible: bool,
    }

    struct RecordingHud(Arc<Mutex<HudLog>>);

    impl Hud for RecordingHud {
        fn set_health_source(&mut self, _health: Arc<HealthTracker>) {
            self.0.lock().health_bound = true;
        }
        fn update_defeated_team(&mut self, defeated: bool) {
            self.0.lock().defeated = defeated;
        }
        fn set_game_over_visible(&mut self, visible: bool) {
            self.0.lock().game_over_visible = visible;
        }
    }

    struct FailingFactory;

    impl WeaponFactory for FailingFactory {
        fn spawn_weapon(&mut self, _kind: WeaponKind, _owner: CharacterId) -> Option<Weapon> {
            None
        }
    }

    fn new_id() -> CharacterId {
        CharacterId(Uuid::new_v4())
    }

    fn spawned(role: NetRole, hud: Option<Box<dyn Hud>>) -> Character {
        let mut character = Character::new(new_id(), role);
        let mut factory = DefaultWeaponFactory;
        character
            .begin_play(BeginPlay {
                weapon_factory: &mut factory,
                weapon_kind: WeaponKind::Rifle,
                hud,
                max_health: 100.0,
                game_over: None,
            })
            .unwrap();
        character
    }

    #[test]
    fn zero_axis_value_queues_nothing() {
        let mut character = spawned(NetRole::Authority, None);
        character.possess(Controller::default());
        character.move_forward(0.0);
        character.move_right(0.0);
        assert_eq!(character.pending_movement_input(), Vec3::ZERO);
    }

    #[test]
    fn movement_without_controller_is_ignored() {
        let mut character = spawned(NetRole::Authority, None);
        character.move_forward(1.0);
        assert_eq!(character.pending_movement_input(), Vec3::ZERO);
    }

    #[test]
    fn movement_follows_controller_yaw_only() {
        let mut character = spawned(NetRole::Authority, None);
        character.possess(Controller::new(Rotator::new(60.0, 90.0, 0.0)));

        character.move_forward(0.5);
        let input = character.pending_movement_input();
        assert!((input - Vec3::new(0.0, 0.5, 0.0)).length() < 1e-5);

        character.move_right(1.0);
        let input = character.pending_movement_input();
        assert!((input - Vec3::new(-1.0, 0.5, 0.0)).length() < 1e-5);
    }

    #[test]
    fn turn_rate_scales_by_constant_and_frame_time() {
        let mut character = spawned(NetRole::Authority, None);
        character.possess(Controller::default());

        character.turn_at_rate(1.0, 0.5);
        character.look_up_at_rate(-0.5, 0.2);

        let rotation = character.controller().unwrap().control_rotation;
        assert!((rotation.yaw - 25.0).abs() < 1e-4);
        assert!((rotation.pitch + 5.0).abs() < 1e-4);
    }

    #[test]
    fn mouse_input_wraps_yaw_and_clamps_pitch() {
        let mut character = spawned(NetRole::Authority, None);
        character.possess(Controller::default());

        character.add_controller_yaw_input(-30.0);
        character.add_controller_pitch_input(200.0);

        let rotation = character.controller().unwrap().control_rotation;
        assert!((rotation.yaw - 330.0).abs() < 1e-4);
        assert_eq!(rotation.pitch, 89.0);
    }

    #[test]
    fn shoot_without_controller_still_requests_authority() {
        let mut character = Character::new(new_id(), NetRole::AutonomousProxy);
        character.shoot();
        character.stop_shoot();
        assert_eq!(
            character.take_remote_calls(),
            vec![RemoteCall::ServerShoot {
                character: character.id()
            }]
        );
        assert!(character.take_remote_calls().is_empty());
    }

    #[test]
    fn server_shoot_fires_held_weapon() {
        let mut character = spawned(NetRole::Authority, None);
        let shot = character.server_shoot().unwrap().expect("weapon ready");
        assert_eq!(shot.shooter_id, character.id());
        assert_eq!(character.weapon().unwrap().shots_fired, 1);
    }

    #[test]
    fn server_shoot_on_proxy_is_refused() {
        let mut character = spawned(NetRole::SimulatedProxy, None);
        assert!(matches!(
            character.server_shoot(),
            Err(CharacterError::NotAuthority(RpcAction::ServerShoot))
        ));
    }

    #[test]
    fn failed_weapon_spawn_is_reported_and_shoot_guards() {
        let mut character = Character::new(new_id(), NetRole::Authority);
        let mut factory = FailingFactory;
        let result = character.begin_play(BeginPlay {
            weapon_factory: &mut factory,
            weapon_kind: WeaponKind::Rifle,
            hud: None,
            max_health: 100.0,
            game_over: None,
        });

        assert!(matches!(result, Err(CharacterError::WeaponSpawnFailed(_))));
        assert_eq!(character.health(), 100.0);
        assert!(matches!(
            character.server_shoot(),
            Err(CharacterError::MissingWeapon(_))
        ));
    }

    #[test]
    fn policy_can_reject_shoot() {
        let mut character = spawned(NetRole::Authority, None);
        character.policy = RpcPolicy::allow_all().with_rule(RpcAction::ServerShoot, |_| false);
        assert!(matches!(
            character.server_shoot(),
            Err(CharacterError::Rejected(RpcAction::ServerShoot))
        ));
    }

    #[test]
    fn respawn_restores_max_health_only() {
        let mut character = spawned(NetRole::Authority, None);
        character.take_damage(100.0).unwrap();
        character.multicast_die().unwrap();

        character.respawn();

        assert_eq!(character.health(), 100.0);
        assert!(character.visibility().hidden);
        assert_eq!(character.lifecycle(), Lifecycle::Disabled);
    }

    #[test]
    fn die_disables_every_replica() {
        for role in [
            NetRole::Authority,
            NetRole::AutonomousProxy,
            NetRole::SimulatedProxy,
        ] {
            let mut character = spawned(role, None);
            character.possess(Controller::default());
            character.multicast_die().unwrap();

            let vis = character.visibility();
            assert!(vis.hidden, "{role:?}");
            assert!(!vis.collision_enabled, "{role:?}");
            assert!(!vis.gravity_enabled, "{role:?}");
            assert_eq!(vis.gravity_scale, 0.0);
            assert_eq!(character.lifecycle(), Lifecycle::Disabled);

            // Only the owning copy loses input
            assert_eq!(
                character.input_enabled(),
                !character.is_locally_controlled(),
                "{role:?}"
            );
        }
    }

    #[test]
    fn game_over_updates_hud_and_disables_input() {
        let log = Arc::new(Mutex::new(HudLog::default()));
        let mut character = spawned(
            NetRole::AutonomousProxy,
            Some(Box::new(RecordingHud(log.clone()))),
        );
        character.possess(Controller::default());

        character.client_game_over(2).unwrap();

        let log = log.lock().clone();
        assert!(log.health_bound);
        assert!(log.defeated);
        assert!(log.game_over_visible);
        assert!(!character.input_enabled());
    }

    #[test]
    fn remote_copies_get_world_space_health() {
        let character = spawned(NetRole::SimulatedProxy, None);
        match character.health_display() {
            HealthDisplay::WorldSpace(widget) => {
                assert!(Arc::ptr_eq(&widget.health, character.health_tracker()));
            }
            other => panic!("unexpected display {other:?}"),
        }
    }

    #[test]
    fn authority_subscribes_to_game_over_once() {
        let mut observers = Observers::<GameOver>::new();
        let queue: ClientCallQueue = Arc::default();
        let mut character = Character::new(new_id(), NetRole::Authority);
        let mut factory = DefaultWeaponFactory;

        for _ in 0..2 {
            character
                .begin_play(BeginPlay {
                    weapon_factory: &mut factory,
                    weapon_kind: WeaponKind::Rifle,
                    hud: None,
                    max_health: 100.0,
                    game_over: Some(GameOverBinding {
                        observers: &mut observers,
                        deliver: queue.clone(),
                    }),
                })
                .unwrap();
        }

        observers.notify(&GameOver {
            defeated_team_id: 3,
        });
        let calls: Vec<_> = queue.lock().drain(..).collect();
        assert_eq!(
            calls,
            vec![ClientCall::GameOver {
                character: character.id(),
                defeated_team_id: 3
            }]
        );
    }

    #[test]
    fn proxies_apply_snapshots_and_authority_refuses() {
        let mut authority = spawned(NetRole::Authority, None);
        authority.take_damage(40.0).unwrap();
        let snapshot = authority.snapshot();

        let mut proxy = Character::new(authority.id(), NetRole::SimulatedProxy);
        proxy.apply_snapshot(&snapshot).unwrap();
        assert_eq!(proxy.health(), 60.0);
        assert_eq!(proxy.health_tracker().max(), 100.0);

        assert!(matches!(
            authority.apply_snapshot(&snapshot),
            Err(CharacterError::SnapshotOnAuthority)
        ));
    }

    #[test]
    fn owners_keep_their_aim_when_snapshots_arrive() {
        let mut authority = spawned(NetRole::Authority, None);
        authority.possess(Controller::new(Rotator::new(10.0, 90.0, 0.0)));
        authority.multicast_die().unwrap();
        let snapshot = authority.snapshot();

        let mut owner = Character::new(authority.id(), NetRole::AutonomousProxy);
        owner.possess(Controller::default());
        owner.camera.arm_length = 250.0;
        owner.apply_snapshot(&snapshot).unwrap();
        assert_eq!(owner.controller().unwrap().control_rotation.yaw, 0.0);
        assert_eq!(owner.camera.arm_length, 250.0);
        assert_eq!(owner.lifecycle(), Lifecycle::Disabled);
        assert!(owner.visibility().hidden);

        let mut remote = Character::new(authority.id(), NetRole::SimulatedProxy);
        remote.possess(Controller::default());
        remote.apply_snapshot(&snapshot).unwrap();
        assert_eq!(remote.controller().unwrap().control_rotation.yaw, 90.0);
        assert_eq!(remote.controller().unwrap().control_rotation.pitch, 10.0);
    }

    #[test]
    fn second_begin_play_keeps_the_first_weapon() {
        let mut character = spawned(NetRole::Authority, None);
        character.possess(Controller::default());
        character.server_shoot().unwrap();

        let mut factory = DefaultWeaponFactory;
        character
            .begin_play(BeginPlay {
                weapon_factory: &mut factory,
                weapon_kind: WeaponKind::Pistol,
                hud: None,
                max_health: 100.0,
                game_over: None,
            })
            .unwrap();

        let weapon = character.weapon().unwrap();
        assert_eq!(weapon.kind, WeaponKind::Rifle);
        assert_eq!(weapon.shots_fired, 1);
    }

    #[test]
    fn dead_character_cannot_shoot() {
        let mut character = spawned(NetRole::Authority, None);
        character.possess(Controller::default());
        character.multicast_die().unwrap();

        assert!(matches!(
            character.server_shoot(),
            Err(CharacterError::NotAlive(_))
        ));
        assert_eq!(character.weapon().unwrap().shots_fired, 0);
    }

    #[test]
    fn damage_reports_depletion_once() {
        let mut character = spawned(NetRole::Authority, None);
        assert!(!character.take_damage(50.0).unwrap());
        assert!(character.take_damage(60.0).unwrap());
        assert!(!character.take_damage(10.0).unwrap());
    }
}
