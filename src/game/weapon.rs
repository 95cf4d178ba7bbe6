//! Weapons held by characters

use glam::Vec3;
use serde::{Deserialize, Serialize};

use super::character::CharacterId;
use super::physics::Rotator;

/// Weapon archetypes a character can be spawned with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeaponKind {
    #[default]
    Rifle,
    Pistol,
}

/// Weapon stats per archetype
#[derive(Debug, Clone, Copy)]
pub struct WeaponStats {
    /// Damage per hit
    pub damage: f32,
    /// Cooldown between shots (seconds)
    pub cooldown: f32,
    /// Maximum trace distance
    pub range: f32,
}

impl WeaponStats {
    pub fn for_kind(kind: WeaponKind) -> Self {
        match kind {
            WeaponKind::Rifle => Self {
                damage: 20.0,
                cooldown: 0.1,
                range: 10_000.0,
            },
            WeaponKind::Pistol => Self {
                damage: 35.0,
                cooldown: 0.4,
                range: 5_000.0,
            },
        }
    }
}

/// Where a shot is traced from: the character's follow camera
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AimSource {
    pub location: Vec3,
    pub rotation: Rotator,
}

/// A fired shot, broadcast to observers
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Shot {
    pub shooter_id: CharacterId,
    pub origin: Vec3,
    pub direction: Vec3,
    pub range: f32,
    pub damage: f32,
}

/// A weapon instance, owned by exactly one character
#[derive(Debug, Clone)]
pub struct Weapon {
    pub kind: WeaponKind,
    pub owner: CharacterId,
    stats: WeaponStats,
    cooldown_remaining: f32,
    pub shots_fired: u32,
}

impl Weapon {
    pub fn new(kind: WeaponKind, owner: CharacterId) -> Self {
        Self {
            kind,
            owner,
            stats: WeaponStats::for_kind(kind),
            cooldown_remaining: 0.0,
            shots_fired: 0,
        }
    }

    pub fn can_fire(&self) -> bool {
        self.cooldown_remaining <= 0.0
    }

    /// Fire along the aim source's forward vector. Returns None while cooling down.
    pub fn shoot(&mut self, aim: &AimSource) -> Option<Shot> {
        if !self.can_fire() {
            return None;
        }

        self.cooldown_remaining = self.stats.cooldown;
        self.shots_fired += 1;

        Some(Shot {
            shooter_id: self.owner,
            origin: aim.location,
            direction: aim.rotation.forward(),
            range: self.stats.range,
            damage: self.stats.damage,
        })
    }

    /// Advance the cooldown by `dt` seconds
    pub fn tick(&mut self, dt: f32) {
        self.cooldown_remaining = (self.cooldown_remaining - dt).max(0.0);
    }
}

/// Spawns weapon instances for characters
pub trait WeaponFactory {
    fn spawn_weapon(&mut self, kind: WeaponKind, owner: CharacterId) -> Option<Weapon>;
}

/// Factory that always succeeds
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultWeaponFactory;

impl WeaponFactory for DefaultWeaponFactory {
    fn spawn_weapon(&mut self, kind: WeaponKind, owner: CharacterId) -> Option<Weapon> {
        Some(Weapon::new(kind, owner))
    }
}
