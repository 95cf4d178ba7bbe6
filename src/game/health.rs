//! Health tracking shared between a character and its health displays

use parking_lot::RwLock;

#[derive(Debug, Clone, Copy, Default)]
struct HealthValues {
    current: f32,
    max: f32,
}

/// Health of one character.
///
/// The character owns it behind an `Arc` and hands clones to the HUD or the
/// world-space display, which only read it. Writes happen on the authority;
/// proxies overwrite it from snapshots.
#[derive(Debug, Default)]
pub struct HealthTracker {
    values: RwLock<HealthValues>,
}

impl HealthTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set both current and max health to `max_health`
    pub fn initialize_health(&self, max_health: f32) {
        let mut values = self.values.write();
        values.current = max_health;
        values.max = max_health;
    }

    pub fn current(&self) -> f32 {
        self.values.read().current
    }

    pub fn max(&self) -> f32 {
        self.values.read().max
    }

    pub fn is_depleted(&self) -> bool {
        self.current() <= 0.0
    }

    /// Apply damage, returns (new_health, depleted)
    pub fn apply_damage(&self, damage: f32) -> (f32, bool) {
        let mut values = self.values.write();
        values.current = (values.current - damage.max(0.0)).max(0.0);
        (values.current, values.current <= 0.0)
    }

    /// Overwrite with replicated values
    pub(crate) fn replicate(&self, current: f32, max: f32) {
        let mut values = self.values.write();
        values.current = current;
        values.max = max;
    }
}
