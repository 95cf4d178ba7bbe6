//! Character movement tuning and the per-tick movement step

use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Rotation in degrees
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rotator {
    pub pitch: f32,
    pub yaw: f32,
    pub roll: f32,
}

impl Rotator {
    pub const fn new(pitch: f32, yaw: f32, roll: f32) -> Self {
        Self { pitch, yaw, roll }
    }

    /// Same heading, level with the ground
    pub fn yaw_only(&self) -> Self {
        Self::new(0.0, self.yaw, 0.0)
    }

    /// Unit X axis of the rotation matrix (forward)
    pub fn forward(&self) -> Vec3 {
        let (sp, cp) = self.pitch.to_radians().sin_cos();
        let (sy, cy) = self.yaw.to_radians().sin_cos();
        Vec3::new(cp * cy, cp * sy, sp)
    }

    /// Unit Y axis of the rotation matrix (right), ignoring roll
    pub fn right(&self) -> Vec3 {
        let (sy, cy) = self.yaw.to_radians().sin_cos();
        Vec3::new(-sy, cy, 0.0)
    }
}

/// Collision capsule
#[derive(Debug, Clone, Copy)]
pub struct Capsule {
    pub radius: f32,
    pub half_height: f32,
}

impl Default for Capsule {
    fn default() -> Self {
        Self {
            radius: 42.0,
            half_height: 96.0,
        }
    }
}

/// Third-person camera rig: a spring arm with a camera at its end
#[derive(Debug, Clone, Copy)]
pub struct CameraRig {
    /// The camera follows at this distance behind the character
    pub arm_length: f32,
    /// Arm rotates with the controller
    pub arm_uses_control_rotation: bool,
    /// Camera does not rotate relative to the arm
    pub camera_uses_control_rotation: bool,
}

impl Default for CameraRig {
    fn default() -> Self {
        Self {
            arm_length: 400.0,
            arm_uses_control_rotation: true,
            camera_uses_control_rotation: false,
        }
    }
}

impl CameraRig {
    /// Camera location for a character at `pivot` looking along `rotation`
    pub fn camera_location(&self, pivot: Vec3, rotation: &Rotator) -> Vec3 {
        pivot - rotation.forward() * self.arm_length
    }
}

/// Movement constants applied at construction
#[derive(Debug, Clone, Copy)]
pub struct MovementTuning {
    /// Yaw rotation rate (degrees per second)
    pub rotation_rate_yaw: f32,
    pub jump_z_velocity: f32,
    pub air_control: f32,
    pub max_walk_speed: f32,
    pub min_analog_walk_speed: f32,
    pub braking_deceleration_walking: f32,
    /// Gamepad turn rate (degrees per second at full deflection)
    pub turn_rate_gamepad: f32,
    pub gravity_z: f32,
}

impl Default for MovementTuning {
    fn default() -> Self {
        Self {
            rotation_rate_yaw: 500.0,
            jump_z_velocity: 700.0,
            air_control: 0.35,
            max_walk_speed: 500.0,
            min_analog_walk_speed: 20.0,
            braking_deceleration_walking: 2000.0,
            turn_rate_gamepad: 50.0,
            gravity_z: -980.0,
        }
    }
}

/// Kinematic state consumed and produced by the movement step
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Kinematics {
    pub position: Vec3,
    pub velocity: Vec3,
}

impl Kinematics {
    pub fn is_grounded(&self) -> bool {
        self.position.z <= 0.0 && self.velocity.z <= 0.0
    }
}

/// Movement system for integrating queued input
pub struct PhysicsSystem;

impl PhysicsSystem {
    /// Advance one character by `dt` seconds.
    ///
    /// `input` is the sum of movement input queued since the last step.
    pub fn step(
        state: Kinematics,
        input: Vec3,
        jump: bool,
        gravity_scale: f32,
        tuning: &MovementTuning,
        dt: f32,
    ) -> Kinematics {
        let grounded = state.is_grounded();

        // Planar input, analog magnitude capped at 1
        let planar = Vec3::new(input.x, input.y, 0.0);
        let magnitude = planar.length().min(1.0);
        let direction = planar.normalize_or_zero();

        let mut velocity = state.velocity;
        let horizontal = Vec3::new(velocity.x, velocity.y, 0.0);

        let new_horizontal = if magnitude > 0.0 {
            let speed = (tuning.max_walk_speed * magnitude).max(tuning.min_analog_walk_speed);
            let target = direction * speed;
            if grounded {
                target
            } else {
                horizontal + (target - horizontal) * tuning.air_control
            }
        } else if grounded {
            // Brake towards zero
            let speed = horizontal.length();
            let reduced = (speed - tuning.braking_deceleration_walking * dt).max(0.0);
            horizontal.normalize_or_zero() * reduced
        } else {
            horizontal
        };

        velocity.x = new_horizontal.x;
        velocity.y = new_horizontal.y;

        if jump && grounded {
            velocity.z = tuning.jump_z_velocity;
        }

        velocity.z += tuning.gravity_z * gravity_scale * dt;

        let mut position = state.position + velocity * dt;
        if position.z < 0.0 && gravity_scale > 0.0 {
            position.z = 0.0;
            velocity.z = 0.0;
        }

        Kinematics { position, velocity }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yaw_axes_are_perpendicular_and_planar() {
        let rot = Rotator::new(30.0, 45.0, 0.0).yaw_only();
        let forward = rot.forward();
        let right = rot.right();
        assert!(forward.z.abs() < 1e-6);
        assert!(forward.dot(right).abs() < 1e-6);
        assert!((forward.length() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn full_input_walks_at_max_speed() {
        let tuning = MovementTuning::default();
        let out = PhysicsSystem::step(Kinematics::default(), Vec3::X, false, 1.0, &tuning, 0.1);
        assert!((out.velocity.x - tuning.max_walk_speed).abs() < 1e-3);
        assert!((out.position.x - 50.0).abs() < 1e-3);
        assert_eq!(out.position.z, 0.0);
    }

    #[test]
    fn no_input_brakes_on_ground() {
        let tuning = MovementTuning::default();
        let moving = Kinematics {
            position: Vec3::ZERO,
            velocity: Vec3::new(100.0, 0.0, 0.0),
        };
        let out = PhysicsSystem::step(moving, Vec3::ZERO, false, 1.0, &tuning, 0.1);
        assert_eq!(out.velocity.x, 0.0);
    }

    #[test]
    fn jump_leaves_the_ground() {
        let tuning = MovementTuning::default();
        let out = PhysicsSystem::step(Kinematics::default(), Vec3::ZERO, true, 1.0, &tuning, 0.1);
        assert!(out.position.z > 0.0);
        assert!(out.velocity.z < tuning.jump_z_velocity);
    }

    #[test]
    fn camera_sits_behind_the_pivot() {
        let rig = CameraRig::default();
        let loc = rig.camera_location(Vec3::ZERO, &Rotator::new(0.0, 0.0, 0.0));
        assert!((loc - Vec3::new(-400.0, 0.0, 0.0)).length() < 1e-3);
    }
}
