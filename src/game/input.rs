//! Named input bindings and their dispatch onto character handlers

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::character::{Character, Lifecycle};

pub const MOVE_FORWARD: &str = "Move Forward / Backward";
pub const MOVE_RIGHT: &str = "Move Right / Left";
pub const TURN_MOUSE: &str = "Turn Right / Left Mouse";
pub const TURN_GAMEPAD: &str = "Turn Right / Left Gamepad";
pub const LOOK_UP_MOUSE: &str = "Look Up / Down Mouse";
pub const LOOK_UP_GAMEPAD: &str = "Look Up / Down Gamepad";
pub const JUMP: &str = "Jump";
pub const SHOOT: &str = "Shoot";

/// One input sample routed by name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InputEvent {
    Axis { name: String, value: f32 },
    Action { name: String, pressed: bool },
}

/// Handlers an axis can be bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisHandler {
    MoveForward,
    MoveRight,
    /// Absolute delta, e.g. a mouse
    AddYaw,
    AddPitch,
    /// Rate of change, e.g. an analog stick
    TurnAtRate,
    LookUpAtRate,
}

/// Handlers an action can be bound to, per edge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionHandler {
    Jump,
    StopJumping,
    Shoot,
    StopShoot,
}

/// Outcome of dispatching one event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Handled,
    /// No binding under that name
    Unbound,
    /// Controller has input disabled, none is bound, or the character is dead
    InputDisabled,
}

/// Binding table from input names to character handlers
#[derive(Debug, Clone)]
pub struct InputBindings {
    axes: HashMap<String, AxisHandler>,
    pressed: HashMap<String, ActionHandler>,
    released: HashMap<String, ActionHandler>,
}

impl InputBindings {
    pub fn empty() -> Self {
        Self {
            axes: HashMap::new(),
            pressed: HashMap::new(),
            released: HashMap::new(),
        }
    }

    pub fn bind_axis(&mut self, name: &str, handler: AxisHandler) -> &mut Self {
        self.axes.insert(name.to_string(), handler);
        self
    }

    pub fn bind_action(
        &mut self,
        name: &str,
        on_pressed: ActionHandler,
        on_released: ActionHandler,
    ) -> &mut Self {
        self.pressed.insert(name.to_string(), on_pressed);
        self.released.insert(name.to_string(), on_released);
        self
    }

    /// The standard third-person character layout
    pub fn character_defaults() -> Self {
        let mut bindings = Self::empty();
        bindings
            .bind_action(JUMP, ActionHandler::Jump, ActionHandler::StopJumping)
            .bind_axis(MOVE_FORWARD, AxisHandler::MoveForward)
            .bind_axis(MOVE_RIGHT, AxisHandler::MoveRight)
            // Two turn bindings: mice report an absolute delta,
            // sticks a rate of change
            .bind_axis(TURN_MOUSE, AxisHandler::AddYaw)
            .bind_axis(TURN_GAMEPAD, AxisHandler::TurnAtRate)
            .bind_axis(LOOK_UP_MOUSE, AxisHandler::AddPitch)
            .bind_axis(LOOK_UP_GAMEPAD, AxisHandler::LookUpAtRate)
            .bind_action(SHOOT, ActionHandler::Shoot, ActionHandler::StopShoot);
        bindings
    }

    pub fn axis(&self, name: &str) -> Option<AxisHandler> {
        self.axes.get(name).copied()
    }

    pub fn action(&self, name: &str, pressed: bool) -> Option<ActionHandler> {
        if pressed {
            self.pressed.get(name).copied()
        } else {
            self.released.get(name).copied()
        }
    }

    /// Route one event to the character. `dt` is the frame time for rate axes.
    pub fn dispatch(&self, character: &mut Character, event: &InputEvent, dt: f32) -> Dispatch {
        if !character.input_enabled() || character.lifecycle() != Lifecycle::Alive {
            return Dispatch::InputDisabled;
        }

        match event {
            InputEvent::Axis { name, value } => {
                let Some(handler) = self.axis(name) else {
                    return Dispatch::Unbound;
                };
                let value = *value;
                match handler {
                    AxisHandler::MoveForward => character.move_forward(value),
                    AxisHandler::MoveRight => character.move_right(value),
                    AxisHandler::AddYaw => character.add_controller_yaw_input(value),
                    AxisHandler::AddPitch => character.add_controller_pitch_input(value),
                    AxisHandler::TurnAtRate => character.turn_at_rate(value, dt),
                    AxisHandler::LookUpAtRate => character.look_up_at_rate(value, dt),
                }
            }
            InputEvent::Action { name, pressed } => {
                let Some(handler) = self.action(name, *pressed) else {
                    return Dispatch::Unbound;
                };
                match handler {
                    ActionHandler::Jump => character.jump(),
                    ActionHandler::StopJumping => character.stop_jumping(),
                    ActionHandler::Shoot => character.shoot(),
                    ActionHandler::StopShoot => character.stop_shoot(),
                }
            }
        }

        Dispatch::Handled
    }
}

impl Default for InputBindings {
    fn default() -> Self {
        Self::character_defaults()
    }
}
