//! Gameplay modules: characters, the session record and the authoritative loop

pub mod authority;
pub mod character;
pub mod game_state;
pub mod health;
pub mod input;
pub mod observer;
pub mod physics;
pub mod session;
pub mod snapshot;
pub mod weapon;

pub use session::{GameSession, SessionCommand, SessionHandle};

use crate::ws::protocol::ClientMsg;
use character::CharacterId;

/// Player message received from WebSocket
#[derive(Debug, Clone)]
pub struct PlayerInput {
    pub user_id: CharacterId,
    pub msg: ClientMsg,
}
