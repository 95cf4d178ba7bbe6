//! Network roles, remote calls and their authorization predicates

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::character::CharacterId;

/// Role of the executing instance for a given character
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetRole {
    /// Server copy, allowed to make canonical changes
    Authority,
    /// Client copy owned by the input-producing player
    AutonomousProxy,
    /// Client copy of somebody else's character
    SimulatedProxy,
}

impl NetRole {
    pub fn has_authority(self) -> bool {
        matches!(self, NetRole::Authority)
    }
}

/// Remote actions that pass through an authorization check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RpcAction {
    ServerShoot,
    ClientGameOver,
    MulticastDie,
}

impl fmt::Display for RpcAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RpcAction::ServerShoot => "server_shoot",
            RpcAction::ClientGameOver => "client_game_over",
            RpcAction::MulticastDie => "multicast_die",
        };
        f.write_str(name)
    }
}

/// Request queued by a character for delivery to the authority.
/// Fire-and-forget: the caller never waits for the outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteCall {
    ServerShoot { character: CharacterId },
}

/// What a predicate gets to look at
#[derive(Debug, Clone, Copy)]
pub struct RpcContext {
    pub action: RpcAction,
    pub character: CharacterId,
    pub role: NetRole,
    /// Defeated team for game-over calls
    pub team_id: Option<i32>,
}

pub type Predicate = Arc<dyn Fn(&RpcContext) -> bool + Send + Sync>;

/// One pluggable predicate per action. Actions without a predicate are allowed.
#[derive(Clone, Default)]
pub struct RpcPolicy {
    predicates: HashMap<RpcAction, Predicate>,
}

impl RpcPolicy {
    /// Policy that accepts every call
    pub fn allow_all() -> Self {
        Self::default()
    }

    pub fn with_rule<F>(mut self, action: RpcAction, predicate: F) -> Self
    where
        F: Fn(&RpcContext) -> bool + Send + Sync + 'static,
    {
        self.predicates.insert(action, Arc::new(predicate));
        self
    }

    pub fn authorize(&self, ctx: &RpcContext) -> bool {
        self.predicates
            .get(&ctx.action)
            .map(|p| p(ctx))
            .unwrap_or(true)
    }
}

impl fmt::Debug for RpcPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcPolicy")
            .field("rules", &self.predicates.keys().collect::<Vec<_>>())
            .finish()
    }
}
