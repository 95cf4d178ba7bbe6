//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// HS256 secret used to verify player and admin tokens
    pub jwt_secret: String,
    /// Allowed client origin for CORS (comma-separated)
    pub client_origin: String,

    /// Session tuning
    pub session: SessionConfig,
}

/// Per-session gameplay tuning
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Players needed before the match moves to in-progress
    pub min_players: i32,
    /// Hard cap enforced when players join
    pub max_players: i32,
    /// Health every character is initialized and respawned with
    pub max_health: f32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            min_players: 2,
            max_players: 10,
            max_health: 100.0,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Hosting platforms provide PORT, fall back to SERVER_ADDR or default
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        };

        let defaults = SessionConfig::default();
        let session = SessionConfig {
            min_players: parse_or("MIN_PLAYERS", defaults.min_players)?,
            max_players: parse_or("MAX_PLAYERS", defaults.max_players)?,
            max_health: parse_or("MAX_HEALTH", defaults.max_health)?,
        };

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),

            jwt_secret: env::var("JWT_SECRET").map_err(|_| ConfigError::Missing("JWT_SECRET"))?,
            client_origin: env::var("CLIENT_ORIGIN")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),

            session,
        })
    }
}

fn parse_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(key)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_defaults() {
        let session = SessionConfig::default();
        assert_eq!(session.min_players, 2);
        assert_eq!(session.max_players, 10);
        assert_eq!(session.max_health, 100.0);
    }

    #[test]
    fn parse_or_falls_back_when_unset() {
        let value: i32 = parse_or("ARENA_TEST_UNSET_VARIABLE", 7).unwrap();
        assert_eq!(value, 7);
    }
}
