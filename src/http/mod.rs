//! HTTP surface: health, session status and game mode routes

pub mod middleware;
pub mod routes;

pub use routes::build_router;
