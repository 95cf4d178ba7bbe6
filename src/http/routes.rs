//! HTTP route definitions

use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::{header, Method, StatusCode},
    middleware,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer,
};
use tracing::info;
use uuid::Uuid;

use crate::app::AppState;
use crate::game::character::CharacterId;
use crate::game::game_state::MatchPhase;
use crate::game::session::{SessionError, SessionStatus};
use crate::game::SessionCommand;
use crate::http::middleware::require_admin;
use crate::util::time::uptime_secs;
use crate::ws::handler::ws_handler;

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    // CORS configuration - support multiple origins (comma-separated in CLIENT_ORIGIN)
    let allowed_origins: Vec<header::HeaderValue> = state
        .config
        .client_origin
        .split(',')
        .filter_map(|s| s.trim().parse::<header::HeaderValue>().ok())
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true);

    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/health", get(health_handler))
        .route("/session", get(session_handler))
        .route("/ws", get(ws_handler));

    // Game mode routes (admin token required)
    let admin_routes = Router::new()
        .route("/session/game-over", post(game_over_handler))
        .route("/session/max-players", post(max_players_handler))
        .route("/session/match-phase", post(match_phase_handler))
        .route("/session/characters/:id/damage", post(damage_handler))
        .route("/session/characters/:id/respawn", post(respawn_handler))
        .layer(middleware::from_fn_with_state(state.clone(), require_admin));

    Router::new()
        .merge(public_routes)
        .merge(admin_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CompressionLayer::new())
                .layer(cors),
        )
        .layer(TimeoutLayer::new(Duration::from_secs(10)))
        .with_state(state)
}

// ============================================================================
// Health endpoint
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    session_id: Uuid,
    active_players: usize,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: uptime_secs(),
        session_id: state.session.id,
        active_players: state.session.player_count(),
    })
}

async fn session_handler(State(state): State<AppState>) -> Result<Json<SessionStatus>, AppError> {
    let status = state.session.status().await?;
    Ok(Json(status))
}

// ============================================================================
// Game mode endpoints
// ============================================================================

#[derive(Serialize)]
struct Accepted {
    status: &'static str,
}

const ACCEPTED: Accepted = Accepted { status: "queued" };

#[derive(Deserialize)]
struct GameOverRequest {
    defeated_team_id: i32,
}

async fn game_over_handler(
    State(state): State<AppState>,
    Json(req): Json<GameOverRequest>,
) -> Result<Json<Accepted>, AppError> {
    info!(defeated_team_id = req.defeated_team_id, "Game over requested");
    state
        .session
        .send(SessionCommand::GameOver {
            defeated_team_id: req.defeated_team_id,
        })
        .await?;
    Ok(Json(ACCEPTED))
}

#[derive(Deserialize)]
struct MaxPlayersRequest {
    max_players: i32,
}

async fn max_players_handler(
    State(state): State<AppState>,
    Json(req): Json<MaxPlayersRequest>,
) -> Result<Json<Accepted>, AppError> {
    state
        .session
        .send(SessionCommand::SetMaxPlayers(req.max_players))
        .await?;
    Ok(Json(ACCEPTED))
}

#[derive(Deserialize)]
struct MatchPhaseRequest {
    phase: MatchPhase,
}

async fn match_phase_handler(
    State(state): State<AppState>,
    Json(req): Json<MatchPhaseRequest>,
) -> Result<Json<Accepted>, AppError> {
    state
        .session
        .send(SessionCommand::SetMatchPhase(req.phase))
        .await?;
    Ok(Json(ACCEPTED))
}

#[derive(Deserialize)]
struct DamageRequest {
    amount: f32,
}

async fn damage_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<DamageRequest>,
) -> Result<Json<Accepted>, AppError> {
    if !req.amount.is_finite() || req.amount < 0.0 {
        return Err(AppError::BadRequest("amount must be a non-negative number".to_string()));
    }
    state
        .session
        .send(SessionCommand::Damage {
            character: CharacterId(id),
            amount: req.amount,
        })
        .await?;
    Ok(Json(ACCEPTED))
}

async fn respawn_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Accepted>, AppError> {
    state
        .session
        .send(SessionCommand::Respawn {
            character: CharacterId(id),
        })
        .await?;
    Ok(Json(ACCEPTED))
}

// ============================================================================
// Error handling
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Session unavailable: {0}")]
    Unavailable(#[from] SessionError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Unavailable(e) => (StatusCode::SERVICE_UNAVAILABLE, e.to_string()),
        };

        let body = serde_json::json!({
            "error": message
        });

        (status, Json(body)).into_response()
    }
}
