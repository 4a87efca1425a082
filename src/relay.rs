//! The remote collaborator: a keyed blob store over HTTP.
//!
//! Deliberately dumb. `GET ?gameId=<id>` returns the stored blob or an
//! `{"error": ...}` body; adding `action=check_status` answers with just the
//! status field as a lightweight liveness probe. `POST` with a full
//! `GameState` replaces whatever was stored for that game id. Writes serialize through a bounded lock so
//! two clients pushing in the same instant cannot interleave between the
//! find-record and write-record steps; a writer that cannot get the lock in
//! time is turned away with a transient busy error, which clients treat as
//! retryable.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};

use crate::types::GameState;

/// How long a writer may wait for the store lock before being turned away
const WRITE_LOCK_WAIT: Duration = Duration::from_secs(10);

const DEFAULT_ADDR: &str = "0.0.0.0:8573";

#[derive(Clone, Default)]
pub struct RelayState {
    games: Arc<RwLock<HashMap<String, GameState>>>,
    /// Serializes concurrent writers
    write_lock: Arc<Mutex<()>>,
}

impl RelayState {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub addr: SocketAddr,
}

impl RelayConfig {
    /// Load configuration from environment variables.
    /// `RELAY_ADDR` overrides the default bind address.
    pub fn from_env() -> Self {
        let addr = std::env::var("RELAY_ADDR")
            .ok()
            .and_then(|raw| {
                let trimmed = raw.trim();
                match trimmed.parse() {
                    Ok(addr) => Some(addr),
                    Err(_) => {
                        tracing::warn!("Ignoring unparseable RELAY_ADDR: {trimmed}");
                        None
                    }
                }
            })
            .unwrap_or_else(|| DEFAULT_ADDR.parse().expect("default address parses"));
        Self { addr }
    }
}

pub fn router(state: RelayState) -> Router {
    Router::new()
        .route("/", get(get_game).post(put_game))
        .with_state(state)
}

#[derive(Deserialize)]
struct GetParams {
    #[serde(rename = "gameId")]
    game_id: Option<String>,
    action: Option<String>,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    (
        status,
        Json(ErrorBody {
            error: msg.to_string(),
        }),
    )
        .into_response()
}

async fn get_game(State(state): State<RelayState>, Query(params): Query<GetParams>) -> Response {
    let Some(game_id) = params.game_id else {
        return error_response(StatusCode::BAD_REQUEST, "Missing gameId");
    };

    let games = state.games.read().await;
    let Some(game) = games.get(&game_id) else {
        return error_response(StatusCode::NOT_FOUND, "Game not found");
    };

    // Status-only probe for clients that do not need the full blob
    if params.action.as_deref() == Some("check_status") {
        return Json(serde_json::json!({ "status": game.status })).into_response();
    }

    Json(game.clone()).into_response()
}

async fn put_game(State(state): State<RelayState>, Json(game): Json<GameState>) -> Response {
    let Ok(_guard) = tokio::time::timeout(WRITE_LOCK_WAIT, state.write_lock.lock()).await else {
        return error_response(StatusCode::SERVICE_UNAVAILABLE, "Server busy, try again.");
    };

    tracing::debug!(
        game_id = %game.game_id,
        players = game.players.len(),
        status = ?game.status,
        "Storing game blob"
    );
    state.games.write().await.insert(game.game_id.clone(), game);

    // Pushers do not read the body; this is for humans poking at the relay
    Json(serde_json::json!({ "success": true })).into_response()
}
