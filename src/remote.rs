//! Remote sync against a keyed blob store with last-writer-wins semantics.
//!
//! The store is deliberately dumb: get-by-key, put-by-key, no rule
//! enforcement. `RemoteStore` is the seam that lets the relay server, a
//! spreadsheet webhook, or an in-memory map stand in for each other without
//! touching the controller.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::RwLock;

use crate::types::GameState;

/// Result type for remote store operations
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Failures on the sync path. None of these are fatal: the controller logs
/// them and keeps operating on local state.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("Remote endpoint unreachable: {0}")]
    Unreachable(String),

    /// Typed absence: the store has no record for this game (yet)
    #[error("Game not found on remote")]
    NotFound,

    #[error("Malformed remote payload: {0}")]
    Malformed(String),
}

#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Fetch the full game blob by id
    async fn pull(&self, game_id: &str) -> RemoteResult<GameState>;

    /// Replace the remote record for this state's game id. Fire-and-forget:
    /// implementations must not require a parseable response body.
    async fn push(&self, state: &GameState) -> RemoteResult<()>;
}

/// HTTP client for the relay protocol: `GET ?gameId=<id>` returns the blob
/// or `{"error": ...}`, `POST` with the full blob replaces it.
pub struct HttpRemote {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpRemote {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

/// The relay answers errors as `{"error": ...}` bodies, possibly with a
/// non-2xx status. Try the blob shape first.
#[derive(Deserialize)]
#[serde(untagged)]
enum PullResponse {
    State(GameState),
    Error { error: String },
}

#[async_trait]
impl RemoteStore for HttpRemote {
    async fn pull(&self, game_id: &str) -> RemoteResult<GameState> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("gameId", game_id)])
            .send()
            .await
            .map_err(|e| RemoteError::Unreachable(e.to_string()))?;

        let body: PullResponse = response
            .json()
            .await
            .map_err(|e| RemoteError::Malformed(e.to_string()))?;

        match body {
            PullResponse::State(state) => Ok(state),
            PullResponse::Error { error } => {
                tracing::debug!("Remote pull for {game_id} answered: {error}");
                Err(RemoteError::NotFound)
            }
        }
    }

    async fn push(&self, state: &GameState) -> RemoteResult<()> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(state)
            .send()
            .await
            .map_err(|e| RemoteError::Unreachable(e.to_string()))?;

        // A busy relay answers 503; surface it as retryable and move on.
        // The body itself is never read.
        response
            .error_for_status()
            .map_err(|e| RemoteError::Unreachable(e.to_string()))?;
        Ok(())
    }
}

/// Shared in-process map, the substitute store for tests and local play
#[derive(Clone, Default)]
pub struct MemoryRemote {
    games: Arc<RwLock<HashMap<String, GameState>>>,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    async fn pull(&self, game_id: &str) -> RemoteResult<GameState> {
        self.games
            .read()
            .await
            .get(game_id)
            .cloned()
            .ok_or(RemoteError::NotFound)
    }

    async fn push(&self, state: &GameState) -> RemoteResult<()> {
        self.games
            .write()
            .await
            .insert(state.game_id.clone(), state.clone());
        Ok(())
    }
}
