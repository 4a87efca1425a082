//! Local persistence for the game blob and the per-game session identity.
//!
//! One serialized `GameState` under a fixed key plus one `Player` record per
//! game id, so a device can re-render "your role" after a restart without
//! re-joining.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::types::{GameState, Player};

const STATE_FILE: &str = "game_state.json";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Durable local store, atomic from the caller's perspective: a save either
/// fully succeeds or leaves the prior value in place.
pub trait LocalStore: Send + Sync {
    /// Persist the game blob; `None` removes it
    fn save_state(&self, state: Option<&GameState>) -> StoreResult<()>;
    fn load_state(&self) -> StoreResult<Option<GameState>>;

    fn save_session(&self, game_id: &str, player: &Player) -> StoreResult<()>;
    fn load_session(&self, game_id: &str) -> StoreResult<Option<Player>>;
    fn clear_session(&self, game_id: &str) -> StoreResult<()>;
}

/// JSON files in a directory, one per key.
///
/// Writes go to a sibling temp file first and are renamed into place, which
/// is atomic on the filesystems we care about.
pub struct FsStore {
    dir: PathBuf,
}

impl FsStore {
    pub fn new(dir: impl Into<PathBuf>) -> StoreResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn state_path(&self) -> PathBuf {
        self.dir.join(STATE_FILE)
    }

    fn session_path(&self, game_id: &str) -> PathBuf {
        self.dir.join(format!("session_{game_id}.json"))
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> StoreResult<()> {
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> StoreResult<Option<T>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn remove_if_present(path: &Path) -> StoreResult<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

impl LocalStore for FsStore {
    fn save_state(&self, state: Option<&GameState>) -> StoreResult<()> {
        match state {
            Some(state) => write_atomic(&self.state_path(), &serde_json::to_vec(state)?),
            None => remove_if_present(&self.state_path()),
        }
    }

    fn load_state(&self) -> StoreResult<Option<GameState>> {
        read_json(&self.state_path())
    }

    fn save_session(&self, game_id: &str, player: &Player) -> StoreResult<()> {
        write_atomic(&self.session_path(game_id), &serde_json::to_vec(player)?)
    }

    fn load_session(&self, game_id: &str) -> StoreResult<Option<Player>> {
        read_json(&self.session_path(game_id))
    }

    fn clear_session(&self, game_id: &str) -> StoreResult<()> {
        remove_if_present(&self.session_path(game_id))
    }
}
