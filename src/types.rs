use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::GameError;

/// Opaque ID types for type safety
pub type GameId = String;
pub type PlayerId = String;

/// Safe character set for short game codes (excludes 0/O, 1/I/L to avoid confusion)
const GAME_ID_CHARS: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";
const GAME_ID_LENGTH: usize = 7;

/// Generate a random short game code (7 characters)
pub fn generate_game_id() -> GameId {
    let mut rng = rand::rng();
    (0..GAME_ID_LENGTH)
        .map(|_| GAME_ID_CHARS[rng.random_range(0..GAME_ID_CHARS.len())] as char)
        .collect()
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Civilian,
    Spy,
    WhiteHat,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GameStatus {
    Setup,
    Playing,
    Ended,
}

/// Game settings, immutable once a game starts.
///
/// The civilian quota is implicit: whatever is left of `total_players` after
/// spies and white hats, and it must be at least 1.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GameConfig {
    pub civilian_keyword: String,
    pub spy_keyword: String,
    pub total_players: u32,
    pub spy_count: u32,
    pub white_hat_count: u32,
    /// Remote sync endpoint; games without one stay device-local
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud_url: Option<String>,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            civilian_keyword: String::new(),
            spy_keyword: String::new(),
            total_players: 5,
            spy_count: 1,
            white_hat_count: 0,
            cloud_url: None,
        }
    }
}

impl GameConfig {
    /// Check the quota invariant and value ranges.
    ///
    /// The UI layer validates before calling into the controller; the
    /// controller re-checks via this method.
    pub fn validate(&self) -> Result<(), GameError> {
        if self.civilian_keyword.trim().is_empty() || self.spy_keyword.trim().is_empty() {
            return Err(GameError::InvalidConfig(
                "both civilian and spy keywords are required".to_string(),
            ));
        }
        if self.total_players < 3 {
            return Err(GameError::InvalidConfig(
                "a game needs at least 3 players".to_string(),
            ));
        }
        if !(1..=2).contains(&self.spy_count) {
            return Err(GameError::InvalidConfig(
                "spy count must be 1 or 2".to_string(),
            ));
        }
        if self.white_hat_count > 2 {
            return Err(GameError::InvalidConfig(
                "white hat count must be between 0 and 2".to_string(),
            ));
        }
        if self.spy_count + self.white_hat_count >= self.total_players {
            return Err(GameError::InvalidConfig(
                "spies plus white hats must be fewer than total players".to_string(),
            ));
        }
        Ok(())
    }
}

/// One joined participant.
///
/// Role and keyword never change after assignment; `has_viewed` is the only
/// mutable field and only flips false -> true.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub role: Role,
    /// Secret keyword; white hats get none
    pub keyword: Option<String>,
    pub has_viewed: bool,
    /// Epoch milliseconds at join time
    pub joined_at: i64,
}

/// Root aggregate, the unit of local persistence and remote sync.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GameState {
    pub game_id: GameId,
    pub config: GameConfig,
    /// Insertion order = join order
    pub players: Vec<Player>,
    pub status: GameStatus,
}

impl GameState {
    /// Fresh PLAYING state with an empty roster and a generated game id
    pub fn new(config: GameConfig) -> Self {
        Self {
            game_id: generate_game_id(),
            config,
            players: Vec::new(),
            status: GameStatus::Playing,
        }
    }

    pub fn is_full(&self) -> bool {
        self.players.len() as u32 >= self.config.total_players
    }

    pub fn count_role(&self, role: Role) -> u32 {
        self.players.iter().filter(|p| p.role == role).count() as u32
    }
}
