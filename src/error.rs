use crate::store::StoreError;

/// Errors surfaced synchronously by controller mutations.
///
/// Remote sync failures are deliberately absent: they are absorbed at the
/// adapter boundary (see `RemoteError`) and never block a local mutation.
#[derive(Debug, thiserror::Error)]
pub enum GameError {
    #[error("Invalid game config: {0}")]
    InvalidConfig(String),

    #[error("Player name is required")]
    NameRequired,

    #[error("Room is full")]
    RoomFull,

    /// The roster was already at capacity when a role draw was attempted
    #[error("No role slots remaining")]
    CapacityExceeded,

    #[error("No active game")]
    NoActiveGame,

    #[error("Local store error: {0}")]
    Store(#[from] StoreError),
}
