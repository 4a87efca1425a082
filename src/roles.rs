//! Role assignment for players joining mid-stream.
//!
//! Roles are handed out as they arrive, without knowing the final roster
//! size: each join draws from a bag sized to the remaining slots and holding
//! exactly the remaining spy and white hat tokens. This keeps every quota
//! intact regardless of join order and guarantees quotas are exactly met
//! once the roster reaches capacity.

use rand::Rng;

use crate::error::GameError;
use crate::types::{GameConfig, Player, Role};

/// Pick a role and secret keyword for the next joiner.
///
/// `roster` holds the already-assigned players, not including the new one.
/// The RNG is injected so callers that need a serialized or deterministic
/// draw can provide their own; UI flows pass `rand::rng()`.
pub fn assign_role<R: Rng + ?Sized>(
    config: &GameConfig,
    roster: &[Player],
    rng: &mut R,
) -> Result<(Role, Option<String>), GameError> {
    let assigned = roster.len() as u32;
    if assigned >= config.total_players {
        return Err(GameError::CapacityExceeded);
    }
    let slots_remaining = config.total_players - assigned;

    let count = |role: Role| roster.iter().filter(|p| p.role == role).count() as u32;
    let spy_remaining = config.spy_count.saturating_sub(count(Role::Spy));
    let white_remaining = config.white_hat_count.saturating_sub(count(Role::WhiteHat));

    // Single uniform draw against stacked probability bands. With one slot
    // left the band of the only remaining role spans [0, 1), so the last
    // joiner's role is deterministic.
    let r: f64 = rng.random();
    let spy_band = spy_remaining as f64 / slots_remaining as f64;
    let white_band = white_remaining as f64 / slots_remaining as f64;

    let role = if r < spy_band {
        Role::Spy
    } else if r < spy_band + white_band {
        Role::WhiteHat
    } else {
        Role::Civilian
    };

    Ok((role, keyword_for(role, config)))
}

/// Keyword lookup is a pure function of the role
pub fn keyword_for(role: Role, config: &GameConfig) -> Option<String> {
    match role {
        Role::Civilian => Some(config.civilian_keyword.clone()),
        Role::Spy => Some(config.spy_keyword.clone()),
        Role::WhiteHat => None,
    }
}
