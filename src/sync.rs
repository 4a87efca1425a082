//! Fixed-interval reconciliation with the remote store.
//!
//! Polling is a stand-in for push notification; the collaborator only
//! speaks get-by-key/put-by-key. A pull racing a local mutation may clobber
//! it with a stale copy within one interval; that is the documented
//! trade-off, and the reason every mutation pushes immediately.

use std::time::Duration;

use tokio::task::JoinHandle;

use crate::controller::GameController;

/// How often each client pulls the remote store while a game is running
pub const POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Spawn the background task that periodically pulls the remote store and
/// reconciles local state. The task exits on its own once the game is no
/// longer running; the controller aborts it on reset.
pub(crate) fn spawn_reconcile_loop(controller: GameController) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(POLL_INTERVAL).await;

            let Some((game_id, remote)) = controller.poll_target().await else {
                break;
            };

            let snapshot = match remote.pull(&game_id).await {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    // "No data yet" and transport failures are both
                    // non-events; the next tick retries.
                    tracing::debug!(%game_id, "Remote pull failed: {e}");
                    continue;
                }
            };

            if let Err(e) = controller.reconcile(snapshot).await {
                tracing::warn!(%game_id, "Failed to persist reconciled state: {e}");
            }
        }
    })
}
