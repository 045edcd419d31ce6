//! Async host integration.
//!
//! The runtime itself never flushes on its own; a host decides when. Under
//! tokio the natural point is "after the current task yields": install
//! [`install_local_flush`] once inside a [`LocalSet`](tokio::task::LocalSet)
//! and every write schedules a flush as a local task. [`next_tick`] lets
//! async code wait for that flush.

use tracing::{error, trace};

use crate::error::ReactiveError;
use crate::graph::scheduler::{clear_flush_hook, flush, has_pending_flush, on_flush_requested};

/// Yield to the executor, then flush whatever is still pending.
///
/// With [`install_local_flush`] active, the yield usually lets the spawned
/// flush run first and the trailing flush finds nothing to do.
pub async fn next_tick() -> Result<(), ReactiveError> {
    tokio::task::yield_now().await;
    if has_pending_flush() {
        flush()?;
    }
    Ok(())
}

/// Flush on a local task whenever work is queued.
///
/// Must be called from within a [`LocalSet`](tokio::task::LocalSet); the
/// hook spawns with [`tokio::task::spawn_local`].
pub fn install_local_flush() {
    on_flush_requested(|| {
        trace!("scheduling local flush");
        tokio::task::spawn_local(async {
            if let Err(err) = flush() {
                error!(error = %err, "scheduled flush failed");
            }
        });
    });
}

/// Remove the hook installed by [`install_local_flush`].
pub fn uninstall_local_flush() {
    clear_flush_hook();
}
