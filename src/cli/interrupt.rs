//! Ctrl-C handling for a running pipeline

use std::future::Future;
use std::io;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Watch interrupt signals for a run
///
/// The first signal cancels `cancel` so stages stop and cleanups run. The
/// function returns `Ok(())` on the second signal, when the caller should
/// exit without waiting. An error means the signal source failed.
pub async fn watch_interrupts<F, Fut>(cancel: CancellationToken, mut next_signal: F) -> io::Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = io::Result<()>>,
{
    next_signal().await?;
    warn!("Interrupt received, cancelling pipeline (press Ctrl-C again to exit immediately)");
    cancel.cancel();

    next_signal().await?;
    warn!("Second interrupt received, exiting without waiting for cleanups");
    Ok(())
}
