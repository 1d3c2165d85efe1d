//! OS signal watcher actor

use crate::{CoreError, Result};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Wait for SIGINT or SIGTERM, or for `stop` to be cancelled
///
/// The listeners are installed before the first await so a signal delivered
/// during start-up is not lost.
pub async fn watch(stop: CancellationToken) -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut interrupt = signal(SignalKind::interrupt())
            .map_err(|e| CoreError::InitializationError(format!("SIGINT handler: {e}")))?;
        let mut terminate = signal(SignalKind::terminate())
            .map_err(|e| CoreError::InitializationError(format!("SIGTERM handler: {e}")))?;

        tokio::select! {
            _ = interrupt.recv() => info!(signal = "SIGINT", "caught signal, exiting"),
            _ = terminate.recv() => info!(signal = "SIGTERM", "caught signal, exiting"),
            _ = stop.cancelled() => {}
        }
    }

    #[cfg(not(unix))]
    {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result.map_err(|e| CoreError::InitializationError(format!("Ctrl+C handler: {e}")))?;
                info!(signal = "ctrl-c", "caught signal, exiting");
            }
            _ = stop.cancelled() => {}
        }
    }

    Ok(())
}
