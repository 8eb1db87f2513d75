//! OS signal handling.
//!
//! # Responsibilities
//! - Register signal handlers (SIGINT, SIGTERM)
//! - Translate the first one into a [`StopReason`] on the stop channel
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - One notification per process; later signals hit a full slot and are dropped

use tokio::task::JoinHandle;

use crate::lifecycle::shutdown::{StopHandle, StopReason};

/// Spawn a task that forwards the first SIGINT/SIGTERM to `handle`.
///
/// The task ends after forwarding or once the server side has gone away.
pub fn forward_os_signals(handle: StopHandle) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            reason = wait_for_signal() => {
                match reason {
                    Ok(reason) => {
                        tracing::info!(signal = %reason, "Shutdown signal received");
                        handle.trigger(reason);
                    }
                    Err(e) => tracing::error!(error = %e, "Failed to install signal handlers"),
                }
            }
            _ = handle.closed() => {}
        }
    })
}

#[cfg(unix)]
async fn wait_for_signal() -> std::io::Result<StopReason> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        res = tokio::signal::ctrl_c() => res.map(|_| StopReason::Interrupt),
        _ = terminate.recv() => Ok(StopReason::Terminate),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> std::io::Result<StopReason> {
    tokio::signal::ctrl_c().await?;
    Ok(StopReason::Interrupt)
}
