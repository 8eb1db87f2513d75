//! Stop signal channel for the server lifecycle.

use tokio::sync::mpsc;

/// Why a stop was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// SIGINT / Ctrl+C.
    Interrupt,
    /// SIGTERM.
    Terminate,
    /// Requested programmatically.
    Requested,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::Interrupt => write!(f, "interrupt"),
            StopReason::Terminate => write!(f, "terminate"),
            StopReason::Requested => write!(f, "requested"),
        }
    }
}

/// Create a stop channel.
///
/// The channel holds a single notification. Triggers that find the slot
/// full are dropped, so the server observes at most one stop per lifecycle.
pub fn stop_channel() -> (StopHandle, StopSignal) {
    let (tx, rx) = mpsc::channel(1);
    (StopHandle { tx }, StopSignal { rx })
}

/// Producer side. Clone freely: signal handlers, tests, admin hooks.
#[derive(Debug, Clone)]
pub struct StopHandle {
    tx: mpsc::Sender<StopReason>,
}

impl StopHandle {
    /// Request a stop. Never blocks.
    ///
    /// Returns `false` if a stop is already pending or the server is gone.
    pub fn trigger(&self, reason: StopReason) -> bool {
        self.tx.try_send(reason).is_ok()
    }

    /// True once the consuming server has finished.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Resolves once the consuming server has finished.
    pub async fn closed(&self) {
        self.tx.closed().await
    }
}

/// Consumer side, owned by the server.
#[derive(Debug)]
pub struct StopSignal {
    rx: mpsc::Receiver<StopReason>,
}

impl StopSignal {
    /// Wait for a stop request.
    ///
    /// Returns `None` if every [`StopHandle`] was dropped without triggering.
    pub async fn recv(&mut self) -> Option<StopReason> {
        self.rx.recv().await
    }
}
