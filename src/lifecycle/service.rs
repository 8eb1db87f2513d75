//! The network service driven by the lifecycle.

use std::future::Future;

use crate::error::BoxError;
use crate::net::Listener;

/// Anything that serves connections on a [`Listener`] until told to stop.
///
/// The server calls [`serve`](Service::serve) once on a dedicated task and,
/// if a stop request wins the race against it, calls
/// [`graceful_stop`](Service::graceful_stop) once from another task.
pub trait Service: Send + Sync + 'static {
    /// Accept and serve connections until stopped or fatally failed.
    ///
    /// The listener is dropped, and the socket closed, when this returns.
    fn serve(&self, listener: Listener) -> impl Future<Output = Result<(), BoxError>> + Send;

    /// Ask the service to stop accepting and finish in-flight work.
    ///
    /// Must not block, and must make a pending `serve` resolve. A stop
    /// requested before `serve` starts waiting must not be lost.
    fn graceful_stop(&self);
}
