//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     ServerBuilder → Server::start
//!     → TLS bootstrap (optional) → bind listener → spawn Service::serve
//!
//! Race (startup.rs):
//!     serve returns first  → return its result, never call graceful_stop
//!     stop request first   → graceful_stop once → await serve → Ok(())
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → one StopReason on the stop channel (shutdown.rs)
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config checks first, listener last
//! - The stop channel has a single slot; extra requests are dropped
//! - No timeout on graceful stop: bounding it is the service's job

pub mod service;
pub mod shutdown;
pub mod signals;
pub mod startup;

pub use service::Service;
pub use shutdown::{stop_channel, StopHandle, StopReason, StopSignal};
pub use signals::forward_os_signals;
pub use startup::{Server, ServerBuilder};
