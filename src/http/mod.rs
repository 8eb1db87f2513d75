//! HTTP service subsystem.
//!
//! # Data Flow
//! ```text
//! Connection (plain or TLS, from net::Listener)
//!     → server.rs (axum::serve, graceful shutdown via Notify)
//!     → request.rs (assign / propagate x-request-id)
//!     → handlers (/healthz, echo fallback)
//! ```

pub mod request;
pub mod server;

pub use request::{UuidRequestId, X_REQUEST_ID};
pub use server::HttpService;
