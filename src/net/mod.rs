//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! TlsProvider (optional)
//!     → tls.rs (ACME or PEM files → rustls ServerConfig)
//!     → listener.rs (bind host:port, plain or TLS)
//!     → Service::serve (accept loop owned by the service)
//! ```
//!
//! # Design Decisions
//! - TLS configuration is produced before binding, never after
//! - TLS is optional and handled transparently behind `Connection`

pub mod listener;
pub mod tls;

pub use listener::{Connection, Listener};
pub use tls::{AutoCert, CertificateFiles, DriverGuard, TlsProvider, TlsSetup};
