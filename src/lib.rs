//! Server lifecycle harness.
//!
//! Owns the sequence "acquire a listening socket (plain or TLS) → hand it to
//! a [`Service`] → wait for a fatal serve error or a stop request → drive
//! graceful shutdown".
//!
//! # Architecture Overview
//!
//! ```text
//!   ServerConfig ──▶ ServerBuilder ──▶ Server::start
//!                                         │
//!            ┌────────────────────────────┼───────────────────────────┐
//!            ▼                            ▼                           ▼
//!     net::tls (optional)          net::listener              lifecycle race
//!     ACME / PEM files ──────────▶ bind host:port ──────────▶ serve  vs  stop
//!                                                              │          │
//!                                                     Service::serve  graceful_stop
//! ```
//!
//! ```no_run
//! use serve_harness::{HttpService, Server};
//!
//! # async fn run() -> Result<(), serve_harness::ServerError> {
//! Server::builder(HttpService::default())
//!     .host("127.0.0.1")
//!     .port(8080)
//!     .build()
//!     .start()
//!     .await
//! # }
//! ```

pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;

pub use config::ServerConfig;
pub use error::{BoxError, CertError, ServerError};
pub use http::HttpService;
pub use lifecycle::{stop_channel, Server, ServerBuilder, Service, StopHandle, StopReason, StopSignal};
pub use net::{AutoCert, CertificateFiles, DriverGuard, Listener, TlsProvider, TlsSetup};
