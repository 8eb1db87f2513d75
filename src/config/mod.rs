//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! defaults (ServerConfig::default)
//!     → loader.rs (optional TOML file)
//!     → loader.rs (SERVE_* environment overlay)
//!     → validation.rs (semantic checks)
//!     → ServerBuilder options (explicit overrides)
//!     → Server (immutable for its whole lifecycle)
//! ```
//!
//! # Design Decisions
//! - Config is immutable once the server is built
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load, load_config, ConfigError};
pub use schema::{
    AutoCertConfig, CertificateFilesConfig, LogFormat, ObservabilityConfig, ServerConfig,
    TlsConfig,
};
pub use validation::{validate_config, ValidationError};
