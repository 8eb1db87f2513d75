//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check the TLS section is complete for the chosen certificate source
//! - Check the metrics address parses when metrics are enabled
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use crate::config::schema::{normalize_hosts, ServerConfig};

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// TLS via ACME without a cache directory.
    MissingCacheDir,
    /// TLS via ACME without any host names.
    MissingHosts,
    /// A certificate or key path is empty.
    EmptyCertificatePath(&'static str),
    /// A contact address is blank.
    BlankContact,
    /// The metrics address is not a socket address.
    InvalidMetricsAddress(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::MissingCacheDir => write!(f, "tls.autocert.cache_dir is not set"),
            ValidationError::MissingHosts => write!(f, "tls.autocert.hosts is empty"),
            ValidationError::EmptyCertificatePath(field) => {
                write!(f, "tls.certificate.{} is empty", field)
            }
            ValidationError::BlankContact => write!(f, "tls.autocert.contact has a blank entry"),
            ValidationError::InvalidMetricsAddress(addr) => {
                write!(f, "observability.metrics_address {:?} is not a socket address", addr)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Check a configuration, collecting every problem found.
pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.tls.enabled {
        match &config.tls.certificate {
            Some(files) => {
                if files.cert_path.trim().is_empty() {
                    errors.push(ValidationError::EmptyCertificatePath("cert_path"));
                }
                if files.key_path.trim().is_empty() {
                    errors.push(ValidationError::EmptyCertificatePath("key_path"));
                }
            }
            None => {
                let autocert = &config.tls.autocert;
                if autocert.cache_dir.trim().is_empty() {
                    errors.push(ValidationError::MissingCacheDir);
                }
                if normalize_hosts(&autocert.hosts).is_empty() {
                    errors.push(ValidationError::MissingHosts);
                }
                if autocert.contact.iter().any(|c| c.trim().is_empty()) {
                    errors.push(ValidationError::BlankContact);
                }
            }
        }
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidMetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
