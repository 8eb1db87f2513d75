//! Error types for the server lifecycle.

use std::path::PathBuf;
use thiserror::Error;

/// Boxed error returned by a [`Service`](crate::lifecycle::Service) serve loop.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised while preparing a TLS configuration.
///
/// All of these are configuration problems: they abort startup before any
/// socket is opened.
#[derive(Debug, Error)]
pub enum CertError {
    /// TLS via ACME is enabled but no cache directory was configured.
    #[error("autocert certificates cache dir is not set")]
    MissingDirCache,

    /// TLS via ACME is enabled but the host allow-list is empty.
    #[error("hosts whitelist is not set")]
    MissingHosts,

    /// The cache directory could not be created or written to.
    #[error("certificate cache dir {path:?} is not usable: {source}")]
    DirCache {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A PEM certificate or key file could not be read.
    #[error("could not read {path:?}: {source}")]
    CertificateFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The key file parsed but held no private key.
    #[error("no private key found in {path:?}")]
    MissingPrivateKey { path: PathBuf },

    /// rustls rejected the certificate/key pair.
    #[error("invalid TLS configuration: {0}")]
    Rustls(#[from] rustls::Error),
}

/// Errors returned from [`Server::start`](crate::lifecycle::Server::start).
#[derive(Debug, Error)]
pub enum ServerError {
    /// TLS bootstrap failed; nothing was bound.
    #[error(transparent)]
    Config(#[from] CertError),

    /// The listening socket could not be opened.
    #[error("could not listen on {addr}: {source}")]
    Listen {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// The service's serve loop failed. Displayed verbatim.
    #[error(transparent)]
    Serve(BoxError),
}

impl ServerError {
    /// True for errors raised before the network was touched.
    pub fn is_config(&self) -> bool {
        matches!(self, ServerError::Config(_))
    }

    /// Borrow the service's original error, if this is a serve failure.
    pub fn serve_error(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        match self {
            ServerError::Serve(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}
