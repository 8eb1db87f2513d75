//! TLS configuration and certificate acquisition.
//!
//! # Responsibilities
//! - Produce the rustls `ServerConfig` a TLS listener terminates with
//! - ACME: validate cache dir and host allow-list, hand issuance and renewal
//!   to the authority, drive the renewal state machine in the background
//! - Static: load a PEM certificate chain and private key from disk
//!
//! # Design Decisions
//! - Every check runs before the listener is bound; a failure aborts startup
//! - No retries here: the ACME driver task retries on its own schedule
//! - The ACME driver lives as long as the returned [`TlsSetup`]
//! - Both sources advertise `h2` and `http/1.1`; ACME adds `acme-tls/1` so the
//!   authority's TLS-ALPN-01 validation reaches the challenge certificate

use std::fs::{self, File, OpenOptions};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures_util::StreamExt;
use rustls::crypto::CryptoProvider;
use rustls::pki_types::CertificateDer;
use rustls::server::ResolvesServerCert;
use rustls::ServerConfig;
use rustls_acme::caches::DirCache;
use rustls_acme::AcmeConfig;
use tokio::task::JoinHandle;

use crate::config::schema::{normalize_hosts, AutoCertConfig, CertificateFilesConfig};
use crate::error::CertError;
use crate::observability::metrics;

/// ALPN protocol of TLS-ALPN-01 validation connections.
pub const ACME_TLS_ALPN: &[u8] = rustls_acme::acme::ACME_TLS_ALPN_NAME;

/// Application protocols offered to regular clients, most preferred first.
fn http_alpn() -> Vec<Vec<u8>> {
    vec![b"h2".to_vec(), b"http/1.1".to_vec()]
}

fn crypto_provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::aws_lc_rs::default_provider())
}

/// Source of the TLS configuration for a listener.
pub trait TlsProvider: Send + Sync {
    /// Build the server-side TLS configuration.
    ///
    /// Called once per start, before the listener is opened.
    fn tls_config(&self) -> Result<TlsSetup, CertError>;
}

/// A TLS configuration and the background task keeping it current, if any.
#[derive(Debug)]
pub struct TlsSetup {
    pub config: Arc<ServerConfig>,
    pub driver: Option<DriverGuard>,
}

impl TlsSetup {
    /// A configuration that needs no background work.
    pub fn fixed(config: Arc<ServerConfig>) -> Self {
        Self {
            config,
            driver: None,
        }
    }

    /// A configuration kept current by `driver`.
    pub fn driven(config: Arc<ServerConfig>, driver: JoinHandle<()>) -> Self {
        Self {
            config,
            driver: Some(DriverGuard(driver)),
        }
    }
}

/// Aborts the wrapped task when dropped.
#[derive(Debug)]
pub struct DriverGuard(JoinHandle<()>);

impl DriverGuard {
    pub fn is_finished(&self) -> bool {
        self.0.is_finished()
    }
}

impl Drop for DriverGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Server config answering both regular and TLS-ALPN-01 handshakes.
///
/// `resolver` picks the challenge certificate when the client offers only
/// `acme-tls/1`, and the issued certificate otherwise.
pub(crate) fn acme_server_config(
    resolver: Arc<dyn ResolvesServerCert>,
) -> Result<Arc<ServerConfig>, CertError> {
    let mut config = ServerConfig::builder_with_provider(crypto_provider())
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_cert_resolver(resolver);

    config.alpn_protocols = http_alpn();
    config.alpn_protocols.push(ACME_TLS_ALPN.to_vec());

    Ok(Arc::new(config))
}

/// Certificates issued and renewed by an ACME authority (Let's Encrypt).
#[derive(Debug, Clone)]
pub struct AutoCert {
    cache_dir: PathBuf,
    hosts: Vec<String>,
    contact: Vec<String>,
    staging: bool,
}

impl AutoCert {
    pub fn new<I, S>(cache_dir: impl Into<PathBuf>, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            cache_dir: cache_dir.into(),
            hosts: hosts.into_iter().map(Into::into).collect(),
            contact: Vec::new(),
            staging: false,
        }
    }

    pub fn from_config(config: &AutoCertConfig) -> Self {
        Self {
            cache_dir: PathBuf::from(&config.cache_dir),
            hosts: config.hosts.clone(),
            contact: config.contact.clone(),
            staging: config.staging,
        }
    }

    /// Register a contact e-mail with the authority.
    pub fn contact(mut self, email: impl Into<String>) -> Self {
        self.contact.push(email.into());
        self
    }

    /// Use the authority's staging directory.
    pub fn staging(mut self, staging: bool) -> Self {
        self.staging = staging;
        self
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Run every startup check and return the normalized host allow-list.
    pub fn prepare(&self) -> Result<Vec<String>, CertError> {
        self.check_cache_dir()?;
        self.allowed_hosts()
    }

    /// The host allow-list with surrounding whitespace trimmed.
    pub fn allowed_hosts(&self) -> Result<Vec<String>, CertError> {
        let hosts = normalize_hosts(&self.hosts);
        if hosts.is_empty() {
            return Err(CertError::MissingHosts);
        }
        Ok(hosts)
    }

    /// Make sure the cache directory exists and accepts writes.
    fn check_cache_dir(&self) -> Result<(), CertError> {
        if self.cache_dir.as_os_str().is_empty() {
            return Err(CertError::MissingDirCache);
        }

        let dir_err = |source| CertError::DirCache {
            path: self.cache_dir.clone(),
            source,
        };

        fs::create_dir_all(&self.cache_dir).map_err(dir_err)?;

        let probe = self
            .cache_dir
            .join(format!(".write-probe-{}", rand::random::<u32>()));
        OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&probe)
            .map_err(dir_err)?;
        fs::remove_file(&probe).map_err(dir_err)?;

        Ok(())
    }
}

impl TlsProvider for AutoCert {
    /// Requires a running tokio runtime: the ACME driver is spawned onto it
    /// and runs until the returned setup is dropped.
    fn tls_config(&self) -> Result<TlsSetup, CertError> {
        let hosts = self.prepare()?;

        tracing::info!(
            hosts = ?hosts,
            cache_dir = %self.cache_dir.display(),
            staging = self.staging,
            "Configuring ACME certificates"
        );

        let contact: Vec<String> = self
            .contact
            .iter()
            .map(|email| format!("mailto:{}", email.trim()))
            .collect();

        let mut state = AcmeConfig::new(hosts)
            .contact(contact)
            .cache(DirCache::new(self.cache_dir.clone()))
            .directory_lets_encrypt(!self.staging)
            .state();

        let config = acme_server_config(state.resolver())?;

        let driver = tokio::spawn(async move {
            while let Some(event) = state.next().await {
                match event {
                    Ok(ok) => {
                        tracing::info!(event = ?ok, "ACME event");
                        metrics::record_acme_event(true);
                    }
                    Err(err) => {
                        tracing::error!(error = ?err, "ACME error");
                        metrics::record_acme_event(false);
                    }
                }
            }
        });

        Ok(TlsSetup::driven(config, driver))
    }
}

/// A fixed certificate chain and key read from PEM files.
#[derive(Debug, Clone)]
pub struct CertificateFiles {
    cert_path: PathBuf,
    key_path: PathBuf,
}

impl CertificateFiles {
    pub fn new(cert_path: impl Into<PathBuf>, key_path: impl Into<PathBuf>) -> Self {
        Self {
            cert_path: cert_path.into(),
            key_path: key_path.into(),
        }
    }

    pub fn from_config(config: &CertificateFilesConfig) -> Self {
        Self::new(&config.cert_path, &config.key_path)
    }
}

impl TlsProvider for CertificateFiles {
    fn tls_config(&self) -> Result<TlsSetup, CertError> {
        let certs: Vec<CertificateDer<'static>> = {
            let mut reader = open_pem(&self.cert_path)?;
            rustls_pemfile::certs(&mut reader)
                .collect::<Result<Vec<_>, _>>()
                .map_err(|source| CertError::CertificateFile {
                    path: self.cert_path.clone(),
                    source,
                })?
        };

        let key = {
            let mut reader = open_pem(&self.key_path)?;
            rustls_pemfile::private_key(&mut reader)
                .map_err(|source| CertError::CertificateFile {
                    path: self.key_path.clone(),
                    source,
                })?
                .ok_or_else(|| CertError::MissingPrivateKey {
                    path: self.key_path.clone(),
                })?
        };

        let mut config = ServerConfig::builder_with_provider(crypto_provider())
            .with_safe_default_protocol_versions()?
            .with_no_client_auth()
            .with_single_cert(certs, key)?;

        config.alpn_protocols = http_alpn();

        tracing::info!(cert = %self.cert_path.display(), "Loaded TLS certificate");

        Ok(TlsSetup::fixed(Arc::new(config)))
    }
}

fn open_pem(path: &Path) -> Result<BufReader<File>, CertError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|source| CertError::CertificateFile {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_cache_dir() {
        let cert = AutoCert::new("", ["example.com"]);
        assert!(matches!(cert.prepare(), Err(CertError::MissingDirCache)));
    }

    #[test]
    fn missing_hosts() {
        let dir = tempfile::tempdir().unwrap();
        let cert = AutoCert::new(dir.path(), Vec::<String>::new());
        assert!(matches!(cert.prepare(), Err(CertError::MissingHosts)));

        let blank = AutoCert::new(dir.path(), ["  ", ""]);
        assert!(matches!(blank.prepare(), Err(CertError::MissingHosts)));
    }

    #[test]
    fn hosts_are_trimmed() {
        let dir = tempfile::tempdir().unwrap();
        let cert = AutoCert::new(dir.path(), [" example.com ", "\twww.example.com"]);
        assert_eq!(
            cert.prepare().unwrap(),
            vec!["example.com".to_string(), "www.example.com".to_string()]
        );
    }

    #[test]
    fn probe_leaves_cache_dir_clean() {
        let dir = tempfile::tempdir().unwrap();
        let cache = dir.path().join("certs");
        let cert = AutoCert::new(&cache, ["example.com"]);

        cert.prepare().unwrap();

        assert!(cache.is_dir());
        assert_eq!(fs::read_dir(&cache).unwrap().count(), 0);
    }

    #[test]
    fn unusable_cache_dir() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("not-a-dir");
        fs::write(&file, b"x").unwrap();

        let cert = AutoCert::new(&file, ["example.com"]);
        assert!(matches!(cert.prepare(), Err(CertError::DirCache { .. })));
    }

    #[test]
    fn from_config_keeps_settings() {
        let config = AutoCertConfig {
            cache_dir: "/var/cache/acme".into(),
            hosts: vec!["a.example".into()],
            contact: vec!["ops@example.com".into()],
            staging: true,
        };
        let cert = AutoCert::from_config(&config);
        assert_eq!(cert.cache_dir(), Path::new("/var/cache/acme"));
        assert!(cert.staging);
        assert_eq!(cert.contact, vec!["ops@example.com".to_string()]);
    }

    #[test]
    fn missing_certificate_file() {
        let files = CertificateFiles::new("/nonexistent/cert.pem", "/nonexistent/key.pem");
        assert!(matches!(
            files.tls_config(),
            Err(CertError::CertificateFile { .. })
        ));
    }

    #[tokio::test]
    async fn autocert_offers_challenge_and_http_protocols() {
        let dir = tempfile::tempdir().unwrap();
        let setup = AutoCert::new(dir.path(), ["example.com"])
            .tls_config()
            .unwrap();

        assert_eq!(
            setup.config.alpn_protocols,
            vec![b"h2".to_vec(), b"http/1.1".to_vec(), b"acme-tls/1".to_vec()]
        );
        assert!(setup.driver.is_some());
    }

    #[test]
    fn certificate_files_offer_http_protocols() {
        let dir = tempfile::tempdir().unwrap();
        let generated = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        let cert = dir.path().join("cert.pem");
        let key = dir.path().join("key.pem");
        fs::write(&cert, generated.cert.pem()).unwrap();
        fs::write(&key, generated.key_pair.serialize_pem()).unwrap();

        let setup = CertificateFiles::new(&cert, &key).tls_config().unwrap();

        assert_eq!(setup.config.alpn_protocols, http_alpn());
        assert!(setup.driver.is_none());
    }

    #[tokio::test]
    async fn dropping_setup_aborts_driver() {
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let driver = tokio::spawn(async move {
            let _tx = tx;
            std::future::pending::<()>().await;
        });

        let dir = tempfile::tempdir().unwrap();
        let config = AutoCert::new(dir.path(), ["example.com"])
            .tls_config()
            .unwrap()
            .config;
        drop(TlsSetup::driven(config, driver));

        let closed = tokio::time::timeout(std::time::Duration::from_secs(5), rx).await;
        assert!(matches!(closed, Ok(Err(_))));
    }

    #[test]
    fn key_file_without_key() {
        let dir = tempfile::tempdir().unwrap();
        let cert = dir.path().join("cert.pem");
        let key = dir.path().join("key.pem");
        fs::write(&cert, b"").unwrap();
        fs::write(&key, b"not pem at all\n").unwrap();

        let files = CertificateFiles::new(&cert, &key);
        assert!(matches!(
            files.tls_config(),
            Err(CertError::MissingPrivateKey { .. })
        ));
    }
}
