//! Shared fakes for lifecycle and service tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serve_harness::{BoxError, Listener, Service};
use tokio::sync::Notify;

/// Error returned by a failing fake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Boom(pub String);

impl std::fmt::Display for Boom {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for Boom {}

#[derive(Debug, Clone)]
enum Mode {
    /// Serve until graceful_stop is called.
    Block,
    /// Return Ok right away.
    ReturnOk,
    /// Return Err(Boom) right away.
    Fail(String),
    /// Panic inside serve.
    Panic,
}

#[derive(Debug)]
struct Inner {
    mode: Mode,
    stop: Notify,
    started: Notify,
    serve_count: AtomicUsize,
    stop_count: AtomicUsize,
    local_addr: Mutex<Option<SocketAddr>>,
}

/// A scriptable service that counts serve and graceful_stop calls.
#[derive(Debug, Clone)]
pub struct FakeService {
    inner: Arc<Inner>,
}

impl FakeService {
    fn with_mode(mode: Mode) -> Self {
        Self {
            inner: Arc::new(Inner {
                mode,
                stop: Notify::new(),
                started: Notify::new(),
                serve_count: AtomicUsize::new(0),
                stop_count: AtomicUsize::new(0),
                local_addr: Mutex::new(None),
            }),
        }
    }

    pub fn blocking() -> Self {
        Self::with_mode(Mode::Block)
    }

    pub fn returning_ok() -> Self {
        Self::with_mode(Mode::ReturnOk)
    }

    pub fn failing(message: &str) -> Self {
        Self::with_mode(Mode::Fail(message.to_string()))
    }

    pub fn panicking() -> Self {
        Self::with_mode(Mode::Panic)
    }

    pub fn serve_count(&self) -> usize {
        self.inner.serve_count.load(Ordering::SeqCst)
    }

    pub fn stop_count(&self) -> usize {
        self.inner.stop_count.load(Ordering::SeqCst)
    }

    /// Address of the listener handed to serve.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.inner.local_addr.lock().unwrap()
    }

    /// Wait until serve has been entered.
    pub async fn wait_started(&self) {
        tokio::time::timeout(Duration::from_secs(5), self.inner.started.notified())
            .await
            .expect("serve was never called");
    }
}

impl Service for FakeService {
    async fn serve(&self, listener: Listener) -> Result<(), BoxError> {
        self.inner.serve_count.fetch_add(1, Ordering::SeqCst);
        *self.inner.local_addr.lock().unwrap() = listener.local_addr().ok();
        self.inner.started.notify_one();

        match &self.inner.mode {
            Mode::Block => {
                self.inner.stop.notified().await;
                drop(listener);
                Ok(())
            }
            Mode::ReturnOk => Ok(()),
            Mode::Fail(message) => Err(Box::new(Boom(message.clone()))),
            Mode::Panic => panic!("serve blew up"),
        }
    }

    fn graceful_stop(&self) {
        self.inner.stop_count.fetch_add(1, Ordering::SeqCst);
        self.inner.stop.notify_one();
    }
}

/// Reserve a free loopback port. The port is released before returning.
pub fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

/// A self-signed `localhost` certificate written to PEM files.
pub struct TestCert {
    _dir: tempfile::TempDir,
    pub cert_path: std::path::PathBuf,
    pub key_path: std::path::PathBuf,
    pub cert_pem: String,
}

impl TestCert {
    pub fn localhost() -> Self {
        let generated = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let cert_path = dir.path().join("cert.pem");
        let key_path = dir.path().join("key.pem");
        let cert_pem = generated.cert.pem();
        std::fs::write(&cert_path, &cert_pem).unwrap();
        std::fs::write(&key_path, generated.key_pair.serialize_pem()).unwrap();

        Self {
            _dir: dir,
            cert_path,
            key_path,
            cert_pem,
        }
    }

    pub fn files(&self) -> serve_harness::CertificateFiles {
        serve_harness::CertificateFiles::new(&self.cert_path, &self.key_path)
    }

    /// Client connector trusting only this certificate.
    pub fn connector(&self) -> tokio_rustls::TlsConnector {
        let mut roots = rustls::RootCertStore::empty();
        for cert in rustls_pemfile::certs(&mut self.cert_pem.as_bytes()) {
            roots.add(cert.unwrap()).unwrap();
        }
        let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
        let config = rustls::ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .unwrap()
            .with_root_certificates(roots)
            .with_no_client_auth();
        tokio_rustls::TlsConnector::from(Arc::new(config))
    }
}
