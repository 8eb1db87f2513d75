//! Plain and TLS listeners.
//!
//! # Responsibilities
//! - Bind to `host:port`
//! - Wrap accepted streams in TLS when a configuration is supplied
//! - Expose an accept loop that never fails, for `axum::serve`
//!
//! # Design Decisions
//! - Binding is the only fallible step visible to the lifecycle
//! - TLS handshakes run concurrently, each bounded by a timeout, so a slow
//!   peer never holds up the next connection
//! - Handshake and transient accept failures are logged and skipped
//! - TLS-ALPN-01 validation connections end after the handshake and are never
//!   handed to the service

use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::stream::{FuturesUnordered, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::server::TlsStream;
use tokio_rustls::TlsAcceptor;

use crate::config::schema::bind_address;
use crate::error::ServerError;
use crate::net::tls::ACME_TLS_ALPN;
use crate::observability::metrics;

/// Upper bound on a single TLS handshake.
pub const TLS_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Handshakes in flight before new TCP connections wait in the backlog.
pub const MAX_PENDING_HANDSHAKES: usize = 1024;

/// Outcome of one handshake; `Ok(None)` for a finished ACME validation.
type Handshake = BoxFuture<'static, (io::Result<Option<Connection>>, SocketAddr)>;

/// A bound socket accepting plain or TLS connections.
pub struct Listener {
    /// The underlying TCP listener.
    inner: TcpListener,
    /// Present when connections are TLS terminated.
    tls: Option<TlsAcceptor>,
    handshakes: FuturesUnordered<Handshake>,
}

impl Listener {
    /// Bind `host:port`, terminating TLS when `tls` is given.
    ///
    /// An empty host binds every interface.
    pub async fn bind(
        host: &str,
        port: u16,
        tls: Option<Arc<rustls::ServerConfig>>,
    ) -> Result<Self, ServerError> {
        let addr = bind_address(host, port);

        let inner = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Listen {
                addr: addr.clone(),
                source,
            })?;

        let listener = Self {
            inner,
            tls: tls.map(TlsAcceptor::from),
            handshakes: FuturesUnordered::new(),
        };

        if let Ok(local_addr) = listener.local_addr() {
            tracing::info!(
                address = %local_addr,
                tls = listener.is_tls(),
                "Listener bound"
            );
        }

        Ok(listener)
    }

    /// Get the local address this listener is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }

    pub fn is_tls(&self) -> bool {
        self.tls.is_some()
    }

    /// Accept one connection, completing the TLS handshake if configured.
    ///
    /// TLS handshakes keep progressing only while this is being awaited.
    /// Cancel safe: pending handshakes survive a dropped call.
    pub async fn try_accept(&mut self) -> io::Result<(Connection, SocketAddr)> {
        let Some(acceptor) = self.tls.clone() else {
            let (stream, addr) = self.inner.accept().await?;
            metrics::record_connection("tcp");
            return Ok((Connection::Plain(stream), addr));
        };

        loop {
            let accepting = self.handshakes.len() < MAX_PENDING_HANDSHAKES;
            let pending = !self.handshakes.is_empty();

            tokio::select! {
                accepted = self.inner.accept(), if accepting => {
                    let (stream, addr) = accepted?;
                    self.handshakes
                        .push(Box::pin(handshake(acceptor.clone(), stream, addr)));
                }
                Some((res, addr)) = self.handshakes.next(), if pending => {
                    if let Some(conn) = res? {
                        return Ok((conn, addr));
                    }
                }
            }
        }
    }
}

async fn handshake(
    acceptor: TlsAcceptor,
    stream: TcpStream,
    addr: SocketAddr,
) -> (io::Result<Option<Connection>>, SocketAddr) {
    let res = match tokio::time::timeout(TLS_HANDSHAKE_TIMEOUT, acceptor.accept(stream)).await {
        Ok(Ok(tls_stream)) if tls_stream.get_ref().1.alpn_protocol() == Some(ACME_TLS_ALPN) => {
            tracing::debug!(peer = %addr, "Answered ACME TLS-ALPN-01 validation");
            metrics::record_connection("acme_validation");
            Ok(None)
        }
        Ok(Ok(tls_stream)) => {
            metrics::record_connection("tls");
            Ok(Some(Connection::Tls(Box::new(tls_stream))))
        }
        Ok(Err(e)) => {
            metrics::record_handshake_failure();
            Err(e)
        }
        Err(_) => {
            metrics::record_handshake_failure();
            Err(io::Error::new(io::ErrorKind::TimedOut, "TLS handshake timed out"))
        }
    };
    (res, addr)
}

impl std::fmt::Debug for Listener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listener")
            .field("local_addr", &self.inner.local_addr().ok())
            .field("tls", &self.is_tls())
            .field("handshakes", &self.handshakes.len())
            .finish()
    }
}

impl axum::serve::Listener for Listener {
    type Io = Connection;
    type Addr = SocketAddr;

    async fn accept(&mut self) -> (Self::Io, Self::Addr) {
        loop {
            match self.try_accept().await {
                Ok(accepted) => return accepted,
                Err(e) => handle_accept_error(e).await,
            }
        }
    }

    fn local_addr(&self) -> io::Result<Self::Addr> {
        Listener::local_addr(self)
    }
}

async fn handle_accept_error(e: io::Error) {
    if is_connection_error(&e) {
        tracing::debug!(error = %e, "Connection dropped during accept or handshake");
        return;
    }

    // Resource errors (EMFILE and friends) would spin the loop; back off.
    tracing::error!(error = %e, "Accept error");
    tokio::time::sleep(Duration::from_secs(1)).await;
}

fn is_connection_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::InvalidData
            | io::ErrorKind::UnexpectedEof
            | io::ErrorKind::TimedOut
    )
}

/// An accepted connection.
pub enum Connection {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl Connection {
    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        match self {
            Connection::Plain(s) => s.peer_addr(),
            Connection::Tls(s) => s.get_ref().0.peer_addr(),
        }
    }

    pub fn is_tls(&self) -> bool {
        matches!(self, Connection::Tls(_))
    }
}

impl AsyncRead for Connection {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Connection::Plain(s) => Pin::new(s).poll_read(cx, buf),
            Connection::Tls(s) => Pin::new(&mut **s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Connection {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Connection::Plain(s) => Pin::new(s).poll_write(cx, buf),
            Connection::Tls(s) => Pin::new(&mut **s).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Connection::Plain(s) => Pin::new(s).poll_flush(cx),
            Connection::Tls(s) => Pin::new(&mut **s).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Connection::Plain(s) => Pin::new(s).poll_shutdown(cx),
            Connection::Tls(s) => Pin::new(&mut **s).poll_shutdown(cx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustls::pki_types::{CertificateDer, PrivatePkcs8KeyDer, ServerName};
    use rustls::server::{ClientHello, ResolvesServerCert};
    use rustls::sign::CertifiedKey;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio_rustls::TlsConnector;

    use crate::net::tls::acme_server_config;

    /// Resolves every handshake to one self-signed certificate.
    #[derive(Debug)]
    struct FixedCert(Arc<CertifiedKey>);

    impl ResolvesServerCert for FixedCert {
        fn resolve(&self, _client_hello: ClientHello<'_>) -> Option<Arc<CertifiedKey>> {
            Some(Arc::clone(&self.0))
        }
    }

    fn self_signed() -> (CertificateDer<'static>, Arc<CertifiedKey>) {
        let generated = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        let cert = generated.cert.der().clone();
        let key = rustls::crypto::aws_lc_rs::default_provider()
            .key_provider
            .load_private_key(PrivatePkcs8KeyDer::from(generated.key_pair.serialize_der()).into())
            .unwrap();
        (cert.clone(), Arc::new(CertifiedKey::new(vec![cert], key)))
    }

    fn connector(root: &CertificateDer<'static>, alpn: &[&[u8]]) -> TlsConnector {
        let mut roots = rustls::RootCertStore::empty();
        roots.add(root.clone()).unwrap();
        let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
        let mut config = rustls::ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .unwrap()
            .with_root_certificates(roots)
            .with_no_client_auth();
        config.alpn_protocols = alpn.iter().map(|p| p.to_vec()).collect();
        TlsConnector::from(Arc::new(config))
    }

    #[tokio::test]
    async fn binds_ephemeral_port() {
        let listener = Listener::bind("127.0.0.1", 0, None).await.unwrap();
        let addr = listener.local_addr().unwrap();
        assert!(addr.ip().is_loopback());
        assert_ne!(addr.port(), 0);
        assert!(!listener.is_tls());
    }

    #[tokio::test]
    async fn port_in_use_is_a_listen_error() {
        let first = Listener::bind("127.0.0.1", 0, None).await.unwrap();
        let port = first.local_addr().unwrap().port();

        let err = Listener::bind("127.0.0.1", port, None).await.unwrap_err();
        match err {
            ServerError::Listen { addr, .. } => assert_eq!(addr, format!("127.0.0.1:{}", port)),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn plain_accept_round_trip() {
        let mut listener = Listener::bind("127.0.0.1", 0, None).await.unwrap();
        let addr = listener.local_addr().unwrap();

        let client = tokio::spawn(async move {
            let mut stream = TcpStream::connect(addr).await.unwrap();
            stream.write_all(b"ping").await.unwrap();
            let mut buf = [0u8; 4];
            stream.read_exact(&mut buf).await.unwrap();
            buf
        });

        let (mut conn, _peer) = listener.try_accept().await.unwrap();
        assert!(!conn.is_tls());
        let mut buf = [0u8; 4];
        conn.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");
        conn.write_all(b"pong").await.unwrap();

        assert_eq!(&client.await.unwrap(), b"pong");
    }

    #[tokio::test]
    async fn acme_validation_is_answered_but_not_handed_out() {
        let (root, key) = self_signed();
        let config = acme_server_config(Arc::new(FixedCert(key))).unwrap();
        let mut listener = Listener::bind("127.0.0.1", 0, Some(config)).await.unwrap();
        let addr = listener.local_addr().unwrap();
        let name = ServerName::try_from("localhost").unwrap();

        let accepting = tokio::spawn(async move {
            let (conn, peer) = listener.try_accept().await.unwrap();
            (conn.is_tls(), peer)
        });

        let tcp = TcpStream::connect(addr).await.unwrap();
        let validation = connector(&root, &[ACME_TLS_ALPN])
            .connect(name.clone(), tcp)
            .await
            .unwrap();
        assert_eq!(validation.get_ref().1.alpn_protocol(), Some(ACME_TLS_ALPN));

        let tcp = TcpStream::connect(addr).await.unwrap();
        let client_addr = tcp.local_addr().unwrap();
        let regular = connector(&root, &[&b"h2"[..], &b"http/1.1"[..]])
            .connect(name, tcp)
            .await
            .unwrap();
        assert_eq!(regular.get_ref().1.alpn_protocol(), Some(&b"h2"[..]));

        let (is_tls, peer) = tokio::time::timeout(Duration::from_secs(5), accepting)
            .await
            .unwrap()
            .unwrap();
        assert!(is_tls);
        assert_eq!(peer, client_addr);

        drop(validation);
        drop(regular);
    }
}
