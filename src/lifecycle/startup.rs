//! Startup orchestration and the serve/stop race.
//!
//! # Responsibilities
//! - Assemble an immutable [`Server`] from a base config plus explicit options
//! - TLS bootstrap (if enabled) → bind → serve-or-stop
//! - Invoke graceful stop at most once, and only when a stop request wins
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal and returned before serving
//! - The listener is bound last, after every configuration check
//! - A serve error is returned verbatim; a requested stop is not an error

use std::sync::Arc;

use tokio::task::JoinError;

use crate::config::loader::{apply_env, ConfigError};
use crate::config::schema::{AutoCertConfig, CertificateFilesConfig, ServerConfig};
use crate::error::{BoxError, ServerError};
use crate::lifecycle::service::Service;
use crate::lifecycle::shutdown::{stop_channel, StopHandle, StopSignal};
use crate::lifecycle::signals::forward_os_signals;
use crate::net::{AutoCert, CertificateFiles, Listener, TlsProvider};
use crate::observability::metrics;

type Override = Box<dyn FnOnce(&mut ServerConfig) + Send>;

/// Builds a [`Server`] from a base configuration and ordered overrides.
///
/// Overrides set through the builder methods are applied on top of the base
/// configuration at [`build`](ServerBuilder::build) time, in call order, so
/// explicit options always win over file or environment defaults.
pub struct ServerBuilder<S> {
    service: S,
    base: ServerConfig,
    overrides: Vec<Override>,
    tls_provider: Option<Box<dyn TlsProvider>>,
    stop: Option<StopSignal>,
}

impl<S: Service> ServerBuilder<S> {
    pub fn new(service: S) -> Self {
        Self {
            service,
            base: ServerConfig::default(),
            overrides: Vec::new(),
            tls_provider: None,
            stop: None,
        }
    }

    /// Replace the base configuration.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.base = config;
        self
    }

    /// Overlay `SERVE_*` environment variables onto the base configuration.
    pub fn with_env(mut self) -> Result<Self, ConfigError> {
        apply_env(&mut self.base)?;
        Ok(self)
    }

    /// Apply an arbitrary override.
    pub fn with(mut self, f: impl FnOnce(&mut ServerConfig) + Send + 'static) -> Self {
        self.overrides.push(Box::new(f));
        self
    }

    pub fn host(self, host: impl Into<String>) -> Self {
        let host = host.into();
        self.with(move |c| c.host = host)
    }

    pub fn port(self, port: u16) -> Self {
        self.with(move |c| c.port = port)
    }

    /// Enable TLS with ACME-managed certificates.
    pub fn autocert<I, H>(self, cache_dir: impl Into<String>, hosts: I) -> Self
    where
        I: IntoIterator<Item = H>,
        H: Into<String>,
    {
        let cache_dir = cache_dir.into();
        let hosts: Vec<String> = hosts.into_iter().map(Into::into).collect();
        self.with(move |c| {
            c.tls.enabled = true;
            c.tls.certificate = None;
            c.tls.autocert = AutoCertConfig {
                cache_dir,
                hosts,
                ..std::mem::take(&mut c.tls.autocert)
            };
        })
    }

    /// Enable TLS with a certificate chain and key read from PEM files.
    pub fn certificate_files(self, cert_path: impl Into<String>, key_path: impl Into<String>) -> Self {
        let files = CertificateFilesConfig {
            cert_path: cert_path.into(),
            key_path: key_path.into(),
        };
        self.with(move |c| {
            c.tls.enabled = true;
            c.tls.certificate = Some(files);
        })
    }

    /// Turn TLS off regardless of the base configuration.
    pub fn without_tls(self) -> Self {
        self.with(|c| c.tls.enabled = false)
    }

    /// Use a custom TLS source instead of the configured one.
    pub fn tls_provider(mut self, provider: impl TlsProvider + 'static) -> Self {
        self.tls_provider = Some(Box::new(provider));
        self
    }

    /// Drive shutdown from `stop` instead of OS signals.
    pub fn stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = Some(stop);
        self
    }

    pub fn build(self) -> Server<S> {
        let mut config = self.base;
        for apply in self.overrides {
            apply(&mut config);
        }

        let tls = match self.tls_provider {
            Some(provider) => Some(provider),
            None if config.tls.enabled => Some(provider_for(&config)),
            None => None,
        };

        let (stop, os_signals) = match self.stop {
            Some(stop) => (stop, None),
            None => {
                let (handle, stop) = stop_channel();
                (stop, Some(handle))
            }
        };

        Server {
            config,
            service: Arc::new(self.service),
            tls,
            stop,
            os_signals,
        }
    }
}

fn provider_for(config: &ServerConfig) -> Box<dyn TlsProvider> {
    match &config.tls.certificate {
        Some(files) => Box::new(CertificateFiles::from_config(files)),
        None => Box::new(AutoCert::from_config(&config.tls.autocert)),
    }
}

/// A single-listener server around a [`Service`].
pub struct Server<S> {
    config: ServerConfig,
    service: Arc<S>,
    tls: Option<Box<dyn TlsProvider>>,
    stop: StopSignal,
    /// Set when no stop signal was supplied; wired to SIGINT/SIGTERM on start.
    os_signals: Option<StopHandle>,
}

impl<S: Service> Server<S> {
    pub fn builder(service: S) -> ServerBuilder<S> {
        ServerBuilder::new(service)
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Handle for stopping a server that listens for OS signals.
    ///
    /// `None` when a stop signal was supplied to the builder; the caller
    /// already holds its handle.
    pub fn stop_handle(&self) -> Option<StopHandle> {
        self.os_signals.clone()
    }

    /// Bootstrap TLS, bind, serve, and wait for serve to end or a stop request.
    ///
    /// Returns the serve error if serving ends first, `Ok(())` if serving
    /// ends cleanly or a stop request wins, or the startup error.
    pub async fn start(self) -> Result<(), ServerError> {
        let Server {
            config,
            service,
            tls,
            mut stop,
            os_signals,
        } = self;

        if let Some(handle) = os_signals {
            forward_os_signals(handle);
        }

        // The driver guard lives until start returns, on every path.
        let (tls_config, _tls_driver) = match tls {
            Some(provider) => {
                let setup = provider.tls_config()?;
                metrics::record_lifecycle_event("tls_ready");
                (Some(setup.config), setup.driver)
            }
            None => (None, None),
        };

        let listener = Listener::bind(&config.host, config.port, tls_config).await?;
        metrics::record_lifecycle_event("listening");
        if let Ok(addr) = listener.local_addr() {
            tracing::info!(address = %addr, tls = listener.is_tls(), "Listening");
        }

        let serve_service = Arc::clone(&service);
        let mut serving = tokio::spawn(async move { serve_service.serve(listener).await });
        metrics::set_serving(true);

        let result = tokio::select! {
            res = &mut serving => {
                metrics::record_lifecycle_event("serve_returned");
                let res = serve_result(res);
                match &res {
                    Ok(()) => tracing::info!("Service stopped"),
                    Err(e) => tracing::debug!(error = %e, "Service returned an error"),
                }
                res
            }
            Some(reason) = stop.recv() => {
                tracing::info!(reason = %reason, "Received stop request, shutting down");
                metrics::record_lifecycle_event("graceful_stop");
                service.graceful_stop();

                if let Err(e) = serve_result(serving.await) {
                    tracing::debug!(error = %e, "Service returned an error while stopping");
                }
                tracing::info!("Shutdown complete");
                Ok(())
            }
        };

        metrics::set_serving(false);
        result
    }
}

fn serve_result(res: Result<Result<(), BoxError>, JoinError>) -> Result<(), ServerError> {
    match res {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(ServerError::Serve(e)),
        Err(e) => Err(ServerError::Serve(Box::new(e))),
    }
}
