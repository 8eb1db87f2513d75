//! HTTP service served on the lifecycle's listener.
//!
//! # Responsibilities
//! - Create Axum Router with the built-in handlers
//! - Wire up middleware (tracing, timeout, request ID)
//! - Serve on a plain or TLS [`Listener`] until gracefully stopped

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::Request,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde_json::json;
use tokio::sync::Notify;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::error::BoxError;
use crate::http::request::{propagate_request_id_layer, request_id, set_request_id_layer};
use crate::lifecycle::Service;
use crate::net::Listener;

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// An axum application implementing [`Service`].
pub struct HttpService {
    router: Router,
    stop: Arc<Notify>,
}

impl HttpService {
    /// Health and echo endpoints with the standard middleware stack.
    pub fn new(request_timeout: Duration) -> Self {
        let router = Router::new()
            .route("/healthz", get(healthz))
            .fallback(echo);
        Self::with_router(router, request_timeout)
    }

    /// Serve a caller-supplied router with the standard middleware stack.
    pub fn with_router(router: Router, request_timeout: Duration) -> Self {
        let router = router
            .layer(TimeoutLayer::with_status_code(
                StatusCode::REQUEST_TIMEOUT,
                request_timeout,
            ))
            .layer(propagate_request_id_layer())
            .layer(TraceLayer::new_for_http())
            .layer(set_request_id_layer());

        Self {
            router,
            stop: Arc::new(Notify::new()),
        }
    }
}

impl Default for HttpService {
    fn default() -> Self {
        Self::new(DEFAULT_REQUEST_TIMEOUT)
    }
}

impl Service for HttpService {
    async fn serve(&self, listener: Listener) -> Result<(), BoxError> {
        let stop = Arc::clone(&self.stop);
        tracing::info!(tls = listener.is_tls(), "HTTP service starting");

        axum::serve(listener, self.router.clone())
            .with_graceful_shutdown(async move { stop.notified().await })
            .await?;

        tracing::info!("HTTP service stopped");
        Ok(())
    }

    fn graceful_stop(&self) {
        // notify_one keeps a permit if serve is not waiting yet.
        self.stop.notify_one();
    }
}

async fn healthz() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION"),
        })),
    )
}

async fn echo(request: Request) -> impl IntoResponse {
    Json(json!({
        "method": request.method().as_str(),
        "path": request.uri().path(),
        "request_id": request_id(&request),
    }))
}
