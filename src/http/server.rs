//! HTTP server implementation.

use std::any::Any;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any as AnyOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use super::error::ApiError;
use super::handlers;
use crate::credits::CreditGate;
use crate::error::{CreditGateError, Result};
use crate::vision::VisionService;

/// Default request body cap, large enough for a base64 photo.
const DEFAULT_MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    /// Credit gate in front of the collaborator
    pub gate: CreditGate,
    /// Image description collaborator
    pub vision: Arc<dyn VisionService>,
    /// Shared caller key; `None` disables the check
    pub api_key: Option<Arc<str>>,
}

impl AppState {
    pub fn new(gate: CreditGate, vision: Arc<dyn VisionService>, api_key: Option<String>) -> Self {
        Self {
            gate,
            vision,
            api_key: api_key.map(Arc::from),
        }
    }
}

fn handle_panic(_: Box<dyn Any + Send + 'static>) -> Response {
    error!("Handler panicked");
    ApiError::Internal.into_response()
}

/// Assemble the router with its middleware stack.
pub fn build_router(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .route(
            "/",
            get(handlers::index)
                .post(handlers::index)
                .fallback(handlers::method_not_allowed),
        )
        .route(
            "/credits",
            get(handlers::credits).fallback(handlers::method_not_allowed),
        )
        .route(
            "/analyze/image",
            post(handlers::analyze_image).fallback(handlers::method_not_allowed),
        )
        .fallback(handlers::not_found)
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(
            CorsLayer::new()
                .allow_origin(AnyOrigin)
                .allow_headers(AnyOrigin)
                .allow_methods(AnyOrigin),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// HTTP server for the credit-gated API.
pub struct HttpServer {
    /// Address to bind to
    addr: SocketAddr,
    /// Handler state
    state: AppState,
    max_body_bytes: usize,
}

impl HttpServer {
    /// Create a new HTTP server.
    pub fn new(addr: SocketAddr, state: AppState) -> Self {
        Self {
            addr,
            state,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    /// Start the server.
    ///
    /// This method will block until the server is shut down.
    pub async fn serve(self) -> Result<()> {
        self.serve_with_shutdown(std::future::pending()).await
    }

    /// Start the server with graceful shutdown.
    ///
    /// The server stops accepting connections when the provided signal
    /// resolves and returns once in-flight requests have finished.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let router = build_router(self.state, self.max_body_bytes);
        let listener = TcpListener::bind(self.addr).await.map_err(|e| {
            error!(addr = %self.addr, error = %e, "Failed to bind HTTP listener");
            e
        })?;

        info!(addr = %listener.local_addr()?, "Starting HTTP server");

        axum::serve(listener, router)
            .with_graceful_shutdown(signal)
            .await
            .map_err(|e| {
                error!(error = %e, "HTTP server failed");
                CreditGateError::Io(e)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credits::SqliteLedger;
    use crate::vision::MockVisionClient;

    #[tokio::test]
    async fn test_server_shuts_down_on_signal() {
        let ledger = Arc::new(SqliteLedger::open_in_memory().unwrap());
        let state = AppState::new(
            CreditGate::new(ledger),
            Arc::new(MockVisionClient::new()),
            None,
        );
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();

        let server = HttpServer::new(addr, state).with_max_body_bytes(1024);
        tokio_test::assert_ok!(server.serve_with_shutdown(async {}).await);
    }
}
