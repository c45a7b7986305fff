//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router for both transports
//! - Wire up middleware (tracing, limits, request ID)
//! - Serve on a listener until shutdown is triggered

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::limit::GlobalConcurrencyLimitLayer;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};

use crate::config::GatewayConfig;
use crate::gateway;
use crate::http::request::{propagate_request_id_layer, set_request_id_layer};
use crate::lifecycle::Shutdown;
use crate::merge::SpillStore;
use crate::pool::Pools;
use crate::rpc::{BasicAuthCredentials, DispatchTable};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub table: Arc<dyn DispatchTable>,
    pub pools: Arc<Pools>,
    pub spills: Arc<SpillStore>,
    pub credentials: Arc<BasicAuthCredentials>,
    pub config: Arc<GatewayConfig>,
}

impl AppState {
    pub fn new(config: GatewayConfig, table: Arc<dyn DispatchTable>) -> Self {
        Self {
            table,
            pools: Arc::new(Pools::default()),
            spills: Arc::new(SpillStore::new(&config.spill)),
            credentials: Arc::new(BasicAuthCredentials::from_config(&config.credentials)),
            config: Arc::new(config),
        }
    }
}

/// HTTP server for the gateway.
pub struct HttpServer {
    router: Router,
    state: AppState,
}

impl HttpServer {
    /// Create a new HTTP server serving `table`.
    pub fn new(config: GatewayConfig, table: Arc<dyn DispatchTable>) -> Self {
        let state = AppState::new(config, table);
        let router = Self::build_router(state.clone());
        Self { router, state }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(state: AppState) -> Router {
        let config = state.config.clone();
        Router::new()
            .route("/", get(gateway::list_methods))
            .route("/health", get(gateway::health))
            .route(&config.gateway.xmlrpc_path, post(gateway::handle_xmlrpc))
            .route("/{*path}", post(gateway::handle_json))
            .with_state(state)
            .layer(DefaultBodyLimit::disable())
            .layer(RequestBodyLimitLayer::new(config.listener.max_body_size))
            .layer(GlobalConcurrencyLimitLayer::new(config.listener.max_connections))
            .layer(propagate_request_id_layer())
            .layer(TraceLayer::new_for_http())
            .layer(set_request_id_layer())
    }

    /// Run the server until `shutdown` is triggered.
    pub async fn run(self, listener: TcpListener, shutdown: Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            methods = self.state.table.list().len(),
            xmlrpc_path = %self.state.config.gateway.xmlrpc_path,
            credentials_require_tls = self.state.credentials.require_transport_security(),
            "HTTP server starting"
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move { shutdown.wait().await })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }
}
