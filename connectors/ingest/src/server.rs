use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use drasi_mcp_core::{ResourceStore, SyncPointManager};
use drasi_mcp_proto::QueryConfig;
use tower::ServiceBuilder;
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{info, Level};

use crate::{
    handler::{handle_envelope, health},
    state::IngestState,
};

/// The inbound change-event HTTP listener (spec.md §4.4, §6), built the
/// same way the teacher's `ankurah-websocket-server::WebsocketServer` and
/// `ankurah-server::Server` build their `axum::Router`s: a `TraceLayer`
/// wrapping a small route table, served via `axum::serve`.
pub struct IngestServer {
    router: Router,
}

impl IngestServer {
    pub fn new(store: Arc<ResourceStore>, sync_points: Arc<SyncPointManager>, configs: Arc<Vec<QueryConfig>>) -> Self {
        let state = IngestState::new(store, sync_points, configs);
        let router = Router::new()
            .route("/", post(handle_envelope))
            .route("/health", get(health))
            .with_state(state)
            .layer(
                ServiceBuilder::new().layer(
                    TraceLayer::new_for_http()
                        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                        .on_request(DefaultOnRequest::new().level(Level::INFO))
                        .on_response(DefaultOnResponse::new().level(Level::INFO)),
                ),
            );
        Self { router }
    }

    pub async fn run(self, bind_address: &str) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(bind_address).await?;
        info!("ingest listener bound on {}", listener.local_addr()?);
        axum::serve(listener, self.router.into_make_service_with_connect_info::<SocketAddr>())
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        Ok(())
    }

    /// Exposes the inner router for in-process testing without binding a
    /// real socket twice.
    pub fn into_router(self) -> Router { self.router }
}

/// Waits for Ctrl-C or, on Unix, `SIGTERM` — the graceful-shutdown trigger
/// for the documented exit-code contract (spec.md §6 "Exit codes").
async fn shutdown_signal() {
    let ctrl_c = async { tokio::signal::ctrl_c().await.expect("failed to install Ctrl-C handler") };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()).expect("failed to install SIGTERM handler").recv().await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
