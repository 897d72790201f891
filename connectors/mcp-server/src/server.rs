use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Json, Response,
    },
    routing::{get, post},
    Router,
};
use drasi_mcp_core::ResourceStore;
use drasi_mcp_proto::QueryConfig;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::Value;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tower::ServiceBuilder;
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{info, Level};

use crate::{
    methods::Dispatcher,
    notify,
    rpc::{RpcResponse, INVALID_REQUEST, PARSE_ERROR},
    session::{Session, SessionId},
    state::McpState,
};

const SESSION_HEADER: &str = "mcp-session-id";

/// The MCP JSON-RPC + SSE host (spec.md §4.5), built the same way
/// `IngestServer` and the teacher's own `axum::Router`-building servers are:
/// a route table behind a `TraceLayer`, served via `axum::serve`.
pub struct McpServer {
    router: Router,
}

impl McpServer {
    pub fn new(store: Arc<ResourceStore>, configs: Arc<Vec<QueryConfig>>) -> Self {
        let signals = store.subscribe_signals();
        let state = Arc::new(McpState::new(store, configs));
        tokio::spawn(notify::run(signals, state.sessions.clone()));

        let router = Router::new()
            .route("/health", get(health))
            .route("/", get(server_info))
            .route("/mcp", post(handle_rpc))
            .route("/mcp/sse", get(handle_sse))
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
        info!("mcp server bound on {}", listener.local_addr()?);
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

async fn health() -> &'static str { "OK" }

async fn server_info(State(state): State<Arc<McpState>>) -> Json<Value> {
    Json(serde_json::json!({
        "name": state.store.reaction_name(),
        "version": env!("CARGO_PKG_VERSION"),
        "mcp": { "endpoint": "/mcp", "sse": "/mcp/sse" },
    }))
}

#[derive(Debug, Deserialize)]
struct RawRequest {
    #[serde(default)]
    id: Value,
    method: Option<String>,
    #[serde(default)]
    params: Value,
}

/// `POST /mcp` — one JSON-RPC 2.0 request in, one SSE `event: message` frame
/// out (never bare JSON; spec.md §9's documented SSE-framing pitfall).
async fn handle_rpc(State(state): State<Arc<McpState>>, headers: HeaderMap, body: Bytes) -> Response {
    let raw: Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(_) => return sse_frame(&RpcResponse::err(Value::Null, PARSE_ERROR, "parse error")),
    };
    let request: RawRequest = match serde_json::from_value(raw) {
        Ok(request) => request,
        Err(_) => return sse_frame(&RpcResponse::err(Value::Null, INVALID_REQUEST, "invalid request")),
    };
    let Some(method) = request.method else {
        return sse_frame(&RpcResponse::err(request.id, INVALID_REQUEST, "invalid request"));
    };

    let (session, is_new) = match resolve_session(&state, &headers, &method) {
        Ok(found) => found,
        Err(response) => return sse_frame(&RpcResponse::err(request.id, response.0, response.1)),
    };

    let dispatcher = Dispatcher { store: &state.store, configs: &state.configs };
    let response = match dispatcher.dispatch(&session, &method, &request.params) {
        Ok(result) => RpcResponse::ok(request.id, result),
        Err(err) => RpcResponse::from_error(request.id, err),
    };

    let mut http_response = sse_frame(&response);
    if is_new {
        if let Ok(value) = HeaderValue::from_str(&session.id.to_string()) {
            http_response.headers_mut().insert(SESSION_HEADER, value);
        }
    }
    http_response
}

#[derive(Debug, Deserialize)]
struct SseQuery {
    #[serde(rename = "sessionId")]
    session_id: Option<String>,
}

/// `GET /mcp/sse` — the long-lived stream of server-initiated notifications
/// for one session, attached exactly once per session.
async fn handle_sse(State(state): State<Arc<McpState>>, headers: HeaderMap, Query(query): Query<SseQuery>) -> Response {
    let Some(session) = lookup_session(&state, &headers, query.session_id.as_deref()) else {
        return (StatusCode::BAD_REQUEST, "unknown or missing session").into_response();
    };
    let Some(receiver) = session.take_receiver() else {
        return (StatusCode::CONFLICT, "sse stream already attached for this session").into_response();
    };

    let stream = UnboundedReceiverStream::new(receiver).map(|message| Ok::<_, Infallible>(Event::default().event("message").data(message.to_string())));
    Sse::new(stream).keep_alive(KeepAlive::default()).into_response()
}

fn resolve_session(state: &McpState, headers: &HeaderMap, method: &str) -> Result<(Arc<Session>, bool), (i64, &'static str)> {
    if method == "initialize" {
        return Ok((state.sessions.create(), true));
    }
    match lookup_session(state, headers, None) {
        Some(session) => Ok((session, false)),
        None => Err((INVALID_REQUEST, "missing or unknown session")),
    }
}

fn lookup_session(state: &McpState, headers: &HeaderMap, query_session_id: Option<&str>) -> Option<Arc<Session>> {
    let raw = headers
        .get(SESSION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
        .or_else(|| query_session_id.map(str::to_string))?;
    let id: SessionId = raw.parse().ok()?;
    state.sessions.get(id)
}

fn sse_frame(response: &RpcResponse) -> Response {
    let body = serde_json::to_string(response).unwrap_or_else(|_| "{}".to_string());
    let frame = format!("event: message\ndata: {body}\n\n");
    ([(header::CONTENT_TYPE, "text/event-stream")], frame).into_response()
}
