use std::sync::Arc;

use drasi_mcp_core::{ResourceStore, SyncPointManager};
use drasi_mcp_ingest::IngestServer;
use drasi_mcp_proto::QueryConfig;
use drasi_mcp_server::McpServer;

/// A running instance of both network endpoints (spec.md §5: "the two ports
/// must agree on the Resource Store and Sync-Point Manager"), bound to
/// ephemeral ports so tests never collide. Mirrors the teacher's
/// `tests/tests/common.rs` node-plus-server fixture.
pub struct Harness {
    pub store: Arc<ResourceStore>,
    pub sync_points: Arc<SyncPointManager>,
    pub ingest_base: String,
    pub mcp_base: String,
}

pub async fn spawn(reaction_name: &str, configs: Vec<QueryConfig>) -> Harness {
    let store = Arc::new(ResourceStore::new(reaction_name));
    let sync_points = Arc::new(SyncPointManager::new());
    let configs = Arc::new(configs);

    let ingest_listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let ingest_addr = ingest_listener.local_addr().unwrap();
    let ingest_router = IngestServer::new(store.clone(), sync_points.clone(), configs.clone()).into_router();
    tokio::spawn(async move {
        axum::serve(ingest_listener, ingest_router).await.unwrap();
    });

    let mcp_listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let mcp_addr = mcp_listener.local_addr().unwrap();
    let mcp_router = McpServer::new(store.clone(), configs).into_router();
    tokio::spawn(async move {
        axum::serve(mcp_listener, mcp_router).await.unwrap();
    });

    Harness { store, sync_points, ingest_base: format!("http://{ingest_addr}"), mcp_base: format!("http://{mcp_addr}") }
}

impl Harness {
    /// Drives `initialize` against the MCP endpoint and returns the issued
    /// session id, for tests that need a `READY` session.
    pub async fn mcp_session(&self, client: &reqwest::Client) -> String {
        let response = client
            .post(format!("{}/mcp", self.mcp_base))
            .json(&serde_json::json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}}))
            .send()
            .await
            .unwrap();
        response.headers().get("mcp-session-id").and_then(|v| v.to_str().ok()).unwrap().to_string()
    }

    pub async fn mcp_call(&self, client: &reqwest::Client, session_id: &str, method: &str, params: serde_json::Value) -> serde_json::Value {
        let body = client
            .post(format!("{}/mcp", self.mcp_base))
            .header("mcp-session-id", session_id)
            .json(&serde_json::json!({"jsonrpc": "2.0", "id": 1, "method": method, "params": params}))
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        let data_line = body.lines().find(|line| line.starts_with("data: ")).unwrap();
        serde_json::from_str(&data_line["data: ".len()..]).unwrap()
    }
}
