use std::sync::Arc;

use drasi_mcp_core::{ResourceStore, SyncPointManager};
use drasi_mcp_proto::QueryConfig;

/// Shared state for the ingest listener, cloned cheaply per request
/// (everything inside is already `Arc`-wrapped), matching the
/// `ServerState`/`AppState` pattern in the teacher's `server` crate.
#[derive(Clone)]
pub struct IngestState {
    pub store: Arc<ResourceStore>,
    pub sync_points: Arc<SyncPointManager>,
    pub configs: Arc<Vec<QueryConfig>>,
}

impl IngestState {
    pub fn new(store: Arc<ResourceStore>, sync_points: Arc<SyncPointManager>, configs: Arc<Vec<QueryConfig>>) -> Self {
        Self { store, sync_points, configs }
    }
}
