use std::sync::Arc;

use drasi_mcp_core::ResourceStore;
use drasi_mcp_proto::QueryConfig;

use crate::session::SessionManager;

#[derive(Clone)]
pub struct McpState {
    pub store: Arc<ResourceStore>,
    pub configs: Arc<Vec<QueryConfig>>,
    pub sessions: Arc<SessionManager>,
}

impl McpState {
    pub fn new(store: Arc<ResourceStore>, configs: Arc<Vec<QueryConfig>>) -> Self {
        Self { store, configs, sessions: Arc::new(SessionManager::new()) }
    }
}
