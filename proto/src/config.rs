use serde::{Deserialize, Serialize};

/// Per-query configuration, loaded once at process start and immutable thereafter.
///
/// Mirrors `ankurah_core`'s treatment of collection-level config: a small,
/// cheaply-cloned, read-only record shared across the store, the bootstrap
/// path, and the MCP server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QueryConfig {
    pub query_id: String,
    pub key_field: String,
    #[serde(default = "default_content_type")]
    pub resource_content_type: String,
    #[serde(default)]
    pub description: Option<String>,
}

fn default_content_type() -> String { "application/json".to_string() }

impl QueryConfig {
    pub fn new(query_id: impl Into<String>, key_field: impl Into<String>) -> Self {
        Self { query_id: query_id.into(), key_field: key_field.into(), resource_content_type: default_content_type(), description: None }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Process-level configuration (the three recognised keys from spec.md §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionConfig {
    #[serde(default = "default_reaction_name")]
    pub reaction_name: String,
    #[serde(default = "default_app_port")]
    pub app_port: u16,
    #[serde(default = "default_mcp_port")]
    pub mcp_server_port: u16,
}

fn default_reaction_name() -> String { "mcp-server".to_string() }
fn default_app_port() -> u16 { 80 }
fn default_mcp_port() -> u16 { 8080 }

impl Default for ReactionConfig {
    fn default() -> Self { Self { reaction_name: default_reaction_name(), app_port: default_app_port(), mcp_server_port: default_mcp_port() } }
}
