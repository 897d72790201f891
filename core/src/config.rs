use std::path::Path;

use drasi_mcp_proto::{QueryConfig, ReactionConfig};

use crate::error::ConfigError;

/// Loads [`ReactionConfig`] from the recognised environment variables
/// (spec.md §6), falling back to their documented defaults.
pub fn reaction_config_from_env() -> ReactionConfig {
    let mut config = ReactionConfig::default();
    if let Ok(name) = std::env::var("reactionName") {
        if !name.is_empty() {
            config.reaction_name = name;
        }
    }
    if let Ok(port) = std::env::var("appPort") {
        if let Ok(port) = port.parse() {
            config.app_port = port;
        }
    }
    if let Ok(port) = std::env::var("mcpServerPort") {
        if let Ok(port) = port.parse() {
            config.mcp_server_port = port;
        }
    }
    config
}

/// Loads per-query configuration from a directory of `*.json` files, one
/// file per query, mirroring how a Drasi reaction reads a mounted config
/// volume. Validates the Configuration-taxonomy rules from spec.md §7:
/// non-empty `keyField` per query, no duplicate `queryId`s, at least one
/// query configured.
pub fn load_query_configs(dir: &Path) -> Result<Vec<QueryConfig>, ConfigError> {
    let mut configs = Vec::new();
    let mut seen = std::collections::HashSet::new();

    let mut paths: Vec<_> = std::fs::read_dir(dir)?.collect::<Result<Vec<_>, _>>()?;
    paths.sort_by_key(|entry| entry.path());

    for entry in paths {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let contents = std::fs::read_to_string(&path)?;
        let config: QueryConfig = serde_json::from_str(&contents)?;
        validate_query_config(&config, &mut seen)?;
        configs.push(config);
    }

    if configs.is_empty() {
        return Err(ConfigError::NoQueries);
    }

    configs.sort_by(|a, b| a.query_id.cmp(&b.query_id));
    Ok(configs)
}

fn validate_query_config(config: &QueryConfig, seen: &mut std::collections::HashSet<String>) -> Result<(), ConfigError> {
    if config.key_field.is_empty() {
        return Err(ConfigError::EmptyKeyField(config.query_id.clone()));
    }
    if !seen.insert(config.query_id.clone()) {
        return Err(ConfigError::DuplicateQueryId(config.query_id.clone()));
    }
    Ok(())
}

pub fn validate_reaction_config(config: &ReactionConfig) -> Result<(), ConfigError> {
    if config.reaction_name.is_empty() {
        return Err(ConfigError::EmptyReactionName);
    }
    Ok(())
}
