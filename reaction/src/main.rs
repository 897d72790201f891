use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use drasi_mcp_core::config::{load_query_configs, reaction_config_from_env, validate_reaction_config};
use drasi_mcp_core::{QueryInitializer, ResourceStore, SyncPointManager};
use drasi_mcp_ingest::IngestServer;
use drasi_mcp_server::McpServer;
use futures::future::join_all;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod clients;

/// Process entry point, matching the teacher's single-`#[tokio::main]`
/// binaries (e.g. `examples/server/src/main.rs`): init tracing, run, and
/// translate any fatal error into the documented non-zero exit code
/// (spec.md §6 "Exit codes").
#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))).init();

    if let Err(err) = run().await {
        error!(error = format!("{err:#}"), "fatal error during startup or operation; exiting");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let reaction_config = reaction_config_from_env();
    validate_reaction_config(&reaction_config).context("invalid reaction configuration")?;

    let config_dir = std::env::var("queryConfigDir").unwrap_or_else(|_| "/etc/drasi/queries".to_string());
    let query_configs = load_query_configs(&PathBuf::from(config_dir)).context("failed to load query configuration")?;

    let store = Arc::new(ResourceStore::new(reaction_config.reaction_name.clone()));
    let sync_points = Arc::new(SyncPointManager::new());
    let management = clients::HttpManagementClient::from_env();
    let views = clients::HttpViewStreamFactory::from_env();

    // One bootstrap per configured query, run concurrently — distinct
    // queries must not block each other (spec.md §5), the same discipline
    // the teacher's reactor applies via `join_all` across independent
    // subscriptions.
    let bootstraps = query_configs.iter().map(|config| {
        let initializer = QueryInitializer { store: store.as_ref(), sync_points: sync_points.as_ref(), management: &management, views: &views };
        async move { initializer.run(config).await }
    });
    for result in join_all(bootstraps).await {
        result.context("bootstrap failed for a configured query")?;
    }
    info!(queries = query_configs.len(), "bootstrap complete for all configured queries");

    let query_configs = Arc::new(query_configs);
    let ingest = IngestServer::new(store.clone(), sync_points.clone(), query_configs.clone());
    let mcp = McpServer::new(store.clone(), query_configs.clone());

    let ingest_addr = format!("0.0.0.0:{}", reaction_config.app_port);
    let mcp_addr = format!("0.0.0.0:{}", reaction_config.mcp_server_port);

    // The two endpoints must make independent progress (spec.md §5); joining
    // them means either one failing brings the process down rather than
    // silently serving half the contract.
    tokio::try_join!(ingest.run(&ingest_addr), mcp.run(&mcp_addr))?;
    Ok(())
}
