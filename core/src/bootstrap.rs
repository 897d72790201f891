use std::time::Duration;

use async_trait::async_trait;
use drasi_mcp_proto::{derive_entry_key, QueryConfig, ViewStreamItem};

use crate::{error::BootstrapError, store::ResourceStore, syncpoint::SyncPointManager};

/// Reports whether a query's continuous-query backend has become ready to
/// serve its current result set (spec.md §4.3 step 2). Implemented by a
/// real management-service HTTP client in `reaction::clients`; swappable
/// here the way `ankurah_core::node::Node<SE, PA>` takes `StorageEngine`
/// and `PolicyAgent` as generic collaborators rather than baking in a
/// concrete transport.
#[async_trait]
pub trait ManagementClient: Send + Sync {
    async fn query_ready(&self, query_id: &str) -> Result<bool, anyhow::Error>;
}

/// A pull-based view-service stream: a header followed by an unbounded
/// number of rows, then `End` (spec.md §9 "coroutines / long-running
/// streams"). One instance is opened per query by [`ViewStreamFactory`].
#[async_trait]
pub trait ViewStream: Send {
    async fn next(&mut self) -> Result<ViewStreamItem, anyhow::Error>;
}

#[async_trait]
pub trait ViewStreamFactory: Send + Sync {
    async fn open(&self, query_id: &str) -> Result<Box<dyn ViewStream>, anyhow::Error>;
}

const READINESS_TIMEOUT: Duration = Duration::from_secs(300);

/// Brings one configured query to the initialised state exactly once per
/// process lifetime (spec.md §4.3). Re-entrant: if the sync point is
/// already initialised, returns immediately (spec.md Testable Property 7,
/// "idempotent bootstrap").
pub struct QueryInitializer<'a> {
    pub store: &'a ResourceStore,
    pub sync_points: &'a SyncPointManager,
    pub management: &'a dyn ManagementClient,
    pub views: &'a dyn ViewStreamFactory,
}

impl<'a> QueryInitializer<'a> {
    pub async fn run(&self, config: &QueryConfig) -> Result<(), BootstrapError> {
        if self.sync_points.is_initialised(&config.query_id) {
            tracing::debug!(query_id = %config.query_id, "query already initialised; skipping bootstrap");
            return Ok(());
        }

        tracing::info!(query_id = %config.query_id, "waiting for query readiness");
        let ready = tokio::time::timeout(READINESS_TIMEOUT, self.poll_ready(&config.query_id))
            .await
            .map_err(|_| BootstrapError::ReadinessTimeout { query_id: config.query_id.clone(), timeout_secs: READINESS_TIMEOUT.as_secs() })?
            .map_err(|source| BootstrapError::Management { query_id: config.query_id.clone(), source })?;
        if !ready {
            return Err(BootstrapError::ReadinessTimeout { query_id: config.query_id.clone(), timeout_secs: READINESS_TIMEOUT.as_secs() });
        }

        let mut stream = self
            .views
            .open(&config.query_id)
            .await
            .map_err(|source| BootstrapError::ViewStream { query_id: config.query_id.clone(), source })?;

        let sequence = match stream.next().await.map_err(|source| BootstrapError::ViewStream { query_id: config.query_id.clone(), source })? {
            ViewStreamItem::Header { sequence } => sequence,
            _ => return Err(BootstrapError::MissingHeader { query_id: config.query_id.clone() }),
        };

        self.store.initialize_query(&config.query_id, &config.key_field, &config.resource_content_type, config.description.clone());

        let mut skipped = 0usize;
        let mut loaded = 0usize;
        loop {
            match stream.next().await.map_err(|source| BootstrapError::ViewStream { query_id: config.query_id.clone(), source })? {
                ViewStreamItem::Row(row) => match derive_entry_key(&row, &config.key_field) {
                    Some(key) => {
                        self.store
                            .upsert_entry(&config.query_id, &key, row)
                            .map_err(|source| BootstrapError::Store { query_id: config.query_id.clone(), source })?;
                        loaded += 1;
                    }
                    None => {
                        tracing::warn!(query_id = %config.query_id, key_field = %config.key_field, "row missing key field during bootstrap; skipping");
                        skipped += 1;
                    }
                },
                ViewStreamItem::Header { .. } => {
                    tracing::warn!(query_id = %config.query_id, "unexpected second header in view stream; ignoring");
                }
                ViewStreamItem::End => break,
            }
        }

        self.sync_points
            .initialise(&config.query_id, sequence)
            .map_err(|source| BootstrapError::SyncPoint { query_id: config.query_id.clone(), source })?;

        tracing::info!(query_id = %config.query_id, sequence, loaded, skipped, "bootstrap complete");
        Ok(())
    }

    async fn poll_ready(&self, query_id: &str) -> Result<bool, anyhow::Error> {
        loop {
            if self.management.query_ready(query_id).await? {
                return Ok(true);
            }
            tokio::time::sleep(Duration::from_secs(2)).await;
        }
    }
}
