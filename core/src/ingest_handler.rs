use drasi_mcp_proto::{derive_entry_key, ChangeEvent, QueryConfig, RowChange};

use crate::{error::IngestError, store::ResourceStore, syncpoint::SyncPointManager};

/// Applies one inbound [`ChangeEvent`] to the store, atomically with
/// respect to the query's sync point (spec.md §4.4).
///
/// Per-query serialisation is explicit, not incidental: the ingest
/// connector dispatches one task per HTTP request, so two envelopes for
/// the same `queryId` can reach `apply` concurrently. The check-apply-
/// advance sequence below holds `sync_points.apply_lock(query_id)` for its
/// whole duration, so same-query envelopes serialise through that lock
/// while distinct queries — each with their own lock — still proceed
/// independently (spec.md §5).
pub struct ChangeEventHandler<'a> {
    pub store: &'a ResourceStore,
    pub sync_points: &'a SyncPointManager,
}

impl<'a> ChangeEventHandler<'a> {
    pub fn apply(&self, configs: &[QueryConfig], event: &ChangeEvent) -> Result<(), IngestError> {
        let config = configs
            .iter()
            .find(|c| c.query_id == event.query_id)
            .ok_or_else(|| IngestError::UnknownQuery(event.query_id.clone()))?;

        let lock = self.sync_points.apply_lock(&event.query_id);
        let _guard = lock.lock().unwrap();

        let current = self.sync_points.get(&event.query_id).ok_or_else(|| IngestError::NotInitialised(event.query_id.clone()))?;

        if event.sequence <= current {
            tracing::debug!(query_id = %event.query_id, sequence = event.sequence, current, "duplicate envelope; ignoring");
            return Ok(());
        }

        for change in event.ordered_changes() {
            match change {
                RowChange::Added(row) => self.upsert(config, row)?,
                RowChange::Updated { before, after } => self.apply_update(config, before, after)?,
                RowChange::Deleted(row) => self.delete(config, &row)?,
            }
        }

        self.sync_points
            .advance(&event.query_id, event.sequence)
            .map_err(|_| IngestError::NotInitialised(event.query_id.clone()))?;

        Ok(())
    }

    fn upsert(&self, config: &QueryConfig, row: serde_json::Value) -> Result<(), IngestError> {
        match derive_entry_key(&row, &config.key_field) {
            Some(key) => {
                self.store.upsert_entry(&config.query_id, &key, row)?;
                Ok(())
            }
            None => {
                tracing::warn!(query_id = %config.query_id, key_field = %config.key_field, "row missing key field; skipping");
                Ok(())
            }
        }
    }

    fn delete(&self, config: &QueryConfig, row: &serde_json::Value) -> Result<(), IngestError> {
        match derive_entry_key(row, &config.key_field) {
            Some(key) => {
                self.store.delete_entry(&config.query_id, &key)?;
                Ok(())
            }
            None => {
                tracing::warn!(query_id = %config.query_id, key_field = %config.key_field, "row missing key field; skipping delete");
                Ok(())
            }
        }
    }

    /// An update whose `after` key differs from its `before` key is a
    /// move: delete the old key, upsert the new one (spec.md §4.4 tie-break).
    /// If `before` is unavailable, only the upsert is emitted.
    fn apply_update(&self, config: &QueryConfig, before: Option<serde_json::Value>, after: serde_json::Value) -> Result<(), IngestError> {
        let after_key = derive_entry_key(&after, &config.key_field);
        let before_key = before.as_ref().and_then(|b| derive_entry_key(b, &config.key_field));

        if let (Some(before_key), Some(after_key)) = (&before_key, &after_key) {
            if before_key != after_key {
                self.store.delete_entry(&config.query_id, before_key)?;
            }
        }

        match after_key {
            Some(key) => {
                self.store.upsert_entry(&config.query_id, &key, after)?;
                Ok(())
            }
            None => {
                tracing::warn!(query_id = %config.query_id, key_field = %config.key_field, "updated row missing key field; skipping");
                Ok(())
            }
        }
    }
}
