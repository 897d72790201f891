use std::sync::Arc;

use dashmap::DashMap;
use drasi_mcp_proto::ResourceUri;

use crate::error::StoreError;

/// Metadata for one configured query, written once by the query initializer
/// (spec.md §3, `QueryMetadata`).
#[derive(Debug, Clone)]
pub struct QueryMetadata {
    pub query_id: String,
    pub key_field: String,
    pub description: Option<String>,
    pub content_type: String,
    pub initialized_at: chrono::DateTime<chrono::Utc>,
}

/// One materialised row (spec.md §3, `Entry`).
#[derive(Debug, Clone)]
pub struct Entry {
    pub query_id: String,
    pub entry_key: String,
    pub data: serde_json::Value,
    pub last_updated: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

/// Store-level change notifications, fanned out to subscribers (the MCP
/// server) at least once per emitting operation. Order is preserved per URI
/// because both emission and delivery happen under the same per-query
/// shard (spec.md §4.1 "Change signals").
#[derive(Debug, Clone)]
pub enum ChangeSignal {
    Resource { uri: ResourceUri, kind: ChangeKind },
    ListChanged { query_uri: ResourceUri, added: Vec<ResourceUri>, removed: Vec<ResourceUri> },
}

/// A query's entries, each keyed by the query-configured field. One such
/// map per query id (see [`ResourceStore::entries`]) gives "mutations to a
/// single query serialise but different queries do not block each other"
/// (spec.md §4.1), the same sharding discipline `ankurah-index`'s
/// `DashMap<FieldId, ComparisonIndex>` uses for its watcher tables: locking
/// one query's entry map never contends with another query's.
type EntryMap = DashMap<String, Entry>;

/// In-memory, concurrency-safe materialised view of every configured
/// query's current result set (spec.md §4.1).
///
/// Metadata and entries are kept in separate top-level maps so that
/// replacing a query's metadata (`initialize_query` is idempotent) never
/// requires touching its entries.
pub struct ResourceStore {
    reaction_name: String,
    metadata: DashMap<String, QueryMetadata>,
    entries: DashMap<String, Arc<EntryMap>>,
    signals: tokio::sync::broadcast::Sender<ChangeSignal>,
}

impl ResourceStore {
    pub fn new(reaction_name: impl Into<String>) -> Self {
        // Bounded so a slow/absent subscriber can't grow memory unboundedly;
        // lagged subscribers detect the gap via `RecvError::Lagged` on `recv`.
        let (signals, _rx) = tokio::sync::broadcast::channel(1024);
        Self { reaction_name: reaction_name.into(), metadata: DashMap::new(), entries: DashMap::new(), signals }
    }

    pub fn reaction_name(&self) -> &str { &self.reaction_name }

    pub fn subscribe_signals(&self) -> tokio::sync::broadcast::Receiver<ChangeSignal> { self.signals.subscribe() }

    fn emit(&self, signal: ChangeSignal) {
        // Delivery is at-least-once within this process; a send error here
        // only means there are currently no subscribers, which is fine.
        let _ = self.signals.send(signal);
    }

    /// Registers (or replaces) a query's metadata. Idempotent: a second call
    /// with the same `query_id` replaces the metadata without touching
    /// entries (spec.md §4.1).
    pub fn initialize_query(&self, query_id: &str, key_field: &str, content_type: &str, description: Option<String>) {
        let metadata = QueryMetadata {
            query_id: query_id.to_string(),
            key_field: key_field.to_string(),
            description,
            content_type: content_type.to_string(),
            initialized_at: chrono::Utc::now(),
        };
        self.metadata.insert(query_id.to_string(), metadata);
        self.entries.entry(query_id.to_string()).or_insert_with(|| Arc::new(DashMap::new()));
    }

    fn entries_map(&self, query_id: &str) -> Result<Arc<EntryMap>, StoreError> {
        self.entries.get(query_id).map(|m| m.clone()).ok_or_else(|| StoreError::UnknownQuery(query_id.to_string()))
    }

    pub fn upsert_entry(&self, query_id: &str, entry_key: &str, data: serde_json::Value) -> Result<UpsertOutcome, StoreError> {
        let entries = self.entries_map(query_id)?;
        let entry = Entry { query_id: query_id.to_string(), entry_key: entry_key.to_string(), data, last_updated: chrono::Utc::now() };
        let outcome = if entries.insert(entry_key.to_string(), entry).is_some() { UpsertOutcome::Updated } else { UpsertOutcome::Created };

        let entry_uri = ResourceUri::entry(&self.reaction_name, query_id, entry_key);
        let kind = if outcome == UpsertOutcome::Created { ChangeKind::Created } else { ChangeKind::Updated };
        self.emit(ChangeSignal::Resource { uri: entry_uri.clone(), kind });
        if outcome == UpsertOutcome::Created {
            let query_uri = ResourceUri::query(&self.reaction_name, query_id);
            self.emit(ChangeSignal::ListChanged { query_uri, added: vec![entry_uri], removed: vec![] });
        }
        Ok(outcome)
    }

    pub fn delete_entry(&self, query_id: &str, entry_key: &str) -> Result<DeleteOutcome, StoreError> {
        let entries = self.entries_map(query_id)?;
        let removed = entries.remove(entry_key);
        if removed.is_none() {
            return Ok(DeleteOutcome::NotFound);
        }
        let entry_uri = ResourceUri::entry(&self.reaction_name, query_id, entry_key);
        self.emit(ChangeSignal::Resource { uri: entry_uri.clone(), kind: ChangeKind::Deleted });
        let query_uri = ResourceUri::query(&self.reaction_name, query_id);
        self.emit(ChangeSignal::ListChanged { query_uri, added: vec![], removed: vec![entry_uri] });
        Ok(DeleteOutcome::Deleted)
    }

    pub fn get_entry(&self, query_id: &str, entry_key: &str) -> Result<Option<serde_json::Value>, StoreError> {
        let entries = self.entries_map(query_id)?;
        Ok(entries.get(entry_key).map(|e| e.data.clone()))
    }

    /// Resolves a parsed [`ResourceUri`] to its JSON body, per spec.md
    /// §4.5's `resources/read` contract.
    pub fn get_resource_by_uri(&self, uri: &ResourceUri) -> Result<Option<serde_json::Value>, StoreError> {
        match uri {
            ResourceUri::Query { query_id, .. } => {
                let entries = self.entries_map(query_id)?;
                let description = self.metadata.get(query_id).and_then(|m| m.description.clone());
                let mut entry_uris: Vec<String> = entries.iter().map(|kv| ResourceUri::entry(&self.reaction_name, query_id, kv.key()).to_string()).collect();
                entry_uris.sort();
                Ok(Some(serde_json::json!({
                    "queryId": query_id,
                    "description": description,
                    "entryCount": entries.len(),
                    "entries": entry_uris,
                })))
            }
            ResourceUri::Entry { query_id, entry_key, .. } => self.get_entry(query_id, entry_key),
        }
    }

    pub fn list_queries(&self) -> Vec<QueryMetadata> {
        let mut metas: Vec<QueryMetadata> = self.metadata.iter().map(|kv| kv.value().clone()).collect();
        metas.sort_by(|a, b| a.query_id.cmp(&b.query_id));
        metas
    }

    pub fn query_metadata(&self, query_id: &str) -> Option<QueryMetadata> { self.metadata.get(query_id).map(|m| m.clone()) }

    pub fn list_query_entries(&self, query_id: &str) -> Result<Vec<ResourceUri>, StoreError> {
        let entries = self.entries_map(query_id)?;
        let mut keys: Vec<String> = entries.iter().map(|kv| kv.key().clone()).collect();
        keys.sort();
        Ok(keys.into_iter().map(|k| ResourceUri::entry(&self.reaction_name, query_id, k)).collect())
    }

    /// All entries for a query, for the `get_{queryId}_results` tool
    /// (spec.md §4.5 "Tool semantics").
    pub fn entries_for_query(&self, query_id: &str) -> Result<Vec<Entry>, StoreError> {
        let entries = self.entries_map(query_id)?;
        let mut entries: Vec<Entry> = entries.iter().map(|kv| kv.value().clone()).collect();
        entries.sort_by(|a, b| a.entry_key.cmp(&b.entry_key));
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> ResourceStore { ResourceStore::new("mcp-server-e2e") }

    #[test]
    fn upsert_on_unknown_query_fails() {
        let s = store();
        let err = s.upsert_entry("nope", "k", json!({})).unwrap_err();
        assert!(matches!(err, StoreError::UnknownQuery(q) if q == "nope"));
    }

    #[test]
    fn insert_then_update_then_delete() {
        let s = store();
        s.initialize_query("customer-data", "customer_id", "application/json", None);

        let outcome = s.upsert_entry("customer-data", "cust-1", json!({"customer_id": "cust-1", "name": "Ada"})).unwrap();
        assert_eq!(outcome, UpsertOutcome::Created);
        assert_eq!(s.get_entry("customer-data", "cust-1").unwrap().unwrap()["name"], "Ada");

        let outcome = s.upsert_entry("customer-data", "cust-1", json!({"customer_id": "cust-1", "name": "Ada Lovelace"})).unwrap();
        assert_eq!(outcome, UpsertOutcome::Updated);
        assert_eq!(s.get_entry("customer-data", "cust-1").unwrap().unwrap()["name"], "Ada Lovelace");

        let outcome = s.delete_entry("customer-data", "cust-1").unwrap();
        assert_eq!(outcome, DeleteOutcome::Deleted);
        assert_eq!(s.get_entry("customer-data", "cust-1").unwrap(), None);

        assert_eq!(s.delete_entry("customer-data", "cust-1").unwrap(), DeleteOutcome::NotFound);
    }

    #[test]
    fn query_resource_reflects_entry_count() {
        let s = store();
        s.initialize_query("products", "product_id", "application/json", Some("products".into()));
        s.upsert_entry("products", "p1", json!({"product_id": "p1"})).unwrap();
        s.upsert_entry("products", "p2", json!({"product_id": "p2"})).unwrap();

        let uri = ResourceUri::query("mcp-server-e2e", "products");
        let body = s.get_resource_by_uri(&uri).unwrap().unwrap();
        assert_eq!(body["entryCount"], 2);
    }

    #[tokio::test]
    async fn change_signals_are_emitted_in_order() {
        let s = store();
        let mut rx = s.subscribe_signals();
        s.initialize_query("q", "id", "application/json", None);
        s.upsert_entry("q", "a", json!({"id": "a"})).unwrap();
        s.delete_entry("q", "a").unwrap();

        let first = rx.recv().await.unwrap();
        assert!(matches!(first, ChangeSignal::Resource { kind: ChangeKind::Created, .. }));
        let second = rx.recv().await.unwrap();
        assert!(matches!(second, ChangeSignal::ListChanged { .. }));
        let third = rx.recv().await.unwrap();
        assert!(matches!(third, ChangeSignal::Resource { kind: ChangeKind::Deleted, .. }));
        let fourth = rx.recv().await.unwrap();
        assert!(matches!(fourth, ChangeSignal::ListChanged { .. }));
    }
}
