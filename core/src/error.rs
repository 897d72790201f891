use thiserror::Error;

/// Errors from [`crate::store::ResourceStore`] operations.
///
/// Mirrors `ankurah_core::error::RetrievalError`'s shape: a flat, matchable
/// enum at the crate boundary, wrapping lower-level failures rather than
/// letting them leak as `anyhow::Error`.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unknown query: {0}")]
    UnknownQuery(String),
    #[error("entry not found: query={query_id} key={entry_key}")]
    EntryNotFound { query_id: String, entry_key: String },
    #[error("resource uri error: {0}")]
    Uri(#[from] drasi_mcp_proto::UriError),
}

/// Errors from [`crate::syncpoint::SyncPointManager`].
#[derive(Debug, Error)]
pub enum SyncPointError {
    #[error("query {0} is not initialised")]
    Uninitialised(String),
    #[error("query {0} is already initialised")]
    AlreadyInitialised(String),
}

/// Fatal failures during the bootstrap/recovery protocol (spec.md §4.3).
/// Any of these terminates the process with a non-zero exit code.
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("query {query_id} did not become ready within {timeout_secs}s")]
    ReadinessTimeout { query_id: String, timeout_secs: u64 },
    #[error("management client error for query {query_id}: {source}")]
    Management { query_id: String, #[source] source: anyhow::Error },
    #[error("view stream for query {query_id} ended before a header was received")]
    MissingHeader { query_id: String },
    #[error("view stream error for query {query_id}: {source}")]
    ViewStream { query_id: String, #[source] source: anyhow::Error },
    #[error("store error while initialising query {query_id}: {source}")]
    Store { query_id: String, #[source] source: StoreError },
    #[error("sync point error while initialising query {query_id}: {source}")]
    SyncPoint { query_id: String, #[source] source: SyncPointError },
}

/// The outcome of applying one inbound envelope (spec.md §4.4 and §7).
/// `Quarantined` and `Retryable` map directly onto the ingest connector's
/// `4xx`/`5xx` response.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("unknown query: {0}")]
    UnknownQuery(String),
    #[error("query {0} is not yet initialised")]
    NotInitialised(String),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl IngestError {
    /// Whether the transport should redeliver (a `5xx`-worthy failure) or
    /// give up (a `4xx`-worthy client error). See spec.md §7's taxonomy.
    pub fn is_retryable(&self) -> bool { matches!(self, IngestError::NotInitialised(_)) }
}

/// Configuration-load failures, fatal at startup (spec.md §7).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reactionName must not be empty")]
    EmptyReactionName,
    #[error("query {0}: keyField must not be empty")]
    EmptyKeyField(String),
    #[error("duplicate queryId in configuration: {0}")]
    DuplicateQueryId(String),
    #[error("no queries configured")]
    NoQueries,
    #[error("failed to read query configuration: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse query configuration: {0}")]
    Parse(#[from] serde_json::Error),
}
