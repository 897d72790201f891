//! Domain logic for the Drasi MCP reaction: the resource store, the
//! sync-point manager, the bootstrap/recovery protocol, and change-event
//! application. Transport-agnostic — the HTTP/JSON-RPC connectors live in
//! `connectors/*`.

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod ingest_handler;
pub mod store;
pub mod syncpoint;

pub use bootstrap::{ManagementClient, QueryInitializer, ViewStream, ViewStreamFactory};
pub use ingest_handler::ChangeEventHandler;
pub use store::{ChangeKind, ChangeSignal, DeleteOutcome, Entry, QueryMetadata, ResourceStore, UpsertOutcome};
pub use syncpoint::SyncPointManager;
