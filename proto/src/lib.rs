//! Wire types, resource URI scheme, and configuration records shared by
//! every crate in the Drasi MCP reaction workspace.

pub mod config;
pub mod event;
pub mod uri;

pub use config::{QueryConfig, ReactionConfig};
pub use event::{ChangeEvent, ControlEvent, ControlSignal, Envelope, RowChange, UpdatedRow, ViewStreamItem};
pub use uri::{ResourceUri, UriError};

/// Derives the store's entry key from a row's configured key field.
///
/// Shared by the bootstrap path and the change-event handler so spec.md
/// Invariant 3 ("`entry.entryKey == stringify(entry.data[keyField])`") has a
/// single implementation. Returns `None` if the field is missing, `null`,
/// or an empty string — callers log a warning and skip the row.
pub fn derive_entry_key(data: &serde_json::Value, key_field: &str) -> Option<String> {
    match data.get(key_field) {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(s)) if s.is_empty() => None,
        Some(serde_json::Value::String(s)) => Some(s.clone()),
        Some(other) => Some(stringify_scalar(other)),
    }
}

/// Renders a scalar JSON value the way a tool filter or entry key compares
/// it: strings pass through verbatim, everything else via its JSON text
/// form (so `42` and `"42"` stringify the same way).
pub fn stringify_scalar(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
