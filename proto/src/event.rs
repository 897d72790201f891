use serde::{Deserialize, Serialize};
use serde_json::Value as Row;

/// One `before`/`after` pair inside an envelope's `updatedResults`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdatedRow {
    pub before: Option<Row>,
    pub after: Row,
}

/// The inbound change-event envelope (spec.md §4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    pub query_id: String,
    pub sequence: i64,
    #[serde(default)]
    pub added_results: Vec<Row>,
    #[serde(default)]
    pub updated_results: Vec<UpdatedRow>,
    #[serde(default)]
    pub deleted_results: Vec<Row>,
}

/// Non-data lifecycle signals for a query; logged only, never mutate state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ControlSignal {
    BootstrapStarted,
    BootstrapCompleted,
    Running,
    Stopped,
    Deleted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlEvent {
    pub query_id: String,
    #[serde(default)]
    pub sequence: Option<i64>,
    pub control_signal: ControlSignal,
}

/// Internal, order-preserving view of a `ChangeEvent`'s three arrays.
///
/// The wire format keeps `addedResults`/`updatedResults`/`deletedResults` as
/// parallel arrays, but the per-query apply pipeline wants one ordered list
/// so an add-then-delete of the same key nets out correctly (spec.md §4.4's
/// tie-break rule). See spec.md §9 "dynamic dispatch across change kinds".
#[derive(Debug, Clone)]
pub enum RowChange {
    Added(Row),
    Updated { before: Option<Row>, after: Row },
    Deleted(Row),
}

impl ChangeEvent {
    /// Flattens the three arrays into a single ordered list: all adds, then
    /// all updates, then all deletes, matching the envelope-level tie-break
    /// rule in spec.md §4.4 ("added, updated, deleted").
    pub fn ordered_changes(&self) -> Vec<RowChange> {
        let mut out = Vec::with_capacity(self.added_results.len() + self.updated_results.len() + self.deleted_results.len());
        out.extend(self.added_results.iter().cloned().map(RowChange::Added));
        out.extend(self.updated_results.iter().cloned().map(|u| RowChange::Updated { before: u.before, after: u.after }));
        out.extend(self.deleted_results.iter().cloned().map(RowChange::Deleted));
        out
    }
}

/// Either kind of inbound envelope. Untagged: a control event is
/// distinguished by the presence of `controlSignal`, which a `ChangeEvent`
/// never carries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Envelope {
    Control(ControlEvent),
    Change(ChangeEvent),
}

/// The bootstrap view-service stream yields a header followed by an
/// unbounded number of rows, then ends. Modeled as a pull iterator
/// (`next() -> ViewStreamItem`) per spec.md §9's coroutine design note, so
/// bootstrap code reads as a straight-line loop.
#[derive(Debug, Clone)]
pub enum ViewStreamItem {
    Header { sequence: i64 },
    Row(Row),
    End,
}
