use std::sync::Arc;

use drasi_mcp_core::ChangeSignal;
use serde_json::json;
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

use crate::session::{SessionManager, SessionState};

/// Drains the store's change-signal broadcast and fans out MCP notifications
/// to subscribed sessions (spec.md §4.5 "Notifications"). Runs for the
/// lifetime of the `McpServer`; a lagged receiver just means some
/// notifications were dropped under backpressure, not a correctness bug —
/// sessions can always re-read a resource to recover the current state.
pub async fn run(mut signals: tokio::sync::broadcast::Receiver<ChangeSignal>, sessions: Arc<SessionManager>) {
    loop {
        match signals.recv().await {
            Ok(signal) => dispatch(&signal, &sessions),
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "mcp notification fan-out lagged behind store change signals");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

fn dispatch(signal: &ChangeSignal, sessions: &SessionManager) {
    match signal {
        ChangeSignal::Resource { uri, .. } => {
            // Invariant 6 (spec.md §3): delivered to sessions subscribed to
            // the URI itself or to its parent query collection.
            let uri_str = uri.to_string();
            let parent_str = uri.parent_query().to_string();
            let notification = json!({
                "jsonrpc": "2.0",
                "method": "notifications/resources/updated",
                "params": { "uri": uri_str },
            });
            for session in sessions.snapshot() {
                if session.state() == SessionState::Ready && (session.is_subscribed(&uri_str) || session.is_subscribed(&parent_str)) {
                    session.notify(notification.clone());
                }
            }
        }
        ChangeSignal::ListChanged { query_uri, .. } => {
            let query_uri_str = query_uri.to_string();
            let updated = json!({
                "jsonrpc": "2.0",
                "method": "notifications/resources/updated",
                "params": { "uri": query_uri_str },
            });
            let list_changed = json!({ "jsonrpc": "2.0", "method": "notifications/resources/list_changed" });
            for session in sessions.snapshot() {
                if session.state() != SessionState::Ready {
                    continue;
                }
                if session.is_subscribed(&query_uri_str) {
                    session.notify(updated.clone());
                }
                session.notify(list_changed.clone());
            }
        }
    }
}
