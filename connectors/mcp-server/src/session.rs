use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use drasi_mcp_proto::ResourceUri;
use serde_json::Value;
use tokio::sync::mpsc;
use ulid::Ulid;

/// Identifies one connected MCP session (spec.md §3, `Session`). Modeled the
/// same way the teacher wraps a `Ulid` for its own subscription identifiers
/// (`ReactorSubscriptionId`): opaque, copyable, and round-trippable through
/// the `Mcp-Session-Id` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Ulid);

impl SessionId {
    fn new() -> Self { Self(Ulid::new()) }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

impl FromStr for SessionId {
    type Err = ulid::DecodeError;
    fn from_str(s: &str) -> Result<Self, Self::Err> { Ok(Self(Ulid::from_string(s)?)) }
}

/// The session state machine from spec.md §4.5: `READY` is the only state in
/// which subscriptions may be added or notifications delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Initialising,
    Ready,
    Closing,
    Closed,
}

/// One connected MCP session: its state, its subscription set, and the
/// channel a long-lived `GET /mcp/sse` handler drains notifications from.
pub struct Session {
    pub id: SessionId,
    state: Mutex<SessionState>,
    subscriptions: DashMap<String, ()>,
    notify_tx: mpsc::UnboundedSender<Value>,
    notify_rx: Mutex<Option<mpsc::UnboundedReceiver<Value>>>,
}

impl Session {
    fn new() -> Arc<Self> {
        let (notify_tx, notify_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            id: SessionId::new(),
            state: Mutex::new(SessionState::Connecting),
            subscriptions: DashMap::new(),
            notify_tx,
            notify_rx: Mutex::new(Some(notify_rx)),
        })
    }

    pub fn state(&self) -> SessionState { *self.state.lock().unwrap() }

    pub fn set_state(&self, state: SessionState) { *self.state.lock().unwrap() = state; }

    pub fn subscribe(&self, uri: &ResourceUri) { self.subscriptions.insert(uri.to_string(), ()); }

    pub fn unsubscribe(&self, uri: &ResourceUri) { self.subscriptions.remove(&uri.to_string()); }

    pub fn is_subscribed(&self, uri: &str) -> bool { self.subscriptions.contains_key(uri) }

    /// Consumed exactly once, by whichever `GET /mcp/sse` request attaches
    /// to this session first; a second attachment finds `None`.
    pub fn take_receiver(&self) -> Option<mpsc::UnboundedReceiver<Value>> { self.notify_rx.lock().unwrap().take() }

    pub fn notify(&self, message: Value) {
        // A closed channel just means the session's SSE stream went away;
        // delivery failures to one session must never affect others.
        let _ = self.notify_tx.send(message);
    }
}

/// The session table (spec.md §3 `Session`, §5 "Session table"). `DashMap`
/// gives the per-session locking the concurrency model asks for without a
/// single coarse table lock, the same choice `ResourceStore` makes.
#[derive(Default)]
pub struct SessionManager {
    sessions: DashMap<SessionId, Arc<Session>>,
}

impl SessionManager {
    pub fn new() -> Self { Self::default() }

    pub fn create(&self) -> Arc<Session> {
        let session = Session::new();
        self.sessions.insert(session.id, session.clone());
        session
    }

    pub fn get(&self, id: SessionId) -> Option<Arc<Session>> { self.sessions.get(&id).map(|s| s.clone()) }

    /// Session termination drops all subscriptions for that session
    /// (spec.md §4.5) — true here simply because the `Session` itself, and
    /// its subscription set, goes away with the table entry.
    pub fn close(&self, id: SessionId) { self.sessions.remove(&id); }

    pub fn snapshot(&self) -> Vec<Arc<Session>> { self.sessions.iter().map(|kv| kv.value().clone()).collect() }
}
