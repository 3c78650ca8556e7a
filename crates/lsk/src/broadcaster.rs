// ai
//! 📡 Broadcaster: a guest list of live clients, each with a mailbox and a big red button.
//!
//! Every client that subscribes gets three things: a [`SessionId`], an [`EventStream`]
//! that progress events land in, and a [`CancelSignal`] that fires exactly once if
//! somebody asks for the import to stop. Many callers poke the registry at the same
//! time (the import task broadcasting, a cancel request, the transport hanging up),
//! so the whole thing is built around two kinds of locks:
//!
//! 🔒 the registry `RwLock` (who is on the list), and
//! 🔒 one `Mutex` per session (what state that session is in).
//!
//! Lock order is registry first, then session, never the other way around.
//! Removal and every send happen under the session lock, so once
//! [`Broadcaster::remove_client`] returns, nobody writes to that session's channels again.
//!
//! 🦆 The transport (SSE framing, HTTP, the actual wire) lives somewhere else. We just fill mailboxes.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_channel::{Receiver, Sender};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock, oneshot};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// 🎫 Opaque, unique per client, minted from a random v4 UUID.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for SessionId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

/// ✉️ One opaque message for a client. `event` and `id` are optional labels a
/// transport may use for framing; the broadcaster never looks at any of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub data: String,
    pub event: Option<String>,
    pub id: Option<String>,
}

impl Event {
    pub fn new(data: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            event: None,
            id: None,
        }
    }

    pub fn with_event(mut self, event: impl Into<String>) -> Self {
        self.event = Some(event.into());
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// 📬 A client's inbound mailbox. Ends after the session is removed and the buffer is drained.
pub type EventStream = Receiver<Event>;

/// 🔴 Resolves `Ok(())` when the import is cancelled, `Err` if the session went away first.
pub type CancelSignal = oneshot::Receiver<()>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BroadcastError {
    #[error("session {0} not found")]
    NotFound(SessionId),
    #[error("session {0} is already cancelled")]
    AlreadyCancelled(SessionId),
    #[error("event for session {0} not delivered: mailbox full or closed")]
    SendFailed(SessionId),
    #[error("cancel signal for session {0} had nobody listening")]
    SignalFailed(SessionId),
}

/// 🔧 `[broadcaster]` section of the config file.
#[derive(Debug, Deserialize, Clone)]
pub struct BroadcasterConfig {
    /// 📦 per-client mailbox size; a client this far behind starts missing events
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

fn default_event_buffer() -> usize {
    32
}

impl Default for BroadcasterConfig {
    fn default() -> Self {
        Self {
            event_buffer: default_event_buffer(),
        }
    }
}

// -- 🧳 `None` in `events` means the session was removed; that's the tombstone
#[derive(Debug)]
struct SessionState {
    cancelled: bool,
    events: Option<Sender<Event>>,
    stream: Option<EventStream>,
    cancel: Option<oneshot::Sender<()>>,
}

type Session = Arc<Mutex<SessionState>>;

/// 📡 The registry. Clone it freely; every clone is the same guest list.
#[derive(Debug, Clone)]
pub struct Broadcaster {
    sessions: Arc<RwLock<HashMap<SessionId, Session>>>,
    event_buffer: usize,
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new(default_event_buffer())
    }
}

impl Broadcaster {
    pub fn new(event_buffer: usize) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            event_buffer: event_buffer.max(1),
        }
    }

    pub fn from_config(config: &BroadcasterConfig) -> Self {
        Self::new(config.event_buffer)
    }

    /// 🎫 Put a new client on the list. Takes the registry write lock.
    pub async fn new_client(&self) -> (SessionId, EventStream, CancelSignal) {
        let session_id = SessionId::generate();
        let (events_tx, events_rx) = async_channel::bounded(self.event_buffer);
        let (cancel_tx, cancel_rx) = oneshot::channel();

        let session = Arc::new(Mutex::new(SessionState {
            cancelled: false,
            events: Some(events_tx),
            stream: Some(events_rx.clone()),
            cancel: Some(cancel_tx),
        }));

        let mut sessions = self.sessions.write().await;
        sessions.insert(session_id, session);
        info!(session_id = %session_id, "📡 client registered");
        debug!(active_count = sessions.len(), "📡 registered clients");

        (session_id, events_rx, cancel_rx)
    }

    async fn lookup(&self, session_id: &SessionId) -> Result<Session, BroadcastError> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .cloned()
            .ok_or(BroadcastError::NotFound(*session_id))
    }

    /// ✉️ Drop an event in one client's mailbox. Never waits for room.
    ///
    /// A cancelled session swallows the event and still answers `Ok(())`.
    pub async fn broadcast(&self, session_id: &SessionId, event: Event) -> Result<(), BroadcastError> {
        let session = self.lookup(session_id).await?;
        let state = session.lock().await;

        // -- 🪦 removed between the lookup and the lock
        let Some(events) = state.events.as_ref() else {
            return Err(BroadcastError::NotFound(*session_id));
        };
        if state.cancelled {
            debug!(session_id = %session_id, "🔇 session cancelled, event dropped");
            return Ok(());
        }
        events.try_send(event).map_err(|_| {
            warn!(session_id = %session_id, "⚠️ mailbox full or closed, event not delivered");
            BroadcastError::SendFailed(*session_id)
        })
    }

    /// 🔴 Press the big red button. Works once per session.
    ///
    /// If the [`CancelSignal`] was already dropped the session still counts as
    /// cancelled; the error just tells you nobody heard it.
    pub async fn cancel_import(&self, session_id: &SessionId) -> Result<(), BroadcastError> {
        let session = self.lookup(session_id).await?;
        let mut state = session.lock().await;

        if state.events.is_none() {
            return Err(BroadcastError::NotFound(*session_id));
        }
        if state.cancelled {
            return Err(BroadcastError::AlreadyCancelled(*session_id));
        }
        state.cancelled = true;

        match state.cancel.take().map(|signal| signal.send(())) {
            Some(Ok(())) => {
                info!(session_id = %session_id, "🔴 cancellation signal sent");
                Ok(())
            }
            _ => {
                warn!(session_id = %session_id, "⚠️ cancellation signal had no listener");
                Err(BroadcastError::SignalFailed(*session_id))
            }
        }
    }

    /// 🚪 Take a client off the list and close its channels. Unknown ids are ignored.
    /// Returns whether this call did the removing.
    pub async fn remove_client(&self, session_id: &SessionId) -> bool {
        let removed = self.sessions.write().await.remove(session_id);
        let Some(session) = removed else {
            return false;
        };

        let mut state = session.lock().await;
        if let Some(events) = state.events.take() {
            events.close();
        }
        state.stream = None;
        state.cancel = None;
        info!(session_id = %session_id, "🚪 client removed");
        true
    }

    /// 📋 Sessions that are still running, i.e. registered and not cancelled. No particular order.
    pub async fn list_active_imports(&self) -> Vec<SessionId> {
        let sessions = self.sessions.read().await;
        let mut active = Vec::with_capacity(sessions.len());
        for (session_id, session) in sessions.iter() {
            if !session.lock().await.cancelled {
                active.push(*session_id);
            }
        }
        active
    }

    /// 📬 Another handle on a client's mailbox, for whoever does the actual transport.
    pub async fn client_event_channel(&self, session_id: &SessionId) -> Option<EventStream> {
        let session = self.lookup(session_id).await.ok()?;
        let state = session.lock().await;
        state.stream.clone()
    }

    pub async fn client_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// 🧹 Remove every client still on the list, ending all their streams.
    /// Returns how many were removed.
    pub async fn close_all(&self) -> usize {
        let session_ids: Vec<SessionId> = self.sessions.read().await.keys().copied().collect();
        let mut removed = 0;
        for session_id in session_ids {
            if self.remove_client(&session_id).await {
                removed += 1;
            }
        }
        removed
    }
}
