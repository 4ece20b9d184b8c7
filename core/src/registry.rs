//! In-process registry of open live channels.
//!
//! State lives for the lifetime of the process only; a restart starts with an
//! empty registry and clients reconnect.

use std::{
    collections::{HashMap, HashSet},
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use parking_lot::Mutex;
use serde::Serialize;
use time::OffsetDateTime;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Send half of a live channel. The transport task owns the receiver; a send
/// fails once that task is gone.
pub type Outbox = UnboundedSender<String>;

/// Identifier of one open live channel, unique within the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

struct Connection {
    user_id: Uuid,
    opened_at: OffsetDateTime,
    outbox: Outbox,
}

#[derive(Default)]
struct Inner {
    connections: HashMap<ConnectionId, Connection>,
    by_user: HashMap<Uuid, HashSet<ConnectionId>>,
}

impl Inner {
    fn remove(&mut self, id: ConnectionId) -> Option<Connection> {
        let conn = self.connections.remove(&id)?;
        if let Some(set) = self.by_user.get_mut(&conn.user_id) {
            set.remove(&id);
            if set.is_empty() {
                self.by_user.remove(&conn.user_id);
            }
        }
        Some(conn)
    }
}

/// Maps users to their open live channels and fans payloads out to them.
///
/// Both maps sit behind one lock, held only while the maps are read or
/// mutated and never across a send.
#[derive(Default)]
pub struct ConnectionRegistry {
    inner: Mutex<Inner>,
    next_id: AtomicU64,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an accepted channel for `user_id`.
    pub fn connect(&self, user_id: Uuid, outbox: Outbox) -> ConnectionId {
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let opened_at = OffsetDateTime::now_utc();
        {
            let mut inner = self.inner.lock();
            inner.connections.insert(
                id,
                Connection {
                    user_id,
                    opened_at,
                    outbox,
                },
            );
            inner.by_user.entry(user_id).or_default().insert(id);
        }
        info!(connection = %id, user = %user_id, opened_at = %opened_at, "live channel opened");
        id
    }

    /// Remove a channel. Returns false if it was already gone.
    pub fn disconnect(&self, id: ConnectionId) -> bool {
        let removed = self.inner.lock().remove(id);
        match removed {
            Some(conn) => {
                let open_for = OffsetDateTime::now_utc() - conn.opened_at;
                info!(connection = %id, user = %conn.user_id, open_secs = open_for.whole_seconds(), "live channel closed");
                true
            }
            None => false,
        }
    }

    /// Channels currently open for `user_id`; empty when there are none.
    pub fn lookup_connections(&self, user_id: &Uuid) -> HashSet<ConnectionId> {
        self.inner
            .lock()
            .by_user
            .get(user_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn is_online(&self, user_id: &Uuid) -> bool {
        self.inner.lock().by_user.contains_key(user_id)
    }

    pub fn connection_count(&self) -> usize {
        self.inner.lock().connections.len()
    }

    pub fn user_count(&self) -> usize {
        self.inner.lock().by_user.len()
    }

    /// Push `payload` to every channel of `user_id`.
    ///
    /// A failed push prunes that channel and does not stop delivery to the
    /// others. Returns how many channels accepted the payload.
    pub fn send_to_user(&self, user_id: &Uuid, payload: &str) -> usize {
        let targets: Vec<(ConnectionId, Outbox)> = {
            let inner = self.inner.lock();
            match inner.by_user.get(user_id) {
                Some(ids) => ids
                    .iter()
                    .filter_map(|id| inner.connections.get(id).map(|c| (*id, c.outbox.clone())))
                    .collect(),
                None => return 0,
            }
        };
        self.deliver(targets, payload)
    }

    /// Push `payload` to every open channel.
    pub fn broadcast(&self, payload: &str) -> usize {
        let targets: Vec<(ConnectionId, Outbox)> = {
            let inner = self.inner.lock();
            inner
                .connections
                .iter()
                .map(|(id, c)| (*id, c.outbox.clone()))
                .collect()
        };
        self.deliver(targets, payload)
    }

    /// Serialize `event` and push it to every channel of `user_id`.
    pub fn send_event<T: Serialize>(&self, user_id: &Uuid, event: &T) -> usize {
        match serde_json::to_string(event) {
            Ok(payload) => self.send_to_user(user_id, &payload),
            Err(err) => {
                warn!(user = %user_id, error = %err, "failed to encode live event");
                0
            }
        }
    }

    fn deliver(&self, targets: Vec<(ConnectionId, Outbox)>, payload: &str) -> usize {
        let mut delivered = 0;
        for (id, outbox) in targets {
            if outbox.send(payload.to_owned()).is_ok() {
                delivered += 1;
            } else {
                warn!(connection = %id, "push failed, dropping live channel");
                self.disconnect(id);
            }
        }
        debug!(delivered, "fanout done");
        delivered
    }
}

/// Keeps a channel registered for as long as it is alive.
///
/// Dropping the guard disconnects the channel, whichever path ended it.
pub struct ConnectionGuard {
    registry: Arc<ConnectionRegistry>,
    id: ConnectionId,
    user_id: Uuid,
}

impl ConnectionGuard {
    pub fn register(registry: Arc<ConnectionRegistry>, user_id: Uuid, outbox: Outbox) -> Self {
        let id = registry.connect(user_id, outbox);
        Self {
            registry,
            id,
            user_id,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn user_id(&self) -> Uuid {
        self.user_id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.registry.disconnect(self.id);
    }
}
