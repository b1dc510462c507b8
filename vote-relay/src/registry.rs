use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use dashmap::DashMap;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use crate::message::ServerMessage;

pub type ConnectionId = u64;

/// Frames queued per connection before further frames to it are dropped.
pub const DEFAULT_OUTBOX_CAPACITY: usize = 256;

/// Outbound queue of one connection. The connection's writer drains it.
pub type Outbox = mpsc::Sender<ServerMessage>;

/// The set of open connections.
///
/// Registration, removal and iteration may race freely: iteration sees
/// each entry at most once, and sending to a connection that is closing
/// fails quietly instead of surfacing an error.
///
/// Queues are bounded. A connection whose queue is full misses the frame;
/// every `update` carries a poll's whole tally, so the next one for that
/// poll brings it current again.
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, Outbox>,
    next_id: AtomicU64,
    capacity: usize,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_OUTBOX_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            connections: DashMap::new(),
            next_id: AtomicU64::new(1),
            capacity: capacity.max(1),
        }
    }

    pub fn register(&self, outbox: Outbox) -> ConnectionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.connections.insert(id, outbox);
        debug!(connection = id, "registered connection");
        id
    }

    /// Returns `false` if the connection was already gone.
    pub fn unregister(&self, id: ConnectionId) -> bool {
        let removed = self.connections.remove(&id).is_some();
        if removed {
            debug!(connection = id, "unregistered connection");
        }
        removed
    }

    /// Registers a fresh outbound queue and ties its removal to the
    /// returned guard.
    pub fn join(self: &Arc<Self>) -> (Registration, mpsc::Receiver<ServerMessage>) {
        let (outbox, inbox) = mpsc::channel(self.capacity);
        let id = self.register(outbox);
        let registration = Registration {
            registry: Arc::clone(self),
            id,
        };
        (registration, inbox)
    }

    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(ConnectionId, &Outbox),
    {
        for entry in self.connections.iter() {
            f(*entry.key(), entry.value());
        }
    }

    /// Queues `message` for one connection. Returns whether it was queued.
    pub fn send_to(&self, id: ConnectionId, message: ServerMessage) -> bool {
        match self.connections.get(&id) {
            Some(outbox) => offer(id, &outbox, message),
            None => false,
        }
    }

    /// Queues `message` for every registered connection and returns how
    /// many accepted it.
    pub fn broadcast(&self, message: &ServerMessage) -> usize {
        let mut delivered = 0;
        self.for_each(|id, outbox| {
            if offer(id, outbox, message.clone()) {
                delivered += 1;
            }
        });
        delivered
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.connections.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

fn offer(id: ConnectionId, outbox: &Outbox, message: ServerMessage) -> bool {
    match outbox.try_send(message) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            warn!(connection = id, "outbox full, dropping frame for slow connection");
            false
        }
        Err(TrySendError::Closed(_)) => {
            debug!(connection = id, "skipping closed connection");
            false
        }
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Membership of one connection in the registry; dropping it unregisters.
pub struct Registration {
    registry: Arc<ConnectionRegistry>,
    id: ConnectionId,
}

impl Registration {
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry.unregister(self.id);
    }
}
