use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use duet_domain::ports::realtime::EventPublisher;
use duet_domain::realtime::PushEvent;
use tokio::sync::mpsc;

use crate::observability;

/// In-memory room registry for the realtime transport. Purely ephemeral: a
/// reconnecting client rebuilds its membership from scratch, and nothing in
/// here is ever treated as a system of record.
///
/// Every connection sits in its owner's personal room for its whole
/// lifetime and may additionally join thread rooms. A user with N devices
/// gets every event N times, once per connection.
#[derive(Clone, Default)]
pub struct RealtimeHub {
    inner: Arc<HubInner>,
}

#[derive(Default)]
struct HubInner {
    connections: RwLock<HashMap<String, ConnectionHandle>>,
    user_rooms: RwLock<HashMap<String, HashSet<String>>>,
    thread_rooms: RwLock<HashMap<String, HashSet<String>>>,
}

struct ConnectionHandle {
    user_id: String,
    sender: mpsc::UnboundedSender<PushEvent>,
}

impl RealtimeHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection into its owner's personal room. Returns the
    /// connection id and the outbound event stream.
    pub fn register(&self, user_id: &str) -> (String, mpsc::UnboundedReceiver<PushEvent>) {
        let conn_id = duet_domain::util::uuid_v7_without_dashes();
        let (sender, receiver) = mpsc::unbounded_channel();

        self.inner
            .connections
            .write()
            .expect("realtime registry lock")
            .insert(
                conn_id.clone(),
                ConnectionHandle {
                    user_id: user_id.to_string(),
                    sender,
                },
            );
        self.inner
            .user_rooms
            .write()
            .expect("realtime registry lock")
            .entry(user_id.to_string())
            .or_default()
            .insert(conn_id.clone());

        observability::register_realtime_connection("opened");
        (conn_id, receiver)
    }

    pub fn unregister(&self, conn_id: &str) {
        let handle = self
            .inner
            .connections
            .write()
            .expect("realtime registry lock")
            .remove(conn_id);
        if let Some(handle) = handle {
            let mut user_rooms = self.inner.user_rooms.write().expect("realtime registry lock");
            if let Some(room) = user_rooms.get_mut(&handle.user_id) {
                room.remove(conn_id);
                if room.is_empty() {
                    user_rooms.remove(&handle.user_id);
                }
            }
        }
        let mut thread_rooms = self
            .inner
            .thread_rooms
            .write()
            .expect("realtime registry lock");
        thread_rooms.retain(|_, room| {
            room.remove(conn_id);
            !room.is_empty()
        });
        observability::register_realtime_connection("closed");
    }

    /// Access must be checked by the caller before joining; the hub only
    /// tracks membership.
    pub fn join_thread(&self, conn_id: &str, thread_id: &str) {
        self.inner
            .thread_rooms
            .write()
            .expect("realtime registry lock")
            .entry(thread_id.to_string())
            .or_default()
            .insert(conn_id.to_string());
    }

    pub fn leave_thread(&self, conn_id: &str, thread_id: &str) {
        let mut thread_rooms = self
            .inner
            .thread_rooms
            .write()
            .expect("realtime registry lock");
        if let Some(room) = thread_rooms.get_mut(thread_id) {
            room.remove(conn_id);
            if room.is_empty() {
                thread_rooms.remove(thread_id);
            }
        }
    }

    /// Direct delivery to a single connection, used for per-connection
    /// error replies. Routing through the connection's own channel keeps
    /// replies ordered with room fan-out.
    pub fn send_to_conn(&self, conn_id: &str, event: &PushEvent) {
        let delivered = {
            let connections = self.inner.connections.read().expect("realtime registry lock");
            match connections.get(conn_id) {
                Some(handle) => handle.sender.send(event.clone()).is_ok(),
                None => true,
            }
        };
        if !delivered {
            self.unregister(conn_id);
        }
    }

    pub fn connection_count(&self, user_id: &str) -> usize {
        self.inner
            .user_rooms
            .read()
            .expect("realtime registry lock")
            .get(user_id)
            .map(HashSet::len)
            .unwrap_or(0)
    }

    fn fan_out(&self, conn_ids: Vec<String>, event: &PushEvent) {
        let mut dead = Vec::new();
        {
            let connections = self.inner.connections.read().expect("realtime registry lock");
            for conn_id in conn_ids {
                let Some(handle) = connections.get(&conn_id) else {
                    continue;
                };
                if handle.sender.send(event.clone()).is_err() {
                    dead.push(conn_id);
                }
            }
        }
        // A closed receiver means the socket task is gone; drop its rooms.
        for conn_id in dead {
            self.unregister(&conn_id);
        }
    }

    fn room_snapshot(rooms: &RwLock<HashMap<String, HashSet<String>>>, key: &str) -> Vec<String> {
        rooms
            .read()
            .expect("realtime registry lock")
            .get(key)
            .map(|room| room.iter().cloned().collect())
            .unwrap_or_default()
    }
}

impl EventPublisher for RealtimeHub {
    fn publish_to_user(&self, user_id: &str, event: &PushEvent) {
        observability::register_push_event(event.name(), "user");
        let conn_ids = Self::room_snapshot(&self.inner.user_rooms, user_id);
        self.fan_out(conn_ids, event);
    }

    fn publish_to_thread(&self, thread_id: &str, event: &PushEvent) {
        observability::register_push_event(event.name(), "thread");
        let conn_ids = Self::room_snapshot(&self.inner.thread_rooms, thread_id);
        self.fan_out(conn_ids, event);
    }
}
