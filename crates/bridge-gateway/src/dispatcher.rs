use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{RwLock, broadcast, mpsc};
use uuid::Uuid;

use bridge_types::events::GatewayEvent;

/// Push transport: tracks which named rooms each connection is in and
/// delivers events to rooms, single connections, or everyone.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// Broadcast channel for gateway events. All connected clients receive all events
    broadcast_tx: broadcast::Sender<GatewayEvent>,

    /// Per-connection targeted send channels and room memberships
    connections: RwLock<HashMap<Uuid, ConnectionSlot>>,
}

struct ConnectionSlot {
    tx: mpsc::UnboundedSender<GatewayEvent>,
    rooms: HashSet<String>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(DispatcherInner {
                broadcast_tx,
                connections: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Subscribe to events meant for every connection.
    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Send an event to all connected clients.
    pub fn broadcast(&self, event: GatewayEvent) {
        let _ = self.inner.broadcast_tx.send(event);
    }

    /// Register a connection. It starts in its own private room, named
    /// after its id.
    pub async fn register(&self, conn_id: Uuid) -> mpsc::UnboundedReceiver<GatewayEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut rooms = HashSet::new();
        rooms.insert(conn_id.to_string());
        self.inner
            .connections
            .write()
            .await
            .insert(conn_id, ConnectionSlot { tx, rooms });
        rx
    }

    pub async fn unregister(&self, conn_id: Uuid) {
        self.inner.connections.write().await.remove(&conn_id);
    }

    /// Leave every room except the connection's private one, then enter
    /// `rooms`. Done under one lock so no delivery sees a half-moved
    /// connection.
    pub async fn switch_rooms(&self, conn_id: Uuid, rooms: &[String]) {
        let private = conn_id.to_string();
        if let Some(slot) = self.inner.connections.write().await.get_mut(&conn_id) {
            slot.rooms.retain(|room| *room == private);
            slot.rooms.extend(rooms.iter().cloned());
        }
    }

    /// Rooms a connection is in, sorted.
    pub async fn rooms_of(&self, conn_id: Uuid) -> Vec<String> {
        let connections = self.inner.connections.read().await;
        let mut rooms: Vec<String> = connections
            .get(&conn_id)
            .map(|slot| slot.rooms.iter().cloned().collect())
            .unwrap_or_default();
        rooms.sort();
        rooms
    }

    /// Deliver to every connection in `room`. Returns how many got it.
    pub async fn broadcast_to_room(&self, room: &str, event: GatewayEvent) -> usize {
        let connections = self.inner.connections.read().await;
        connections
            .values()
            .filter(|slot| slot.rooms.contains(room))
            .filter(|slot| slot.tx.send(event.clone()).is_ok())
            .count()
    }

    /// Deliver to a single connection.
    pub async fn emit_to(&self, conn_id: Uuid, event: GatewayEvent) {
        let connections = self.inner.connections.read().await;
        if let Some(slot) = connections.get(&conn_id) {
            let _ = slot.tx.send(event);
        }
    }

    pub async fn connection_count(&self) -> usize {
        self.inner.connections.read().await.len()
    }
}
