//! Per-room bookkeeping for the relay: the host slot and pending peers.
//!
//! Lock order is registry before room; network writes never happen under
//! either lock (callers clone the host writer out and send afterwards).

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::WebSocket;
use futures_util::stream::SplitStream;
use tokio::sync::Mutex;

use crate::relay::socket::SharedWriter;

/// Read half of a relay-side WebSocket.
pub type SocketReader = SplitStream<WebSocket>;

/// A peer that has upgraded but not yet been paired with a host data
/// connection. Nobody reads the parked socket until pairing happens.
pub struct PendingPeer {
    pub writer: SharedWriter,
    pub reader: SocketReader,
}

/// One relay room: at most one host control connection plus the peers
/// waiting for the host to open their data channels.
pub struct RelayRoom {
    pub name: String,
    slots: Mutex<RoomSlots>,
}

#[derive(Default)]
struct RoomSlots {
    host: Option<SharedWriter>,
    pending: HashMap<String, PendingPeer>,
    next_peer: u64,
}

impl RelayRoom {
    fn new(name: String) -> Self {
        Self {
            name,
            slots: Mutex::new(RoomSlots::default()),
        }
    }

    /// Claim the host slot. Returns false when another host already holds it.
    pub async fn claim_host(&self, writer: SharedWriter) -> bool {
        let mut slots = self.slots.lock().await;
        if slots.host.is_some() {
            return false;
        }
        slots.host = Some(writer);
        true
    }

    /// Clear the host slot and evict every pending peer. The caller closes
    /// the returned connections outside the lock.
    pub async fn release_host(&self) -> Vec<PendingPeer> {
        let mut slots = self.slots.lock().await;
        slots.host = None;
        slots.pending.drain().map(|(_, peer)| peer).collect()
    }

    /// Park a peer for pairing. Fails when the room has no host, handing the
    /// peer back for disposal. On success returns the assigned peer id and a
    /// clone of the host writer so the caller can notify the host with the
    /// room lock released.
    pub async fn add_pending(
        &self,
        peer: PendingPeer,
    ) -> Result<(String, SharedWriter), PendingPeer> {
        let mut slots = self.slots.lock().await;
        let Some(host) = slots.host.clone() else {
            return Err(peer);
        };
        slots.next_peer += 1;
        let peer_id = format!("peer_{}", slots.next_peer);
        slots.pending.insert(peer_id.clone(), peer);
        Ok((peer_id, host))
    }

    /// Take a pending peer out, either for pairing or for disposal after a
    /// failed host notification.
    pub async fn take_pending(&self, peer_id: &str) -> Option<PendingPeer> {
        self.slots.lock().await.pending.remove(peer_id)
    }

    async fn is_abandoned(&self) -> bool {
        let slots = self.slots.lock().await;
        slots.host.is_none() && slots.pending.is_empty()
    }
}

/// All relay rooms, created on first use and dropped once hostless and
/// peerless.
#[derive(Default)]
pub struct RelayRegistry {
    rooms: Mutex<HashMap<String, Arc<RelayRoom>>>,
}

impl RelayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch or create the room with the given name.
    pub async fn room(&self, name: &str) -> Arc<RelayRoom> {
        let mut rooms = self.rooms.lock().await;
        rooms
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(RelayRoom::new(name.to_string())))
            .clone()
    }

    pub async fn get(&self, name: &str) -> Option<Arc<RelayRoom>> {
        self.rooms.lock().await.get(name).cloned()
    }

    /// Drop the room once it has neither a host nor pending peers. Paired
    /// channels keep running; they own their sockets outright.
    pub async fn remove_if_abandoned(&self, name: &str) {
        let mut rooms = self.rooms.lock().await;
        if let Some(room) = rooms.get(name) {
            if room.is_abandoned().await {
                rooms.remove(name);
                tracing::info!("relay room {} removed", name);
            }
        }
    }
}
