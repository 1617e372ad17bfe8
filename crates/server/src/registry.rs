//! Broadcast registry for owner dashboards
//!
//! Each business owner may have several dashboard sockets open at once;
//! every lead event fans out to all of them. A send failure only drops
//! that one socket, never its siblings, and dead senders are pruned on
//! the next broadcast.

use std::collections::HashMap;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

use leadline_core::LeadEvent;

#[derive(Default)]
pub struct BroadcastRegistry {
    clients: Mutex<HashMap<String, Vec<mpsc::UnboundedSender<String>>>>,
}

impl BroadcastRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one dashboard socket for an owner. The receiver yields
    /// serialized events until the registry drops the sender.
    pub fn register(&self, owner_id: &str) -> mpsc::UnboundedReceiver<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut clients = self.clients.lock();
        clients.entry(owner_id.to_string()).or_default().push(tx);
        debug!(owner_id, total = clients[owner_id].len(), "dashboard client registered");
        rx
    }

    /// Fan one event out to every connected client of `owner_id`.
    /// Returns how many clients received it.
    pub fn broadcast(&self, owner_id: &str, event: &LeadEvent) -> usize {
        let payload = match serde_json::to_string(event) {
            Ok(json) => json,
            Err(_) => return 0,
        };

        let mut clients = self.clients.lock();
        let Some(senders) = clients.get_mut(owner_id) else {
            return 0;
        };
        senders.retain(|tx| tx.send(payload.clone()).is_ok());
        let delivered = senders.len();
        if senders.is_empty() {
            clients.remove(owner_id);
        }
        delivered
    }

    /// Broadcast a batch to one owner, in order.
    pub fn broadcast_batch(&self, owner_id: &str, events: &[LeadEvent]) {
        for event in events {
            self.broadcast(owner_id, event);
        }
    }

    /// Fan one event out to every client of every owner. Same per-socket
    /// isolation as [`broadcast`](Self::broadcast): a dead socket is
    /// pruned without aborting the rest of the sweep. Returns how many
    /// clients received it.
    pub fn broadcast_all(&self, event: &LeadEvent) -> usize {
        let payload = match serde_json::to_string(event) {
            Ok(json) => json,
            Err(_) => return 0,
        };

        let mut clients = self.clients.lock();
        let mut delivered = 0;
        for senders in clients.values_mut() {
            senders.retain(|tx| tx.send(payload.clone()).is_ok());
            delivered += senders.len();
        }
        clients.retain(|_, senders| !senders.is_empty());
        delivered
    }

    pub fn client_count(&self, owner_id: &str) -> usize {
        self.clients.lock().get(owner_id).map_or(0, Vec::len)
    }
}
