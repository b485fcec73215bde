//! # Connection Registry + Broadcast Fan-out
//!
//! Tracks every open duplex connection, tagging each with a role and a
//! liveness flag, and owns the fan-out path.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Connection Registry                                │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │   RwLock<HashMap<ConnectionId, ConnEntry>>                      │   │
//! │  │                                                                 │   │
//! │  │   ┌──────────┐  ┌──────────┐  ┌──────────┐                      │   │
//! │  │   │ hardware │  │  app #1  │  │  app #2  │   Each entry holds   │   │
//! │  │   │ alive ✓  │  │ alive ✓  │  │ alive ✗  │   a bounded mpsc     │   │
//! │  │   └──────────┘  └──────────┘  └──────────┘   sender of Frames   │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  FAN-OUT RULES                                                         │
//! │  ─────────────                                                         │
//! │  • Serialize once, enqueue to every connection except the excluded one │
//! │  • Per-connection FIFO order is the mpsc channel's order               │
//! │  • try_send only: a slow or dead peer never stalls the caller          │
//! │  • One failed enqueue never aborts delivery to the others              │
//! │                                                                         │
//! │  ROLE RULES                                                            │
//! │  ──────────                                                            │
//! │  • Every connection starts as App with alive = true                    │
//! │  • Promotion to Hardware happens at most once; roles never revert      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashMap;

use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

/// Identifier for one open connection.
pub type ConnectionId = Uuid;

/// Per-connection outbound channel depth.
///
/// Household-scale traffic never comes close; a full channel means the peer
/// stopped draining its socket and frames for it are dropped.
pub const OUTBOUND_BUFFER: usize = 64;

// =============================================================================
// Roles and Frames
// =============================================================================

/// Role a registered connection holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionRole {
    /// Remote control surface (the default).
    App,

    /// The physical controller. At most one connection meaningfully holds
    /// this at a time; promotion is one-way.
    Hardware,
}

impl std::fmt::Display for ConnectionRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionRole::App => write!(f, "app"),
            ConnectionRole::Hardware => write!(f, "hardware"),
        }
    }
}

/// Frame queued for a connection's outgoing task.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// A serialized protocol message.
    Text(String),

    /// Liveness probe.
    Ping,

    /// Answer to a peer's ping.
    Pong(Vec<u8>),

    /// Ask the outgoing task to close the socket and stop.
    Close,
}

// =============================================================================
// Registry
// =============================================================================

#[derive(Debug)]
struct ConnEntry {
    role: ConnectionRole,
    alive: bool,
    sender: mpsc::Sender<Frame>,
}

/// Registry of open connections.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    conns: RwLock<HashMap<ConnectionId, ConnEntry>>,
}

impl ConnectionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new connection. Starts as App with alive = true.
    pub async fn register(&self, sender: mpsc::Sender<Frame>) -> ConnectionId {
        let id = Uuid::new_v4();
        let entry = ConnEntry {
            role: ConnectionRole::App,
            alive: true,
            sender,
        };
        self.conns.write().await.insert(id, entry);
        debug!(conn_id = %id, "Connection registered");
        id
    }

    /// Promotes a connection to the hardware role.
    ///
    /// Returns true if the role actually changed. Promotion happens at most
    /// once per connection; the role never reverts.
    pub async fn promote_to_hardware(&self, id: ConnectionId) -> bool {
        let mut conns = self.conns.write().await;
        match conns.get_mut(&id) {
            Some(entry) if entry.role == ConnectionRole::App => {
                entry.role = ConnectionRole::Hardware;
                debug!(conn_id = %id, "Connection promoted to hardware");
                true
            }
            _ => false,
        }
    }

    /// Removes a connection, returning the role it held.
    pub async fn unregister(&self, id: ConnectionId) -> Option<ConnectionRole> {
        let removed = self.conns.write().await.remove(&id);
        if let Some(ref entry) = removed {
            debug!(conn_id = %id, role = %entry.role, "Connection removed");
        }
        removed.map(|entry| entry.role)
    }

    /// Returns the role a connection currently holds.
    pub async fn role_of(&self, id: ConnectionId) -> Option<ConnectionRole> {
        self.conns.read().await.get(&id).map(|entry| entry.role)
    }

    /// Marks a connection alive (probe response received).
    pub async fn mark_alive(&self, id: ConnectionId) {
        if let Some(entry) = self.conns.write().await.get_mut(&id) {
            entry.alive = true;
        }
    }

    /// Returns the number of open connections.
    pub async fn count(&self) -> usize {
        self.conns.read().await.len()
    }

    /// Returns the ids of all connections holding `role`.
    pub async fn ids_by_role(&self, role: ConnectionRole) -> Vec<ConnectionId> {
        self.conns
            .read()
            .await
            .iter()
            .filter(|(_, entry)| entry.role == role)
            .map(|(id, _)| *id)
            .collect()
    }

    /// Enqueues a serialized message to every connection except `exclude`.
    ///
    /// The message is serialized once by the caller; here it is only cloned
    /// into each connection's queue. A failed enqueue is logged and skipped.
    pub async fn broadcast(&self, text: &str, exclude: Option<ConnectionId>) {
        let conns = self.conns.read().await;
        for (id, entry) in conns.iter() {
            if Some(*id) == exclude {
                continue;
            }
            if entry.sender.try_send(Frame::Text(text.to_string())).is_err() {
                warn!(conn_id = %id, "Dropping broadcast frame for slow or closed connection");
            }
        }
    }

    /// Enqueues a serialized message to one connection.
    ///
    /// Returns false if the connection is gone or its queue is full.
    pub async fn send_to(&self, id: ConnectionId, text: &str) -> bool {
        let conns = self.conns.read().await;
        match conns.get(&id) {
            Some(entry) => entry.sender.try_send(Frame::Text(text.to_string())).is_ok(),
            None => false,
        }
    }

    /// Enqueues a pong answering a peer's ping.
    pub async fn send_pong(&self, id: ConnectionId, payload: Vec<u8>) {
        let conns = self.conns.read().await;
        if let Some(entry) = conns.get(&id) {
            let _ = entry.sender.try_send(Frame::Pong(payload));
        }
    }

    /// Runs one liveness sweep.
    ///
    /// Connections that did not answer the previous probe are closed and
    /// removed; every survivor is flagged not-alive and sent a fresh probe.
    /// Returns the removed connections so the caller can react to a lost
    /// hardware link.
    pub async fn sweep(&self) -> Vec<(ConnectionId, ConnectionRole)> {
        let mut conns = self.conns.write().await;
        let dead: Vec<ConnectionId> = conns
            .iter()
            .filter(|(_, entry)| !entry.alive)
            .map(|(id, _)| *id)
            .collect();

        let mut removed = Vec::with_capacity(dead.len());
        for id in dead {
            if let Some(entry) = conns.remove(&id) {
                warn!(conn_id = %id, role = %entry.role, "Closing unresponsive connection");
                // Best effort: the outgoing task closes the socket on Close
                let _ = entry.sender.try_send(Frame::Close);
                removed.push((id, entry.role));
            }
        }

        for (id, entry) in conns.iter_mut() {
            entry.alive = false;
            if entry.sender.try_send(Frame::Ping).is_err() {
                debug!(conn_id = %id, "Could not enqueue probe");
            }
        }

        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel() -> (mpsc::Sender<Frame>, mpsc::Receiver<Frame>) {
        mpsc::channel(OUTBOUND_BUFFER)
    }

    #[tokio::test]
    async fn test_register_starts_as_app() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = channel();
        let id = registry.register(tx).await;

        assert_eq!(registry.role_of(id).await, Some(ConnectionRole::App));
        assert_eq!(registry.count().await, 1);
    }

    #[tokio::test]
    async fn test_promotion_happens_once() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = channel();
        let id = registry.register(tx).await;

        assert!(registry.promote_to_hardware(id).await);
        assert!(!registry.promote_to_hardware(id).await);
        assert_eq!(registry.role_of(id).await, Some(ConnectionRole::Hardware));
    }

    #[tokio::test]
    async fn test_ids_by_role() {
        let registry = ConnectionRegistry::new();
        let (tx_a, _rx_a) = channel();
        let (tx_b, _rx_b) = channel();
        let id_a = registry.register(tx_a).await;
        let id_b = registry.register(tx_b).await;
        registry.promote_to_hardware(id_a).await;

        assert_eq!(
            registry.ids_by_role(ConnectionRole::Hardware).await,
            vec![id_a]
        );
        assert_eq!(registry.ids_by_role(ConnectionRole::App).await, vec![id_b]);
    }

    #[tokio::test]
    async fn test_unregister_returns_role() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = channel();
        let id = registry.register(tx).await;
        registry.promote_to_hardware(id).await;

        assert_eq!(
            registry.unregister(id).await,
            Some(ConnectionRole::Hardware)
        );
        assert_eq!(registry.unregister(id).await, None);
        assert_eq!(registry.count().await, 0);
    }

    #[tokio::test]
    async fn test_broadcast_excludes_sender() {
        let registry = ConnectionRegistry::new();
        let (tx_a, mut rx_a) = channel();
        let (tx_b, mut rx_b) = channel();
        let id_a = registry.register(tx_a).await;
        let _id_b = registry.register(tx_b).await;

        registry.broadcast("hello", Some(id_a)).await;

        assert_eq!(rx_b.try_recv().unwrap(), Frame::Text("hello".into()));
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_broadcast_survives_closed_peer() {
        let registry = ConnectionRegistry::new();
        let (tx_a, rx_a) = channel();
        let (tx_b, mut rx_b) = channel();
        registry.register(tx_a).await;
        registry.register(tx_b).await;
        drop(rx_a); // peer A's outgoing task is gone

        registry.broadcast("still delivered", None).await;
        assert_eq!(
            rx_b.try_recv().unwrap(),
            Frame::Text("still delivered".into())
        );
    }

    #[tokio::test]
    async fn test_sweep_two_round_eviction() {
        let registry = ConnectionRegistry::new();
        let (tx, mut rx) = channel();
        let id = registry.register(tx).await;

        // Round 1: connection was alive, gets flagged and probed
        let removed = registry.sweep().await;
        assert!(removed.is_empty());
        assert_eq!(rx.try_recv().unwrap(), Frame::Ping);

        // No pong arrives. Round 2: connection is evicted.
        let removed = registry.sweep().await;
        assert_eq!(removed, vec![(id, ConnectionRole::App)]);
        assert_eq!(rx.try_recv().unwrap(), Frame::Close);
        assert_eq!(registry.count().await, 0);
    }

    #[tokio::test]
    async fn test_sweep_spares_responsive_connection() {
        let registry = ConnectionRegistry::new();
        let (tx, mut rx) = channel();
        let id = registry.register(tx).await;

        registry.sweep().await;
        assert_eq!(rx.try_recv().unwrap(), Frame::Ping);
        registry.mark_alive(id).await; // pong came back

        let removed = registry.sweep().await;
        assert!(removed.is_empty());
        assert_eq!(registry.count().await, 1);
    }
}
