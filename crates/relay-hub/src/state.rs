//! # Canonical State Store
//!
//! The single shared state document and everything the router needs to act
//! on it: the connection registry and the persistence handle.
//!
//! ## Synchronization Discipline
//! All mutations go through the one write lock. Writers build and enqueue
//! their broadcasts while still holding the guard, so mutations are fanned
//! out in exactly the order they were applied; the enqueue is non-blocking
//! (network writes happen on per-connection tasks). Readers take a
//! whole-document snapshot and never observe a partial update.

use std::sync::Arc;

use tokio::sync::{RwLock, RwLockWriteGuard};

use crate::persist::PersistHandle;
use crate::registry::ConnectionRegistry;
use relay_core::{PersistedState, StateDocument};

/// Shared engine state: the canonical document, the connection registry,
/// and the persistence handle.
pub struct SharedState {
    doc: RwLock<StateDocument>,

    /// Open connections and the fan-out path.
    pub registry: ConnectionRegistry,

    persist: PersistHandle,
}

impl SharedState {
    /// Creates the shared state around an initial document.
    pub fn new(initial: StateDocument, persist: PersistHandle) -> Arc<Self> {
        Arc::new(SharedState {
            doc: RwLock::new(initial),
            registry: ConnectionRegistry::new(),
            persist,
        })
    }

    /// Takes a consistent whole-document snapshot.
    pub async fn snapshot(&self) -> StateDocument {
        self.doc.read().await.clone()
    }

    /// Acquires the write guard. Crate-internal: only the router and the
    /// automation engine mutate the document.
    pub(crate) async fn write(&self) -> RwLockWriteGuard<'_, StateDocument> {
        self.doc.write().await
    }

    /// Enqueues a best-effort durable write of the document's durable subset.
    pub(crate) fn persist_from(&self, doc: &StateDocument) {
        self.persist.enqueue(PersistedState::from(doc));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::SwitchId;

    #[tokio::test]
    async fn test_snapshot_sees_mutation() {
        let (persist, _rx) = PersistHandle::paired(4);
        let state = SharedState::new(StateDocument::default(), persist);

        {
            let mut doc = state.write().await;
            doc.switches.insert(SwitchId::Switch2, true);
        }

        let snapshot = state.snapshot().await;
        assert_eq!(snapshot.switches[&SwitchId::Switch2], true);
    }

    #[tokio::test]
    async fn test_persist_from_enqueues_durable_subset() {
        let (persist, mut rx) = PersistHandle::paired(4);
        let state = SharedState::new(StateDocument::default(), persist);

        let mut doc = state.write().await;
        doc.hardware_online = true;
        state.persist_from(&doc);
        drop(doc);

        let snapshot = rx.recv().await.unwrap();
        // hardware_online is volatile and must not appear in the subset
        assert_eq!(
            serde_json::to_value(&snapshot)
                .unwrap()
                .get("isHardwareOnline"),
            None
        );
    }
}
