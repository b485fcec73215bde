//! # Persistence Worker
//!
//! Background task that owns the durable-store repository and drains
//! snapshots of the durable state subset.
//!
//! ## Best-Effort Contract
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Persistence Worker                                   │
//! │                                                                         │
//! │  Router / automation tick                                              │
//! │       │  1. mutate in-memory document (authoritative)                  │
//! │       │  2. enqueue durable snapshot (try_send, never blocks)          │
//! │       ▼                                                                 │
//! │  ┌─────────────────┐         ┌──────────────────────────┐              │
//! │  │  PersistHandle  │ ──────► │  worker task             │              │
//! │  │  (mpsc sender)  │         │  repo.save("main_state") │              │
//! │  └─────────────────┘         └──────────────────────────┘              │
//! │                                                                         │
//! │  A failed write is logged and dropped. The in-memory state keeps       │
//! │  serving; the next persisted intent tries again independently.         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use relay_core::{PersistedState, STATE_DOCUMENT_KEY};
use relay_db::StateRepository;

/// Queue depth for pending snapshots.
///
/// Snapshots supersede each other, so a shallow queue is fine; overflow just
/// means an older snapshot is skipped in favor of a newer one already queued.
const PERSIST_BUFFER: usize = 32;

/// Handle for enqueueing durable snapshots.
#[derive(Debug, Clone)]
pub struct PersistHandle {
    tx: mpsc::Sender<PersistedState>,
}

impl PersistHandle {
    /// Spawns the worker task and returns its handle.
    pub fn spawn(repo: StateRepository) -> PersistHandle {
        let (handle, rx) = Self::paired(PERSIST_BUFFER);
        tokio::spawn(run(repo, rx));
        handle
    }

    /// Creates a handle without a worker; the caller owns the receiving end.
    ///
    /// Used by tests that want to count and inspect persistence calls.
    pub fn paired(capacity: usize) -> (PersistHandle, mpsc::Receiver<PersistedState>) {
        let (tx, rx) = mpsc::channel(capacity);
        (PersistHandle { tx }, rx)
    }

    /// Enqueues a snapshot for a best-effort durable write.
    ///
    /// Never blocks; a full queue drops this snapshot with a warning.
    pub fn enqueue(&self, snapshot: PersistedState) {
        if self.tx.try_send(snapshot).is_err() {
            warn!("Persistence queue full or closed - dropping snapshot");
        }
    }
}

/// Worker loop: drain snapshots, write each, log failures.
async fn run(repo: StateRepository, mut rx: mpsc::Receiver<PersistedState>) {
    info!("Persistence worker started");

    while let Some(snapshot) = rx.recv().await {
        match repo.save(STATE_DOCUMENT_KEY, &snapshot).await {
            Ok(()) => debug!("State document persisted"),
            Err(e) => error!(?e, "Failed to persist state document"),
        }
    }

    info!("Persistence worker stopped");
}
