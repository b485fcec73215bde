//! # Liveness Monitor
//!
//! Two-round dead-peer detection over every open connection.
//!
//! ## The Sweep
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Liveness Monitor                                   │
//! │                                                                         │
//! │  every probe_interval (default 30s):                                   │
//! │                                                                         │
//! │    for each connection:                                                │
//! │      alive == false ──► close it (it missed the previous probe)        │
//! │      alive == true  ──► set alive = false, send a ping                 │
//! │                                                                         │
//! │    a pong resets alive = true (handled in the socket loop)             │
//! │                                                                         │
//! │  A connection must answer every probe to stay open; missing exactly    │
//! │  one cycle is fatal. Worst-case detection: two intervals.              │
//! │                                                                         │
//! │  Evicting the hardware connection flips HardwareLiveness off and       │
//! │  broadcasts the new state, same as a clean hardware disconnect.        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, info};

use crate::registry::ConnectionRole;
use crate::router;
use crate::state::SharedState;

/// Runs one probe sweep and handles a lost hardware connection.
pub async fn run_sweep(state: &SharedState) {
    let removed = state.registry.sweep().await;
    for (conn_id, role) in removed {
        debug!(conn_id = %conn_id, role = %role, "Evicted unresponsive connection");
        if role == ConnectionRole::Hardware {
            info!(conn_id = %conn_id, "Hardware connection evicted by liveness monitor");
            router::hardware_lost(state).await;
        }
    }
}

/// Spawns the repeating probe sweep.
pub fn spawn(state: Arc<SharedState>, probe_interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(interval_secs = probe_interval.as_secs(), "Liveness monitor started");
        let mut ticker = interval(probe_interval);
        // The first tick fires immediately; skip it so fresh connections get
        // a full interval before their first probe.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            run_sweep(&state).await;
        }
    })
}
