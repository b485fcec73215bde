//! # Engine Orchestrator
//!
//! Wires the whole hub together: loads the durable document, builds the
//! shared state, spawns the persistence worker, liveness monitor, and
//! automation engine, and serves the WebSocket + HTTP router.
//!
//! ## Startup Sequence
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        HubEngine::start                                 │
//! │                                                                         │
//! │  validate config                                                        │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  load("main_state") ──► StateDocument::restore  (defaults on absence   │
//! │       │                  or load failure; volatile fields reset)       │
//! │       ▼                                                                 │
//! │  SharedState { document, registry, persistence worker }                │
//! │       │                                                                 │
//! │       ├──► liveness monitor   (30s probe sweep)                        │
//! │       ├──► automation engine  (60s tick)                               │
//! │       ▼                                                                 │
//! │  TcpListener::bind ──► axum::serve (graceful shutdown channel)         │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  EngineHandle { local_addr, state, shutdown }                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Binding port 0 asks the OS for a free port; `EngineHandle::local_addr`
//! reports the resolved address, which is what integration tests connect to.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::automation::{AutomationEngine, TickSchedule};
use crate::config::HubConfig;
use crate::error::{HubError, HubResult};
use crate::liveness;
use crate::persist::PersistHandle;
use crate::server;
use crate::state::SharedState;
use relay_core::{StateDocument, STATE_DOCUMENT_KEY};
use relay_db::Database;

// =============================================================================
// Engine
// =============================================================================

/// The hub engine, ready to start.
pub struct HubEngine {
    config: HubConfig,
}

impl HubEngine {
    /// Creates a new engine from validated-or-not configuration;
    /// `start` validates.
    pub fn new(config: HubConfig) -> Self {
        HubEngine { config }
    }

    /// Starts every component and returns a handle to the running engine.
    pub async fn start(self, db: Database) -> HubResult<EngineHandle> {
        self.config.validate()?;

        // Restore the durable subset; volatile fields always start cold.
        let repo = db.state();
        let initial = match repo.load(STATE_DOCUMENT_KEY).await {
            Ok(Some(persisted)) => {
                info!("Restored durable state from storage");
                StateDocument::restore(persisted)
            }
            Ok(None) => {
                info!("No stored state - starting from defaults");
                StateDocument::default()
            }
            Err(e) => {
                warn!(?e, "Failed to load stored state - starting from defaults");
                StateDocument::default()
            }
        };

        let persist = PersistHandle::spawn(repo);
        let state = SharedState::new(initial, persist);

        // Periodic loops
        let liveness_task = liveness::spawn(
            state.clone(),
            Duration::from_secs(self.config.liveness.probe_interval_secs),
        );
        let schedule = TickSchedule::from_settings(&self.config.automation)?;
        let automation_task = AutomationEngine::new(state.clone(), schedule).spawn();

        // Server
        let app = server::app_router(state.clone());
        let bind_addr = self.config.server.bind_address();
        let listener = TcpListener::bind(&bind_addr)
            .await
            .map_err(|e| HubError::BindFailed {
                addr: bind_addr.clone(),
                reason: e.to_string(),
            })?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| HubError::Internal(e.to_string()))?;

        info!(addr = %local_addr, "Hub server started");

        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    shutdown_rx.recv().await;
                    info!("Hub server shutting down");
                })
                .await
                .ok();
        });

        Ok(EngineHandle {
            local_addr,
            state,
            shutdown_tx,
            liveness_task,
            automation_task,
        })
    }
}

// =============================================================================
// Engine Handle
// =============================================================================

/// Handle for a running hub engine.
pub struct EngineHandle {
    local_addr: SocketAddr,
    state: Arc<SharedState>,
    shutdown_tx: mpsc::Sender<()>,
    liveness_task: JoinHandle<()>,
    automation_task: JoinHandle<()>,
}

impl EngineHandle {
    /// The address the server actually bound (resolves port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The shared engine state.
    pub fn state(&self) -> Arc<SharedState> {
        self.state.clone()
    }

    /// Number of currently open connections.
    pub async fn client_count(&self) -> usize {
        self.state.registry.count().await
    }

    /// Shuts the engine down: stops the server and the periodic loops.
    pub async fn shutdown(&self) -> HubResult<()> {
        self.liveness_task.abort();
        self.automation_task.abort();
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| HubError::ChannelClosed("Hub shutdown channel closed".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_db::DbConfig;

    #[tokio::test]
    async fn test_engine_starts_and_shuts_down() {
        let mut config = HubConfig::default();
        config.server.port = 0;
        config.server.bind_addr = "127.0.0.1".to_string();

        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let handle = HubEngine::new(config).start(db).await.unwrap();

        assert_ne!(handle.local_addr().port(), 0);
        assert_eq!(handle.client_count().await, 0);
        assert!(!handle.state().snapshot().await.hardware_online);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_engine_rejects_invalid_config() {
        let mut config = HubConfig::default();
        config.automation.tick_interval_secs = 0;

        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let result = HubEngine::new(config).start(db).await;
        assert!(matches!(result, Err(HubError::InvalidConfig(_))));
    }
}
