//! # relay-hub: Sync + Automation Engine for Relay Hub
//!
//! This crate is the hub proper: the single source of truth between one
//! physical relay controller ("hardware") and any number of remote control
//! surfaces ("apps").
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Hub Engine Architecture                         │
//! │                                                                         │
//! │  hardware ──┐                                                           │
//! │             │  WebSocket (/ws)                                          │
//! │  app #1  ───┼──────────────────▶ ┌──────────────────────────────┐       │
//! │             │                    │  server  → router            │       │
//! │  app #2  ───┘                    │     │         │              │       │
//! │                                  │     │    ┌────▼─────────┐    │       │
//! │  HTTP (/api/*) ─────────────────▶│  facade │ SharedState  │    │       │
//! │                                  │         │ (doc + lock) │    │       │
//! │                                  │         └────┬─────────┘    │       │
//! │                                  │              │              │       │
//! │                                  │   ┌──────────┼───────────┐  │       │
//! │                                  │   ▼          ▼           ▼  │       │
//! │                                  │ registry  persistence  fan- │       │
//! │                                  │ (roles,   worker       out  │       │
//! │                                  │  alive)   (best-effort)     │       │
//! │                                  └──────────────────────────────┘       │
//! │                                                                         │
//! │  Periodic loops, decoupled from any connection:                        │
//! │  • liveness monitor: 30s two-round ping sweep                          │
//! │  • automation engine: 60s tick (night/morning protocol, schedule and   │
//! │    timer due-checks, anti-idle keepalive)                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`engine`] - Orchestrator: load state, spawn everything, serve
//! - [`config`] - Hub configuration (TOML file + RELAY_* env overrides)
//! - [`error`] - Engine error types
//! - [`protocol`] - Wire messages and the envelope codec
//! - [`registry`] - Connection registry + broadcast fan-out
//! - [`router`] - Message dispatch, interlock and liveness gates
//! - [`state`] - The canonical state document behind its write lock
//! - [`server`] - Axum WebSocket server
//! - [`api`] - HTTP read/write facade
//! - [`liveness`] - Dead-peer detection
//! - [`automation`] - The periodic automation tick
//! - [`persist`] - Best-effort persistence worker
//!
//! ## Usage
//!
//! ```rust,ignore
//! use relay_hub::{HubConfig, HubEngine};
//! use relay_db::{Database, DbConfig};
//!
//! let config = HubConfig::load(None)?;
//! let db = Database::new(DbConfig::new(&config.storage.database_path)).await?;
//! let handle = HubEngine::new(config).start(db).await?;
//!
//! // ... runs until:
//! handle.shutdown().await;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod api;
pub mod automation;
pub mod config;
pub mod engine;
pub mod error;
pub mod liveness;
pub mod persist;
pub mod protocol;
pub mod registry;
pub mod router;
pub mod server;
pub mod state;

// =============================================================================
// Re-exports
// =============================================================================

pub use automation::{AutomationEngine, TickSchedule};
pub use config::{AutomationSettings, HubConfig, LivenessSettings, ServerSettings, StorageSettings};
pub use engine::{EngineHandle, HubEngine};
pub use error::{HubError, HubResult};
pub use protocol::{ClientMessage, CommandPayload, ServerMessage};
pub use registry::{ConnectionId, ConnectionRegistry, ConnectionRole};
pub use state::SharedState;
