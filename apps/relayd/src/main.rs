//! # Relay Hub Daemon
//!
//! Bootstraps and runs the hub engine.
//!
//! ## Startup
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           relayd                                        │
//! │                                                                         │
//! │  tracing init (RUST_LOG) ──► config load (RELAY_CONFIG / defaults)     │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  SQLite open + migrations ──► HubEngine::start ──► wait for ctrl-c     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use tracing::info;
use tracing_subscriber::EnvFilter;

use relay_db::{Database, DbConfig};
use relay_hub::{HubConfig, HubEngine};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing; RUST_LOG overrides the default level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting Relay Hub daemon");

    // Load configuration (explicit path via RELAY_CONFIG, else platform
    // default, else built-in defaults).
    let config_path = std::env::var("RELAY_CONFIG").ok().map(PathBuf::from);
    let config = HubConfig::load(config_path)?;
    info!(
        addr = %config.server.bind_address(),
        db = %config.storage.database_path.display(),
        "Configuration loaded"
    );

    // Open the database; the data directory may not exist on first boot.
    if let Some(parent) = config.storage.database_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let db = Database::new(DbConfig::new(&config.storage.database_path)).await?;

    // Start the engine.
    let handle = HubEngine::new(config).start(db).await?;
    info!(addr = %handle.local_addr(), "Relay Hub running");

    // Run until interrupted.
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");
    handle.shutdown().await?;

    Ok(())
}
