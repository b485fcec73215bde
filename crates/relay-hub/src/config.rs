//! # Hub Configuration
//!
//! Configuration management for the hub daemon.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     RELAY_PORT=8080                                                    │
//! │     RELAY_DB_PATH=/var/lib/relayd/hub.db                               │
//! │     RELAY_KEEPALIVE_URL=https://hub.example.net/health                 │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/relayd/hub.toml (Linux)                                  │
//! │     ~/Library/Application Support/net.relay-hub.relayd/hub.toml (mac)  │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     port 8080, 60s automation tick, UTC+5:30 local clock               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # hub.toml
//! [server]
//! port = 8080
//! bind_addr = "0.0.0.0"
//!
//! [storage]
//! database_path = "/var/lib/relayd/hub.db"
//!
//! [liveness]
//! probe_interval_secs = 30
//!
//! [automation]
//! tick_interval_secs = 60
//! utc_offset_minutes = 330     # hub wall clock, independent of host tz
//! night_start = "22:30"
//! night_end = "05:00"
//! morning_restore = "05:00"
//! timer_tolerance_secs = 30
//! keepalive_url = "https://hub.example.net/health"
//! keepalive_quiet_start = "02:30"
//! keepalive_quiet_end = "03:30"
//! keepalive_mark_minutes = 10
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info};

use crate::error::{HubError, HubResult};
use relay_core::rules::parse_hhmm;

// =============================================================================
// Server Settings
// =============================================================================

/// Listener settings for the WebSocket + HTTP server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Port to listen on. Port 0 asks the OS for a free port (tests).
    #[serde(default = "default_port")]
    pub port: u16,

    /// Bind address (default: 0.0.0.0 for all interfaces).
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

fn default_port() -> u16 {
    8080
}

fn default_bind_addr() -> String {
    "0.0.0.0".to_string()
}

impl Default for ServerSettings {
    fn default() -> Self {
        ServerSettings {
            port: default_port(),
            bind_addr: default_bind_addr(),
        }
    }
}

impl ServerSettings {
    /// Returns the full bind address.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}

// =============================================================================
// Storage Settings
// =============================================================================

/// Durable storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

fn default_database_path() -> PathBuf {
    // Fall back to the working directory when no platform dir is available
    // (containers without HOME).
    directories::ProjectDirs::from("net", "relay-hub", "relayd")
        .map(|dirs| dirs.data_dir().join("hub.db"))
        .unwrap_or_else(|| PathBuf::from("hub.db"))
}

impl Default for StorageSettings {
    fn default() -> Self {
        StorageSettings {
            database_path: default_database_path(),
        }
    }
}

// =============================================================================
// Liveness Settings
// =============================================================================

/// Dead-peer detection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LivenessSettings {
    /// Interval between probe sweeps (seconds).
    ///
    /// A connection that misses one whole sweep is closed, so worst-case
    /// detection is two intervals.
    #[serde(default = "default_probe_interval")]
    pub probe_interval_secs: u64,
}

fn default_probe_interval() -> u64 {
    30
}

impl Default for LivenessSettings {
    fn default() -> Self {
        LivenessSettings {
            probe_interval_secs: default_probe_interval(),
        }
    }
}

// =============================================================================
// Automation Settings
// =============================================================================

/// Automation engine settings.
///
/// The tolerance windows here are double protection against clock drift and
/// skipped ticks. They are configurable, but the semantics (a symmetric
/// window around the nominal instant) are load-bearing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationSettings {
    /// Interval between automation ticks (seconds).
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,

    /// Minutes east of UTC the hub wall clock runs at, regardless of host
    /// timezone. Default: 330 (UTC+5:30).
    #[serde(default = "default_utc_offset")]
    pub utc_offset_minutes: i32,

    /// Start of the night window ("HH:MM").
    #[serde(default = "default_night_start")]
    pub night_start: String,

    /// End of the night window, exclusive ("HH:MM").
    #[serde(default = "default_night_end")]
    pub night_end: String,

    /// Minute the morning restore fires at ("HH:MM").
    #[serde(default = "default_morning_restore")]
    pub morning_restore: String,

    /// Symmetric timer due window (seconds).
    #[serde(default = "default_timer_tolerance")]
    pub timer_tolerance_secs: u64,

    /// Anti-idle keepalive target. None disables the keepalive entirely.
    #[serde(default)]
    pub keepalive_url: Option<String>,

    /// Start of the keepalive quiet window ("HH:MM").
    #[serde(default = "default_quiet_start")]
    pub keepalive_quiet_start: String,

    /// End of the keepalive quiet window, exclusive ("HH:MM").
    #[serde(default = "default_quiet_end")]
    pub keepalive_quiet_end: String,

    /// Keepalive fires on whole-N-minute marks.
    #[serde(default = "default_keepalive_mark")]
    pub keepalive_mark_minutes: u32,
}

fn default_tick_interval() -> u64 {
    60
}
fn default_utc_offset() -> i32 {
    330
}
fn default_night_start() -> String {
    "22:30".to_string()
}
fn default_night_end() -> String {
    "05:00".to_string()
}
fn default_morning_restore() -> String {
    "05:00".to_string()
}
fn default_timer_tolerance() -> u64 {
    30
}
fn default_quiet_start() -> String {
    "02:30".to_string()
}
fn default_quiet_end() -> String {
    "03:30".to_string()
}
fn default_keepalive_mark() -> u32 {
    10
}

impl Default for AutomationSettings {
    fn default() -> Self {
        AutomationSettings {
            tick_interval_secs: default_tick_interval(),
            utc_offset_minutes: default_utc_offset(),
            night_start: default_night_start(),
            night_end: default_night_end(),
            morning_restore: default_morning_restore(),
            timer_tolerance_secs: default_timer_tolerance(),
            keepalive_url: None,
            keepalive_quiet_start: default_quiet_start(),
            keepalive_quiet_end: default_quiet_end(),
            keepalive_mark_minutes: default_keepalive_mark(),
        }
    }
}

// =============================================================================
// Main Hub Configuration
// =============================================================================

/// Complete hub configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HubConfig {
    /// Listener settings.
    #[serde(default)]
    pub server: ServerSettings,

    /// Durable storage settings.
    #[serde(default)]
    pub storage: StorageSettings,

    /// Dead-peer detection settings.
    #[serde(default)]
    pub liveness: LivenessSettings,

    /// Automation engine settings.
    #[serde(default)]
    pub automation: AutomationSettings,
}

impl HubConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (hub.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> HubResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading hub config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Returns the platform default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("net", "relay-hub", "relayd")
            .map(|dirs| dirs.config_dir().join("hub.toml"))
    }

    /// Saves the configuration to the given path (TOML).
    pub fn save(&self, path: &PathBuf) -> HubResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        info!(?path, "Saved hub config");
        Ok(())
    }

    /// Applies `RELAY_*` environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(port) = std::env::var("RELAY_PORT") {
            if let Ok(port) = port.parse() {
                self.server.port = port;
            }
        }
        if let Ok(addr) = std::env::var("RELAY_BIND_ADDR") {
            self.server.bind_addr = addr;
        }
        if let Ok(path) = std::env::var("RELAY_DB_PATH") {
            self.storage.database_path = PathBuf::from(path);
        }
        if let Ok(url) = std::env::var("RELAY_KEEPALIVE_URL") {
            self.automation.keepalive_url = Some(url);
        }
        if let Ok(offset) = std::env::var("RELAY_UTC_OFFSET_MINUTES") {
            if let Ok(offset) = offset.parse() {
                self.automation.utc_offset_minutes = offset;
            }
        }
    }

    /// Validates the configuration.
    pub fn validate(&self) -> HubResult<()> {
        if self.liveness.probe_interval_secs == 0 {
            return Err(HubError::InvalidConfig(
                "liveness.probe_interval_secs must be > 0".into(),
            ));
        }
        if self.automation.tick_interval_secs == 0 {
            return Err(HubError::InvalidConfig(
                "automation.tick_interval_secs must be > 0".into(),
            ));
        }
        // FixedOffset rejects anything outside +/- 24h, but real offsets
        // stay within +/- 14h
        if self.automation.utc_offset_minutes.abs() > 14 * 60 {
            return Err(HubError::InvalidConfig(format!(
                "automation.utc_offset_minutes out of range: {}",
                self.automation.utc_offset_minutes
            )));
        }
        for (field, value) in [
            ("night_start", &self.automation.night_start),
            ("night_end", &self.automation.night_end),
            ("morning_restore", &self.automation.morning_restore),
            ("keepalive_quiet_start", &self.automation.keepalive_quiet_start),
            ("keepalive_quiet_end", &self.automation.keepalive_quiet_end),
        ] {
            parse_hhmm(value).map_err(|_| {
                HubError::InvalidConfig(format!("automation.{} is not HH:MM: '{}'", field, value))
            })?;
        }
        if let Some(ref url) = self.automation.keepalive_url {
            url::Url::parse(url)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = HubConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.automation.utc_offset_minutes, 330);
        assert_eq!(config.liveness.probe_interval_secs, 30);
    }

    #[test]
    fn test_bind_address() {
        let settings = ServerSettings {
            port: 9000,
            bind_addr: "127.0.0.1".to_string(),
        };
        assert_eq!(settings.bind_address(), "127.0.0.1:9000");
    }

    #[test]
    fn test_parse_partial_toml() {
        let config: HubConfig = toml::from_str(
            r#"
            [server]
            port = 9999

            [automation]
            night_start = "23:00"
            "#,
        )
        .unwrap();
        assert_eq!(config.server.port, 9999);
        assert_eq!(config.automation.night_start, "23:00");
        // Unspecified sections fall back to defaults
        assert_eq!(config.automation.tick_interval_secs, 60);
        assert_eq!(config.liveness.probe_interval_secs, 30);
    }

    #[test]
    fn test_validate_rejects_bad_clock_values() {
        let mut config = HubConfig::default();
        config.automation.night_start = "25:00".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_keepalive_url() {
        let mut config = HubConfig::default();
        config.automation.keepalive_url = Some("not a url".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_writes_readable_toml() {
        let config = HubConfig::default();
        let path = std::env::temp_dir().join("relay-hub-test-config.toml");
        config.save(&path).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let parsed: HubConfig = toml::from_str(&contents).unwrap();
        assert_eq!(parsed.server.port, config.server.port);
        assert_eq!(parsed.automation.night_start, config.automation.night_start);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_validate_rejects_zero_intervals() {
        let mut config = HubConfig::default();
        config.automation.tick_interval_secs = 0;
        assert!(config.validate().is_err());
    }
}
