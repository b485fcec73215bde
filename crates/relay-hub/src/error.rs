//! # Hub Error Types
//!
//! Error types for engine operations.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Hub Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │   Transport     │  │     Protocol            │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  BindFailed     │  │  DecodeFailed           │ │
//! │  │  ConfigLoad/    │  │  ChannelClosed  │  │  SerializationFailed    │ │
//! │  │  Save, BadUrl   │  │                 │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  Policy rejections (interlock, hardware-offline) are NOT errors:       │
//! │  they are answered on the wire and modeled in relay-core.              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

/// Result type alias for engine operations.
pub type HubResult<T> = Result<T, HubError>;

/// Hub error type covering all engine failures.
#[derive(Debug, Error)]
pub enum HubError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid hub configuration.
    #[error("Invalid hub configuration: {0}")]
    InvalidConfig(String),

    /// Invalid keepalive URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Transport Errors
    // =========================================================================
    /// Failed to bind the listener.
    #[error("Failed to bind {addr}: {reason}")]
    BindFailed { addr: String, reason: String },

    /// An internal channel closed unexpectedly.
    #[error("Channel error: {0}")]
    ChannelClosed(String),

    // =========================================================================
    // Protocol Errors
    // =========================================================================
    /// Inbound message could not be decoded.
    #[error("Failed to decode message: {0}")]
    DecodeFailed(String),

    /// Outbound message could not be serialized.
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    // =========================================================================
    // Storage Errors
    // =========================================================================
    /// Durable store failure.
    #[error("Database error: {0}")]
    DatabaseError(String),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Internal engine error.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Engine is shutting down.
    #[error("Hub engine is shutting down")]
    ShuttingDown,
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<relay_db::DbError> for HubError {
    fn from(err: relay_db::DbError) -> Self {
        HubError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for HubError {
    fn from(err: serde_json::Error) -> Self {
        HubError::SerializationFailed(err.to_string())
    }
}

impl From<url::ParseError> for HubError {
    fn from(err: url::ParseError) -> Self {
        HubError::InvalidUrl(err.to_string())
    }
}

impl From<std::io::Error> for HubError {
    fn from(err: std::io::Error) -> Self {
        HubError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for HubError {
    fn from(err: toml::de::Error) -> Self {
        HubError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for HubError {
    fn from(err: toml::ser::Error) -> Self {
        HubError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization
// =============================================================================

impl HubError {
    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            HubError::InvalidConfig(_)
                | HubError::InvalidUrl(_)
                | HubError::ConfigLoadFailed(_)
                | HubError::ConfigSaveFailed(_)
        )
    }
}
