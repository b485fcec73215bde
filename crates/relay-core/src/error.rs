//! # Domain Error Types
//!
//! Errors the pure rule layer can produce. Policy rejections (interlock,
//! liveness) are NOT errors - they are expected outcomes modeled by
//! [`crate::rules::ToggleRejection`] so the router can answer them without
//! an error path.

use thiserror::Error;

/// Domain-level error.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    /// A schedule clock value that is not "HH:MM".
    #[error("invalid clock value '{value}', expected HH:MM")]
    InvalidClockValue { value: String },
}
