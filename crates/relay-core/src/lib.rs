//! # relay-core: Pure Domain Logic for Relay Hub
//!
//! This crate is the **heart** of Relay Hub. It contains the canonical state
//! document and every domain rule as pure functions with zero I/O
//! dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Relay Hub Architecture                           │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │            Hardware controller + remote apps (WebSocket)        │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                 relay-hub (router, fan-out, automation)         │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ relay-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐                  │   │
//! │  │   │   types   │  │   rules   │  │   error   │                  │   │
//! │  │   │ StateDoc  │  │ interlock │  │  domain   │                  │   │
//! │  │   │ Schedule  │  │ due-check │  │  errors   │                  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘                  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    relay-db (SQLite document store)             │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - The state document and its building blocks
//! - [`rules`] - Interlock and time-window rules
//! - [`error`] - Domain error types
//!
//! ## Design Principles
//!
//! 1. **Pure Functions**: Every rule is deterministic - same input = same output
//! 2. **No I/O**: Database, network, file system access is FORBIDDEN here
//! 3. **Closed Sets**: Switch and label identifiers are enums; unknown keys
//!    cannot exist past the decode boundary
//! 4. **Explicit Errors**: All errors are typed, never strings or panics

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod rules;
pub mod types;

// =============================================================================
// Re-exports for Convenience
// =============================================================================
// These allow users to do `use relay_core::StateDocument` instead of
// `use relay_core::types::StateDocument`

pub use error::CoreError;
pub use rules::{ToggleRejection, INTERLOCKED_SWITCHES};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Well-known key the durable state document is stored under.
///
/// ## Why a constant?
/// The hub holds exactly one global state document (single-tenant by design),
/// so the key-value store only ever sees this one key.
pub const STATE_DOCUMENT_KEY: &str = "main_state";
