//! Prelude module for common re-exports.
//!
//! ```rust
//! use bb_common::prelude::*;
//! ```

// ─── Logging ────────────────────────────────────────────────────────
pub use crate::config::LogLevel;

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{ConfigError, ConfigLoader, SharedConfig};

// ─── Limits ─────────────────────────────────────────────────────────
pub use crate::consts::{
    DEFAULT_MEMORY_SIZE, INTERFACE_ID_SIZE, INTERFACE_TYPE_SIZE, MESSAGE_TYPE_SIZE,
};
