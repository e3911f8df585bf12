//! BlackBoard Common Library
//!
//! This crate provides shared constants and configuration loading utilities
//! for all BlackBoard workspace crates.
//!
//! # Module Structure
//!
//! - [`consts`] - Name bounds and arena sizing limits
//! - [`config`] - Configuration loading traits and types
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```rust
//! use bb_common::consts::*;
//! use bb_common::config::{ConfigLoader, SharedConfig};
//! ```

pub mod config;
pub mod consts;
pub mod prelude;
