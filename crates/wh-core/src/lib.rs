//! # wh-core
//!
//! Core crate for the whook alert-to-order engine, providing:
//!
//! - **Types** (`types`): enums, market metadata, positions, balances, order requests
//! - **Market table** (`types::symbol`): flexible symbol resolution against loaded markets
//! - **Configuration** (`config`): JSON config deserialization and validation
//! - **Error types** (`error`): domain-specific `WhError` via thiserror
//! - **Time utilities** (`time_util`): wall-clock timestamps
//! - **Logging** (`logging`): tracing-based structured logging

pub mod config;
pub mod error;
pub mod logging;
pub mod time_util;
pub mod types;

// Re-export types at crate root for convenience.
pub use types::*;
