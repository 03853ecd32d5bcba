//! Typed error definitions for the whook engine.
//!
//! Provides [`WhError`] for domain-specific errors that are more informative
//! than plain `anyhow::Error` strings. All variants implement `std::error::Error`
//! via `thiserror`, so they integrate seamlessly with `anyhow::Result`.
//!
//! Exchange rejections have their own taxonomy in `wh-td`; this enum covers
//! everything that happens before an exchange is ever called.

use thiserror::Error;

/// Domain-specific errors for the whook engine.
#[derive(Debug, Error)]
pub enum WhError {
    /// Configuration parsing or validation error.
    #[error("config error: {0}")]
    Config(String),

    /// The configured exchange has no adapter.
    #[error("unsupported exchange: {0}")]
    UnsupportedExchange(String),

    /// Malformed numeric or enum text.
    #[error("parse error: {0}")]
    Parse(String),
}
