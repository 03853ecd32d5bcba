//! Normalized exchange error taxonomy.
//!
//! Adapters turn every rejection into one [`ExchangeError`] variant. The
//! engine reacts to the coarse [`ErrorClass`] and never inspects raw exchange
//! messages, except to log them.

use thiserror::Error;

/// An exchange rejection, classified at the adapter boundary.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExchangeError {
    /// Not enough free margin or balance for the order.
    #[error("insufficient funds: {0}")]
    InsufficientFunds(String),

    /// Order parameters were rejected (size, price bounds, duplicate id, ...).
    #[error("invalid order: {0}")]
    InvalidOrder(String),

    /// Too many requests; retry later with the same parameters.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Network failure, maintenance or server-side error.
    #[error("exchange not available: {0}")]
    NotAvailable(String),

    /// The call did not complete within the engine's time bound.
    #[error("exchange call timed out")]
    Timeout,

    /// The requested setting is already in effect.
    #[error("no change: {0}")]
    NoChange(String),

    /// The referenced order does not exist.
    #[error("order not found: {0}")]
    OrderNotFound(String),

    /// Anything not recognized yet. Carries the raw text for classification.
    #[error("unclassified: {0}")]
    Unclassified(String),
}

/// Coarse reaction class of an [`ExchangeError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    InsufficientFunds,
    RateLimited,
    InvalidOrder,
    Transient,
    NoChange,
    NotFound,
    Unclassified,
}

impl ExchangeError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::InsufficientFunds(_) => ErrorClass::InsufficientFunds,
            Self::InvalidOrder(_) => ErrorClass::InvalidOrder,
            Self::RateLimited(_) => ErrorClass::RateLimited,
            Self::NotAvailable(_) | Self::Timeout => ErrorClass::Transient,
            Self::NoChange(_) => ErrorClass::NoChange,
            Self::OrderNotFound(_) => ErrorClass::NotFound,
            Self::Unclassified(_) => ErrorClass::Unclassified,
        }
    }

    /// Retrying the same call later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self.class(), ErrorClass::RateLimited | ErrorClass::Transient)
    }

    /// Explicit "already set" acknowledgment.
    pub fn is_no_change(&self) -> bool {
        matches!(self, Self::NoChange(_))
    }
}

impl From<reqwest::Error> for ExchangeError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_connect() || e.is_request() {
            Self::NotAvailable(e.to_string())
        } else {
            Self::Unclassified(e.to_string())
        }
    }
}

/// Result alias for adapter operations.
pub type ExchangeResult<T> = Result<T, ExchangeError>;
