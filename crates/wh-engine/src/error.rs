//! Alert validation errors.
//!
//! These are user-visible: the listener answers them back line by line and
//! they never reach the order queue.

use thiserror::Error;

use crate::alert::Command;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("couldn't find symbol")]
    MissingSymbol,

    #[error("missing command")]
    MissingCommand,

    #[error("{0} must have a positive amount")]
    NonPositiveQuantity(Command),

    #[error("changeleverage needs a leverage token (e.g. 10x)")]
    MissingLeverage,

    #[error("limit is only valid with buy or sell")]
    LimitWithoutTrade,

    #[error("limit price must be positive: '{0}'")]
    BadLimit(String),

    #[error("custom id '{0}' must be 2 to 30 characters")]
    CustomIdLength(String),

    #[error("{0}")]
    CustomIdRejected(String),

    #[error("close percentage must be within (0, 100]: {0}")]
    BadPercentage(f64),
}
