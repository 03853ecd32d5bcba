//! Enumerations used throughout the engine.
//!
//! These are the normalized vocabulary shared by the exchange adapters and the
//! engine. Adapters translate their wire strings into these once, at the
//! boundary.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::WhError;

// ---------------------------------------------------------------------------
// Order direction / kind / status
// ---------------------------------------------------------------------------

/// Buy or sell direction of an exchange order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Buy,
    Sell,
}

impl Direction {
    /// The direction that reduces a position opened with `self`.
    pub fn opposite(self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Buy => "buy",
            Self::Sell => "sell",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Order kind. Only the two kinds alerts can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OrderKind {
    #[default]
    Market,
    Limit,
}

impl fmt::Display for OrderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Market => f.write_str("market"),
            Self::Limit => f.write_str("limit"),
        }
    }
}

/// Order status, unified across all exchanges.
///
/// `Filled` is what ccxt-style APIs call `closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    New,
    PartiallyFilled,
    Filled,
    Canceled,
    Rejected,
    Expired,
}

impl OrderStatus {
    /// The exchange will not touch this order again.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Filled | Self::Canceled | Self::Rejected | Self::Expired)
    }
}

// ---------------------------------------------------------------------------
// Position / margin configuration
// ---------------------------------------------------------------------------

/// Side of an open position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    /// +1 for long, -1 for short.
    pub fn sign(self) -> f64 {
        match self {
            Self::Long => 1.0,
            Self::Short => -1.0,
        }
    }

    /// The order direction that closes this position.
    pub fn closing_direction(self) -> Direction {
        match self {
            Self::Long => Direction::Sell,
            Self::Short => Direction::Buy,
        }
    }
}

impl fmt::Display for PositionSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Long => f.write_str("long"),
            Self::Short => f.write_str("short"),
        }
    }
}

/// Margin mode of a symbol or position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MarginMode {
    Isolated,
    Cross,
    #[default]
    Unknown,
}

impl FromStr for MarginMode {
    type Err = WhError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "isolated" => Ok(Self::Isolated),
            "cross" | "crossed" => Ok(Self::Cross),
            "" | "unknown" => Ok(Self::Unknown),
            other => Err(WhError::Parse(format!("margin mode '{other}'"))),
        }
    }
}

impl fmt::Display for MarginMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Isolated => f.write_str("isolated"),
            Self::Cross => f.write_str("cross"),
            Self::Unknown => f.write_str("unknown"),
        }
    }
}

/// Position mode of a symbol (or of the whole account on some exchanges).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PositionMode {
    OneWay,
    Hedged,
    #[default]
    Unknown,
}

impl fmt::Display for PositionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OneWay => f.write_str("oneway"),
            Self::Hedged => f.write_str("hedged"),
            Self::Unknown => f.write_str("unknown"),
        }
    }
}

// ---------------------------------------------------------------------------
// Exchange identifiers
// ---------------------------------------------------------------------------

/// Exchanges with an adapter in `wh-td`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExchangeId {
    /// Binance USDⓈ-M perpetual futures.
    BinanceUsdm,
    /// In-memory exchange used by tests and dry runs.
    Mock,
}

impl FromStr for ExchangeId {
    type Err = WhError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "binanceusdm" | "binance" | "binancefutures" => Ok(Self::BinanceUsdm),
            "mock" | "paper" => Ok(Self::Mock),
            other => Err(WhError::UnsupportedExchange(other.to_string())),
        }
    }
}

impl fmt::Display for ExchangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BinanceUsdm => f.write_str("binanceusdm"),
            Self::Mock => f.write_str("mock"),
        }
    }
}
