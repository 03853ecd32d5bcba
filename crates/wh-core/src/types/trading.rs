//! Trading-related data structures: positions, balances, books and orders.
//!
//! These are the normalized shapes returned by every exchange adapter and
//! consumed by the engine. Adapters own the translation from the wire.

use serde::{Deserialize, Serialize};

use super::enums::{Direction, MarginMode, OrderKind, OrderStatus, PositionSide};

// ---------------------------------------------------------------------------
// Position
// ---------------------------------------------------------------------------

/// A position snapshot from the exchange.
///
/// Read-only mirror: the engine replaces the whole list on refresh and never
/// edits an entry in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Unified symbol (e.g. `"BTC/USDT:USDT"`).
    pub symbol: String,
    /// Long or short.
    pub side: PositionSide,
    /// Absolute size in contracts.
    pub contracts: f64,
    /// Average entry price.
    pub entry_price: f64,
    /// Unrealized PnL in settle currency.
    pub unrealized_pnl: f64,
    /// Margin mode the position was opened with.
    pub margin_mode: MarginMode,
    /// Leverage the position carries (0 when the exchange does not report it).
    pub leverage: u32,
    /// Initial margin, when reported.
    pub initial_margin: Option<f64>,
}

impl Position {
    /// Contracts with sign: positive for long, negative for short.
    pub fn signed_contracts(&self) -> f64 {
        self.contracts * self.side.sign()
    }
}

// ---------------------------------------------------------------------------
// Balance / book
// ---------------------------------------------------------------------------

/// Settle-currency balance.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Balance {
    pub free: f64,
    pub used: f64,
    pub total: f64,
}

/// Top of the order book.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BookTop {
    pub bid: f64,
    pub ask: f64,
}

impl BookTop {
    pub fn mid(&self) -> f64 {
        (self.bid + self.ask) * 0.5
    }

    /// The price a market order in `direction` would take.
    pub fn taker_price(&self, direction: Direction) -> f64 {
        match direction {
            Direction::Buy => self.ask,
            Direction::Sell => self.bid,
        }
    }
}

// ---------------------------------------------------------------------------
// Order request (engine → adapter)
// ---------------------------------------------------------------------------

/// An order request sent from the engine to an exchange adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    /// Unified symbol.
    pub symbol: String,
    /// Market or limit.
    pub kind: OrderKind,
    /// Buy or sell.
    pub direction: Direction,
    /// Quantity in contracts.
    pub quantity: f64,
    /// Limit price (`None` for market orders).
    pub price: Option<f64>,
    /// Client-assigned order id.
    pub client_id: Option<String>,
    /// Only reduce an existing position.
    pub reduce_only: bool,
    /// Leverage carried on the order itself, for exchanges that take it there.
    pub leverage: Option<u32>,
}

// ---------------------------------------------------------------------------
// Order info (adapter → engine)
// ---------------------------------------------------------------------------

/// An order as reported by the exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderInfo {
    /// Exchange-assigned order id.
    pub id: String,
    /// Client-assigned order id, if any.
    pub client_id: Option<String>,
    /// Unified symbol.
    pub symbol: String,
    /// Current status.
    pub status: OrderStatus,
    /// Original quantity.
    pub quantity: f64,
    /// Cumulative filled quantity.
    pub filled: f64,
    /// Quantity still open or never executed.
    pub remaining: f64,
    /// Average fill price (or order price when nothing filled).
    pub price: Option<f64>,
}
