//! Leverage, margin mode and position mode synchronization.
//!
//! Exchanges do not reliably report these settings back, so the account keeps
//! an optimistic per-symbol cache. A setting is cached after the exchange
//! accepts it or answers with an explicit "no change"; any other rejection
//! resets the cached value to unknown so the next order tries again.

use ahash::AHashMap;
use serde::Serialize;
use tracing::{debug, info, warn};
use wh_core::types::{MarginMode, Position, PositionMode};
use wh_td::{ExchangeApi, ExchangeError};

/// Cached settings of one symbol. `leverage == 0` means unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SymbolCaps {
    pub leverage: u32,
    pub margin_mode: MarginMode,
    pub position_mode: PositionMode,
}

/// Per-account synchronizer and its cache.
#[derive(Debug)]
pub struct CapabilitySync {
    account: String,
    /// Margin mode every new position should use; `Unknown` leaves it alone.
    margin_mode: MarginMode,
    cache: AHashMap<String, SymbolCaps>,
}

impl CapabilitySync {
    pub fn new(account: impl Into<String>, margin_mode: MarginMode) -> Self {
        Self {
            account: account.into(),
            margin_mode,
            cache: AHashMap::new(),
        }
    }

    pub fn margin_mode(&self) -> MarginMode {
        self.margin_mode
    }

    pub fn get(&self, symbol: &str) -> SymbolCaps {
        self.cache.get(symbol).copied().unwrap_or_default()
    }

    /// Cached leverage, if known.
    pub fn leverage_of(&self, symbol: &str) -> Option<u32> {
        Some(self.get(symbol).leverage).filter(|l| *l > 0)
    }

    /// Seed the cache from freshly fetched positions.
    ///
    /// Positions are exchange truth: their leverage and margin mode overwrite
    /// whatever was cached.
    pub fn observe_positions(&mut self, positions: &[Position]) {
        for p in positions {
            let entry = self.cache.entry(p.symbol.clone()).or_default();
            if p.leverage > 0 {
                entry.leverage = p.leverage;
            }
            if p.margin_mode != MarginMode::Unknown {
                entry.margin_mode = p.margin_mode;
            }
        }
    }

    /// Bring the exchange settings of `symbol` in line with an order that
    /// wants `leverage`.
    ///
    /// Position and margin mode failures are logged and do not block the
    /// order. A leverage failure is returned: an order sized for one leverage
    /// must not go out at another.
    pub async fn synchronize(
        &mut self,
        ex: &dyn ExchangeApi,
        symbol: &str,
        leverage: u32,
        has_position: bool,
    ) -> Result<(), ExchangeError> {
        if leverage == 0 {
            return Ok(());
        }
        let caps = ex.caps();
        let mut state = self.get(symbol);

        if caps.supports_position_mode && state.position_mode != PositionMode::OneWay && !has_position {
            state.position_mode = match ex.set_position_mode(false, symbol).await {
                Ok(()) => {
                    info!("[{}] {symbol} position mode set to one-way", self.account);
                    PositionMode::OneWay
                }
                Err(e) if e.is_no_change() => PositionMode::OneWay,
                Err(e) => {
                    warn!("[{}] {symbol} failed to set position mode: {e}", self.account);
                    PositionMode::Unknown
                }
            };
        }

        let wanted = self.margin_mode;
        if caps.supports_margin_mode && wanted != MarginMode::Unknown && state.margin_mode != wanted {
            match ex.set_margin_mode(wanted, symbol, leverage).await {
                Ok(()) => {
                    info!("[{}] {symbol} margin mode set to {wanted}", self.account);
                    state.margin_mode = wanted;
                    if caps.margin_mode_with_leverage {
                        state.leverage = leverage;
                    }
                }
                Err(e) if e.is_no_change() => state.margin_mode = wanted,
                Err(e) => {
                    warn!("[{}] {symbol} failed to set margin mode {wanted}: {e}", self.account);
                    state.margin_mode = MarginMode::Unknown;
                }
            }
        }

        let mut result = Ok(());
        if caps.leverage_in_order {
            debug!("[{}] {symbol} leverage {leverage}x travels with the order", self.account);
        } else if state.leverage != leverage {
            match ex.set_leverage(leverage, symbol).await {
                Ok(()) => {
                    info!("[{}] {symbol} leverage set to {leverage}x", self.account);
                    state.leverage = leverage;
                }
                Err(e) if e.is_no_change() => state.leverage = leverage,
                Err(e) => {
                    warn!("[{}] {symbol} failed to set leverage {leverage}x: {e}", self.account);
                    state.leverage = 0;
                    result = Err(e);
                }
            }
        }

        self.cache.insert(symbol.to_string(), state);
        result
    }
}
