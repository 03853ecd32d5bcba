//! Market metadata and flexible symbol resolution.
//!
//! Alerts name symbols however the charting tool prints them (`BTCUSDT`,
//! `BTCUSDT.P`, `BINANCE:BTCUSDT.P`, `BTC/USDT`), while the engine works with
//! unified `BASE/QUOTE:SETTLE` symbols. [`MarketTable`] holds the markets an
//! account loaded from its exchange and maps any of those spellings to the
//! unified form.

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

/// Trading rules for one derivative market.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketInfo {
    /// Unified symbol (e.g. `"BTC/USDT:USDT"`).
    pub symbol: String,
    /// Exchange-native id (e.g. `"BTCUSDT"`).
    pub id: String,
    pub base: String,
    pub quote: String,
    pub settle: String,
    /// Underlying units per contract.
    pub contract_size: f64,
    /// Quantity tick: every order size is a multiple of this.
    pub amount_step: f64,
    /// Smallest order size accepted.
    pub min_amount: f64,
    /// Highest leverage allowed, when known.
    pub max_leverage: Option<u32>,
}

impl MarketInfo {
    /// Build the unified symbol for a linear contract.
    pub fn unified(base: &str, quote: &str, settle: &str) -> String {
        format!("{base}/{quote}:{settle}")
    }
}

/// Suffixes that charting tools append to perpetual tickers.
const PERP_SUFFIXES: &[&str] = &["-PERP", "_PERP", ".P", "PERP"];

/// Markets of one account with O(1) lookups by unified symbol or exchange id.
#[derive(Debug, Clone, Default)]
pub struct MarketTable {
    /// Unified symbol → market.
    by_symbol: AHashMap<String, MarketInfo>,
    /// Upper-case exchange id → unified symbol.
    id_to_symbol: AHashMap<String, String>,
    /// Distinct settle currencies, longest first, for suffix rewriting.
    settles: Vec<String>,
}

impl MarketTable {
    pub fn new(markets: Vec<MarketInfo>) -> Self {
        let mut table = Self::default();
        for m in markets {
            table.insert(m);
        }
        table
    }

    /// Add or replace a market.
    pub fn insert(&mut self, market: MarketInfo) {
        if !self.settles.contains(&market.settle) {
            self.settles.push(market.settle.clone());
            self.settles.sort_by_key(|s| std::cmp::Reverse(s.len()));
        }
        self.id_to_symbol.insert(market.id.to_ascii_uppercase(), market.symbol.clone());
        self.by_symbol.insert(market.symbol.clone(), market);
    }

    /// Market for an already-unified symbol.
    pub fn get(&self, symbol: &str) -> Option<&MarketInfo> {
        self.by_symbol.get(symbol)
    }

    /// Resolve any accepted spelling of a symbol to its market.
    ///
    /// Tries, in order: the exchange id as written, the unified symbol after
    /// rewriting (`BTCUSDT` → `BTC/USDT:USDT`, `BTC/USDT` → `BTC/USDT:USDT`),
    /// and finally the exchange id after stripping perpetual suffixes.
    pub fn resolve(&self, token: &str) -> Option<&MarketInfo> {
        let upper = token.trim().to_ascii_uppercase();
        if upper.is_empty() {
            return None;
        }

        if let Some(sym) = self.id_to_symbol.get(&upper) {
            return self.by_symbol.get(sym);
        }
        if let Some(m) = self.by_symbol.get(&upper) {
            return Some(m);
        }

        let stripped = strip_venue_prefix(&upper);
        let stripped = strip_perp_suffix(stripped);

        if let Some(sym) = self.id_to_symbol.get(stripped) {
            return self.by_symbol.get(sym);
        }
        self.rewrite(stripped).and_then(|sym| self.by_symbol.get(&sym))
    }

    /// Rewrite a bare or half-unified ticker into unified form.
    fn rewrite(&self, ticker: &str) -> Option<String> {
        if let Some((base, rest)) = ticker.split_once('/') {
            if rest.contains(':') {
                return Some(ticker.to_string());
            }
            // BTC/USDT → BTC/USDT:USDT (linear contracts settle in the quote)
            return Some(MarketInfo::unified(base, rest, rest));
        }

        self.settles.iter().find_map(|settle| {
            let base = ticker.strip_suffix(settle.as_str())?;
            if base.is_empty() {
                return None;
            }
            Some(MarketInfo::unified(base, settle, settle))
        })
    }

    pub fn len(&self) -> usize {
        self.by_symbol.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_symbol.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MarketInfo> {
        self.by_symbol.values()
    }
}

/// `BINANCE:BTCUSDT.P` → `BTCUSDT.P`. Unified symbols keep their settle part.
fn strip_venue_prefix(token: &str) -> &str {
    match token.split_once(':') {
        Some((venue, rest)) if !venue.contains('/') && !rest.is_empty() => rest,
        _ => token,
    }
}

fn strip_perp_suffix(token: &str) -> &str {
    PERP_SUFFIXES
        .iter()
        .find_map(|suffix| token.strip_suffix(suffix))
        .filter(|rest| !rest.is_empty())
        .unwrap_or(token)
}
