//! # wh-td
//!
//! Exchange connectivity for the whook engine.
//!
//! Each exchange implements the [`ExchangeApi`] trait, a normalized capability
//! interface (positions, balance, book, orders, leverage/margin/position mode).
//! Every adapter classifies rejections into [`ExchangeError`] exactly once, at
//! this boundary, and describes its quirks in an [`ExchangeCaps`] record so the
//! engine never branches on exchange identity.
//!
//! ## Supported exchanges
//!
//! | Exchange        | Module    | Products                | Transport        |
//! |-----------------|-----------|-------------------------|------------------|
//! | Binance USDⓈ-M  | `binance` | USDT-margined perpetual | signed REST      |
//! | Mock            | `mock`    | anything seeded         | in-memory        |

pub mod binance;
pub mod caps;
pub mod error;
#[cfg(any(test, feature = "mock"))]
pub mod mock;

use std::sync::Arc;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use wh_core::config::AccountConfig;
use wh_core::types::*;

pub use caps::{ClientIdRule, ExchangeCaps};
pub use error::{ErrorClass, ExchangeError, ExchangeResult};

/// Trait implemented by all exchange adapters.
///
/// Symbols are always unified (`BTC/USDT:USDT`); adapters map them to their
/// native ids. All operations take `&self` so one adapter can be shared by an
/// account actor and the status endpoint.
#[async_trait]
pub trait ExchangeApi: Send + Sync {
    /// Which exchange this adapter talks to.
    fn id(&self) -> ExchangeId;

    /// Static capability description, selected once per adapter.
    fn caps(&self) -> &ExchangeCaps;

    /// Fetch tradable derivative markets and their sizing rules.
    async fn load_markets(&self) -> ExchangeResult<Vec<MarketInfo>>;

    /// All open positions (zero-size entries are omitted).
    async fn fetch_positions(&self) -> ExchangeResult<Vec<Position>>;

    /// Settle-currency balance.
    async fn fetch_balance(&self) -> ExchangeResult<Balance>;

    /// Best bid and ask.
    async fn fetch_order_book(&self, symbol: &str) -> ExchangeResult<BookTop>;

    /// Submit a new order.
    ///
    /// Returns the order as the exchange acknowledged it, which may already
    /// be terminal for market orders.
    async fn create_order(&self, request: &OrderRequest) -> ExchangeResult<OrderInfo>;

    /// Query one order by exchange id.
    async fn fetch_order(&self, order_id: &str, symbol: &str) -> ExchangeResult<OrderInfo>;

    /// Cancel one order by exchange id or client id.
    async fn cancel_order(&self, symbol: &str, order_id: Option<&str>, client_id: Option<&str>)
    -> ExchangeResult<()>;

    /// Cancel every open order on a symbol.
    async fn cancel_all_orders(&self, symbol: &str) -> ExchangeResult<()>;

    /// Open orders on a symbol.
    async fn fetch_open_orders(&self, symbol: &str) -> ExchangeResult<Vec<OrderInfo>>;

    /// Recently closed (filled, canceled, expired) orders on a symbol.
    async fn fetch_closed_orders(&self, symbol: &str) -> ExchangeResult<Vec<OrderInfo>>;

    /// Set leverage for a symbol.
    async fn set_leverage(&self, leverage: u32, symbol: &str) -> ExchangeResult<()>;

    /// Set margin mode for a symbol. `leverage` is passed for exchanges that
    /// change both atomically ([`ExchangeCaps::margin_mode_with_leverage`]).
    async fn set_margin_mode(&self, mode: MarginMode, symbol: &str, leverage: u32) -> ExchangeResult<()>;

    /// Switch between one-way (`hedged = false`) and hedged position mode.
    async fn set_position_mode(&self, hedged: bool, symbol: &str) -> ExchangeResult<()>;
}

/// Create the adapter an account config asks for.
pub fn create_exchange(account: &AccountConfig) -> Result<Arc<dyn ExchangeApi>> {
    match account.exchange_id()? {
        ExchangeId::BinanceUsdm => {
            let cfg = binance::config::BinanceConfig::from_account(account);
            Ok(Arc::new(binance::BinanceUsdm::new(cfg)))
        }
        #[cfg(feature = "mock")]
        ExchangeId::Mock => Ok(Arc::new(mock::MockExchange::paper())),
        #[cfg(not(feature = "mock"))]
        ExchangeId::Mock => Err(anyhow!("account '{}': mock exchange not compiled in", account.name)),
    }
}

/// Shorthand used by adapters for "the id part" of a unified symbol:
/// `BTC/USDT:USDT` → (`BTC`, `USDT`, `USDT`).
pub fn split_unified(symbol: &str) -> Result<(&str, &str, &str)> {
    let (base, rest) = symbol.split_once('/').ok_or_else(|| anyhow!("not a unified symbol: {symbol}"))?;
    let (quote, settle) = rest.split_once(':').unwrap_or((rest, rest));
    Ok((base, quote, settle))
}
