//! Binance USDⓈ-M futures adapter.
//!
//! Implements [`ExchangeApi`](crate::ExchangeApi) over signed REST.
//!
//! # Architecture
//!
//! ```text
//! BinanceUsdm
//! ├── FuturesClient   (signed REST, error classification)
//! └── MarketTable     (unified symbol ↔ BTCUSDT, sizing rules)
//! ```
//!
//! All methods take `&self`; the market table sits behind a
//! [`tokio::sync::RwLock`] and is replaced wholesale by `load_markets`.

pub mod auth;
pub mod client;
pub mod codes;
pub mod config;
pub mod parse;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{info, warn};
use wh_core::types::*;

use self::client::FuturesClient;
use self::config::BinanceConfig;
use crate::caps::ExchangeCaps;
use crate::error::{ExchangeError, ExchangeResult};
use crate::{ExchangeApi, split_unified};

/// Orders fetched when looking for recently closed ones.
const CLOSED_ORDER_LOOKBACK: u32 = 50;

/// Binance USDⓈ-M adapter for one account.
pub struct BinanceUsdm {
    client: FuturesClient,
    markets: RwLock<MarketTable>,
    account: String,
}

impl BinanceUsdm {
    pub fn new(config: BinanceConfig) -> Self {
        Self {
            client: FuturesClient::new(&config),
            markets: RwLock::new(MarketTable::default()),
            account: config.account,
        }
    }

    /// Exchange id and quantity step for a unified symbol.
    async fn native(&self, symbol: &str) -> ExchangeResult<(String, Option<f64>)> {
        if let Some(m) = self.markets.read().await.get(symbol) {
            return Ok((m.id.clone(), Some(m.amount_step)));
        }
        let (base, quote, _) =
            split_unified(symbol).map_err(|e| ExchangeError::InvalidOrder(e.to_string()))?;
        Ok((format!("{base}{quote}"), None))
    }

    async fn native_id(&self, symbol: &str) -> ExchangeResult<String> {
        Ok(self.native(symbol).await?.0)
    }

    /// Unified symbol for an exchange id; falls back to the id itself.
    async fn unified(&self, id: &str) -> String {
        self.markets.read().await.resolve(id).map(|m| m.symbol.clone()).unwrap_or_else(|| id.to_string())
    }

    fn parse_orders(v: &serde_json::Value, symbol: &str) -> ExchangeResult<Vec<OrderInfo>> {
        v.as_array()
            .ok_or_else(|| ExchangeError::Unclassified("expected order list".into()))?
            .iter()
            .map(|o| parse::parse_order(o, symbol))
            .collect()
    }
}

#[async_trait]
impl ExchangeApi for BinanceUsdm {
    fn id(&self) -> ExchangeId {
        ExchangeId::BinanceUsdm
    }

    fn caps(&self) -> &ExchangeCaps {
        &ExchangeCaps::BINANCE_USDM
    }

    async fn load_markets(&self) -> ExchangeResult<Vec<MarketInfo>> {
        let info = self.client.get_exchange_info().await?;
        let brackets = match self.client.get_leverage_brackets().await {
            Ok(v) => parse::parse_leverage_brackets(&v),
            Err(e) => {
                warn!("[{}] leverage brackets unavailable: {e}", self.account);
                Default::default()
            }
        };

        let markets: Vec<MarketInfo> = info
            .get("symbols")
            .and_then(|s| s.as_array())
            .into_iter()
            .flatten()
            .filter_map(|s| {
                let id = s.get("symbol").and_then(|v| v.as_str()).unwrap_or("");
                parse::parse_market(s, brackets.get(id).copied())
            })
            .collect();

        info!("[{}] loaded {} perpetual markets", self.account, markets.len());
        *self.markets.write().await = MarketTable::new(markets.clone());
        Ok(markets)
    }

    async fn fetch_positions(&self) -> ExchangeResult<Vec<Position>> {
        let v = self.client.get_positions().await?;
        let mut out = Vec::new();
        for entry in v.as_array().into_iter().flatten() {
            let id = entry.get("symbol").and_then(|s| s.as_str()).unwrap_or("");
            let symbol = self.unified(id).await;
            if let Some(p) = parse::parse_position(entry, &symbol) {
                out.push(p);
            }
        }
        Ok(out)
    }

    async fn fetch_balance(&self) -> ExchangeResult<Balance> {
        let v = self.client.get_balance().await?;
        parse::parse_balance(&v, self.caps().settle)
    }

    async fn fetch_order_book(&self, symbol: &str) -> ExchangeResult<BookTop> {
        let id = self.native_id(symbol).await?;
        let v = self.client.get_book_ticker(&id).await?;
        parse::parse_book(&v)
    }

    async fn create_order(&self, request: &OrderRequest) -> ExchangeResult<OrderInfo> {
        let (id, step) = self.native(&request.symbol).await?;
        let quantity = match step {
            Some(step) => parse::format_quantity(request.quantity, step),
            None => request.quantity.to_string(),
        };
        let side = match request.direction {
            Direction::Buy => "BUY",
            Direction::Sell => "SELL",
        };
        let price = request.price.map(|p| p.to_string());

        let mut params: Vec<(&str, &str)> =
            vec![("symbol", id.as_str()), ("side", side), ("quantity", quantity.as_str())];
        match request.kind {
            OrderKind::Market => params.push(("type", "MARKET")),
            OrderKind::Limit => {
                let price = price
                    .as_deref()
                    .ok_or_else(|| ExchangeError::InvalidOrder("limit order without price".into()))?;
                params.extend([("type", "LIMIT"), ("price", price), ("timeInForce", "GTC")]);
            }
        }
        if request.reduce_only {
            params.push(("reduceOnly", "true"));
        }
        if let Some(cid) = request.client_id.as_deref() {
            params.push(("newClientOrderId", cid));
        }
        params.push(("newOrderRespType", "RESULT"));

        let v = self.client.place_order(&params).await?;
        parse::parse_order(&v, &request.symbol)
    }

    async fn fetch_order(&self, order_id: &str, symbol: &str) -> ExchangeResult<OrderInfo> {
        let id = self.native_id(symbol).await?;
        let v = self.client.query_order(&id, order_id).await?;
        parse::parse_order(&v, symbol)
    }

    async fn cancel_order(
        &self,
        symbol: &str,
        order_id: Option<&str>,
        client_id: Option<&str>,
    ) -> ExchangeResult<()> {
        if order_id.is_none() && client_id.is_none() {
            return Err(ExchangeError::InvalidOrder("cancel needs an order id or client id".into()));
        }
        let id = self.native_id(symbol).await?;
        self.client.cancel_order(&id, order_id, client_id).await?;
        Ok(())
    }

    async fn cancel_all_orders(&self, symbol: &str) -> ExchangeResult<()> {
        let id = self.native_id(symbol).await?;
        self.client.cancel_all_orders(&id).await?;
        Ok(())
    }

    async fn fetch_open_orders(&self, symbol: &str) -> ExchangeResult<Vec<OrderInfo>> {
        let id = self.native_id(symbol).await?;
        let v = self.client.get_open_orders(&id).await?;
        Self::parse_orders(&v, symbol)
    }

    async fn fetch_closed_orders(&self, symbol: &str) -> ExchangeResult<Vec<OrderInfo>> {
        let id = self.native_id(symbol).await?;
        let v = self.client.get_all_orders(&id, CLOSED_ORDER_LOOKBACK).await?;
        let mut orders = Self::parse_orders(&v, symbol)?;
        orders.retain(|o| o.status.is_terminal());
        Ok(orders)
    }

    async fn set_leverage(&self, leverage: u32, symbol: &str) -> ExchangeResult<()> {
        let id = self.native_id(symbol).await?;
        self.client.change_leverage(&id, leverage).await?;
        Ok(())
    }

    async fn set_margin_mode(&self, mode: MarginMode, symbol: &str, _leverage: u32) -> ExchangeResult<()> {
        let margin_type = match mode {
            MarginMode::Isolated => "ISOLATED",
            MarginMode::Cross => "CROSSED",
            MarginMode::Unknown => return Err(ExchangeError::InvalidOrder("unknown margin mode".into())),
        };
        let id = self.native_id(symbol).await?;
        self.client.change_margin_type(&id, margin_type).await?;
        Ok(())
    }

    async fn set_position_mode(&self, hedged: bool, _symbol: &str) -> ExchangeResult<()> {
        self.client.change_position_mode(hedged).await?;
        Ok(())
    }
}
