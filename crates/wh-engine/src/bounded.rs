//! Deadline-bounded exchange calls.
//!
//! [`TimeoutExchange`] wraps any adapter and gives every call the same upper
//! bound. An elapsed deadline surfaces as [`ExchangeError::Timeout`], which is
//! transient: the caller backs off or latches instead of dropping the work.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;
use wh_core::types::*;
use wh_td::{ExchangeApi, ExchangeCaps, ExchangeError, ExchangeResult};

pub struct TimeoutExchange {
    inner: Arc<dyn ExchangeApi>,
    limit: Duration,
}

impl TimeoutExchange {
    pub fn new(inner: Arc<dyn ExchangeApi>, limit: Duration) -> Self {
        Self { inner, limit }
    }

    async fn bounded<T>(&self, op: &str, call: impl Future<Output = ExchangeResult<T>>) -> ExchangeResult<T> {
        match tokio::time::timeout(self.limit, call).await {
            Ok(result) => result,
            Err(_) => {
                warn!("{:?} {op} timed out after {:?}", self.inner.id(), self.limit);
                Err(ExchangeError::Timeout)
            }
        }
    }
}

#[async_trait]
impl ExchangeApi for TimeoutExchange {
    fn id(&self) -> ExchangeId {
        self.inner.id()
    }

    fn caps(&self) -> &ExchangeCaps {
        self.inner.caps()
    }

    async fn load_markets(&self) -> ExchangeResult<Vec<MarketInfo>> {
        self.bounded("load_markets", self.inner.load_markets()).await
    }

    async fn fetch_positions(&self) -> ExchangeResult<Vec<Position>> {
        self.bounded("fetch_positions", self.inner.fetch_positions()).await
    }

    async fn fetch_balance(&self) -> ExchangeResult<Balance> {
        self.bounded("fetch_balance", self.inner.fetch_balance()).await
    }

    async fn fetch_order_book(&self, symbol: &str) -> ExchangeResult<BookTop> {
        self.bounded("fetch_order_book", self.inner.fetch_order_book(symbol)).await
    }

    async fn create_order(&self, request: &OrderRequest) -> ExchangeResult<OrderInfo> {
        self.bounded("create_order", self.inner.create_order(request)).await
    }

    async fn fetch_order(&self, order_id: &str, symbol: &str) -> ExchangeResult<OrderInfo> {
        self.bounded("fetch_order", self.inner.fetch_order(order_id, symbol)).await
    }

    async fn cancel_order(
        &self,
        symbol: &str,
        order_id: Option<&str>,
        client_id: Option<&str>,
    ) -> ExchangeResult<()> {
        self.bounded("cancel_order", self.inner.cancel_order(symbol, order_id, client_id)).await
    }

    async fn cancel_all_orders(&self, symbol: &str) -> ExchangeResult<()> {
        self.bounded("cancel_all_orders", self.inner.cancel_all_orders(symbol)).await
    }

    async fn fetch_open_orders(&self, symbol: &str) -> ExchangeResult<Vec<OrderInfo>> {
        self.bounded("fetch_open_orders", self.inner.fetch_open_orders(symbol)).await
    }

    async fn fetch_closed_orders(&self, symbol: &str) -> ExchangeResult<Vec<OrderInfo>> {
        self.bounded("fetch_closed_orders", self.inner.fetch_closed_orders(symbol)).await
    }

    async fn set_leverage(&self, leverage: u32, symbol: &str) -> ExchangeResult<()> {
        self.bounded("set_leverage", self.inner.set_leverage(leverage, symbol)).await
    }

    async fn set_margin_mode(&self, mode: MarginMode, symbol: &str, leverage: u32) -> ExchangeResult<()> {
        self.bounded("set_margin_mode", self.inner.set_margin_mode(mode, symbol, leverage)).await
    }

    async fn set_position_mode(&self, hedged: bool, symbol: &str) -> ExchangeResult<()> {
        self.bounded("set_position_mode", self.inner.set_position_mode(hedged, symbol)).await
    }
}
