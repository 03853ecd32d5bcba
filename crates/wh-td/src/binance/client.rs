//! Binance USDⓈ-M futures REST client.
//!
//! Thin request layer: builds signed queries, sends them, and classifies
//! rejections. Responses are returned as raw JSON; [`super::parse`] turns them
//! into normalized types.
//!
//! # REST endpoints
//!
//! | Operation          | Method | Path                           |
//! |--------------------|--------|--------------------------------|
//! | Exchange info      | GET    | `/fapi/v1/exchangeInfo`        |
//! | Leverage brackets  | GET    | `/fapi/v1/leverageBracket`     |
//! | Positions          | GET    | `/fapi/v2/positionRisk`        |
//! | Balance            | GET    | `/fapi/v2/balance`             |
//! | Book ticker        | GET    | `/fapi/v1/ticker/bookTicker`   |
//! | Place order        | POST   | `/fapi/v1/order`               |
//! | Query order        | GET    | `/fapi/v1/order`               |
//! | Cancel order       | DELETE | `/fapi/v1/order`               |
//! | Cancel all         | DELETE | `/fapi/v1/allOpenOrders`       |
//! | Open orders        | GET    | `/fapi/v1/openOrders`          |
//! | All orders         | GET    | `/fapi/v1/allOrders`           |
//! | Leverage           | POST   | `/fapi/v1/leverage`            |
//! | Margin type        | POST   | `/fapi/v1/marginType`          |
//! | Position mode      | POST   | `/fapi/v1/positionSide/dual`   |

use reqwest::Method;
use serde_json::Value;
use tracing::debug;
use wh_core::time_util::now_ms;

use super::auth;
use super::codes;
use super::config::BinanceConfig;
use crate::error::ExchangeResult;

/// Binance USDⓈ-M account client.
pub struct FuturesClient {
    /// Shared HTTP client.
    http: reqwest::Client,
    api_key: String,
    secret_key: String,
    /// REST base URL (e.g. `https://fapi.binance.com`).
    base_url: String,
    recv_window: u64,
    /// Account name for log lines.
    account: String,
}

impl FuturesClient {
    pub fn new(config: &BinanceConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: config.api_key.clone(),
            secret_key: config.secret_key.clone(),
            base_url: config.rest_url.clone(),
            recv_window: config.recv_window,
            account: config.account.clone(),
        }
    }

    // -----------------------------------------------------------------------
    // Transport
    // -----------------------------------------------------------------------

    /// Unsigned GET.
    async fn public_get(&self, path: &str, params: &[(&str, &str)]) -> ExchangeResult<Value> {
        let url = if params.is_empty() {
            format!("{}{path}", self.base_url)
        } else {
            format!("{}{path}?{}", self.base_url, auth::encode_query(params))
        };
        let resp = self.http.get(&url).send().await?;
        Self::read_body(resp).await
    }

    /// Signed request; `timestamp` and `recvWindow` are appended here.
    async fn signed(&self, method: Method, path: &str, params: &[(&str, &str)]) -> ExchangeResult<Value> {
        let timestamp = now_ms().to_string();
        let recv = self.recv_window.to_string();
        let mut all: Vec<(&str, &str)> = params.to_vec();
        all.push(("recvWindow", &recv));
        all.push(("timestamp", &timestamp));

        let query = auth::build_signed_query(&all, &self.secret_key);
        let url = format!("{}{path}?{query}", self.base_url);
        debug!("[{}] {method} {path}", self.account);

        let resp = self.http.request(method, &url).header("X-MBX-APIKEY", &self.api_key).send().await?;
        Self::read_body(resp).await
    }

    /// Return the JSON body of a 2xx response or the classified rejection.
    async fn read_body(resp: reqwest::Response) -> ExchangeResult<Value> {
        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(codes::classify_body(status.as_u16(), &text));
        }
        serde_json::from_str(&text).map_err(|e| crate::ExchangeError::Unclassified(format!("bad JSON: {e}")))
    }

    // -----------------------------------------------------------------------
    // Market data
    // -----------------------------------------------------------------------

    pub async fn get_exchange_info(&self) -> ExchangeResult<Value> {
        self.public_get("/fapi/v1/exchangeInfo", &[]).await
    }

    pub async fn get_leverage_brackets(&self) -> ExchangeResult<Value> {
        self.signed(Method::GET, "/fapi/v1/leverageBracket", &[]).await
    }

    pub async fn get_book_ticker(&self, symbol: &str) -> ExchangeResult<Value> {
        self.public_get("/fapi/v1/ticker/bookTicker", &[("symbol", symbol)]).await
    }

    // -----------------------------------------------------------------------
    // Account
    // -----------------------------------------------------------------------

    pub async fn get_positions(&self) -> ExchangeResult<Value> {
        self.signed(Method::GET, "/fapi/v2/positionRisk", &[]).await
    }

    pub async fn get_balance(&self) -> ExchangeResult<Value> {
        self.signed(Method::GET, "/fapi/v2/balance", &[]).await
    }

    pub async fn change_leverage(&self, symbol: &str, leverage: u32) -> ExchangeResult<Value> {
        let lev = leverage.to_string();
        self.signed(Method::POST, "/fapi/v1/leverage", &[("symbol", symbol), ("leverage", &lev)]).await
    }

    /// `margin_type` is `ISOLATED` or `CROSSED`.
    pub async fn change_margin_type(&self, symbol: &str, margin_type: &str) -> ExchangeResult<Value> {
        self.signed(Method::POST, "/fapi/v1/marginType", &[("symbol", symbol), ("marginType", margin_type)]).await
    }

    /// Position mode is account-wide on Binance.
    pub async fn change_position_mode(&self, dual_side: bool) -> ExchangeResult<Value> {
        let dual = if dual_side { "true" } else { "false" };
        self.signed(Method::POST, "/fapi/v1/positionSide/dual", &[("dualSidePosition", dual)]).await
    }

    // -----------------------------------------------------------------------
    // Orders
    // -----------------------------------------------------------------------

    /// Place an order. `params` carries everything except the signature fields.
    pub async fn place_order(&self, params: &[(&str, &str)]) -> ExchangeResult<Value> {
        self.signed(Method::POST, "/fapi/v1/order", params).await
    }

    pub async fn query_order(&self, symbol: &str, order_id: &str) -> ExchangeResult<Value> {
        self.signed(Method::GET, "/fapi/v1/order", &[("symbol", symbol), ("orderId", order_id)]).await
    }

    pub async fn cancel_order(
        &self,
        symbol: &str,
        order_id: Option<&str>,
        client_order_id: Option<&str>,
    ) -> ExchangeResult<Value> {
        let mut params: Vec<(&str, &str)> = vec![("symbol", symbol)];
        if let Some(oid) = order_id {
            params.push(("orderId", oid));
        }
        if let Some(cid) = client_order_id {
            params.push(("origClientOrderId", cid));
        }
        self.signed(Method::DELETE, "/fapi/v1/order", &params).await
    }

    pub async fn cancel_all_orders(&self, symbol: &str) -> ExchangeResult<Value> {
        self.signed(Method::DELETE, "/fapi/v1/allOpenOrders", &[("symbol", symbol)]).await
    }

    pub async fn get_open_orders(&self, symbol: &str) -> ExchangeResult<Value> {
        self.signed(Method::GET, "/fapi/v1/openOrders", &[("symbol", symbol)]).await
    }

    /// Most recent orders of a symbol, any status.
    pub async fn get_all_orders(&self, symbol: &str, limit: u32) -> ExchangeResult<Value> {
        let limit = limit.to_string();
        self.signed(Method::GET, "/fapi/v1/allOrders", &[("symbol", symbol), ("limit", &limit)]).await
    }
}
