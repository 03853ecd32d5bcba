//! Scriptable in-memory exchange.
//!
//! Used by engine tests and by `mock` accounts for dry runs. It keeps a
//! one-way position book, fills market orders against a configured top of
//! book, rests limit orders, and lets tests queue failures per operation.
//!
//! State lives behind a `std::sync::Mutex` that is never held across an
//! await point.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use wh_core::types::*;

use crate::caps::ExchangeCaps;
use crate::error::{ExchangeError, ExchangeResult};
use crate::ExchangeApi;

/// Leverage a symbol has before anyone sets it.
const DEFAULT_LEVERAGE: u32 = 20;

/// Operation selector for scripted failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    LoadMarkets,
    FetchPositions,
    FetchBalance,
    FetchBook,
    CreateOrder,
    FetchOrder,
    CancelOrder,
    CancelAll,
    FetchOpenOrders,
    FetchClosedOrders,
    SetLeverage,
    SetMarginMode,
    SetPositionMode,
}

/// A state-changing call, recorded in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    CreateOrder(OrderRequest),
    CancelOrder {
        symbol: String,
        order_id: Option<String>,
        client_id: Option<String>,
    },
    CancelAll(String),
    SetLeverage {
        symbol: String,
        leverage: u32,
    },
    SetMarginMode {
        symbol: String,
        mode: MarginMode,
    },
    SetPositionMode {
        hedged: bool,
    },
}

/// How the next market order executes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FillMode {
    /// Fills completely at the taker price.
    Full,
    /// Fills this fraction (snapped down to the step); the rest expires.
    Partial(f64),
    /// Acknowledged but untouched until [`MockExchange::fill_order`].
    Resting,
}

#[derive(Debug)]
struct MockState {
    markets: MarketTable,
    positions: HashMap<String, Position>,
    balance: Balance,
    books: HashMap<String, BookTop>,
    orders: Vec<OrderInfo>,
    /// Order id → direction, for filling resting orders later.
    directions: HashMap<String, Direction>,
    leverage: HashMap<String, u32>,
    margin: HashMap<String, MarginMode>,
    position_mode: PositionMode,
    failures: HashMap<Op, VecDeque<ExchangeError>>,
    fill_default: FillMode,
    fill_next: VecDeque<FillMode>,
    enforce_margin: bool,
    latency: Duration,
    next_id: u64,
    calls: Vec<Call>,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            markets: MarketTable::default(),
            positions: HashMap::new(),
            balance: Balance::default(),
            books: HashMap::new(),
            orders: Vec::new(),
            directions: HashMap::new(),
            leverage: HashMap::new(),
            margin: HashMap::new(),
            position_mode: PositionMode::OneWay,
            failures: HashMap::new(),
            fill_default: FillMode::Full,
            fill_next: VecDeque::new(),
            enforce_margin: false,
            latency: Duration::ZERO,
            next_id: 1,
            calls: Vec::new(),
        }
    }
}

impl MockState {
    fn fail(&mut self, op: Op) -> ExchangeResult<()> {
        match self.failures.get_mut(&op).and_then(VecDeque::pop_front) {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn leverage_of(&self, symbol: &str) -> u32 {
        self.leverage.get(symbol).copied().unwrap_or(DEFAULT_LEVERAGE)
    }

    fn margin_of(&self, symbol: &str) -> MarginMode {
        self.margin.get(symbol).copied().unwrap_or(MarginMode::Cross)
    }

    /// Apply `qty` contracts in `direction` at `price` to the position book.
    fn apply_fill(&mut self, symbol: &str, direction: Direction, qty: f64, price: f64) {
        let contract_size = self.markets.get(symbol).map(|m| m.contract_size).unwrap_or(1.0);
        let leverage = self.leverage_of(symbol);
        let margin_mode = self.margin_of(symbol);
        let delta = match direction {
            Direction::Buy => qty,
            Direction::Sell => -qty,
        };

        let (old_signed, old_entry, old_margin) = match self.positions.get(symbol) {
            Some(p) => (p.signed_contracts(), p.entry_price, p.initial_margin.unwrap_or(0.0)),
            None => (0.0, 0.0, 0.0),
        };
        let new_signed = old_signed + delta;

        // Margin released by the reducing part, taken by the opening part.
        let reduced = if old_signed * delta < 0.0 { qty.min(old_signed.abs()) } else { 0.0 };
        let opened = qty - reduced;
        let released = if old_signed != 0.0 { old_margin * reduced / old_signed.abs() } else { 0.0 };
        let taken = opened * contract_size * price / leverage.max(1) as f64;
        self.balance.free += released - taken;
        self.balance.used += taken - released;

        if new_signed.abs() < 1e-12 {
            self.positions.remove(symbol);
            return;
        }

        let entry_price = if old_signed * new_signed <= 0.0 {
            price
        } else if new_signed.abs() > old_signed.abs() {
            (old_entry * old_signed.abs() + price * opened) / new_signed.abs()
        } else {
            old_entry
        };
        let initial_margin = if old_signed * new_signed <= 0.0 {
            taken
        } else {
            old_margin - released + taken
        };

        self.positions.insert(
            symbol.to_string(),
            Position {
                symbol: symbol.to_string(),
                side: if new_signed > 0.0 {
                    PositionSide::Long
                } else {
                    PositionSide::Short
                },
                contracts: new_signed.abs(),
                entry_price,
                unrealized_pnl: 0.0,
                margin_mode,
                leverage,
                initial_margin: Some(initial_margin),
            },
        );
    }
}

/// In-memory [`ExchangeApi`] implementation.
pub struct MockExchange {
    state: Mutex<MockState>,
    caps: ExchangeCaps,
}

impl Default for MockExchange {
    fn default() -> Self {
        Self::new()
    }
}

impl MockExchange {
    /// Empty exchange: no markets, zero balance.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
            caps: ExchangeCaps::PERMISSIVE,
        }
    }

    /// Paper-trading exchange with a few USDT perpetuals and 10 000 USDT.
    pub fn paper() -> Self {
        Self::new()
            .with_market(Self::linear_market("BTC", 0.001, 0.001, 125))
            .with_market(Self::linear_market("ETH", 0.001, 0.001, 100))
            .with_market(Self::linear_market("XRP", 0.1, 0.1, 75))
            .with_book("BTC/USDT:USDT", 60_000.0, 60_001.0)
            .with_book("ETH/USDT:USDT", 3_000.0, 3_000.5)
            .with_book("XRP/USDT:USDT", 0.5, 0.5001)
            .with_balance(10_000.0)
    }

    /// A `BASE/USDT:USDT` market with contract size 1.
    pub fn linear_market(base: &str, step: f64, min: f64, max_leverage: u32) -> MarketInfo {
        MarketInfo {
            symbol: MarketInfo::unified(base, "USDT", "USDT"),
            id: format!("{base}USDT"),
            base: base.to_string(),
            quote: "USDT".into(),
            settle: "USDT".into(),
            contract_size: 1.0,
            amount_step: step,
            min_amount: min,
            max_leverage: Some(max_leverage),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn state_mut(&mut self) -> &mut MockState {
        self.state.get_mut().unwrap_or_else(|e| e.into_inner())
    }

    // -----------------------------------------------------------------------
    // Construction
    // -----------------------------------------------------------------------

    pub fn with_caps(mut self, caps: ExchangeCaps) -> Self {
        self.caps = caps;
        self
    }

    pub fn with_market(mut self, market: MarketInfo) -> Self {
        self.state_mut().markets.insert(market);
        self
    }

    pub fn with_book(mut self, symbol: &str, bid: f64, ask: f64) -> Self {
        self.state_mut().books.insert(symbol.to_string(), BookTop { bid, ask });
        self
    }

    pub fn with_balance(mut self, free: f64) -> Self {
        self.state_mut().balance = Balance {
            free,
            used: 0.0,
            total: free,
        };
        self
    }

    pub fn with_margin_check(mut self) -> Self {
        self.state_mut().enforce_margin = true;
        self
    }

    // -----------------------------------------------------------------------
    // Scripting
    // -----------------------------------------------------------------------

    /// Queue an error for the next call of `op`.
    pub fn fail_next(&self, op: Op, error: ExchangeError) {
        self.lock().failures.entry(op).or_default().push_back(error);
    }

    pub fn set_fill_mode(&self, mode: FillMode) {
        self.lock().fill_default = mode;
    }

    /// Fill mode for the next market order only.
    pub fn push_fill_mode(&self, mode: FillMode) {
        self.lock().fill_next.push_back(mode);
    }

    pub fn set_latency(&self, latency: Duration) {
        self.lock().latency = latency;
    }

    pub fn set_book(&self, symbol: &str, bid: f64, ask: f64) {
        self.lock().books.insert(symbol.to_string(), BookTop { bid, ask });
    }

    pub fn set_balance(&self, free: f64) {
        let mut st = self.lock();
        st.balance.free = free;
        st.balance.total = free + st.balance.used;
    }

    /// Seed a position directly, bypassing orders.
    pub fn set_position(&self, position: Position) {
        let mut st = self.lock();
        st.leverage.insert(position.symbol.clone(), position.leverage);
        st.margin.insert(position.symbol.clone(), position.margin_mode);
        st.positions.insert(position.symbol.clone(), position);
    }

    pub fn set_margin_mode_of(&self, symbol: &str, mode: MarginMode) {
        self.lock().margin.insert(symbol.to_string(), mode);
    }

    /// Fill a resting order completely at its price, or at the taker price
    /// for market orders.
    pub fn fill_order(&self, order_id: &str) -> bool {
        let mut st = self.lock();
        let Some(idx) = st.orders.iter().position(|o| o.id == order_id && !o.status.is_terminal()) else {
            return false;
        };
        let order = st.orders[idx].clone();
        let Some(direction) = st.directions.get(order_id).copied() else {
            return false;
        };
        let price = order
            .price
            .or_else(|| st.books.get(&order.symbol).map(|b| b.taker_price(direction)))
            .unwrap_or(0.0);
        st.apply_fill(&order.symbol, direction, order.remaining, price);
        let o = &mut st.orders[idx];
        o.filled = o.quantity;
        o.remaining = 0.0;
        o.status = OrderStatus::Filled;
        o.price = Some(price);
        true
    }

    // -----------------------------------------------------------------------
    // Inspection
    // -----------------------------------------------------------------------

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Orders submitted so far, in order.
    pub fn order_requests(&self) -> Vec<OrderRequest> {
        self.lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                Call::CreateOrder(r) => Some(r.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn position(&self, symbol: &str) -> Option<Position> {
        self.lock().positions.get(symbol).cloned()
    }

    pub fn orders(&self) -> Vec<OrderInfo> {
        self.lock().orders.clone()
    }

    pub fn balance(&self) -> Balance {
        self.lock().balance
    }

    pub fn leverage_of(&self, symbol: &str) -> u32 {
        self.lock().leverage_of(symbol)
    }

    pub fn margin_mode_of(&self, symbol: &str) -> MarginMode {
        self.lock().margin_of(symbol)
    }

    async fn simulate_latency(&self) {
        let latency = self.lock().latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl ExchangeApi for MockExchange {
    fn id(&self) -> ExchangeId {
        ExchangeId::Mock
    }

    fn caps(&self) -> &ExchangeCaps {
        &self.caps
    }

    async fn load_markets(&self) -> ExchangeResult<Vec<MarketInfo>> {
        self.simulate_latency().await;
        let mut st = self.lock();
        st.fail(Op::LoadMarkets)?;
        Ok(st.markets.iter().cloned().collect())
    }

    async fn fetch_positions(&self) -> ExchangeResult<Vec<Position>> {
        self.simulate_latency().await;
        let mut st = self.lock();
        st.fail(Op::FetchPositions)?;
        Ok(st.positions.values().cloned().collect())
    }

    async fn fetch_balance(&self) -> ExchangeResult<Balance> {
        self.simulate_latency().await;
        let mut st = self.lock();
        st.fail(Op::FetchBalance)?;
        Ok(st.balance)
    }

    async fn fetch_order_book(&self, symbol: &str) -> ExchangeResult<BookTop> {
        self.simulate_latency().await;
        let mut st = self.lock();
        st.fail(Op::FetchBook)?;
        st.books
            .get(symbol)
            .copied()
            .ok_or_else(|| ExchangeError::InvalidOrder(format!("no book for {symbol}")))
    }

    async fn create_order(&self, request: &OrderRequest) -> ExchangeResult<OrderInfo> {
        self.simulate_latency().await;
        let mut st = self.lock();
        st.calls.push(Call::CreateOrder(request.clone()));
        st.fail(Op::CreateOrder)?;

        let market = st
            .markets
            .get(&request.symbol)
            .cloned()
            .ok_or_else(|| ExchangeError::InvalidOrder(format!("unknown symbol {}", request.symbol)))?;
        if request.quantity < market.min_amount - 1e-12 {
            return Err(ExchangeError::InvalidOrder(format!(
                "quantity {} below minimum {}",
                request.quantity, market.min_amount
            )));
        }
        if let Some(cid) = &request.client_id {
            let dup = st.orders.iter().any(|o| o.client_id.as_ref() == Some(cid) && !o.status.is_terminal());
            if dup {
                return Err(ExchangeError::InvalidOrder(format!("client id {cid} is duplicated")));
            }
        }

        let position = st.positions.get(&request.symbol).map(Position::signed_contracts).unwrap_or(0.0);
        let mut quantity = request.quantity;
        if request.reduce_only {
            let reduces = match request.direction {
                Direction::Buy => position < 0.0,
                Direction::Sell => position > 0.0,
            };
            if !reduces {
                return Err(ExchangeError::InvalidOrder("reduce-only order would not reduce".into()));
            }
            quantity = quantity.min(position.abs());
        }

        let id = st.next_id.to_string();
        st.next_id += 1;
        let client_id = request.client_id.clone().or_else(|| Some(format!("mock-{id}")));

        let mut info = OrderInfo {
            id,
            client_id,
            symbol: request.symbol.clone(),
            status: OrderStatus::New,
            quantity,
            filled: 0.0,
            remaining: quantity,
            price: request.price,
        };

        if request.kind == OrderKind::Market {
            let book = st
                .books
                .get(&request.symbol)
                .copied()
                .ok_or_else(|| ExchangeError::NotAvailable(format!("no book for {}", request.symbol)))?;
            let price = book.taker_price(request.direction);

            if st.enforce_margin {
                let opening = match request.direction {
                    Direction::Buy => (quantity - (-position).max(0.0)).max(0.0),
                    Direction::Sell => (quantity - position.max(0.0)).max(0.0),
                };
                let leverage = st.leverage_of(&request.symbol).max(1) as f64;
                let required = opening * market.contract_size * price / leverage;
                if required > st.balance.free + 1e-9 {
                    return Err(ExchangeError::InsufficientFunds(format!(
                        "margin {required:.4} exceeds free {:.4}",
                        st.balance.free
                    )));
                }
            }

            let mode = st.fill_next.pop_front().unwrap_or(st.fill_default);
            let filled = match mode {
                FillMode::Full => quantity,
                FillMode::Partial(fraction) => {
                    let raw = quantity * fraction.clamp(0.0, 1.0);
                    (raw / market.amount_step + 1e-9).floor() * market.amount_step
                }
                FillMode::Resting => 0.0,
            };
            if filled > 0.0 {
                st.apply_fill(&request.symbol, request.direction, filled, price);
                info.price = Some(price);
            }
            info.filled = filled;
            info.remaining = (quantity - filled).max(0.0);
            info.status = match mode {
                FillMode::Resting => OrderStatus::New,
                _ if info.remaining > 1e-12 => OrderStatus::Expired,
                _ => OrderStatus::Filled,
            };
        }

        st.directions.insert(info.id.clone(), request.direction);
        st.orders.push(info.clone());
        Ok(info)
    }

    async fn fetch_order(&self, order_id: &str, symbol: &str) -> ExchangeResult<OrderInfo> {
        self.simulate_latency().await;
        let mut st = self.lock();
        st.fail(Op::FetchOrder)?;
        st.orders
            .iter()
            .find(|o| o.id == order_id && o.symbol == symbol)
            .cloned()
            .ok_or_else(|| ExchangeError::OrderNotFound(order_id.to_string()))
    }

    async fn cancel_order(
        &self,
        symbol: &str,
        order_id: Option<&str>,
        client_id: Option<&str>,
    ) -> ExchangeResult<()> {
        self.simulate_latency().await;
        let mut st = self.lock();
        st.calls.push(Call::CancelOrder {
            symbol: symbol.to_string(),
            order_id: order_id.map(str::to_string),
            client_id: client_id.map(str::to_string),
        });
        st.fail(Op::CancelOrder)?;

        let order = st.orders.iter_mut().find(|o| {
            o.symbol == symbol
                && !o.status.is_terminal()
                && (order_id.is_some_and(|id| o.id == id) || client_id.is_some_and(|c| o.client_id.as_deref() == Some(c)))
        });
        match order {
            Some(o) => {
                o.status = OrderStatus::Canceled;
                Ok(())
            }
            None => Err(ExchangeError::OrderNotFound(
                order_id.or(client_id).unwrap_or_default().to_string(),
            )),
        }
    }

    async fn cancel_all_orders(&self, symbol: &str) -> ExchangeResult<()> {
        self.simulate_latency().await;
        let mut st = self.lock();
        st.calls.push(Call::CancelAll(symbol.to_string()));
        st.fail(Op::CancelAll)?;
        for o in st.orders.iter_mut().filter(|o| o.symbol == symbol && !o.status.is_terminal()) {
            o.status = OrderStatus::Canceled;
        }
        Ok(())
    }

    async fn fetch_open_orders(&self, symbol: &str) -> ExchangeResult<Vec<OrderInfo>> {
        self.simulate_latency().await;
        let mut st = self.lock();
        st.fail(Op::FetchOpenOrders)?;
        Ok(st.orders.iter().filter(|o| o.symbol == symbol && !o.status.is_terminal()).cloned().collect())
    }

    async fn fetch_closed_orders(&self, symbol: &str) -> ExchangeResult<Vec<OrderInfo>> {
        self.simulate_latency().await;
        let mut st = self.lock();
        st.fail(Op::FetchClosedOrders)?;
        Ok(st.orders.iter().filter(|o| o.symbol == symbol && o.status.is_terminal()).cloned().collect())
    }

    async fn set_leverage(&self, leverage: u32, symbol: &str) -> ExchangeResult<()> {
        self.simulate_latency().await;
        let mut st = self.lock();
        st.calls.push(Call::SetLeverage {
            symbol: symbol.to_string(),
            leverage,
        });
        st.fail(Op::SetLeverage)?;
        let max = st.markets.get(symbol).and_then(|m| m.max_leverage).unwrap_or(u32::MAX);
        if leverage == 0 || leverage > max {
            return Err(ExchangeError::InvalidOrder(format!("leverage {leverage} not valid")));
        }
        st.leverage.insert(symbol.to_string(), leverage);
        if let Some(p) = st.positions.get_mut(symbol) {
            p.leverage = leverage;
        }
        Ok(())
    }

    async fn set_margin_mode(&self, mode: MarginMode, symbol: &str, leverage: u32) -> ExchangeResult<()> {
        self.simulate_latency().await;
        let mut st = self.lock();
        st.calls.push(Call::SetMarginMode {
            symbol: symbol.to_string(),
            mode,
        });
        st.fail(Op::SetMarginMode)?;
        if st.margin_of(symbol) == mode {
            return Err(ExchangeError::NoChange("No need to change margin type.".into()));
        }
        if st.positions.contains_key(symbol) {
            return Err(ExchangeError::Unclassified(
                "Margin type cannot be changed if there exists position.".into(),
            ));
        }
        st.margin.insert(symbol.to_string(), mode);
        if self.caps.margin_mode_with_leverage && leverage > 0 {
            st.leverage.insert(symbol.to_string(), leverage);
        }
        Ok(())
    }

    async fn set_position_mode(&self, hedged: bool, _symbol: &str) -> ExchangeResult<()> {
        self.simulate_latency().await;
        let mut st = self.lock();
        st.calls.push(Call::SetPositionMode { hedged });
        st.fail(Op::SetPositionMode)?;
        let wanted = if hedged {
            PositionMode::Hedged
        } else {
            PositionMode::OneWay
        };
        if st.position_mode == wanted {
            return Err(ExchangeError::NoChange("No need to change position side.".into()));
        }
        st.position_mode = wanted;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BTC: &str = "BTC/USDT:USDT";

    fn market_buy(qty: f64) -> OrderRequest {
        OrderRequest {
            symbol: BTC.into(),
            kind: OrderKind::Market,
            direction: Direction::Buy,
            quantity: qty,
            price: None,
            client_id: None,
            reduce_only: false,
            leverage: None,
        }
    }

    #[tokio::test]
    async fn market_order_opens_and_closes_position() {
        let ex = MockExchange::paper();
        let info = ex.create_order(&market_buy(0.01)).await.unwrap();
        assert_eq!(info.status, OrderStatus::Filled);
        let pos = ex.position(BTC).unwrap();
        assert_eq!(pos.side, PositionSide::Long);
        assert!((pos.contracts - 0.01).abs() < 1e-12);
        assert_eq!(pos.entry_price, 60_001.0);

        let mut close = market_buy(0.01);
        close.direction = Direction::Sell;
        close.reduce_only = true;
        ex.create_order(&close).await.unwrap();
        assert!(ex.position(BTC).is_none());
        assert!((ex.balance().free - 10_000.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn partial_fill_expires_remainder() {
        let ex = MockExchange::paper();
        ex.push_fill_mode(FillMode::Partial(0.5));
        let info = ex.create_order(&market_buy(0.011)).await.unwrap();
        assert_eq!(info.status, OrderStatus::Expired);
        assert!((info.filled - 0.005).abs() < 1e-12);
        assert!((info.remaining - 0.006).abs() < 1e-12);
    }

    #[tokio::test]
    async fn scripted_failures_are_consumed_once() {
        let ex = MockExchange::paper();
        ex.fail_next(Op::CreateOrder, ExchangeError::RateLimited("429".into()));
        assert!(ex.create_order(&market_buy(0.01)).await.unwrap_err().is_transient());
        assert!(ex.create_order(&market_buy(0.01)).await.is_ok());
        assert_eq!(ex.order_requests().len(), 2);
    }

    #[tokio::test]
    async fn margin_check_rejects_oversized_orders() {
        let ex = MockExchange::paper().with_margin_check();
        // 1 BTC at 60k with 20x needs ~3000 USDT; 10 BTC does not fit.
        let err = ex.create_order(&market_buy(10.0)).await.unwrap_err();
        assert!(matches!(err, ExchangeError::InsufficientFunds(_)));
        assert!(ex.create_order(&market_buy(1.0)).await.is_ok());
    }

    #[tokio::test]
    async fn reduce_only_needs_opposite_position() {
        let ex = MockExchange::paper();
        let mut req = market_buy(0.01);
        req.reduce_only = true;
        assert!(matches!(ex.create_order(&req).await, Err(ExchangeError::InvalidOrder(_))));
    }

    #[tokio::test]
    async fn limit_orders_rest_until_filled_or_canceled() {
        let ex = MockExchange::paper();
        let mut req = market_buy(0.01);
        req.kind = OrderKind::Limit;
        req.price = Some(59_000.0);
        req.client_id = Some("tp1".into());
        let info = ex.create_order(&req).await.unwrap();
        assert_eq!(info.status, OrderStatus::New);
        assert_eq!(ex.fetch_open_orders(BTC).await.unwrap().len(), 1);

        // Same client id while the first is open.
        assert!(ex.create_order(&req).await.is_err());

        ex.cancel_order(BTC, None, Some("tp1")).await.unwrap();
        assert!(ex.fetch_open_orders(BTC).await.unwrap().is_empty());
        assert_eq!(ex.fetch_closed_orders(BTC).await.unwrap().len(), 1);
        assert!(matches!(
            ex.cancel_order(BTC, None, Some("tp1")).await,
            Err(ExchangeError::OrderNotFound(_))
        ));
    }

    #[tokio::test]
    async fn settings_report_no_change() {
        let ex = MockExchange::paper();
        assert!(ex.set_position_mode(false, BTC).await.unwrap_err().is_no_change());
        ex.set_margin_mode(MarginMode::Isolated, BTC, 5).await.unwrap();
        assert!(ex.set_margin_mode(MarginMode::Isolated, BTC, 5).await.unwrap_err().is_no_change());
        ex.set_leverage(5, BTC).await.unwrap();
        assert_eq!(ex.leverage_of(BTC), 5);
        assert!(ex.set_leverage(500, BTC).await.is_err());
    }
}
