//! Per-account order queue and retry ladder.
//!
//! Orders wait in `queued` until their symbol is free and their delay has
//! passed, then go out one per symbol per tick. Accepted orders that are not
//! terminal yet move to `active` and are polled until they settle. At most one
//! order per symbol is ever active.
//!
//! Submission failures are handled by error class:
//!
//! | Class               | Reaction                                            |
//! |---------------------|-----------------------------------------------------|
//! | insufficient funds  | shrink along the ladder, cancel below the minimum   |
//! | rate limited / busy | push the delay out, quantity unchanged              |
//! | invalid order       | drop with the exchange's reason                     |
//! | anything else       | drop, logging the raw error                         |

use std::collections::VecDeque;

use ahash::{AHashMap, AHashSet};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use wh_core::config::EngineConfig;
use wh_core::types::{MarketInfo, MarketTable, OrderInfo, OrderKind, OrderRequest, Position};
use wh_td::{ErrorClass, ExchangeApi, ExchangeError};

use crate::capability::CapabilitySync;
use crate::convert::{contracts_from_quote, round_down_tick};
use crate::order::{Order, OrderSide, OrderSummary, generate_client_id};

/// Orders below this many contracts shrink one tick at a time when the tick
/// is a whole contract.
const ONE_TICK_LADDER_LIMIT: f64 = 20.0;

/// Shrink factor of the percentage ladder step.
const LADDER_SHRINK: f64 = 0.95;

/// Next step of the insufficient-funds ladder.
#[derive(Debug, Clone, PartialEq)]
pub enum LadderStep {
    Resize(f64),
    Cancel(String),
}

/// Ladder step after the balance-based reprice has been used.
///
/// Every `Resize` is strictly smaller than `quantity`, so repeated rejections
/// end in `Cancel` after a bounded number of steps.
pub fn shrink(quantity: f64, market: &MarketInfo) -> LadderStep {
    let tick = market.amount_step;
    if quantity <= tick + 1e-12 {
        return LadderStep::Cancel(format!("insufficient balance at {quantity} contracts"));
    }
    let next = if quantity < ONE_TICK_LADDER_LIMIT && tick >= 1.0 {
        quantity - tick
    } else {
        round_down_tick(quantity * LADDER_SHRINK, tick)
    };
    if next < market.min_amount {
        return LadderStep::Cancel(format!("insufficient balance, {next} contracts is below the minimum"));
    }
    LadderStep::Resize(next)
}

/// Read-only account state a tick needs.
pub struct QueueEnv<'a> {
    pub account: &'a str,
    pub ex: &'a dyn ExchangeApi,
    pub markets: &'a MarketTable,
    pub positions: &'a AHashMap<String, Position>,
    pub config: &'a EngineConfig,
}

/// What happened during one tick.
#[derive(Debug, Default)]
pub struct TickReport {
    /// Symbols whose orders settled, were dropped or timed out.
    pub settled: Vec<String>,
    /// The queue held orders at the start of the tick and is empty now.
    pub drained: bool,
}

#[derive(Debug, Default)]
pub struct OrderQueue {
    queued: VecDeque<Order>,
    active: Vec<Order>,
}

impl OrderQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, order: Order) {
        self.queued.push_back(order);
    }

    pub fn is_empty(&self) -> bool {
        self.queued.is_empty() && self.active.is_empty()
    }

    pub fn queued_len(&self) -> usize {
        self.queued.len()
    }

    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    /// Some order for `symbol` is queued or in flight.
    pub fn busy(&self, symbol: &str) -> bool {
        self.has_active(symbol) || self.queued.iter().any(|o| o.symbol == symbol)
    }

    fn has_active(&self, symbol: &str) -> bool {
        self.active.iter().any(|o| o.symbol == symbol)
    }

    /// Forget local orders on `symbol`, all of them or only the one carrying
    /// `client_id`. Returns how many were removed.
    pub fn remove(&mut self, symbol: &str, client_id: Option<&str>) -> usize {
        let matches = |o: &Order| o.symbol == symbol && client_id.is_none_or(|id| o.client_id.as_deref() == Some(id));
        let before = self.queued.len() + self.active.len();
        self.queued.retain(|o| !matches(o));
        self.active.retain(|o| !matches(o));
        before - self.queued.len() - self.active.len()
    }

    pub fn summaries(&self) -> (Vec<OrderSummary>, Vec<OrderSummary>) {
        (
            self.queued.iter().map(Order::summary).collect(),
            self.active.iter().map(Order::summary).collect(),
        )
    }

    /// Poll active orders, then submit what is ready.
    pub async fn tick(&mut self, env: &QueueEnv<'_>, sync: &mut CapabilitySync) -> TickReport {
        let had_orders = !self.is_empty();
        let mut report = TickReport::default();
        self.poll_active(env, &mut report).await;
        self.process_queue(env, sync, &mut report).await;
        report.drained = had_orders && self.is_empty();
        report
    }

    // -----------------------------------------------------------------------
    // Active orders
    // -----------------------------------------------------------------------

    async fn poll_active(&mut self, env: &QueueEnv<'_>, report: &mut TickReport) {
        let now = Instant::now();
        let mut still_active = Vec::with_capacity(self.active.len());

        for order in std::mem::take(&mut self.active) {
            if order.timed_out(now, env.config.order_timeout()) {
                warn!("[{}] active order timed out: {order}", env.account);
                report.settled.push(order.symbol);
                continue;
            }
            let Some(id) = order.exchange_id.clone() else {
                error!("[{}] active order without exchange id dropped: {order}", env.account);
                continue;
            };

            if order.kind == OrderKind::Limit {
                if self.limit_resident(env, &order, &id).await {
                    info!("[{}] limit order placed: {order} id {id}", env.account);
                    report.settled.push(order.symbol);
                } else {
                    still_active.push(order);
                }
                continue;
            }

            match env.ex.fetch_order(&id, &order.symbol).await {
                Ok(info) if info.status.is_terminal() => self.settle(env, order, &info, report),
                Ok(info) => {
                    debug!("[{}] {order} is {:?}, remaining {}", env.account, info.status, info.remaining);
                    still_active.push(order);
                }
                Err(ExchangeError::OrderNotFound(_)) => {
                    warn!("[{}] active order vanished from the exchange: {order} id {id}", env.account);
                    report.settled.push(order.symbol);
                }
                Err(e) => {
                    debug!("[{}] failed to poll {order}: {e}", env.account);
                    still_active.push(order);
                }
            }
        }
        self.active = still_active;
    }

    /// A limit order counts as placed once any open or closed order lookup
    /// returns it.
    async fn limit_resident(&self, env: &QueueEnv<'_>, order: &Order, id: &str) -> bool {
        let found = |orders: &[OrderInfo]| orders.iter().any(|o| o.id == id);
        match env.ex.fetch_open_orders(&order.symbol).await {
            Ok(open) if found(&open) => return true,
            Ok(_) => {}
            Err(e) => debug!("[{}] open order lookup failed: {e}", env.account),
        }
        match env.ex.fetch_closed_orders(&order.symbol).await {
            Ok(closed) => found(&closed),
            Err(e) => {
                debug!("[{}] closed order lookup failed: {e}", env.account);
                false
            }
        }
    }

    /// A terminal order: success, or a remainder to re-enqueue.
    fn settle(&mut self, env: &QueueEnv<'_>, order: Order, info: &OrderInfo, report: &mut TickReport) {
        report.settled.push(order.symbol.clone());
        if info.remaining <= 0.0 {
            let price = info.price.map(|p| format!(" at price {p}")).unwrap_or_default();
            info!("[{}] order successful: {order}{price} id {}", env.account, info.id);
            return;
        }

        let min = env.markets.get(&order.symbol).map(|m| m.min_amount).unwrap_or(0.0);
        if info.remaining < min {
            warn!(
                "[{}] {order} ended {:?} with {} left, below the minimum {min}",
                env.account, info.status, info.remaining
            );
            return;
        }
        info!(
            "[{}] {order} ended {:?} after {} contracts, re-queueing {}",
            env.account, info.status, info.filled, info.remaining
        );
        self.queued.push_front(order.remainder(info.remaining, env.config.remainder_delay()));
    }

    // -----------------------------------------------------------------------
    // Submission
    // -----------------------------------------------------------------------

    async fn process_queue(&mut self, env: &QueueEnv<'_>, sync: &mut CapabilitySync, report: &mut TickReport) {
        let now = Instant::now();
        // Symbols that already had a submission this tick or whose earlier
        // order is still waiting. Later orders on them keep their place.
        let mut blocked: AHashSet<String> = AHashSet::new();
        let mut kept = VecDeque::with_capacity(self.queued.len());

        while let Some(mut order) = self.queued.pop_front() {
            if blocked.contains(&order.symbol) || self.has_active(&order.symbol) {
                kept.push_back(order);
                continue;
            }
            if order.timed_out(now, env.config.order_timeout()) {
                warn!("[{}] queued order timed out: {order}", env.account);
                report.settled.push(order.symbol);
                continue;
            }
            if !order.ready(now) {
                blocked.insert(order.symbol.clone());
                kept.push_back(order);
                continue;
            }

            blocked.insert(order.symbol.clone());
            let has_position = env.positions.contains_key(&order.symbol);

            if order.side == OrderSide::ChangeLeverage {
                match sync.synchronize(env.ex, &order.symbol, order.leverage, has_position).await {
                    Ok(()) => {
                        info!("[{}] {} leverage is {}x", env.account, order.symbol, order.leverage);
                        report.settled.push(order.symbol);
                    }
                    Err(e) if e.is_transient() => {
                        order.back_off(now, env.config.rate_limit_backoff());
                        kept.push_back(order);
                    }
                    Err(e) => {
                        warn!("[{}] dropping {order}: {e}", env.account);
                        report.settled.push(order.symbol);
                    }
                }
                continue;
            }

            let Some(market) = env.markets.get(&order.symbol) else {
                error!("[{}] dropping {order}: symbol not in the market table", env.account);
                continue;
            };

            if let Err(e) = sync.synchronize(env.ex, &order.symbol, order.leverage, has_position).await {
                if e.is_transient() {
                    order.back_off(now, env.config.rate_limit_backoff());
                    kept.push_back(order);
                } else {
                    warn!("[{}] dropping {order}: leverage not applied: {e}", env.account);
                    report.settled.push(order.symbol);
                }
                continue;
            }

            if let Some(order) = self.submit(env, order, market, report).await {
                kept.push_back(order);
            }
        }
        self.queued = kept;
    }

    /// Send one order. Returns it when it must stay queued.
    async fn submit(
        &mut self,
        env: &QueueEnv<'_>,
        mut order: Order,
        market: &MarketInfo,
        report: &mut TickReport,
    ) -> Option<Order> {
        let caps = env.ex.caps();
        let Some(direction) = order.side.direction() else {
            return None;
        };
        let client_id = order.client_id.get_or_insert_with(|| generate_client_id(&caps.client_id)).clone();
        let request = OrderRequest {
            symbol: order.symbol.clone(),
            kind: order.kind,
            direction,
            quantity: order.quantity,
            price: order.limit_price,
            client_id: Some(client_id),
            reduce_only: order.reduce_only && caps.supports_reduce_only,
            leverage: Some(order.leverage).filter(|l| caps.leverage_in_order && *l > 0),
        };

        match env.ex.create_order(&request).await {
            Ok(info) => {
                order.exchange_id = Some(info.id.clone());
                if info.status.is_terminal() {
                    self.settle(env, order, &info, report);
                } else {
                    debug!("[{}] activating {order} id {}", env.account, info.id);
                    self.active.push(order);
                }
                None
            }
            Err(e) => self.rejected(env, order, market, e, report).await,
        }
    }

    async fn rejected(
        &mut self,
        env: &QueueEnv<'_>,
        mut order: Order,
        market: &MarketInfo,
        e: ExchangeError,
        report: &mut TickReport,
    ) -> Option<Order> {
        match e.class() {
            ErrorClass::InsufficientFunds => self.ladder(env, order, market, report).await,
            ErrorClass::RateLimited | ErrorClass::Transient => {
                debug!("[{}] {order} deferred: {e}", env.account);
                order.back_off(Instant::now(), env.config.rate_limit_backoff());
                Some(order)
            }
            ErrorClass::InvalidOrder => {
                warn!("[{}] dropping {order}: {e}", env.account);
                report.settled.push(order.symbol);
                None
            }
            ErrorClass::NoChange | ErrorClass::NotFound | ErrorClass::Unclassified => {
                error!("[{}] dropping {order}: unhandled exchange error: {e:?}", env.account);
                report.settled.push(order.symbol);
                None
            }
        }
    }

    /// Shrink an order rejected for insufficient funds.
    ///
    /// The first rejection reprices the order to what the free balance
    /// affords, if that makes it smaller. Later ones walk [`shrink`].
    async fn ladder(
        &mut self,
        env: &QueueEnv<'_>,
        mut order: Order,
        market: &MarketInfo,
        report: &mut TickReport,
    ) -> Option<Order> {
        if !order.reduced_once {
            match self.affordable(env, &order, market).await {
                Ok(affordable) => {
                    order.reduced_once = true;
                    if affordable < market.min_amount {
                        warn!(
                            "[{}] dropping {order}: insufficient balance, {affordable} contracts possible",
                            env.account
                        );
                        report.settled.push(order.symbol);
                        return None;
                    }
                    if affordable < order.quantity {
                        info!("[{}] insufficient balance: reducing {order} to {affordable}", env.account);
                        order.quantity = affordable;
                        return Some(order);
                    }
                }
                Err(e) if e.is_transient() => {
                    order.back_off(Instant::now(), env.config.rate_limit_backoff());
                    return Some(order);
                }
                Err(e) => {
                    debug!("[{}] balance lookup failed during ladder: {e}", env.account);
                    order.reduced_once = true;
                }
            }
        }

        match shrink(order.quantity, market) {
            LadderStep::Resize(quantity) => {
                info!("[{}] insufficient balance: reducing {order} to {quantity}", env.account);
                order.quantity = quantity;
                Some(order)
            }
            LadderStep::Cancel(reason) => {
                warn!("[{}] dropping {order}: {reason}", env.account);
                report.settled.push(order.symbol);
                None
            }
        }
    }

    /// Contracts the current free balance affords for `order`.
    async fn affordable(&self, env: &QueueEnv<'_>, order: &Order, market: &MarketInfo) -> Result<f64, ExchangeError> {
        let direction = order.side.direction().unwrap_or(wh_core::types::Direction::Buy);
        let balance = env.ex.fetch_balance().await?;
        let book = env.ex.fetch_order_book(&order.symbol).await?;
        let price = order.limit_price.unwrap_or_else(|| book.taker_price(direction));
        let available = balance.free * env.config.balance_safety_factor;
        Ok(contracts_from_quote(market, available, price, order.leverage.max(1) as f64).max(0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wh_core::types::{Direction, MarginMode, OrderStatus};
    use wh_td::mock::{Call, FillMode, MockExchange, Op};

    const BTC: &str = "BTC/USDT:USDT";
    const ETH: &str = "ETH/USDT:USDT";

    struct Harness {
        ex: MockExchange,
        markets: MarketTable,
        positions: AHashMap<String, Position>,
        config: EngineConfig,
        sync: CapabilitySync,
        queue: OrderQueue,
    }

    impl Harness {
        fn new(ex: MockExchange) -> Self {
            let markets = MarketTable::new(vec![
                MockExchange::linear_market("BTC", 0.001, 0.001, 125),
                MockExchange::linear_market("ETH", 0.001, 0.001, 100),
                MockExchange::linear_market("XRP", 0.1, 0.1, 75),
            ]);
            Self {
                ex,
                markets,
                positions: AHashMap::new(),
                config: EngineConfig::default(),
                sync: CapabilitySync::new("test", MarginMode::Unknown),
                queue: OrderQueue::new(),
            }
        }

        async fn tick(&mut self) -> TickReport {
            let env = QueueEnv {
                account: "test",
                ex: &self.ex,
                markets: &self.markets,
                positions: &self.positions,
                config: &self.config,
            };
            self.queue.tick(&env, &mut self.sync).await
        }

        fn creates(&self) -> usize {
            self.ex.order_requests().len()
        }
    }

    fn buy(symbol: &str, qty: f64, leverage: u32) -> Order {
        Order::new(symbol, OrderSide::Buy, qty, leverage)
    }

    fn xrp_market() -> MarketInfo {
        MockExchange::linear_market("XRP", 0.1, 0.1, 75)
    }

    fn whole_market() -> MarketInfo {
        MockExchange::linear_market("DOGE", 1.0, 1.0, 50)
    }

    #[test]
    fn ladder_is_strictly_decreasing_and_terminates() {
        for (market, start) in [(whole_market(), 250.0), (xrp_market(), 97.3), (whole_market(), 7.0)] {
            let mut q = start;
            let mut steps = 0;
            loop {
                match shrink(q, &market) {
                    LadderStep::Resize(next) => {
                        assert!(next < q, "{next} !< {q}");
                        q = next;
                    }
                    LadderStep::Cancel(_) => break,
                }
                steps += 1;
                assert!(steps < 200);
            }
        }
    }

    #[test]
    fn ladder_steps() {
        let whole = whole_market();
        assert_eq!(shrink(15.0, &whole), LadderStep::Resize(14.0));
        assert_eq!(shrink(100.0, &whole), LadderStep::Resize(95.0));
        assert!(matches!(shrink(1.0, &whole), LadderStep::Cancel(_)));
        let xrp = xrp_market();
        assert_eq!(shrink(10.0, &xrp), LadderStep::Resize(9.5));
        assert!(matches!(shrink(0.1, &xrp), LadderStep::Cancel(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn market_order_fills_and_drains() {
        let mut h = Harness::new(MockExchange::paper());
        h.queue.push(buy(BTC, 0.01, 5));
        let report = h.tick().await;
        assert_eq!(report.settled, vec![BTC.to_string()]);
        assert!(report.drained);
        assert!(h.queue.is_empty());
        assert_eq!(h.ex.position(BTC).unwrap().contracts, 0.01);
        assert_eq!(h.ex.leverage_of(BTC), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn one_order_in_flight_per_symbol() {
        let mut h = Harness::new(MockExchange::paper());
        h.ex.set_fill_mode(FillMode::Resting);
        h.queue.push(buy(BTC, 0.01, 5));
        h.queue.push(buy(BTC, 0.02, 5));
        h.queue.push(buy(ETH, 0.1, 5));

        h.tick().await;
        assert_eq!(h.creates(), 2);
        assert_eq!(h.queue.active_len(), 2);
        assert_eq!(h.queue.queued_len(), 1);

        // Still resting: nothing new goes out for BTC.
        h.tick().await;
        assert_eq!(h.creates(), 2);

        let first = h.ex.orders().into_iter().find(|o| o.symbol == BTC).unwrap();
        assert!(h.ex.fill_order(&first.id));
        h.ex.set_fill_mode(FillMode::Full);
        let report = h.tick().await;
        assert!(report.settled.contains(&BTC.to_string()));
        assert_eq!(h.creates(), 3);
        assert_eq!(h.ex.position(BTC).unwrap().contracts, 0.03);
    }

    #[tokio::test(start_paused = true)]
    async fn delayed_order_blocks_later_orders_of_its_symbol() {
        let mut h = Harness::new(MockExchange::paper());
        h.queue.push(buy(BTC, 0.01, 5).with_delay(Duration::from_secs(1)));
        h.queue.push(buy(BTC, 0.02, 5));
        h.tick().await;
        assert_eq!(h.creates(), 0);

        tokio::time::advance(Duration::from_millis(1001)).await;
        h.tick().await;
        let sizes: Vec<f64> = h.ex.order_requests().iter().map(|r| r.quantity).collect();
        assert_eq!(sizes, vec![0.01]);
        h.tick().await;
        let sizes: Vec<f64> = h.ex.order_requests().iter().map(|r| r.quantity).collect();
        assert_eq!(sizes, vec![0.01, 0.02]);
    }

    #[tokio::test(start_paused = true)]
    async fn insufficient_funds_reprices_to_balance() {
        let mut h = Harness::new(MockExchange::paper().with_balance(1_000.0).with_margin_check());
        h.queue.push(buy(BTC, 1.0, 5));

        h.tick().await;
        assert_eq!(h.queue.queued_len(), 1);
        // 1000 * 0.985 * 5 / 60001 = 0.08208 -> 0.082
        h.tick().await;
        let requests = h.ex.order_requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].quantity, 0.082);
        assert_eq!(requests[0].client_id, requests[1].client_id);
        assert!(h.queue.is_empty());
        assert_eq!(h.ex.position(BTC).unwrap().contracts, 0.082);
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_insufficient_funds_walk_the_ladder() {
        let mut h = Harness::new(MockExchange::paper());
        for _ in 0..4 {
            h.ex.fail_next(Op::CreateOrder, ExchangeError::InsufficientFunds("-2019".into()));
        }
        // Affordable is far above the order, so the first step goes straight
        // to the percentage ladder.
        h.queue.push(buy("XRP/USDT:USDT", 100.0, 1));
        for _ in 0..5 {
            h.tick().await;
        }
        let sizes: Vec<f64> = h.ex.order_requests().iter().map(|r| r.quantity).collect();
        assert_eq!(sizes, vec![100.0, 95.0, 90.2, 85.6, 81.3]);
        assert!(h.queue.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn insufficient_funds_below_minimum_cancels() {
        let mut h = Harness::new(MockExchange::paper().with_balance(1.0).with_margin_check());
        h.queue.push(buy(BTC, 0.5, 2));
        let report = h.tick().await;
        assert!(h.queue.is_empty());
        assert_eq!(report.settled, vec![BTC.to_string()]);
        assert_eq!(h.creates(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_defers_without_shrinking() {
        let mut h = Harness::new(MockExchange::paper());
        h.ex.fail_next(Op::CreateOrder, ExchangeError::RateLimited("Too Many Requests".into()));
        h.queue.push(buy(BTC, 0.01, 5));

        h.tick().await;
        h.tick().await;
        assert_eq!(h.creates(), 1);

        tokio::time::advance(h.config.rate_limit_backoff()).await;
        h.tick().await;
        let sizes: Vec<f64> = h.ex.order_requests().iter().map(|r| r.quantity).collect();
        assert_eq!(sizes, vec![0.01, 0.01]);
        assert!(h.queue.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_and_unclassified_orders_are_dropped() {
        let mut h = Harness::new(MockExchange::paper());
        h.ex.fail_next(Op::CreateOrder, ExchangeError::InvalidOrder("-4003 quantity".into()));
        h.ex.fail_next(Op::CreateOrder, ExchangeError::Unclassified("-9999 ???".into()));
        h.queue.push(buy(BTC, 0.01, 5));
        h.queue.push(buy(ETH, 0.01, 5));
        let report = h.tick().await;
        assert!(h.queue.is_empty());
        assert_eq!(report.settled.len(), 2);
        assert!(h.ex.position(BTC).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn partial_fill_requeues_remainder() {
        let mut h = Harness::new(MockExchange::paper());
        h.ex.push_fill_mode(FillMode::Partial(0.5));
        h.queue.push(buy(BTC, 0.01, 5));

        h.tick().await;
        assert_eq!(h.queue.queued_len(), 1);
        assert_eq!(h.ex.position(BTC).unwrap().contracts, 0.005);

        h.tick().await;
        assert_eq!(h.creates(), 1);
        tokio::time::advance(h.config.remainder_delay()).await;
        h.tick().await;
        let requests = h.ex.order_requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].quantity, 0.005);
        assert_ne!(requests[0].client_id, requests[1].client_id);
        assert!((h.ex.position(BTC).unwrap().contracts - 0.01).abs() < 1e-12);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_orders_time_out() {
        let mut h = Harness::new(MockExchange::paper());
        h.queue.push(buy(BTC, 0.01, 5));
        tokio::time::advance(h.config.order_timeout() + Duration::from_millis(1)).await;
        let report = h.tick().await;
        assert_eq!(h.creates(), 0);
        assert!(report.drained);

        h.ex.set_fill_mode(FillMode::Resting);
        h.queue.push(buy(BTC, 0.01, 5));
        h.tick().await;
        assert_eq!(h.queue.active_len(), 1);
        tokio::time::advance(h.config.order_timeout() + Duration::from_millis(1)).await;
        h.tick().await;
        assert!(h.queue.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn limit_order_leaves_tracking_once_resident() {
        let mut h = Harness::new(MockExchange::paper());
        h.queue.push(buy(BTC, 0.01, 5).with_limit(50_000.0, "tp1"));
        h.tick().await;
        assert_eq!(h.queue.active_len(), 1);
        let request = &h.ex.order_requests()[0];
        assert_eq!(request.kind, OrderKind::Limit);
        assert_eq!(request.client_id.as_deref(), Some("tp1"));

        let report = h.tick().await;
        assert!(h.queue.is_empty());
        assert!(report.settled.contains(&BTC.to_string()));
        assert_eq!(h.ex.orders()[0].status, OrderStatus::New);
    }

    #[tokio::test(start_paused = true)]
    async fn change_leverage_order_only_syncs() {
        let mut h = Harness::new(MockExchange::paper());
        h.queue.push(Order::change_leverage(BTC, 17));
        h.tick().await;
        assert!(h.queue.is_empty());
        assert_eq!(h.creates(), 0);
        assert_eq!(h.ex.leverage_of(BTC), 17);
    }

    #[tokio::test(start_paused = true)]
    async fn reduce_orders_skip_leverage_and_carry_the_flag() {
        let mut h = Harness::new(MockExchange::paper());
        h.queue.push(buy(BTC, 0.02, 5));
        h.tick().await;
        h.ex.clear_calls();

        h.queue.push(Order::reduce(BTC, Direction::Sell, 0.02));
        h.tick().await;
        let calls = h.ex.calls();
        assert_eq!(calls.len(), 1);
        match &calls[0] {
            Call::CreateOrder(r) => assert!(r.reduce_only),
            other => panic!("unexpected {other:?}"),
        }
        assert!(h.ex.position(BTC).is_none());
    }

    #[test]
    fn remove_by_client_id() {
        let mut q = OrderQueue::new();
        let mut tagged = buy(BTC, 1.0, 1);
        tagged.client_id = Some("tp1".into());
        q.push(tagged);
        q.push(buy(BTC, 2.0, 1));
        q.push(buy(ETH, 2.0, 1));
        assert_eq!(q.remove(BTC, Some("tp1")), 1);
        assert!(q.busy(BTC));
        assert_eq!(q.remove(BTC, None), 1);
        assert!(!q.busy(BTC));
        assert!(q.busy(ETH));
    }
}
