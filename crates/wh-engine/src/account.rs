//! One exchange account: its order queue, latched alerts, capability cache
//! and position mirror.
//!
//! An [`Account`] is owned by exactly one task (see [`crate::actor`]), which
//! serializes alert handling, queue ticks and position refreshes.

use std::fmt;
use std::sync::Arc;

use ahash::AHashMap;
use anyhow::{Context, Result};
use serde::Serialize;
use tokio::time::Instant;
use tracing::{error, info, warn};
use wh_core::config::EngineConfig;
use wh_core::types::{ExchangeId, MarginMode, MarketTable, Position};
use wh_td::{ExchangeApi, ExchangeError};

use crate::alert::{Alert, Command};
use crate::capability::CapabilitySync;
use crate::latch::{AlertLatch, LatchReason};
use crate::order::OrderSummary;
use crate::parser::{ParseContext, parse_alert};
use crate::queue::{OrderQueue, QueueEnv};
use crate::reconcile::{self, Plan, Snapshot};

/// What became of one alert line.
#[derive(Debug, Clone, PartialEq)]
pub enum AlertOutcome {
    /// This many orders were queued.
    Queued(usize),
    /// Handled without queueing anything.
    Done(String),
    /// Deferred; it will be replayed.
    Latched(LatchReason),
    /// Not executable.
    Rejected(String),
}

impl fmt::Display for AlertOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Queued(1) => f.write_str("queued 1 order"),
            Self::Queued(n) => write!(f, "queued {n} orders"),
            Self::Done(msg) => f.write_str(msg),
            Self::Latched(reason) => write!(f, "latched ({reason})"),
            Self::Rejected(msg) => write!(f, "rejected: {msg}"),
        }
    }
}

/// Status snapshot served by the listener.
#[derive(Debug, Clone, Serialize)]
pub struct AccountStatus {
    pub name: String,
    pub exchange: ExchangeId,
    pub queued: Vec<OrderSummary>,
    pub active: Vec<OrderSummary>,
    pub latched: Vec<String>,
    pub positions: Vec<Position>,
}

pub struct Account {
    name: String,
    ex: Arc<dyn ExchangeApi>,
    markets: MarketTable,
    config: EngineConfig,
    queue: OrderQueue,
    latch: AlertLatch,
    sync: CapabilitySync,
    positions: AHashMap<String, Position>,
    /// Set while the mirror may predate a fill: a refresh failed after orders settled.
    positions_stale: bool,
}

impl Account {
    pub fn new(
        name: impl Into<String>,
        ex: Arc<dyn ExchangeApi>,
        markets: MarketTable,
        margin_mode: MarginMode,
        config: EngineConfig,
    ) -> Self {
        let name = name.into();
        Self {
            latch: AlertLatch::new(config.latch_retry(), config.alert_timeout()),
            sync: CapabilitySync::new(name.clone(), margin_mode),
            name,
            ex,
            markets,
            config,
            queue: OrderQueue::new(),
            positions: AHashMap::new(),
            positions_stale: false,
        }
    }

    /// Load markets and the first position snapshot.
    pub async fn connect(
        name: &str,
        ex: Arc<dyn ExchangeApi>,
        margin_mode: MarginMode,
        config: EngineConfig,
    ) -> Result<Self> {
        let markets = ex
            .load_markets()
            .await
            .with_context(|| format!("[{name}] failed to load markets"))?;
        info!("[{name}] {} markets loaded from {:?}", markets.len(), ex.id());

        let mut account = Self::new(name, ex, MarketTable::new(markets), margin_mode, config);
        if let Err(e) = account.refresh_positions(true).await {
            warn!("[{name}] initial position refresh failed: {e}");
            account.positions_stale = true;
        }
        Ok(account)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Parse and execute one alert line routed to this account.
    pub async fn handle_line(&mut self, line: &str) -> AlertOutcome {
        let ctx = ParseContext {
            account: &self.name,
            markets: &self.markets,
            client_ids: &self.ex.caps().client_id,
        };
        let alert = match parse_alert(line, &ctx) {
            Ok(alert) => alert,
            Err(e) => {
                warn!("[{}] invalid alert '{line}': {e}", self.name);
                return AlertOutcome::Rejected(e.to_string());
            }
        };
        self.handle_alert(alert, line).await
    }

    /// Execute a parsed alert now, or latch it.
    pub async fn handle_alert(&mut self, alert: Alert, text: &str) -> AlertOutcome {
        match self.execute(&alert).await {
            Ok(outcome) => {
                info!("[{}] '{text}': {outcome}", self.name);
                outcome
            }
            Err(reason) => {
                info!("[{}] '{text}' latched: {reason}", self.name);
                self.latch.hold(alert, text, reason.clone());
                AlertOutcome::Latched(reason)
            }
        }
    }

    async fn execute(&mut self, alert: &Alert) -> Result<AlertOutcome, LatchReason> {
        if alert.command == Command::Cancel {
            return Ok(self.cancel(alert).await);
        }
        if self.queue.busy(&alert.symbol) {
            return Err(LatchReason::SymbolBusy);
        }
        if self.positions_stale && alert.depends_on_position() {
            return Err(LatchReason::Transient("position snapshot out of date".into()));
        }
        let Some(market) = self.markets.get(&alert.symbol) else {
            return Ok(AlertOutcome::Rejected(format!("unknown symbol {}", alert.symbol)));
        };

        let book = match self.ex.fetch_order_book(&alert.symbol).await {
            Ok(book) => book,
            Err(e) => return self.fetch_failed("order book", e),
        };
        let balance = match self.ex.fetch_balance().await {
            Ok(balance) => balance,
            Err(e) => return self.fetch_failed("balance", e),
        };

        let position = self.positions.get(&alert.symbol);
        let leverage = alert
            .leverage
            .or_else(|| position.map(|p| p.leverage).filter(|l| *l > 0))
            .or_else(|| self.sync.leverage_of(&alert.symbol))
            .unwrap_or(1)
            .max(1);

        let snapshot = Snapshot {
            market,
            position,
            book,
            balance,
            leverage,
            margin_mode: self.sync.margin_mode(),
            config: &self.config,
        };
        match reconcile::plan(alert, &snapshot) {
            Plan::Orders(orders) => {
                let n = orders.len();
                for order in orders {
                    info!("[{}] queueing {order}", self.name);
                    self.queue.push(order);
                }
                Ok(AlertOutcome::Queued(n))
            }
            Plan::Nothing(msg) => Ok(AlertOutcome::Done(msg)),
            Plan::Reject(msg) => {
                warn!("[{}] {} {}: {msg}", self.name, alert.symbol, alert.command);
                Ok(AlertOutcome::Rejected(msg))
            }
        }
    }

    fn fetch_failed(&self, what: &str, e: ExchangeError) -> Result<AlertOutcome, LatchReason> {
        if e.is_transient() {
            Err(LatchReason::Transient(e.to_string()))
        } else {
            error!("[{}] failed to fetch {what}: {e}", self.name);
            Ok(AlertOutcome::Rejected(format!("failed to fetch {what}: {e}")))
        }
    }

    /// `cancel` runs immediately, ahead of anything queued.
    async fn cancel(&mut self, alert: &Alert) -> AlertOutcome {
        let symbol = &alert.symbol;
        let id = alert.cancel_id.as_deref();
        let mut local = self.queue.remove(symbol, id);
        if id.is_none() {
            local += self.latch.discard(symbol);
        }

        let result = match id {
            Some(id) => self.ex.cancel_order(symbol, None, Some(id)).await,
            None => self.ex.cancel_all_orders(symbol).await,
        };
        match (result, id) {
            (Ok(()), Some(id)) => AlertOutcome::Done(format!("canceled order {id} on {symbol}")),
            (Ok(()), None) => AlertOutcome::Done(format!("canceled all orders on {symbol} ({local} local)")),
            (Err(ExchangeError::OrderNotFound(_)), Some(id)) if local > 0 => {
                AlertOutcome::Done(format!("dropped queued order {id} on {symbol}"))
            }
            (Err(e), _) => {
                warn!("[{}] cancel on {symbol} failed: {e}", self.name);
                AlertOutcome::Rejected(format!("cancel failed: {e}"))
            }
        }
    }

    /// One fast tick: queue processing, refresh after settlements, latch replay.
    pub async fn tick(&mut self) {
        let env = QueueEnv {
            account: &self.name,
            ex: self.ex.as_ref(),
            markets: &self.markets,
            positions: &self.positions,
            config: &self.config,
        };
        let report = self.queue.tick(&env, &mut self.sync).await;

        if report.drained || !report.settled.is_empty() || self.positions_stale {
            if let Err(e) = self.refresh_positions(report.drained).await {
                warn!("[{}] position refresh failed, holding position alerts: {e}", self.name);
                self.positions_stale = true;
            }
        }
        self.replay_latched().await;
    }

    async fn replay_latched(&mut self) {
        if self.latch.is_empty() {
            return;
        }
        // A stale mirror holds every latched alert back; expiry still applies.
        let (queue, stale) = (&self.queue, self.positions_stale);
        let (ready, expired) = self.latch.take_ready(Instant::now(), |symbol| stale || queue.busy(symbol));

        for latched in expired {
            warn!(
                "[{}] dropping latched alert '{}' ({} {}): {} and timed out",
                self.name, latched.text, latched.alert.symbol, latched.alert.command, latched.reason
            );
        }
        for latched in ready {
            match self.execute(&latched.alert).await {
                Ok(outcome) => info!("[{}] replayed '{}': {outcome}", self.name, latched.text),
                Err(reason) => self.latch.requeue(latched, reason),
            }
        }
    }

    /// Replace the position mirror with a fresh exchange snapshot.
    pub async fn refresh_positions(&mut self, verbose: bool) -> Result<(), ExchangeError> {
        let positions = self.ex.fetch_positions().await?;
        self.positions_stale = false;
        self.sync.observe_positions(&positions);
        self.positions = positions.into_iter().map(|p| (p.symbol.clone(), p)).collect();

        if verbose {
            info!("[{}] refreshing positions: {} found", self.name, self.positions.len());
            for p in self.positions.values() {
                let pnl = p
                    .initial_margin
                    .filter(|m| *m > 0.0)
                    .map(|m| format!(" ({:.2}%)", p.unrealized_pnl / m * 100.0))
                    .unwrap_or_default();
                info!(
                    "[{}] {} {} {} @ {} {}x {} pnl {}{pnl}",
                    self.name, p.symbol, p.side, p.contracts, p.entry_price, p.leverage, p.margin_mode, p.unrealized_pnl
                );
            }
        }
        Ok(())
    }

    pub fn status(&self) -> AccountStatus {
        let (queued, active) = self.queue.summaries();
        let mut positions: Vec<Position> = self.positions.values().cloned().collect();
        positions.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        AccountStatus {
            name: self.name.clone(),
            exchange: self.ex.id(),
            queued,
            active,
            latched: self.latch.texts(),
            positions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wh_core::types::{Direction, OrderKind, OrderStatus, PositionSide};
    use wh_td::mock::{Call, FillMode, MockExchange, Op};

    const BTC: &str = "BTC/USDT:USDT";

    fn long_btc(contracts: f64, leverage: u32) -> Position {
        Position {
            symbol: BTC.into(),
            side: PositionSide::Long,
            contracts,
            entry_price: 60_000.0,
            unrealized_pnl: 0.0,
            margin_mode: MarginMode::Isolated,
            leverage,
            initial_margin: None,
        }
    }

    async fn account(mock: &Arc<MockExchange>) -> Account {
        let ex: Arc<dyn ExchangeApi> = mock.clone();
        Account::connect("main", ex, MarginMode::Isolated, EngineConfig::default()).await.unwrap()
    }

    fn rich() -> Arc<MockExchange> {
        Arc::new(MockExchange::paper().with_balance(10_000_000.0))
    }

    #[tokio::test(start_paused = true)]
    async fn position_delta_against_existing_long() {
        let mock = rich();
        mock.set_position(long_btc(10.0, 5));
        let mut acct = account(&mock).await;

        assert_eq!(acct.handle_line("main BTCUSDT position 15 @ x5").await, AlertOutcome::Queued(1));
        acct.tick().await;
        let calls = mock.calls();
        assert_eq!(calls.len(), 1, "{calls:?}");
        let requests = mock.order_requests();
        assert_eq!((requests[0].direction, requests[0].quantity), (Direction::Buy, 5.0));
        assert_eq!(mock.position(BTC).unwrap().contracts, 15.0);
    }

    #[tokio::test(start_paused = true)]
    async fn position_flip_sells_through_zero() {
        let mock = rich();
        mock.set_position(long_btc(10.0, 5));
        let mut acct = account(&mock).await;

        assert_eq!(acct.handle_line("main BTCUSDT position -5 @").await, AlertOutcome::Queued(1));
        acct.tick().await;
        let requests = mock.order_requests();
        assert_eq!((requests[0].direction, requests[0].quantity), (Direction::Sell, 15.0));
        let pos = mock.position(BTC).unwrap();
        assert_eq!((pos.side, pos.contracts), (PositionSide::Short, 5.0));
    }

    #[tokio::test(start_paused = true)]
    async fn close_half() {
        let mock = rich();
        mock.set_position(long_btc(10.0, 5));
        let mut acct = account(&mock).await;

        assert_eq!(acct.handle_line("main BTCUSDT close 50%").await, AlertOutcome::Queued(1));
        acct.tick().await;
        let r = &mock.order_requests()[0];
        assert_eq!((r.direction, r.quantity, r.reduce_only), (Direction::Sell, 5.0, true));
    }

    #[tokio::test(start_paused = true)]
    async fn busy_symbol_latches_until_free() {
        let mock = rich();
        mock.set_fill_mode(FillMode::Resting);
        let mut acct = account(&mock).await;

        assert_eq!(acct.handle_line("main BTCUSDT buy 0.01 3x").await, AlertOutcome::Queued(1));
        acct.tick().await;
        assert_eq!(
            acct.handle_line("main BTCUSDT buy 0.02 3x").await,
            AlertOutcome::Latched(LatchReason::SymbolBusy)
        );
        assert_eq!(acct.status().latched.len(), 1);

        let first = mock.orders()[0].id.clone();
        assert!(mock.fill_order(&first));
        mock.set_fill_mode(FillMode::Full);
        // Settles the first order and replays the latched alert.
        acct.tick().await;
        assert!(acct.status().latched.is_empty());
        acct.tick().await;
        let sizes: Vec<f64> = mock.order_requests().iter().map(|r| r.quantity).collect();
        assert_eq!(sizes, vec![0.01, 0.02]);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failure_latches_and_retries() {
        let mock = rich();
        let mut acct = account(&mock).await;
        mock.fail_next(Op::FetchBook, ExchangeError::NotAvailable("502 Bad Gateway".into()));

        let outcome = acct.handle_line("main ETHUSDT buy 0.1").await;
        assert!(matches!(outcome, AlertOutcome::Latched(LatchReason::Transient(_))));

        acct.tick().await;
        assert!(mock.order_requests().is_empty());

        tokio::time::advance(acct.config().latch_retry()).await;
        acct.tick().await;
        acct.tick().await;
        assert_eq!(mock.order_requests().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn latched_alerts_expire() {
        let mock = rich();
        let mut acct = account(&mock).await;
        mock.fail_next(Op::FetchBook, ExchangeError::Timeout);
        acct.handle_line("main ETHUSDT buy 0.1").await;
        for _ in 0..3 {
            mock.fail_next(Op::FetchBook, ExchangeError::Timeout);
        }
        for _ in 0..3 {
            tokio::time::advance(Duration::from_secs(25)).await;
            acct.tick().await;
        }
        assert!(acct.status().latched.is_empty());
        assert!(mock.order_requests().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_by_id_and_all() {
        let mock = rich();
        let mut acct = account(&mock).await;

        acct.handle_line("main BTCUSDT buy 0.01 limit:tp1:50000").await;
        acct.tick().await;
        acct.tick().await;
        let resting = &mock.orders()[0];
        assert_eq!((resting.status, resting.client_id.as_deref()), (OrderStatus::New, Some("tp1")));
        assert_eq!(mock.order_requests()[0].kind, OrderKind::Limit);

        let outcome = acct.handle_line("main BTCUSDT cancel:tp1").await;
        assert!(matches!(outcome, AlertOutcome::Done(_)), "{outcome}");
        assert_eq!(mock.orders()[0].status, OrderStatus::Canceled);

        acct.handle_line("main BTCUSDT buy 0.01").await;
        assert_eq!(acct.status().queued.len(), 1);
        let outcome = acct.handle_line("main BTCUSDT cancel").await;
        assert!(matches!(outcome, AlertOutcome::Done(_)));
        assert!(acct.status().queued.is_empty());
        assert_eq!(mock.calls().last(), Some(&Call::CancelAll(BTC.into())));
    }

    #[tokio::test(start_paused = true)]
    async fn bare_cancel_drops_latched_alerts() {
        let mock = rich();
        let mut acct = account(&mock).await;
        mock.fail_next(Op::FetchBook, ExchangeError::NotAvailable("502 Bad Gateway".into()));
        acct.handle_line("main BTCUSDT buy 0.01").await;
        assert_eq!(acct.status().latched.len(), 1);

        let outcome = acct.handle_line("main BTCUSDT cancel").await;
        assert_eq!(outcome, AlertOutcome::Done(format!("canceled all orders on {BTC} (1 local)")));
        assert!(acct.status().latched.is_empty());

        tokio::time::advance(acct.config().latch_retry()).await;
        acct.tick().await;
        assert!(mock.order_requests().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_of_unknown_id_is_rejected() {
        let mock = rich();
        let mut acct = account(&mock).await;
        let outcome = acct.handle_line("main BTCUSDT cancel:nope").await;
        assert!(matches!(outcome, AlertOutcome::Rejected(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn parse_and_plan_rejections() {
        let mock = rich();
        let mut acct = account(&mock).await;
        assert_eq!(
            acct.handle_line("main BTCUSDT").await,
            AlertOutcome::Rejected("missing command".into())
        );
        assert!(matches!(
            acct.handle_line("main BTCUSDT sell 1 reduce").await,
            AlertOutcome::Rejected(_)
        ));
        assert!(matches!(acct.handle_line("main BTCUSDT close").await, AlertOutcome::Done(_)));
        assert!(acct.status().queued.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn leverage_defaults_to_the_position() {
        let mock = rich();
        mock.set_position(long_btc(1.0, 7));
        let mut acct = account(&mock).await;
        acct.handle_line("main BTCUSDT buy 0.5").await;
        assert_eq!(acct.status().queued[0].leverage, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_target_waits_for_a_fresh_snapshot() {
        let mock = rich();
        mock.set_position(long_btc(10.0, 5));
        let mut acct = account(&mock).await;

        assert_eq!(acct.handle_line("main BTCUSDT position 15 @ x5").await, AlertOutcome::Queued(1));
        mock.fail_next(Op::FetchPositions, ExchangeError::NotAvailable("502 Bad Gateway".into()));
        acct.tick().await;
        assert_eq!(mock.position(BTC).unwrap().contracts, 15.0);

        let outcome = acct.handle_line("main BTCUSDT position 15 @ x5").await;
        assert!(matches!(outcome, AlertOutcome::Latched(LatchReason::Transient(_))), "{outcome}");
        // Relative orders are not held back.
        assert_eq!(acct.handle_line("main ETHUSDT buy 0.1").await, AlertOutcome::Queued(1));

        // The next tick refreshes, then replays the target against 15 contracts.
        tokio::time::advance(acct.config().latch_retry()).await;
        acct.tick().await;
        acct.tick().await;
        assert!(acct.status().latched.is_empty());
        assert_eq!(mock.position(BTC).unwrap().contracts, 15.0);
        let btc_orders = mock.order_requests().iter().filter(|r| r.symbol == BTC).count();
        assert_eq!(btc_orders, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn drain_refreshes_positions() {
        let mock = rich();
        let mut acct = account(&mock).await;
        acct.handle_line("main BTCUSDT buy 0.01 2x").await;
        acct.tick().await;
        let status = acct.status();
        assert_eq!(status.positions.len(), 1);
        assert_eq!(status.positions[0].contracts, 0.01);
        assert_eq!(status.exchange, ExchangeId::Mock);
    }
}
