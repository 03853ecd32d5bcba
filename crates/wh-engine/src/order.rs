//! Engine-side order records.
//!
//! An [`Order`] is created by the reconciler (or straight from a buy/sell
//! alert), waits in the queue, and once submitted is tracked as active until
//! the exchange reports a terminal state or it times out.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use wh_core::time_util::now_ms;
use wh_core::types::{Direction, OrderKind};
use wh_td::ClientIdRule;

/// Order side, including the leverage-only pseudo order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
    /// No trade: only synchronize leverage for the symbol.
    ChangeLeverage,
}

impl OrderSide {
    pub fn direction(self) -> Option<Direction> {
        match self {
            Self::Buy => Some(Direction::Buy),
            Self::Sell => Some(Direction::Sell),
            Self::ChangeLeverage => None,
        }
    }
}

impl From<Direction> for OrderSide {
    fn from(d: Direction) -> Self {
        match d {
            Direction::Buy => Self::Buy,
            Direction::Sell => Self::Sell,
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => f.write_str("buy"),
            Self::Sell => f.write_str("sell"),
            Self::ChangeLeverage => f.write_str("changeleverage"),
        }
    }
}

/// A pending or in-flight order.
#[derive(Debug, Clone)]
pub struct Order {
    pub symbol: String,
    pub side: OrderSide,
    /// Contracts, never negative.
    pub quantity: f64,
    /// Leverage to synchronize before submitting; 0 leaves leverage alone.
    pub leverage: u32,
    pub kind: OrderKind,
    pub limit_price: Option<f64>,
    /// Client order id sent to the exchange.
    pub client_id: Option<String>,
    /// The client id came from the alert (`limit:<id>:...`).
    pub user_id: bool,
    pub reduce_only: bool,
    /// The balance-based first ladder step has been applied.
    pub reduced_once: bool,
    /// Earliest submission, measured from `created_at`.
    pub delay: Duration,
    pub created_at: Instant,
    /// Exchange order id once accepted.
    pub exchange_id: Option<String>,
}

impl Order {
    pub fn new(symbol: impl Into<String>, side: OrderSide, quantity: f64, leverage: u32) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            quantity,
            leverage,
            kind: OrderKind::Market,
            limit_price: None,
            client_id: None,
            user_id: false,
            reduce_only: false,
            reduced_once: false,
            delay: Duration::ZERO,
            created_at: Instant::now(),
            exchange_id: None,
        }
    }

    /// Leverage-only pseudo order.
    pub fn change_leverage(symbol: impl Into<String>, leverage: u32) -> Self {
        Self::new(symbol, OrderSide::ChangeLeverage, 0.0, leverage)
    }

    /// Reduce-only order that never touches leverage.
    pub fn reduce(symbol: impl Into<String>, direction: Direction, quantity: f64) -> Self {
        let mut order = Self::new(symbol, direction.into(), quantity, 0);
        order.reduce_only = true;
        order
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_limit(mut self, price: f64, custom_id: &str) -> Self {
        self.kind = OrderKind::Limit;
        self.limit_price = Some(price);
        self.client_id = Some(custom_id.to_string());
        self.user_id = true;
        self
    }

    /// Past its delay and may be submitted.
    pub fn ready(&self, now: Instant) -> bool {
        now >= self.created_at + self.delay
    }

    pub fn timed_out(&self, now: Instant, timeout: Duration) -> bool {
        now.saturating_duration_since(self.created_at) > timeout
    }

    /// Push the earliest submission `backoff` past now.
    pub fn back_off(&mut self, now: Instant, backoff: Duration) {
        let elapsed = now.saturating_duration_since(self.created_at);
        self.delay = self.delay.max(elapsed) + backoff;
    }

    /// Follow-up order for an unfilled remainder.
    pub fn remainder(&self, quantity: f64, delay: Duration) -> Self {
        let mut order = Self::new(self.symbol.clone(), self.side, quantity, self.leverage);
        order.reduce_only = self.reduce_only;
        order.delay = delay;
        order
    }

    pub fn summary(&self) -> OrderSummary {
        OrderSummary {
            symbol: self.symbol.clone(),
            side: self.side,
            quantity: self.quantity,
            leverage: self.leverage,
            kind: self.kind,
            reduce_only: self.reduce_only,
            client_id: self.client_id.clone(),
            exchange_id: self.exchange_id.clone(),
        }
    }
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {} {}x", self.symbol, self.side, self.quantity, self.leverage)?;
        if self.reduce_only {
            f.write_str(" reduce")?;
        }
        if let Some(price) = self.limit_price {
            write!(f, " limit {price}")?;
        }
        Ok(())
    }
}

/// Serializable view of an order for the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct OrderSummary {
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: f64,
    pub leverage: u32,
    pub kind: OrderKind,
    pub reduce_only: bool,
    pub client_id: Option<String>,
    pub exchange_id: Option<String>,
}

/// Sequence mixed into numeric ids so ids generated within one millisecond differ.
static NUMERIC_SEQ: AtomicU64 = AtomicU64::new(0);

/// Generate a client order id acceptable to the exchange.
///
/// Numeric ids are `now_ms` followed by a three-digit sequence, cut to the
/// trailing `max_len` digits so the fastest-moving digits survive.
pub fn generate_client_id(rule: &ClientIdRule) -> String {
    if rule.numeric_only {
        let seq = NUMERIC_SEQ.fetch_add(1, Ordering::Relaxed) % 1000;
        let id = format!("{}{seq:03}", now_ms());
        let skip = id.len().saturating_sub(rule.max_len);
        id[skip..].to_string()
    } else {
        let mut id = format!("wh{}", uuid::Uuid::new_v4().simple());
        id.truncate(rule.max_len);
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_follow_the_rule() {
        let any = ClientIdRule {
            numeric_only: false,
            max_len: 36,
        };
        let id = generate_client_id(&any);
        assert!(id.starts_with("wh"));
        assert!(any.check(&id).is_ok());
        assert_ne!(id, generate_client_id(&any));

        let numeric = ClientIdRule {
            numeric_only: true,
            max_len: 10,
        };
        let id = generate_client_id(&numeric);
        assert_eq!(id.len(), 10);
        assert!(numeric.check(&id).is_ok());
    }

    #[test]
    fn short_numeric_ids_stay_unique_back_to_back() {
        let numeric = ClientIdRule {
            numeric_only: true,
            max_len: 10,
        };
        let ids: Vec<String> = (0..50).map(|_| generate_client_id(&numeric)).collect();
        for pair in ids.windows(2) {
            assert_ne!(pair[0], pair[1]);
        }
        assert!(ids.iter().all(|id| id.len() == 10 && numeric.check(id).is_ok()));
    }

    #[tokio::test(start_paused = true)]
    async fn delay_and_timeout_are_measured_from_creation() {
        let order = Order::new("BTC/USDT:USDT", OrderSide::Buy, 1.0, 5).with_delay(Duration::from_secs(1));
        assert!(!order.ready(Instant::now()));
        tokio::time::advance(Duration::from_millis(1001)).await;
        assert!(order.ready(Instant::now()));
        assert!(!order.timed_out(Instant::now(), Duration::from_secs(10)));
        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(order.timed_out(Instant::now(), Duration::from_secs(10)));
    }

    #[tokio::test(start_paused = true)]
    async fn back_off_pushes_past_now() {
        let mut order = Order::new("BTC/USDT:USDT", OrderSide::Sell, 1.0, 0);
        tokio::time::advance(Duration::from_secs(3)).await;
        order.back_off(Instant::now(), Duration::from_millis(500));
        assert!(!order.ready(Instant::now()));
        tokio::time::advance(Duration::from_millis(500)).await;
        assert!(order.ready(Instant::now()));
    }

    #[test]
    fn remainder_keeps_intent_but_not_identity() {
        let mut order = Order::reduce("ETH/USDT:USDT", Direction::Sell, 2.0);
        order.client_id = Some("abc".into());
        order.reduced_once = true;
        let rest = order.remainder(0.5, Duration::from_millis(500));
        assert_eq!(rest.side, OrderSide::Sell);
        assert!(rest.reduce_only);
        assert!(!rest.reduced_once);
        assert_eq!(rest.client_id, None);
        assert_eq!(rest.quantity, 0.5);
    }
}
