//! Position reconciliation.
//!
//! Turns one validated alert plus a snapshot of the account (position, book,
//! balance) into the orders that realize it. Pure: no exchange calls, no
//! clock reads beyond order construction, so every branch is testable with
//! plain values.

use wh_core::config::EngineConfig;
use wh_core::types::{Balance, BookTop, Direction, MarginMode, MarketInfo, Position};

use crate::alert::{Alert, Command, Unit};
use crate::convert::{SizingContext, contracts_from_quote, round_down_tick, snap_toward_zero, to_contracts};
use crate::order::Order;

/// What the reconciler decided.
#[derive(Debug)]
pub enum Plan {
    /// Enqueue these, in order.
    Orders(Vec<Order>),
    /// Nothing to do; not an error.
    Nothing(String),
    /// The alert cannot be executed.
    Reject(String),
}

/// Account snapshot an alert is reconciled against.
pub struct Snapshot<'a> {
    pub market: &'a MarketInfo,
    pub position: Option<&'a Position>,
    pub book: BookTop,
    pub balance: Balance,
    /// Leverage resolved for this alert (at least 1).
    pub leverage: u32,
    /// Margin mode the account wants positions in.
    pub margin_mode: MarginMode,
    pub config: &'a EngineConfig,
}

impl Snapshot<'_> {
    fn symbol(&self) -> &str {
        &self.market.symbol
    }

    fn min_amount(&self) -> f64 {
        self.market.min_amount
    }

    fn sizing(&self, price: f64) -> SizingContext {
        SizingContext {
            price,
            leverage: self.leverage as f64,
            equity: self.balance.total,
        }
    }

    /// Contracts the free balance affords at the taker price of `direction`.
    fn affordable(&self, direction: Direction) -> f64 {
        let available = self.balance.free * self.config.balance_safety_factor;
        let price = self.book.taker_price(direction);
        contracts_from_quote(self.market, available, price, self.leverage as f64).max(0.0)
    }

    /// Leverage of the open position differs from the wanted one.
    fn leverage_changes(&self) -> bool {
        self.position.is_some_and(|p| p.leverage != self.leverage)
    }
}

/// Reconcile `alert` against `snap`.
///
/// `cancel` alerts never reach this point; they are executed immediately.
pub fn plan(alert: &Alert, snap: &Snapshot<'_>) -> Plan {
    match alert.command {
        Command::Close => plan_close(alert, snap),
        Command::Position => plan_position(alert, snap),
        Command::Buy => plan_trade(alert, Direction::Buy, snap),
        Command::Sell => plan_trade(alert, Direction::Sell, snap),
        Command::ChangeLeverage => Plan::Orders(vec![Order::change_leverage(snap.symbol(), snap.leverage)]),
        Command::Cancel => Plan::Nothing("cancel is not queued".into()),
    }
}

// ---------------------------------------------------------------------------
// close
// ---------------------------------------------------------------------------

fn plan_close(alert: &Alert, snap: &Snapshot<'_>) -> Plan {
    let Some(pos) = snap.position else {
        return Plan::Nothing(format!("no {} position to close", snap.symbol()));
    };
    let mut quantity = pos.contracts;
    if alert.unit == Unit::Percent && alert.quantity > 0.0 && alert.quantity < 100.0 {
        quantity = round_down_tick(pos.contracts * alert.quantity / 100.0, snap.market.amount_step);
        if quantity < snap.min_amount() {
            return Plan::Reject(format!(
                "{}% of {} contracts is below the minimum order size {}",
                alert.quantity,
                pos.contracts,
                snap.min_amount()
            ));
        }
    }
    Plan::Orders(vec![Order::reduce(snap.symbol(), pos.side.closing_direction(), quantity)])
}

fn close_all(pos: &Position, snap: &Snapshot<'_>) -> Order {
    Order::reduce(snap.symbol(), pos.side.closing_direction(), pos.contracts)
}

// ---------------------------------------------------------------------------
// position
// ---------------------------------------------------------------------------

fn plan_position(alert: &Alert, snap: &Snapshot<'_>) -> Plan {
    let sized = to_contracts(
        snap.market,
        alert.quantity,
        alert.unit,
        alert.nominal || alert.unit == Unit::Base,
        &snap.sizing(snap.book.mid()),
    );
    let mut target = sized.contracts;
    if target == 0.0 {
        return plan_close(alert, snap);
    }

    let Some(pos) = snap.position else {
        let direction = if target > 0.0 { Direction::Buy } else { Direction::Sell };
        return open(snap, direction, target.abs(), None);
    };

    let wanted = snap.margin_mode;
    if wanted != MarginMode::Unknown && pos.margin_mode != MarginMode::Unknown && pos.margin_mode != wanted {
        let direction = if target > 0.0 { Direction::Buy } else { Direction::Sell };
        let reopen = Order::new(snap.symbol(), direction.into(), target.abs(), snap.leverage)
            .with_delay(snap.config.flip_split_delay());
        return Plan::Orders(vec![close_all(pos, snap), reopen]);
    }

    let current = pos.signed_contracts();
    let same_side = current.signum() == target.signum();

    if let Some(margin) = sized.margin.filter(|_| same_side && matches!(alert.unit, Unit::Quote | Unit::Percent)) {
        let price = snap.book.mid();
        let drift = if pos.entry_price > 0.0 {
            (price - pos.entry_price).abs() / pos.entry_price
        } else {
            0.0
        };
        if drift > snap.config.price_drift_tolerance {
            target = capital_target(pos, margin, price, snap);
        }
    }

    let delta = round_down_tick((target - current).abs(), snap.market.amount_step);
    if delta < snap.min_amount() {
        if snap.leverage_changes() {
            return Plan::Orders(vec![Order::change_leverage(snap.symbol(), snap.leverage)]);
        }
        return Plan::Nothing(format!("{} position already matches", snap.symbol()));
    }

    let direction = if current > target { Direction::Sell } else { Direction::Buy };
    let reduces = target.signum() == current.signum() && target.abs() < current.abs() || target == 0.0;
    let flips = target != 0.0 && !same_side;

    if reduces {
        let mut orders = vec![Order::reduce(snap.symbol(), direction, delta)];
        if snap.leverage_changes() {
            orders.push(Order::change_leverage(snap.symbol(), snap.leverage));
        }
        return Plan::Orders(orders);
    }
    if flips && snap.leverage_changes() {
        let reopen = Order::new(snap.symbol(), direction.into(), target.abs(), snap.leverage)
            .with_delay(snap.config.flip_split_delay());
        return Plan::Orders(vec![close_all(pos, snap), reopen]);
    }
    open(snap, direction, delta, Some(pos))
}

/// Same-side target recomputed from capital after the price moved.
///
/// The wanted margin (less the fee allowance) is compared with the margin the
/// position already holds, rescaled to the new leverage, and the difference
/// is converted to contracts at the current price.
fn capital_target(pos: &Position, target_margin: f64, price: f64, snap: &Snapshot<'_>) -> f64 {
    let leverage = snap.leverage.max(1) as f64;
    let held = pos.initial_margin.unwrap_or_else(|| {
        pos.contracts * snap.market.contract_size * pos.entry_price / pos.leverage.max(1) as f64
    });
    let adjusted = held * pos.leverage.max(1) as f64 / leverage;
    let extra = target_margin * (1.0 - snap.config.capital_fee_allowance) - adjusted;
    let extra_contracts = contracts_from_quote(snap.market, extra, price, leverage);

    let current = pos.signed_contracts();
    let target = snap_toward_zero(current + current.signum() * extra_contracts, snap.market.amount_step);
    if target.signum() != current.signum() { 0.0 } else { target }
}

// ---------------------------------------------------------------------------
// buy / sell
// ---------------------------------------------------------------------------

fn plan_trade(alert: &Alert, direction: Direction, snap: &Snapshot<'_>) -> Plan {
    let price = alert.limit.as_ref().map(|l| l.price).unwrap_or_else(|| snap.book.mid());
    let sized = to_contracts(
        snap.market,
        alert.quantity.abs(),
        alert.unit,
        alert.nominal || alert.unit == Unit::Base,
        &snap.sizing(price),
    );
    let quantity = sized.contracts.abs();

    if alert.reduce_only {
        let Some(pos) = snap.position.filter(|p| p.side.closing_direction() == direction) else {
            return Plan::Reject(format!("no {} position to reduce with a {direction}", snap.symbol()));
        };
        let quantity = quantity.min(pos.contracts);
        if quantity < snap.min_amount() {
            return Plan::Reject(format!("order size {quantity} below minimum {}", snap.min_amount()));
        }
        let mut order = Order::reduce(snap.symbol(), direction, quantity);
        if let Some(limit) = &alert.limit {
            order = order.with_limit(limit.price, &limit.custom_id);
        }
        return Plan::Orders(vec![order]);
    }

    if quantity < snap.min_amount() {
        return Plan::Reject(format!("order size {quantity} below minimum {}", snap.min_amount()));
    }
    match &alert.limit {
        Some(limit) => {
            let opposing = opposing_contracts(snap.position, direction);
            if quantity > opposing && snap.affordable(direction) < snap.min_amount() {
                return insufficient(snap);
            }
            let order =
                Order::new(snap.symbol(), direction.into(), quantity, snap.leverage).with_limit(limit.price, &limit.custom_id);
            Plan::Orders(vec![order])
        }
        None => open(snap, direction, quantity, snap.position),
    }
}

fn opposing_contracts(position: Option<&Position>, direction: Direction) -> f64 {
    position.filter(|p| p.side.closing_direction() == direction).map(|p| p.contracts).unwrap_or(0.0)
}

fn insufficient(snap: &Snapshot<'_>) -> Plan {
    Plan::Reject(format!("insufficient balance ({:.4} {} free)", snap.balance.free, snap.market.settle))
}

/// Market order(s) for `quantity` contracts that may open exposure.
///
/// Rejects when the balance cannot afford a single minimum order of new
/// exposure. When the order reverses a position and is larger than the
/// closing part plus what the balance affords, it is split: the first order
/// covers exactly that, the remainder follows after the flip delay.
fn open(snap: &Snapshot<'_>, direction: Direction, quantity: f64, position: Option<&Position>) -> Plan {
    let opposing = opposing_contracts(position, direction);
    let can_do = snap.affordable(direction);

    if opposing > 0.0 && quantity > can_do + opposing {
        let first = round_down_tick(can_do + opposing, snap.market.amount_step);
        let rest = round_down_tick(quantity - first, snap.market.amount_step);
        let mut orders = vec![Order::new(snap.symbol(), direction.into(), first, snap.leverage)];
        if rest >= snap.min_amount() {
            orders.push(
                Order::new(snap.symbol(), direction.into(), rest, snap.leverage)
                    .with_delay(snap.config.flip_split_delay()),
            );
        }
        return Plan::Orders(orders);
    }

    if quantity > opposing && can_do < snap.min_amount() {
        return insufficient(snap);
    }
    Plan::Orders(vec![Order::new(snap.symbol(), direction.into(), quantity, snap.leverage)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::LimitSpec;
    use crate::order::OrderSide;
    use std::time::Duration;
    use wh_core::types::PositionSide;

    const BTC: &str = "BTC/USDT:USDT";

    fn market(step: f64) -> MarketInfo {
        MarketInfo {
            symbol: BTC.into(),
            id: "BTCUSDT".into(),
            base: "BTC".into(),
            quote: "USDT".into(),
            settle: "USDT".into(),
            contract_size: 1.0,
            amount_step: step,
            min_amount: step,
            max_leverage: Some(125),
        }
    }

    fn position(contracts: f64, leverage: u32) -> Position {
        Position {
            symbol: BTC.into(),
            side: if contracts > 0.0 { PositionSide::Long } else { PositionSide::Short },
            contracts: contracts.abs(),
            entry_price: 100.0,
            unrealized_pnl: 0.0,
            margin_mode: MarginMode::Isolated,
            leverage,
            initial_margin: None,
        }
    }

    fn alert(command: Command, quantity: f64, unit: Unit) -> Alert {
        Alert {
            symbol: BTC.into(),
            command,
            quantity,
            unit,
            nominal: false,
            leverage: None,
            reduce_only: false,
            limit: None,
            cancel_id: None,
        }
    }

    struct Fixture {
        market: MarketInfo,
        position: Option<Position>,
        free: f64,
        leverage: u32,
        config: EngineConfig,
    }

    impl Fixture {
        fn new(position: Option<Position>) -> Self {
            Self {
                market: market(1.0),
                position,
                free: 1_000_000.0,
                leverage: 5,
                config: EngineConfig::default(),
            }
        }

        fn plan(&self, alert: &Alert) -> Plan {
            let snap = Snapshot {
                market: &self.market,
                position: self.position.as_ref(),
                book: BookTop { bid: 100.0, ask: 100.0 },
                balance: Balance {
                    free: self.free,
                    used: 0.0,
                    total: self.free,
                },
                leverage: self.leverage,
                margin_mode: MarginMode::Isolated,
                config: &self.config,
            };
            plan(alert, &snap)
        }
    }

    fn orders(plan: Plan) -> Vec<Order> {
        match plan {
            Plan::Orders(o) => o,
            other => panic!("expected orders, got {other:?}"),
        }
    }

    #[test]
    fn position_increase_buys_the_delta() {
        let f = Fixture::new(Some(position(10.0, 5)));
        let o = orders(f.plan(&alert(Command::Position, 15.0, Unit::Contracts)));
        assert_eq!(o.len(), 1);
        assert_eq!((o[0].side, o[0].quantity, o[0].leverage), (OrderSide::Buy, 5.0, 5));
        assert!(!o[0].reduce_only);
    }

    #[test]
    fn position_flip_sells_through_zero() {
        let f = Fixture::new(Some(position(10.0, 5)));
        let o = orders(f.plan(&alert(Command::Position, -5.0, Unit::Contracts)));
        assert_eq!(o.len(), 1);
        assert_eq!((o[0].side, o[0].quantity), (OrderSide::Sell, 15.0));
    }

    #[test]
    fn position_flip_is_split_by_liquidity() {
        let mut f = Fixture::new(Some(position(10.0, 5)));
        // 200 * 0.985 * 5 / 100 = 9.85 -> 9 affordable contracts.
        f.free = 200.0;
        let o = orders(f.plan(&alert(Command::Position, -30.0, Unit::Contracts)));
        assert_eq!(o.len(), 2);
        assert_eq!((o[0].side, o[0].quantity), (OrderSide::Sell, 19.0));
        assert_eq!(o[0].delay, Duration::ZERO);
        assert_eq!((o[1].side, o[1].quantity), (OrderSide::Sell, 21.0));
        assert_eq!(o[1].delay, f.config.flip_split_delay());
    }

    #[test]
    fn matching_position_is_a_no_op_unless_leverage_differs() {
        let f = Fixture::new(Some(position(10.0, 5)));
        assert!(matches!(
            f.plan(&alert(Command::Position, 10.0, Unit::Contracts)),
            Plan::Nothing(_)
        ));

        let mut f = Fixture::new(Some(position(10.0, 5)));
        f.leverage = 8;
        let o = orders(f.plan(&alert(Command::Position, 10.0, Unit::Contracts)));
        assert_eq!(o.len(), 1);
        assert_eq!((o[0].side, o[0].leverage), (OrderSide::ChangeLeverage, 8));
    }

    #[test]
    fn reduction_defers_leverage_change() {
        let mut f = Fixture::new(Some(position(10.0, 5)));
        f.leverage = 3;
        let o = orders(f.plan(&alert(Command::Position, 4.0, Unit::Contracts)));
        assert_eq!(o.len(), 2);
        assert_eq!((o[0].side, o[0].quantity, o[0].leverage), (OrderSide::Sell, 6.0, 0));
        assert!(o[0].reduce_only);
        assert_eq!((o[1].side, o[1].leverage), (OrderSide::ChangeLeverage, 3));
    }

    #[test]
    fn flip_with_leverage_change_closes_then_reopens() {
        let mut f = Fixture::new(Some(position(-4.0, 5)));
        f.leverage = 10;
        let o = orders(f.plan(&alert(Command::Position, 6.0, Unit::Contracts)));
        assert_eq!(o.len(), 2);
        assert_eq!((o[0].side, o[0].quantity, o[0].reduce_only), (OrderSide::Buy, 4.0, true));
        assert_eq!((o[1].side, o[1].quantity, o[1].leverage), (OrderSide::Buy, 6.0, 10));
        assert!(o[1].delay > Duration::ZERO);
    }

    #[test]
    fn margin_mode_mismatch_closes_first() {
        let mut pos = position(10.0, 5);
        pos.margin_mode = MarginMode::Cross;
        let f = Fixture::new(Some(pos));
        let o = orders(f.plan(&alert(Command::Position, 12.0, Unit::Contracts)));
        assert_eq!(o.len(), 2);
        assert_eq!((o[0].side, o[0].quantity, o[0].reduce_only), (OrderSide::Sell, 10.0, true));
        assert_eq!((o[1].side, o[1].quantity), (OrderSide::Buy, 12.0));
    }

    #[test]
    fn position_zero_closes() {
        let f = Fixture::new(Some(position(-7.0, 5)));
        let o = orders(f.plan(&alert(Command::Position, 0.0, Unit::Base)));
        assert_eq!((o[0].side, o[0].quantity, o[0].reduce_only), (OrderSide::Buy, 7.0, true));
        assert_eq!(o[0].leverage, 0);
    }

    #[test]
    fn position_without_current_position_opens() {
        let f = Fixture::new(None);
        let o = orders(f.plan(&alert(Command::Position, -3.0, Unit::Contracts)));
        assert_eq!((o[0].side, o[0].quantity, o[0].leverage), (OrderSide::Sell, 3.0, 5));
    }

    #[test]
    fn capital_branch_tops_up_margin_after_price_moved() {
        // Long 10 entered at 80 holding 250 margin at 5x. With the price at
        // 100, a 300$ target needs 50$ more margin: 50 * 5 / 100 = 2.5,
        // rounded down to 2 contracts instead of the naive 15 - 10 = 5.
        let mut pos = position(10.0, 5);
        pos.entry_price = 80.0;
        pos.initial_margin = Some(250.0);
        let f = Fixture::new(Some(pos));
        let o = orders(f.plan(&alert(Command::Position, 300.0, Unit::Quote)));
        assert_eq!(o.len(), 1);
        assert_eq!((o[0].side, o[0].quantity), (OrderSide::Buy, 2.0));
    }

    #[test]
    fn capital_branch_is_skipped_without_drift() {
        // 300$ at 5x on price 100 is 15 contracts; entry equals price.
        let f = Fixture::new(Some(position(10.0, 5)));
        let o = orders(f.plan(&alert(Command::Position, 300.0, Unit::Quote)));
        assert_eq!((o[0].side, o[0].quantity), (OrderSide::Buy, 5.0));
    }

    #[test]
    fn close_full_and_partial() {
        let f = Fixture::new(Some(position(10.0, 5)));
        let o = orders(f.plan(&alert(Command::Close, 0.0, Unit::Base)));
        assert_eq!((o[0].side, o[0].quantity, o[0].reduce_only), (OrderSide::Sell, 10.0, true));

        let o = orders(f.plan(&alert(Command::Close, 50.0, Unit::Percent)));
        assert_eq!((o[0].side, o[0].quantity), (OrderSide::Sell, 5.0));

        let f = Fixture::new(Some(position(-10.0, 5)));
        let o = orders(f.plan(&alert(Command::Close, 50.0, Unit::Percent)));
        assert_eq!((o[0].side, o[0].quantity), (OrderSide::Buy, 5.0));

        let f = Fixture::new(None);
        assert!(matches!(f.plan(&alert(Command::Close, 0.0, Unit::Base)), Plan::Nothing(_)));
    }

    #[test]
    fn buy_is_rejected_when_balance_affords_nothing() {
        let mut f = Fixture::new(None);
        f.free = 10.0;
        assert!(matches!(f.plan(&alert(Command::Buy, 3.0, Unit::Contracts)), Plan::Reject(_)));
    }

    #[test]
    fn sell_against_long_is_split() {
        let mut f = Fixture::new(Some(position(10.0, 5)));
        f.free = 200.0;
        let o = orders(f.plan(&alert(Command::Sell, 25.0, Unit::Contracts)));
        assert_eq!(o.iter().map(|o| o.quantity).collect::<Vec<_>>(), vec![19.0, 6.0]);
    }

    #[test]
    fn reduce_only_trades() {
        let f = Fixture::new(Some(position(10.0, 5)));
        let mut a = alert(Command::Sell, 30.0, Unit::Contracts);
        a.reduce_only = true;
        let o = orders(f.plan(&a));
        assert_eq!((o[0].quantity, o[0].reduce_only, o[0].leverage), (10.0, true, 0));

        let mut a = alert(Command::Buy, 1.0, Unit::Contracts);
        a.reduce_only = true;
        assert!(matches!(f.plan(&a), Plan::Reject(_)));
        assert!(matches!(Fixture::new(None).plan(&a), Plan::Reject(_)));
    }

    #[test]
    fn quote_buy_converts_at_mid() {
        let f = Fixture::new(None);
        // 100$ at 5x on 100 = 5 contracts.
        let o = orders(f.plan(&alert(Command::Buy, 100.0, Unit::Quote)));
        assert_eq!(o[0].quantity, 5.0);
    }

    #[test]
    fn limit_buy_carries_id_and_price() {
        let f = Fixture::new(None);
        let mut a = alert(Command::Buy, 2.0, Unit::Contracts);
        a.limit = Some(LimitSpec {
            custom_id: "tp1".into(),
            price: 95.0,
        });
        let o = orders(f.plan(&a));
        assert_eq!(o[0].limit_price, Some(95.0));
        assert_eq!(o[0].client_id.as_deref(), Some("tp1"));
        assert!(o[0].user_id);
    }

    #[test]
    fn change_leverage_is_a_pseudo_order() {
        let mut f = Fixture::new(None);
        f.leverage = 12;
        let o = orders(f.plan(&alert(Command::ChangeLeverage, 0.0, Unit::Base)));
        assert_eq!((o[0].side, o[0].leverage), (OrderSide::ChangeLeverage, 12));
    }
}
