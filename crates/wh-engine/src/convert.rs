//! Quantity conversion: quote, base, percent and raw-contract amounts to
//! contract counts.
//!
//! Every conversion snaps to the market's amount step and rounds toward zero,
//! so a converted order is never larger than the amount it was computed from.

use wh_core::types::MarketInfo;

use crate::alert::Unit;

/// Slack for float noise when dividing by a tick.
const TICK_EPS: f64 = 1e-9;

/// Number of decimals a tick has (`0.001` → 3, `1` → 0).
fn tick_decimals(tick: f64) -> i32 {
    let s = format!("{tick}");
    s.split_once('.').map(|(_, frac)| frac.trim_end_matches('0').len() as i32).unwrap_or(0)
}

/// Strip representation noise (`0.30000000000000004` → `0.3`) at tick resolution.
fn clean(value: f64, tick: f64) -> f64 {
    let scale = 10f64.powi(tick_decimals(tick));
    (value * scale).round() / scale
}

/// Largest multiple of `tick` not above `value`.
pub fn round_down_tick(value: f64, tick: f64) -> f64 {
    if tick <= 0.0 {
        return value;
    }
    clean((value / tick + TICK_EPS).floor() * tick, tick)
}

/// Smallest multiple of `tick` not below `value`.
pub fn round_up_tick(value: f64, tick: f64) -> f64 {
    if tick <= 0.0 {
        return value;
    }
    clean((value / tick - TICK_EPS).ceil() * tick, tick)
}

/// Snap a signed contract count toward zero.
pub fn snap_toward_zero(contracts: f64, tick: f64) -> f64 {
    if contracts >= 0.0 {
        round_down_tick(contracts, tick)
    } else {
        round_up_tick(contracts, tick)
    }
}

/// Contracts bought by `amount` of quote-currency collateral at `leverage`.
///
/// `coin = amount * leverage / (contract_size * price)`, rounded down for
/// positive results and up for negative ones.
pub fn contracts_from_quote(market: &MarketInfo, amount: f64, price: f64, leverage: f64) -> f64 {
    if price <= 0.0 || market.contract_size <= 0.0 {
        return 0.0;
    }
    let coin = (amount * leverage) / (market.contract_size * price);
    snap_toward_zero(coin, market.amount_step)
}

/// Contracts for a base-currency amount.
///
/// Nominal amounts are exposure: they are turned into collateral (divided by
/// leverage) before conversion. Collateral amounts are converted as-is and
/// therefore get multiplied by leverage.
pub fn contracts_from_base(market: &MarketInfo, amount: f64, price: f64, leverage: f64, nominal: bool) -> f64 {
    let mut quote = amount * price;
    if nominal && leverage > 0.0 {
        quote /= leverage;
    }
    contracts_from_quote(market, quote, price, leverage)
}

/// Prices and balances a conversion may need.
#[derive(Debug, Clone, Copy)]
pub struct SizingContext {
    /// Reference price (mid when the side is not yet known).
    pub price: f64,
    /// Leverage the order will carry (at least 1).
    pub leverage: f64,
    /// Account equity in settle currency, the base of percentage amounts.
    pub equity: f64,
}

/// A converted amount.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sized {
    /// Signed contract count.
    pub contracts: f64,
    /// Collateral the amount stands for, for quote and percent amounts.
    pub margin: Option<f64>,
}

/// Convert a signed alert quantity in `unit` to contracts.
pub fn to_contracts(market: &MarketInfo, quantity: f64, unit: Unit, nominal: bool, ctx: &SizingContext) -> Sized {
    let leverage = ctx.leverage.max(1.0);
    match unit {
        Unit::Contracts => Sized {
            contracts: snap_toward_zero(quantity, market.amount_step),
            margin: None,
        },
        Unit::Base => Sized {
            contracts: contracts_from_base(market, quantity, ctx.price, leverage, nominal),
            margin: None,
        },
        Unit::Quote => {
            let margin = if nominal { quantity / leverage } else { quantity };
            Sized {
                contracts: contracts_from_quote(market, margin, ctx.price, leverage),
                margin: Some(margin.abs()),
            }
        }
        Unit::Percent => {
            let margin = ctx.equity * quantity / 100.0;
            Sized {
                contracts: contracts_from_quote(market, margin, ctx.price, leverage),
                margin: Some(margin.abs()),
            }
        }
    }
}
