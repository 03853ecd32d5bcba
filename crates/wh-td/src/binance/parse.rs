//! Binance USDⓈ-M wire → normalized type conversion.
//!
//! Binance encodes most numbers as JSON strings; [`num`] accepts either form.
//! Symbol translation goes through a caller-supplied lookup so this module
//! stays free of market state.

use std::collections::HashMap;

use serde_json::Value;
use wh_core::types::*;

use crate::error::{ExchangeError, ExchangeResult};

/// Read a numeric field that may be a JSON number or a numeric string.
pub fn num(v: &Value, key: &str) -> f64 {
    match v.get(key) {
        Some(Value::String(s)) => s.parse().unwrap_or(0.0),
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        _ => 0.0,
    }
}

fn text<'a>(v: &'a Value, key: &str) -> &'a str {
    v.get(key).and_then(|s| s.as_str()).unwrap_or("")
}

fn bad(what: &str) -> ExchangeError {
    ExchangeError::Unclassified(format!("unexpected {what} payload"))
}

// ---------------------------------------------------------------------------
// Markets
// ---------------------------------------------------------------------------

/// `leverageBracket` response → symbol id → highest initial leverage.
pub fn parse_leverage_brackets(v: &Value) -> HashMap<String, u32> {
    let mut out = HashMap::new();
    for entry in v.as_array().into_iter().flatten() {
        let max = entry
            .get("brackets")
            .and_then(|b| b.as_array())
            .into_iter()
            .flatten()
            .map(|b| num(b, "initialLeverage") as u32)
            .max();
        if let Some(max) = max {
            out.insert(text(entry, "symbol").to_string(), max);
        }
    }
    out
}

/// One `exchangeInfo.symbols[]` entry. Only trading perpetuals are kept.
pub fn parse_market(v: &Value, max_leverage: Option<u32>) -> Option<MarketInfo> {
    if text(v, "contractType") != "PERPETUAL" || text(v, "status") != "TRADING" {
        return None;
    }
    let id = text(v, "symbol");
    let base = text(v, "baseAsset");
    let quote = text(v, "quoteAsset");
    let settle = v.get("marginAsset").and_then(|s| s.as_str()).unwrap_or(quote);
    if id.is_empty() || base.is_empty() || quote.is_empty() {
        return None;
    }

    let lot = v
        .get("filters")
        .and_then(|f| f.as_array())
        .and_then(|filters| filters.iter().find(|f| text(f, "filterType") == "LOT_SIZE"))?;
    let amount_step = num(lot, "stepSize");
    let min_amount = num(lot, "minQty");
    if amount_step <= 0.0 {
        return None;
    }

    Some(MarketInfo {
        symbol: MarketInfo::unified(base, quote, settle),
        id: id.to_string(),
        base: base.to_string(),
        quote: quote.to_string(),
        settle: settle.to_string(),
        contract_size: 1.0,
        amount_step,
        min_amount: min_amount.max(amount_step),
        max_leverage,
    })
}

// ---------------------------------------------------------------------------
// Account
// ---------------------------------------------------------------------------

/// One `positionRisk` entry. Returns `None` for flat entries.
pub fn parse_position(v: &Value, symbol: &str) -> Option<Position> {
    let amount = num(v, "positionAmt");
    if amount == 0.0 {
        return None;
    }
    let leverage = num(v, "leverage") as u32;
    let notional = num(v, "notional").abs();
    let margin_mode = text(v, "marginType").parse().unwrap_or_default();
    let initial_margin = match margin_mode {
        MarginMode::Isolated if num(v, "isolatedWallet") > 0.0 => Some(num(v, "isolatedWallet")),
        _ if leverage > 0 => Some(notional / leverage as f64),
        _ => None,
    };

    Some(Position {
        symbol: symbol.to_string(),
        side: if amount > 0.0 {
            PositionSide::Long
        } else {
            PositionSide::Short
        },
        contracts: amount.abs(),
        entry_price: num(v, "entryPrice"),
        unrealized_pnl: num(v, "unRealizedProfit"),
        margin_mode,
        leverage,
        initial_margin,
    })
}

/// `balance` response → balance of one asset.
pub fn parse_balance(v: &Value, asset: &str) -> ExchangeResult<Balance> {
    let entries = v.as_array().ok_or_else(|| bad("balance"))?;
    let Some(entry) = entries.iter().find(|e| text(e, "asset") == asset) else {
        return Ok(Balance::default());
    };
    let total = num(entry, "balance");
    let free = num(entry, "availableBalance");
    Ok(Balance {
        free,
        used: (total - free).max(0.0),
        total,
    })
}

/// `bookTicker` response.
pub fn parse_book(v: &Value) -> ExchangeResult<BookTop> {
    let bid = num(v, "bidPrice");
    let ask = num(v, "askPrice");
    if bid <= 0.0 || ask <= 0.0 {
        return Err(bad("book ticker"));
    }
    Ok(BookTop { bid, ask })
}

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

pub fn parse_status(s: &str) -> OrderStatus {
    match s {
        "NEW" => OrderStatus::New,
        "PARTIALLY_FILLED" => OrderStatus::PartiallyFilled,
        "FILLED" => OrderStatus::Filled,
        "CANCELED" => OrderStatus::Canceled,
        "REJECTED" => OrderStatus::Rejected,
        "EXPIRED" | "EXPIRED_IN_MATCH" => OrderStatus::Expired,
        _ => OrderStatus::New,
    }
}

/// An order object (place / query / cancel / list responses share the shape).
pub fn parse_order(v: &Value, symbol: &str) -> ExchangeResult<OrderInfo> {
    let id = match v.get("orderId") {
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::String(s)) => s.clone(),
        _ => return Err(bad("order")),
    };
    let quantity = num(v, "origQty");
    let filled = num(v, "executedQty");
    let status = parse_status(text(v, "status"));
    let avg = num(v, "avgPrice");
    let limit = num(v, "price");
    let client_id = Some(text(v, "clientOrderId")).filter(|s| !s.is_empty()).map(str::to_string);

    Ok(OrderInfo {
        id,
        client_id,
        symbol: symbol.to_string(),
        status,
        quantity,
        filled,
        remaining: (quantity - filled).max(0.0),
        price: [avg, limit].into_iter().find(|p| *p > 0.0),
    })
}

/// Render a quantity with as many decimals as the step has.
pub fn format_quantity(quantity: f64, step: f64) -> String {
    let decimals = step_decimals(step);
    format!("{quantity:.decimals$}")
}

fn step_decimals(step: f64) -> usize {
    let s = format!("{step}");
    s.split_once('.').map(|(_, frac)| frac.trim_end_matches('0').len()).unwrap_or(0)
}
