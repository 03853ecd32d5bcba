//! Plain-text alert parser.
//!
//! Tokens are whitespace separated and order independent. Each token is
//! classified by the first rule that matches:
//!
//! 1. a tradable symbol of the account (`BTCUSDT`, `BTCUSDT.P`, `BTC/USDT`, ...)
//! 2. a quantity, optionally with a unit marker (`100$`, `$100`, `15@`, `50%`,
//!    `-0.5`), or a standalone marker (`$`, `@`, `%`) for the previous number
//! 3. a leverage token (`10x`, `x10`)
//! 4. a keyword (`buy`/`long`, `sell`/`short`, `close`, `position`/`pos`,
//!    `changeleverage`, `cancel`, `cancel:<id>`, `limit:<id>:<price>`,
//!    `reduce`, `nominal`)
//!
//! Anything else is logged and ignored.

use tracing::warn;
use wh_core::types::MarketTable;
use wh_td::ClientIdRule;

use crate::alert::{Alert, Command, LimitSpec, Unit};
use crate::error::ParseError;

/// Accepted length of user-supplied custom ids.
const CUSTOM_ID_LEN: std::ops::RangeInclusive<usize> = 2..=30;

/// What the parser needs to know about the account a line was routed to.
pub struct ParseContext<'a> {
    /// Account name; its token is skipped.
    pub account: &'a str,
    pub markets: &'a MarketTable,
    pub client_ids: &'a ClientIdRule,
}

/// Accumulates classified tokens before validation.
#[derive(Default)]
struct Draft {
    symbol: Option<(String, Option<u32>)>,
    command: Option<Command>,
    quantity: Option<f64>,
    unit: Unit,
    nominal: bool,
    leverage: Option<u32>,
    reduce_only: bool,
    limit: Option<LimitSpec>,
    cancel_id: Option<String>,
}

/// Parse one line of alert text.
pub fn parse_alert(line: &str, ctx: &ParseContext<'_>) -> Result<Alert, ParseError> {
    let mut d = Draft::default();

    for token in line.split_whitespace() {
        if token.eq_ignore_ascii_case(ctx.account) {
            continue;
        }
        if let Some(m) = ctx.markets.resolve(token) {
            d.symbol = Some((m.symbol.clone(), m.max_leverage));
            continue;
        }
        if let Some((value, unit)) = parse_quantity(token) {
            d.quantity = Some(value);
            d.unit = d.unit.max(unit);
            continue;
        }
        if let Some(unit) = standalone_marker(token) {
            d.unit = d.unit.max(unit);
            continue;
        }
        if let Some(lev) = parse_leverage(token) {
            d.leverage = Some(lev);
            continue;
        }
        if !classify_keyword(token, &mut d)? {
            warn!("[{}] ignoring unrecognized token '{token}'", ctx.account);
        }
    }

    validate(d, ctx)
}

/// Returns `Ok(false)` when the token is not a keyword.
fn classify_keyword(token: &str, d: &mut Draft) -> Result<bool, ParseError> {
    let lower = token.to_ascii_lowercase();
    match lower.as_str() {
        "buy" | "long" => d.command = Some(Command::Buy),
        "sell" | "short" => d.command = Some(Command::Sell),
        "close" => d.command = Some(Command::Close),
        "position" | "pos" => d.command = Some(Command::Position),
        "changeleverage" => d.command = Some(Command::ChangeLeverage),
        "cancel" => d.command = Some(Command::Cancel),
        "reduce" | "reduceonly" => d.reduce_only = true,
        "nominal" => d.nominal = true,
        _ if lower.starts_with("cancel:") => {
            d.command = Some(Command::Cancel);
            d.cancel_id = Some(token["cancel:".len()..].to_string());
        }
        _ if lower.starts_with("limit:") => {
            let mut parts = token.splitn(3, ':').skip(1);
            let id = parts.next().unwrap_or_default();
            let price = parts
                .next()
                .and_then(parse_number)
                .filter(|p| *p > 0.0)
                .ok_or_else(|| ParseError::BadLimit(token.to_string()))?;
            d.limit = Some(LimitSpec {
                custom_id: id.to_string(),
                price,
            });
        }
        _ => return Ok(false),
    }
    Ok(true)
}

fn validate(d: Draft, ctx: &ParseContext<'_>) -> Result<Alert, ParseError> {
    let (symbol, max_leverage) = d.symbol.ok_or(ParseError::MissingSymbol)?;
    let command = d.command.ok_or(ParseError::MissingCommand)?;
    let mut quantity = d.quantity.unwrap_or(0.0);
    let mut unit = d.unit;
    let mut reduce_only = d.reduce_only;

    let mut leverage = d.leverage;
    if let (Some(lev), Some(max)) = (leverage, max_leverage) {
        if lev > max {
            warn!("[{}] leverage {lev}x out of bounds for {symbol}, using {max}x", ctx.account);
            leverage = Some(max);
        }
    }

    match command {
        Command::Buy if quantity <= 0.0 => return Err(ParseError::NonPositiveQuantity(command)),
        Command::Sell => {
            quantity = quantity.abs();
            if quantity == 0.0 {
                return Err(ParseError::NonPositiveQuantity(command));
            }
        }
        Command::Close => {
            if unit == Unit::Percent {
                if quantity <= 0.0 || quantity > 100.0 {
                    return Err(ParseError::BadPercentage(quantity));
                }
            } else if quantity != 0.0 {
                warn!("[{}] close takes only a percentage, ignoring {quantity}", ctx.account);
                quantity = 0.0;
                unit = Unit::Base;
            }
        }
        Command::ChangeLeverage if leverage.is_none() => return Err(ParseError::MissingLeverage),
        _ => {}
    }

    if d.limit.is_some() && !matches!(command, Command::Buy | Command::Sell) {
        return Err(ParseError::LimitWithoutTrade);
    }
    if reduce_only && !matches!(command, Command::Buy | Command::Sell | Command::Close) {
        warn!("[{}] 'reduce' has no meaning for {command}, ignoring", ctx.account);
        reduce_only = false;
    }
    if command == Command::Cancel {
        quantity = 0.0;
        unit = Unit::Base;
    }

    let custom_id = d.limit.as_ref().map(|l| l.custom_id.as_str()).or(d.cancel_id.as_deref());
    if let Some(id) = custom_id {
        if !CUSTOM_ID_LEN.contains(&id.chars().count()) {
            return Err(ParseError::CustomIdLength(id.to_string()));
        }
        ctx.client_ids.check(id).map_err(ParseError::CustomIdRejected)?;
    }

    Ok(Alert {
        symbol,
        command,
        quantity,
        unit,
        nominal: d.nominal,
        leverage,
        reduce_only,
        limit: d.limit,
        cancel_id: d.cancel_id,
    })
}

/// A finite decimal number, optionally negative. Rejects `inf`, `nan`, `1e5`.
fn parse_number(s: &str) -> Option<f64> {
    let digits = s.strip_prefix('-').unwrap_or(s);
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return None;
    }
    s.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// `100$`, `$100`, `15@`, `@15`, `50%`, `-0.5`, `3`.
fn parse_quantity(token: &str) -> Option<(f64, Unit)> {
    let markers = [('%', Unit::Percent), ('$', Unit::Quote), ('@', Unit::Contracts)];
    for (marker, unit) in markers {
        if let Some(rest) = token.strip_suffix(marker).or_else(|| token.strip_prefix(marker)) {
            return parse_number(rest).map(|v| (v, unit));
        }
    }
    parse_number(token).map(|v| (v, Unit::Base))
}

fn standalone_marker(token: &str) -> Option<Unit> {
    match token {
        "%" => Some(Unit::Percent),
        "$" => Some(Unit::Quote),
        "@" => Some(Unit::Contracts),
        _ => None,
    }
}

/// `10x` or `x10`, at least 1.
fn parse_leverage(token: &str) -> Option<u32> {
    let lower = token.to_ascii_lowercase();
    let digits = lower.strip_suffix('x').or_else(|| lower.strip_prefix('x'))?;
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    digits.parse::<u32>().ok().filter(|l| *l >= 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wh_core::types::MarketInfo;
    use wh_td::ExchangeCaps;

    fn market(base: &str, max_leverage: u32) -> MarketInfo {
        MarketInfo {
            symbol: MarketInfo::unified(base, "USDT", "USDT"),
            id: format!("{base}USDT"),
            base: base.into(),
            quote: "USDT".into(),
            settle: "USDT".into(),
            contract_size: 1.0,
            amount_step: 0.001,
            min_amount: 0.001,
            max_leverage: Some(max_leverage),
        }
    }

    fn markets() -> MarketTable {
        MarketTable::new(vec![market("BTC", 125), market("ETH", 100), market("GMX", 20)])
    }

    fn parse(line: &str) -> Result<Alert, ParseError> {
        let m = markets();
        let rule = ExchangeCaps::BINANCE_USDM.client_id;
        parse_alert(
            line,
            &ParseContext {
                account: "main",
                markets: &m,
                client_ids: &rule,
            },
        )
    }

    #[test]
    fn position_with_contracts_and_leverage() {
        let a = parse("main BTCUSDT position 15 @ x5").unwrap();
        assert_eq!(a.symbol, "BTC/USDT:USDT");
        assert_eq!(a.command, Command::Position);
        assert_eq!(a.quantity, 15.0);
        assert_eq!(a.unit, Unit::Contracts);
        assert_eq!(a.leverage, Some(5));
    }

    #[test]
    fn tokens_are_order_independent_and_case_insensitive() {
        let a = parse("10X LONG 100$ main binance:ethusdt.p").unwrap();
        assert_eq!(a.symbol, "ETH/USDT:USDT");
        assert_eq!(a.command, Command::Buy);
        assert_eq!((a.quantity, a.unit), (100.0, Unit::Quote));
        assert_eq!(a.leverage, Some(10));
    }

    #[test]
    fn unit_precedence() {
        let a = parse("main BTCUSDT position 50 % $").unwrap();
        assert_eq!(a.unit, Unit::Percent);
        let a = parse("main BTCUSDT buy $20 @").unwrap();
        assert_eq!(a.unit, Unit::Quote);
        let a = parse("main BTCUSDT pos -0.5").unwrap();
        assert_eq!((a.quantity, a.unit), (-0.5, Unit::Base));
    }

    #[test]
    fn sell_with_negative_quantity_is_made_positive() {
        let a = parse("main BTCUSDT sell -0.01").unwrap();
        assert_eq!(a.quantity, 0.01);
        assert_eq!(parse("main BTCUSDT buy -0.01"), Err(ParseError::NonPositiveQuantity(Command::Buy)));
        assert_eq!(parse("main BTCUSDT sell"), Err(ParseError::NonPositiveQuantity(Command::Sell)));
    }

    #[test]
    fn required_parts() {
        assert_eq!(parse("main buy 1"), Err(ParseError::MissingSymbol));
        assert_eq!(parse("main BTCUSDT 1"), Err(ParseError::MissingCommand));
        assert_eq!(parse("main BTCUSDT changeleverage"), Err(ParseError::MissingLeverage));
        assert!(parse("main BTCUSDT changeleverage 3x").is_ok());
        assert!(parse("main BTCUSDT position 0").is_ok());
    }

    #[test]
    fn leverage_is_clamped_to_market_max() {
        let a = parse("main GMXUSDT buy 1 50x").unwrap();
        assert_eq!(a.leverage, Some(20));
    }

    #[test]
    fn unknown_tokens_are_ignored() {
        let a = parse("main BTCUSDT close please now").unwrap();
        assert_eq!(a.command, Command::Close);
        assert_eq!(a.quantity, 0.0);
    }

    #[test]
    fn close_percentages() {
        let a = parse("main BTCUSDT close 50%").unwrap();
        assert_eq!((a.quantity, a.unit), (50.0, Unit::Percent));
        assert_eq!(parse("main BTCUSDT close 150%"), Err(ParseError::BadPercentage(150.0)));
        let a = parse("main BTCUSDT close 3").unwrap();
        assert_eq!(a.quantity, 0.0);
    }

    #[test]
    fn limit_and_cancel_ids() {
        let a = parse("main BTCUSDT buy 0.01 limit:tp1:29000.5").unwrap();
        assert_eq!(
            a.limit,
            Some(LimitSpec {
                custom_id: "tp1".into(),
                price: 29_000.5
            })
        );
        assert_eq!(parse("main BTCUSDT close limit:tp1:29000"), Err(ParseError::LimitWithoutTrade));
        assert!(matches!(parse("main BTCUSDT buy 1 limit:tp1:abc"), Err(ParseError::BadLimit(_))));
        assert!(matches!(parse("main BTCUSDT cancel:x"), Err(ParseError::CustomIdLength(_))));
        assert!(matches!(parse("main BTCUSDT cancel:bad#id"), Err(ParseError::CustomIdRejected(_))));

        let c = parse("main BTCUSDT cancel:TP1").unwrap();
        assert_eq!(c.command, Command::Cancel);
        assert_eq!(c.cancel_id.as_deref(), Some("TP1"));
        let all = parse("main BTCUSDT cancel").unwrap();
        assert_eq!(all.cancel_id, None);
    }

    #[test]
    fn numeric_only_ids_are_checked_against_the_exchange() {
        let m = markets();
        let rule = ClientIdRule {
            numeric_only: true,
            max_len: 30,
        };
        let ctx = ParseContext {
            account: "main",
            markets: &m,
            client_ids: &rule,
        };
        assert!(parse_alert("BTCUSDT cancel:12345", &ctx).is_ok());
        assert!(matches!(parse_alert("BTCUSDT cancel:tp1", &ctx), Err(ParseError::CustomIdRejected(_))));
    }

    #[test]
    fn close_and_cancel_reparse_to_the_same_intent() {
        for line in [
            "main BTCUSDT close",
            "main BTCUSDT close 25%",
            "main ETHUSDT cancel",
            "main ETHUSDT cancel:order-7",
            "main BTCUSDT close reduce",
        ] {
            let first = parse(line).unwrap();
            let again = parse(&first.to_string()).unwrap();
            assert_eq!(first, again, "{line}");
        }
    }

    #[test]
    fn helpers() {
        assert_eq!(parse_leverage("X20"), Some(20));
        assert_eq!(parse_leverage("0x"), None);
        assert_eq!(parse_leverage("x"), None);
        assert_eq!(parse_quantity("-12.5$"), Some((-12.5, Unit::Quote)));
        assert_eq!(parse_quantity("@7"), Some((7.0, Unit::Contracts)));
        assert_eq!(parse_quantity("inf"), None);
        assert_eq!(parse_quantity("1e5"), None);
    }
}
