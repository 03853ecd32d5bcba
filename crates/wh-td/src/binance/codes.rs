//! Binance error-code classification.
//!
//! Binance rejects requests with a non-2xx status and a `{"code": -NNNN,
//! "msg": "..."}` body. [`classify`] maps that pair to an [`ExchangeError`].

use crate::error::ExchangeError;

/// Margin / balance shortfalls.
const INSUFFICIENT: &[i64] = &[-2018, -2019];

/// Request weight or order-rate limits.
const RATE_LIMIT: &[i64] = &[-1003, -1015];

/// Setting already in effect (margin type, position side).
const NO_CHANGE: &[i64] = &[-4046, -4059];

/// Unknown order on query or cancel.
const NOT_FOUND: &[i64] = &[-2011, -2013];

/// Order parameter rejections.
const INVALID: &[i64] = &[
    -1013, -1102, -1111, -1116, -2022, -4003, -4005, -4015, -4016, -4024, -4061, -4116, -4131, -4164,
];

/// Server busy or unknown internal state.
const UNAVAILABLE: &[i64] = &[-1001, -1007];

/// Classify a rejected response.
pub fn classify(http_status: u16, code: Option<i64>, msg: &str) -> ExchangeError {
    let detail = match code {
        Some(c) => format!("{c}: {msg}"),
        None => format!("HTTP {http_status}: {msg}"),
    };

    if let Some(c) = code {
        if INSUFFICIENT.contains(&c) {
            return ExchangeError::InsufficientFunds(detail);
        }
        if RATE_LIMIT.contains(&c) {
            return ExchangeError::RateLimited(detail);
        }
        if NO_CHANGE.contains(&c) {
            return ExchangeError::NoChange(detail);
        }
        if NOT_FOUND.contains(&c) {
            return ExchangeError::OrderNotFound(detail);
        }
        if INVALID.contains(&c) {
            return ExchangeError::InvalidOrder(detail);
        }
        if UNAVAILABLE.contains(&c) {
            return ExchangeError::NotAvailable(detail);
        }
    }

    if msg.contains("No need to change") {
        return ExchangeError::NoChange(detail);
    }
    match http_status {
        429 | 418 => ExchangeError::RateLimited(detail),
        500..=599 => ExchangeError::NotAvailable(detail),
        _ => ExchangeError::Unclassified(detail),
    }
}

/// Classify a raw response body, falling back to the status alone when the
/// body is not Binance's error JSON.
pub fn classify_body(http_status: u16, body: &str) -> ExchangeError {
    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(v) => {
            let code = v.get("code").and_then(|c| c.as_i64());
            let msg = v.get("msg").and_then(|m| m.as_str()).unwrap_or(body);
            classify(http_status, code, msg)
        }
        Err(_) => classify(http_status, None, body.trim()),
    }
}
