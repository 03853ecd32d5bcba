//! Per-exchange capability descriptors.
//!
//! Exchange quirks are data, not `if exchange == ...` branches: each adapter
//! returns one [`ExchangeCaps`] and the engine consults it when synchronizing
//! leverage/margin state and when building order requests.

/// Constraint on user-supplied client order ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientIdRule {
    /// Only ASCII digits are accepted.
    pub numeric_only: bool,
    /// Longest id accepted.
    pub max_len: usize,
}

impl ClientIdRule {
    /// Check an id against this rule, returning a user-facing reason on failure.
    pub fn check(&self, id: &str) -> Result<(), String> {
        if id.len() > self.max_len {
            return Err(format!("custom id '{id}' longer than {} characters", self.max_len));
        }
        if self.numeric_only && !id.chars().all(|c| c.is_ascii_digit()) {
            return Err(format!("custom id '{id}' must be numeric on this exchange"));
        }
        if !id.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')) {
            return Err(format!("custom id '{id}' contains unsupported characters"));
        }
        Ok(())
    }
}

/// What an exchange supports and how it wants to be driven.
#[derive(Debug, Clone, PartialEq)]
pub struct ExchangeCaps {
    /// One-way / hedged mode can be switched through the API.
    pub supports_position_mode: bool,
    /// Isolated / cross can be switched through the API.
    pub supports_margin_mode: bool,
    /// Margin mode changes must carry the leverage in the same call.
    pub margin_mode_with_leverage: bool,
    /// Leverage is an order parameter rather than a separate setting.
    pub leverage_in_order: bool,
    /// Orders accept a reduce-only flag.
    pub supports_reduce_only: bool,
    /// Client order id constraint.
    pub client_id: ClientIdRule,
    /// Settle currency used for balance and sizing.
    pub settle: &'static str,
}

impl ExchangeCaps {
    pub const BINANCE_USDM: Self = Self {
        supports_position_mode: true,
        supports_margin_mode: true,
        margin_mode_with_leverage: false,
        leverage_in_order: false,
        supports_reduce_only: true,
        client_id: ClientIdRule {
            numeric_only: false,
            max_len: 36,
        },
        settle: "USDT",
    };

    /// Permissive defaults for in-memory exchanges.
    pub const PERMISSIVE: Self = Self {
        supports_position_mode: true,
        supports_margin_mode: true,
        margin_mode_with_leverage: false,
        leverage_in_order: false,
        supports_reduce_only: true,
        client_id: ClientIdRule {
            numeric_only: false,
            max_len: 36,
        },
        settle: "USDT",
    };
}
