//! Parsed alert intent.
//!
//! An [`Alert`] is what one line of alert text asks for, after symbol
//! resolution and validation. It is immutable once parsed; its `Display`
//! form is valid alert text that parses back to the same intent.

use std::fmt;

use serde::Serialize;

/// What the alert asks the engine to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Command {
    Buy,
    Sell,
    Close,
    Position,
    ChangeLeverage,
    Cancel,
}

impl Command {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Buy => "buy",
            Self::Sell => "sell",
            Self::Close => "close",
            Self::Position => "position",
            Self::ChangeLeverage => "changeleverage",
            Self::Cancel => "cancel",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unit of an alert quantity.
///
/// Variants are ordered by precedence: when one alert carries several unit
/// markers the highest wins (percent over quote over contracts over base).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Unit {
    /// Bare number: base currency (e.g. BTC).
    #[default]
    Base,
    /// `@`: raw contracts.
    Contracts,
    /// `$`: quote currency.
    Quote,
    /// `%`: percent of account equity.
    Percent,
}

impl Unit {
    /// Suffix used when writing a quantity back as text.
    pub fn marker(self) -> &'static str {
        match self {
            Self::Base => "",
            Self::Contracts => "@",
            Self::Quote => "$",
            Self::Percent => "%",
        }
    }
}

/// `limit:<id>:<price>` parameters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LimitSpec {
    pub custom_id: String,
    pub price: f64,
}

/// One validated alert.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    /// Unified symbol.
    pub symbol: String,
    pub command: Command,
    /// Signed quantity in `unit`; zero when absent.
    pub quantity: f64,
    pub unit: Unit,
    /// Quote amounts are exposure rather than collateral.
    pub nominal: bool,
    /// Leverage token, already clamped to the market maximum.
    pub leverage: Option<u32>,
    pub reduce_only: bool,
    pub limit: Option<LimitSpec>,
    /// `cancel:<id>` target; `None` with [`Command::Cancel`] cancels everything.
    pub cancel_id: Option<String>,
}

impl Alert {
    pub fn has_quantity(&self) -> bool {
        self.quantity != 0.0
    }

    /// Sized from the current position: absolute targets, closes and reduces.
    pub fn depends_on_position(&self) -> bool {
        matches!(self.command, Command::Position | Command::Close) || self.reduce_only
    }
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol)?;
        match (&self.command, &self.cancel_id) {
            (Command::Cancel, Some(id)) => write!(f, " cancel:{id}")?,
            (cmd, _) => write!(f, " {cmd}")?,
        }
        if self.has_quantity() {
            write!(f, " {}{}", self.quantity, self.unit.marker())?;
        }
        if let Some(lev) = self.leverage {
            write!(f, " {lev}x")?;
        }
        if self.reduce_only {
            f.write_str(" reduce")?;
        }
        if self.nominal {
            f.write_str(" nominal")?;
        }
        if let Some(limit) = &self.limit {
            write!(f, " limit:{}:{}", limit.custom_id, limit.price)?;
        }
        Ok(())
    }
}
