//! Configuration parsing for the whook engine.
//!
//! Everything is read from a single JSON config file. The top-level structure
//! holds the webhook listener address, logging metadata, engine tuning and an
//! `accounts` array where each entry describes one exchange account.
//!
//! # Example config
//!
//! ```json
//! {
//!   "listener": { "bind": "0.0.0.0:80", "path": "/whook" },
//!   "log": { "level": "info", "dir": "logs" },
//!   "engine": { "tick_ms": 500, "order_timeout_secs": 10 },
//!   "accounts": [{
//!     "EXCHANGE": "binanceusdm",
//!     "ACCOUNT_ID": "main",
//!     "API_KEY": "...",
//!     "SECRET_KEY": "...",
//!     "MARGIN_MODE": "isolated"
//!   }]
//! }
//! ```

use std::collections::HashSet;
use std::time::Duration;

use serde::Deserialize;

use crate::error::WhError;
use crate::types::{ExchangeId, MarginMode};

/// Top-level application config, deserialized from a JSON file.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Webhook listener settings.
    #[serde(default)]
    pub listener: ListenerConfig,

    /// Logging settings.
    #[serde(default)]
    pub log: LogConfig,

    /// Engine timing and sizing knobs.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Exchange accounts, one engine actor per entry.
    pub accounts: Vec<AccountConfig>,
}

/// HTTP webhook listener.
#[derive(Debug, Clone, Deserialize)]
pub struct ListenerConfig {
    /// Socket address to bind.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Route that receives alerts (POST) and serves status (GET).
    #[serde(default = "default_path")]
    pub path: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            path: default_path(),
        }
    }
}

/// Logging block.
#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Directory for daily-rotating log files; console only when absent.
    pub dir: Option<String>,
    #[serde(default = "default_module_name")]
    pub module_name: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            dir: None,
            module_name: default_module_name(),
        }
    }
}

/// Engine tuning. Every field has a default so the block may be omitted.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Fast tick: order queue processing period.
    pub tick_ms: u64,
    /// Slow tick: full position refresh period.
    pub refresh_secs: u64,
    /// Queued or active orders older than this are dropped.
    pub order_timeout_secs: u64,
    /// Upper bound for any single exchange call.
    pub exchange_timeout_secs: u64,
    /// Latched alerts older than this are dropped and reported.
    pub alert_timeout_secs: u64,
    /// Delay before a latched alert is retried after a transient error.
    pub latch_retry_ms: u64,
    /// Added to an order's delay on each rate-limit rejection.
    pub rate_limit_backoff_ms: u64,
    /// Delay for re-enqueued partial-fill remainders.
    pub remainder_delay_ms: u64,
    /// Delay of the second half of a side-flip split.
    pub flip_split_delay_ms: u64,
    /// Fraction of the free balance considered spendable.
    pub balance_safety_factor: f64,
    /// Relative price move beyond which same-side targets are sized from capital.
    pub price_drift_tolerance: f64,
    /// Fraction of the target margin held back for fees in capital-based sizing.
    pub capital_fee_allowance: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_ms: 500,
            refresh_secs: 20,
            order_timeout_secs: 10,
            exchange_timeout_secs: 8,
            alert_timeout_secs: 60,
            latch_retry_ms: 2000,
            rate_limit_backoff_ms: 500,
            remainder_delay_ms: 500,
            flip_split_delay_ms: 1000,
            balance_safety_factor: 0.985,
            price_drift_tolerance: 0.001,
            capital_fee_allowance: 0.0,
        }
    }
}

impl EngineConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_secs)
    }

    pub fn order_timeout(&self) -> Duration {
        Duration::from_secs(self.order_timeout_secs)
    }

    pub fn exchange_timeout(&self) -> Duration {
        Duration::from_secs(self.exchange_timeout_secs)
    }

    pub fn alert_timeout(&self) -> Duration {
        Duration::from_secs(self.alert_timeout_secs)
    }

    pub fn latch_retry(&self) -> Duration {
        Duration::from_millis(self.latch_retry_ms)
    }

    pub fn rate_limit_backoff(&self) -> Duration {
        Duration::from_millis(self.rate_limit_backoff_ms)
    }

    pub fn remainder_delay(&self) -> Duration {
        Duration::from_millis(self.remainder_delay_ms)
    }

    pub fn flip_split_delay(&self) -> Duration {
        Duration::from_millis(self.flip_split_delay_ms)
    }
}

/// One exchange account.
///
/// Keys accept the upper-case names of the classic `accounts.json`
/// template as well as lower-case aliases.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountConfig {
    /// Exchange identifier (e.g. `"binanceusdm"`).
    #[serde(rename = "EXCHANGE", alias = "exchange")]
    pub exchange: String,

    /// Account name used as the routing token in alerts.
    #[serde(rename = "ACCOUNT_ID", alias = "account_id", alias = "name")]
    pub name: String,

    #[serde(rename = "API_KEY", alias = "api_key", default)]
    pub api_key: String,

    #[serde(rename = "SECRET_KEY", alias = "secret_key", default)]
    pub secret_key: String,

    /// API passphrase (exchanges that use one).
    #[serde(rename = "PASSWORD", alias = "password", default)]
    pub password: String,

    /// Margin mode every new position is opened with.
    #[serde(rename = "MARGIN_MODE", alias = "margin_mode", default = "default_margin_mode")]
    pub margin_mode: String,

    /// Use the exchange's testnet endpoints.
    #[serde(rename = "SANDBOX", alias = "sandbox", default)]
    pub sandbox: bool,
}

impl AccountConfig {
    pub fn exchange_id(&self) -> Result<ExchangeId, WhError> {
        self.exchange.parse()
    }

    pub fn margin_mode(&self) -> Result<MarginMode, WhError> {
        match self.margin_mode.parse()? {
            MarginMode::Unknown => Err(WhError::Config(format!(
                "account '{}': MARGIN_MODE must be isolated or cross",
                self.name
            ))),
            mode => Ok(mode),
        }
    }
}

impl AppConfig {
    /// Reject configs the engine cannot run with.
    pub fn validate(&self) -> Result<(), WhError> {
        if self.accounts.is_empty() {
            return Err(WhError::Config("no accounts configured".into()));
        }

        let mut seen = HashSet::new();
        for acct in &self.accounts {
            if acct.name.is_empty() || acct.name.chars().all(|c| c.is_ascii_digit()) {
                return Err(WhError::Config(format!("account name '{}' must not be empty or numeric", acct.name)));
            }
            if acct.name.chars().any(char::is_whitespace) {
                return Err(WhError::Config(format!("account name '{}' must be a single token", acct.name)));
            }
            if !seen.insert(acct.name.to_ascii_lowercase()) {
                return Err(WhError::Config(format!("duplicate account name '{}'", acct.name)));
            }

            let exchange = acct.exchange_id()?;
            acct.margin_mode()?;

            if exchange != ExchangeId::Mock && (acct.api_key.is_empty() || acct.secret_key.is_empty()) {
                return Err(WhError::Config(format!("account '{}': API_KEY and SECRET_KEY are required", acct.name)));
            }
        }

        if self.engine.tick_ms == 0 || self.engine.refresh_secs == 0 {
            return Err(WhError::Config("engine.tick_ms and engine.refresh_secs must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.engine.balance_safety_factor) {
            return Err(WhError::Config("engine.balance_safety_factor must be within [0, 1]".into()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Defaults (used by serde)
// ---------------------------------------------------------------------------

fn default_bind() -> String {
    "0.0.0.0:80".into()
}

fn default_path() -> String {
    "/whook".into()
}

fn default_log_level() -> String {
    "info".into()
}

fn default_module_name() -> String {
    "whook".into()
}

fn default_margin_mode() -> String {
    "isolated".into()
}

/// Load, parse and validate a JSON config file.
pub fn load_config(path: &std::path::Path) -> anyhow::Result<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: AppConfig = serde_json::from_str(&content)?;
    config.validate()?;
    Ok(config)
}
