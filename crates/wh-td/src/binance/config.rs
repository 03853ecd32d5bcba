//! Binance USDⓈ-M adapter configuration.
//!
//! Built from an [`AccountConfig`]; URLs default to production and switch to
//! the futures testnet when the account sets `SANDBOX`.

use wh_core::config::AccountConfig;

/// Configuration for one Binance USDⓈ-M account.
#[derive(Debug, Clone)]
pub struct BinanceConfig {
    /// Account name, used as a log prefix.
    pub account: String,

    /// Binance API key.
    pub api_key: String,

    /// Binance API secret (HMAC-SHA256 signing).
    pub secret_key: String,

    /// REST base URL.
    pub rest_url: String,

    /// `recvWindow` for signed requests (milliseconds).
    pub recv_window: u64,
}

impl BinanceConfig {
    pub fn from_account(account: &AccountConfig) -> Self {
        Self {
            account: account.name.clone(),
            api_key: account.api_key.clone(),
            secret_key: account.secret_key.clone(),
            rest_url: if account.sandbox {
                default_testnet_rest_url()
            } else {
                default_rest_url()
            },
            recv_window: default_recv_window(),
        }
    }
}

impl Default for BinanceConfig {
    fn default() -> Self {
        Self {
            account: String::new(),
            api_key: String::new(),
            secret_key: String::new(),
            rest_url: default_rest_url(),
            recv_window: default_recv_window(),
        }
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

fn default_rest_url() -> String {
    "https://fapi.binance.com".into()
}

fn default_testnet_rest_url() -> String {
    "https://testnet.binancefuture.com".into()
}

fn default_recv_window() -> u64 {
    5000
}
