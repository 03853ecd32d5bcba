//! Account registry and alert routing.
//!
//! The listener owns one [`AccountStore`]. A request body may hold several
//! alerts, one per line; each line goes to the account whose name appears
//! among its tokens.

use serde::Serialize;
use tracing::{error, warn};

use crate::account::{AccountStatus, AlertOutcome};
use crate::actor::AccountHandle;

/// Outcome of one line of a request body.
#[derive(Debug, Clone, Serialize)]
pub struct LineOutcome {
    pub line: String,
    pub account: Option<String>,
    pub outcome: String,
}

#[derive(Debug, Clone, Default)]
pub struct AccountStore {
    accounts: Vec<AccountHandle>,
}

impl AccountStore {
    pub fn new(accounts: Vec<AccountHandle>) -> Self {
        Self { accounts }
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Account named by one of the line's tokens. With a single account
    /// configured, lines that name none go to it.
    pub fn route(&self, line: &str) -> Option<&AccountHandle> {
        let named = line
            .split_whitespace()
            .find_map(|token| self.accounts.iter().find(|a| a.name().eq_ignore_ascii_case(token)));
        match named {
            Some(account) => Some(account),
            None if self.accounts.len() == 1 => self.accounts.first(),
            None => None,
        }
    }

    /// Execute every alert line of a request body, in order.
    ///
    /// Blank lines and `//` comments are skipped.
    pub async fn dispatch(&self, body: &str) -> Vec<LineOutcome> {
        let mut outcomes = Vec::new();
        for line in body.lines().map(str::trim) {
            if line.is_empty() || line.starts_with("//") {
                continue;
            }
            let Some(account) = self.route(line) else {
                warn!("account not found for alert '{line}'");
                outcomes.push(LineOutcome {
                    line: line.to_string(),
                    account: None,
                    outcome: AlertOutcome::Rejected("account not found".into()).to_string(),
                });
                continue;
            };
            let outcome = match account.submit(line).await {
                Ok(outcome) => outcome.to_string(),
                Err(e) => {
                    error!("{e}");
                    AlertOutcome::Rejected(e.to_string()).to_string()
                }
            };
            outcomes.push(LineOutcome {
                line: line.to_string(),
                account: Some(account.name().to_string()),
                outcome,
            });
        }
        outcomes
    }

    /// Status of every running account.
    pub async fn status(&self) -> Vec<AccountStatus> {
        let mut all = Vec::with_capacity(self.accounts.len());
        for account in &self.accounts {
            match account.status().await {
                Ok(status) => all.push(status),
                Err(e) => warn!("{e}"),
            }
        }
        all
    }

    pub async fn shutdown(&self) {
        for account in &self.accounts {
            account.shutdown().await;
        }
    }
}
