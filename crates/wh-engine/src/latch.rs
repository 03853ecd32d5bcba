//! Deferred alerts.
//!
//! An alert whose symbol already has orders queued or in flight, or that hit
//! a transient exchange failure while being planned, is latched here and
//! replayed later. Alerts older than the alert timeout are given up on.

use std::fmt;
use std::time::Duration;

use tokio::time::Instant;

use crate::alert::Alert;

/// Why an alert was deferred.
#[derive(Debug, Clone, PartialEq)]
pub enum LatchReason {
    SymbolBusy,
    Transient(String),
}

impl fmt::Display for LatchReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SymbolBusy => f.write_str("symbol busy"),
            Self::Transient(cause) => write!(f, "exchange unavailable: {cause}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LatchedAlert {
    pub alert: Alert,
    /// Original line, for logs.
    pub text: String,
    pub reason: LatchReason,
    pub created_at: Instant,
    pub retry_at: Instant,
}

#[derive(Debug)]
pub struct AlertLatch {
    alerts: Vec<LatchedAlert>,
    retry: Duration,
    timeout: Duration,
}

impl AlertLatch {
    pub fn new(retry: Duration, timeout: Duration) -> Self {
        Self {
            alerts: Vec::new(),
            retry,
            timeout,
        }
    }

    pub fn len(&self) -> usize {
        self.alerts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty()
    }

    /// Latch a freshly received alert.
    pub fn hold(&mut self, alert: Alert, text: &str, reason: LatchReason) {
        let now = Instant::now();
        let retry_at = match reason {
            LatchReason::SymbolBusy => now,
            LatchReason::Transient(_) => now + self.retry,
        };
        self.alerts.push(LatchedAlert {
            alert,
            text: text.to_string(),
            reason,
            created_at: now,
            retry_at,
        });
    }

    /// Put back an alert taken by [`AlertLatch::take_ready`] that still
    /// cannot run. Its age keeps counting from the first receipt.
    pub fn requeue(&mut self, mut latched: LatchedAlert, reason: LatchReason) {
        let now = Instant::now();
        latched.retry_at = match reason {
            LatchReason::SymbolBusy => now,
            LatchReason::Transient(_) => now + self.retry,
        };
        latched.reason = reason;
        self.alerts.push(latched);
    }

    /// Remove and return alerts due for replay, plus those that expired.
    ///
    /// Busy-symbol alerts are due as soon as `busy` says the symbol is free;
    /// transient ones once their retry time passed. Receipt order is kept.
    pub fn take_ready(
        &mut self,
        now: Instant,
        busy: impl Fn(&str) -> bool,
    ) -> (Vec<LatchedAlert>, Vec<LatchedAlert>) {
        let mut ready = Vec::new();
        let mut expired = Vec::new();
        let mut kept = Vec::with_capacity(self.alerts.len());
        for latched in self.alerts.drain(..) {
            if now.saturating_duration_since(latched.created_at) > self.timeout {
                expired.push(latched);
            } else if now >= latched.retry_at && !busy(&latched.alert.symbol) {
                ready.push(latched);
            } else {
                kept.push(latched);
            }
        }
        self.alerts = kept;
        (ready, expired)
    }

    /// Drop latched alerts for `symbol`. Returns how many.
    pub fn discard(&mut self, symbol: &str) -> usize {
        let before = self.alerts.len();
        self.alerts.retain(|l| l.alert.symbol != symbol);
        before - self.alerts.len()
    }

    /// Pending alerts as text, oldest first.
    pub fn texts(&self) -> Vec<String> {
        self.alerts.iter().map(|l| l.text.clone()).collect()
    }
}
