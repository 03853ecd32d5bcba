//! Single-owner task per account.
//!
//! The task owns the [`Account`] and multiplexes three inputs with
//! `tokio::select!`: alert lines and status requests from the listener, the
//! fast queue tick and the slow position refresh. Nothing else can reach the
//! account's state, so the three never interleave.

use std::time::Duration;

use anyhow::{Result, anyhow};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::account::{Account, AccountStatus, AlertOutcome};

/// Commands accepted by an account task.
#[derive(Debug)]
pub enum AccountCommand {
    Alert {
        line: String,
        reply: oneshot::Sender<AlertOutcome>,
    },
    Status {
        reply: oneshot::Sender<AccountStatus>,
    },
    Shutdown,
}

/// Cloneable handle to a running account task.
#[derive(Debug, Clone)]
pub struct AccountHandle {
    name: String,
    tx: mpsc::Sender<AccountCommand>,
}

impl AccountHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Hand one alert line to the account and wait for its outcome.
    pub async fn submit(&self, line: &str) -> Result<AlertOutcome> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(AccountCommand::Alert {
                line: line.to_string(),
                reply,
            })
            .await
            .map_err(|_| anyhow!("account '{}' is not running", self.name))?;
        rx.await.map_err(|_| anyhow!("account '{}' dropped the alert", self.name))
    }

    pub async fn status(&self) -> Result<AccountStatus> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(AccountCommand::Status { reply })
            .await
            .map_err(|_| anyhow!("account '{}' is not running", self.name))?;
        rx.await.map_err(|_| anyhow!("account '{}' dropped the status request", self.name))
    }

    pub async fn shutdown(&self) {
        if self.tx.send(AccountCommand::Shutdown).await.is_err() {
            debug!("[{}] already stopped", self.name);
        }
    }
}

/// Command channel depth per account.
const CHANNEL_CAPACITY: usize = 256;

/// Spawn the task that owns `account`.
pub fn spawn(account: Account) -> (AccountHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    let handle = AccountHandle {
        name: account.name().to_string(),
        tx,
    };
    let task = tokio::spawn(run(account, rx));
    (handle, task)
}

fn interval(period: Duration) -> tokio::time::Interval {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

async fn run(mut account: Account, mut rx: mpsc::Receiver<AccountCommand>) {
    let mut tick = interval(account.config().tick());
    let mut refresh = interval(account.config().refresh_interval());
    // The first refresh tick fires immediately; the snapshot from connect is fresh.
    refresh.tick().await;
    info!("[{}] account task started", account.name());

    loop {
        tokio::select! {
            cmd = rx.recv() => match cmd {
                Some(AccountCommand::Alert { line, reply }) => {
                    let outcome = account.handle_line(&line).await;
                    let _ = reply.send(outcome);
                }
                Some(AccountCommand::Status { reply }) => {
                    let _ = reply.send(account.status());
                }
                Some(AccountCommand::Shutdown) | None => break,
            },
            _ = tick.tick() => account.tick().await,
            _ = refresh.tick() => {
                if let Err(e) = account.refresh_positions(true).await {
                    warn!("[{}] periodic position refresh failed: {e}", account.name());
                }
            }
        }
    }
    info!("[{}] account task stopped", account.name());
}
