//! # wh-runner
//!
//! Main entry point for the webhook order engine.
//!
//! Loads a JSON configuration file, connects every configured exchange
//! account, spawns one engine task per account and serves the webhook
//! listener until Ctrl+C.
//!
//! # Usage
//!
//! ```bash
//! wh-runner config.json --log-level info
//! ```

mod server;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use wh_engine::bounded::TimeoutExchange;
use wh_engine::{Account, AccountStore, actor};

/// Webhook alert to exchange order engine.
#[derive(Parser)]
#[command(name = "wh-runner", about = "Webhook alert to exchange order engine")]
struct Cli {
    /// Configuration file path (JSON).
    #[arg(default_value = "config.json")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error). Overrides the config file.
    #[arg(short, long)]
    log_level: Option<String>,

    /// Log directory for file output. Overrides the config file.
    #[arg(long)]
    log_dir: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 1. Load configuration
    let config = wh_core::config::load_config(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;

    // 2. Initialize logging
    let level = cli.log_level.as_deref().unwrap_or(&config.log.level);
    let log_dir = cli.log_dir.as_deref().or(config.log.dir.as_deref());
    wh_core::logging::init_logging(level, log_dir, &config.log.module_name);

    info!(
        "wh-runner starting: config={}, {} account(s), log_level={level}",
        cli.config.display(),
        config.accounts.len()
    );

    // 3. Connect accounts and spawn one engine task each
    let mut handles = Vec::new();
    let mut tasks = Vec::new();
    for (idx, acct) in config.accounts.iter().enumerate() {
        let margin_mode = acct.margin_mode()?;
        let ex = match wh_td::create_exchange(acct) {
            Ok(ex) => ex,
            Err(e) => {
                error!("account[{idx}] '{}': failed to create exchange '{}': {e}", acct.name, acct.exchange);
                continue;
            }
        };
        let ex = Arc::new(TimeoutExchange::new(ex, config.engine.exchange_timeout()));

        match Account::connect(&acct.name, ex, margin_mode, config.engine.clone()).await {
            Ok(account) => {
                info!("account[{idx}] '{}' connected (exchange={}, margin={margin_mode})", acct.name, acct.exchange);
                let (handle, task) = actor::spawn(account);
                handles.push(handle);
                tasks.push(task);
            }
            Err(e) => error!("account[{idx}] '{}': {e:#}", acct.name),
        }
    }
    if handles.is_empty() {
        anyhow::bail!("no account could be connected");
    }

    // 4. Serve the webhook listener until Ctrl+C
    let store = Arc::new(AccountStore::new(handles));
    server::serve(&config.listener.bind, &config.listener.path, server::AppState::new(store.clone())).await?;

    // 5. Stop account tasks
    store.shutdown().await;
    for task in tasks {
        if let Err(e) = task.await {
            error!("account task ended abnormally: {e}");
        }
    }

    info!("all accounts stopped, goodbye");
    Ok(())
}
