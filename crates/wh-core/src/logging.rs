//! Logging initialization using the `tracing` ecosystem.
//!
//! Console output is human-readable. With a log directory configured, a
//! daily-rotating file receives the same events as JSON lines, one object
//! per event, so order and alert history can be grepped or loaded later.
//! `RUST_LOG` overrides the configured level.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the global tracing subscriber. Call once at program start.
///
/// - `log_level`: filter used when `RUST_LOG` is not set (e.g. `"info"`)
/// - `log_dir`: optional directory for daily-rotating JSON log files
/// - `module_name`: log file prefix (e.g. `"whook"`)
pub fn init_logging(log_level: &str, log_dir: Option<&str>, module_name: &str) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    let console_layer = fmt::layer().with_target(false).with_ansi(true);

    let file_layer = log_dir.map(|dir| {
        fmt::layer()
            .json()
            .with_writer(tracing_appender::rolling::daily(dir, format!("{module_name}.log")))
            .with_current_span(false)
            .with_target(true)
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();
}
