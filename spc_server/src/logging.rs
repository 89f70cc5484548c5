//! Tracing setup for the server binary.
//!
//! Filtering follows `RUST_LOG` (default `info`). Stdout gets human-readable
//! lines, or JSON lines when `SPC_LOG_JSON` is set. With `SPC_LOG_DIR` a
//! daily-rolling `spc-server.log` is written there as well.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;

/// Installs the global subscriber. Keep the returned guard alive for as long
/// as the file log should be flushed.
pub fn init(config: &Config) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let json = config.log_json.then(|| fmt::layer().json());
    let plain = (!config.log_json).then(fmt::layer);

    let (file, guard) = match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "spc-server.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(json)
        .with(plain)
        .with(file)
        .init();

    guard
}
