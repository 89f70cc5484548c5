mod cli;
mod output;
mod token;

pub use cli::{Cli, Error};

/// Diagnostics go to stderr so command output stays clean; `RUST_LOG`
/// overrides the default `warn`.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();
}
