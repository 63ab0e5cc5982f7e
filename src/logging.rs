//! Tracing subscriber setup.
//!
//! Logs go to stderr so `citegate search` output on stdout stays clean.
//! `RUST_LOG` takes precedence over `[logging].level`.

use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

const FALLBACK_LEVEL: &str = "info";

pub fn init_tracing(config: &LoggingConfig) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter(&config.level))
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn env_filter(configured: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(configured))
        .unwrap_or_else(|_| EnvFilter::new(FALLBACK_LEVEL))
}
