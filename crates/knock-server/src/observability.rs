//! Log output for the knock server.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::config::LoggingConfig;

/// Crates whose events follow the configured level. Everything else logs at
/// `warn` unless `RUST_LOG` says otherwise.
const KNOCK_TARGETS: [&str; 4] = ["knock_server", "knock_gate", "knock_cache", "tower_http"];

/// Filter directives for `level`.
pub fn directives(level: &str) -> String {
    let level = level.to_ascii_lowercase();
    KNOCK_TARGETS
        .iter()
        .fold(String::from("warn"), |acc, target| format!("{acc},{target}={level}"))
}

/// Installs the global subscriber. `RUST_LOG`, when set and valid, replaces
/// the configured level. A second call is a no-op.
pub fn init_tracing(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(directives(&config.level)));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .try_init();
}
