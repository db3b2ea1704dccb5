//! Console logging for the harvest binary.

use tracing_subscriber::EnvFilter;

/// Installs a stdout subscriber filtered by `RUST_LOG`.
///
/// Defaults to `info` overall and `debug` for this crate when `RUST_LOG` is
/// unset or unparseable.
pub fn init_logging() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,reportkit=debug"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stdout)
        .with_target(false)
        .init();
}
