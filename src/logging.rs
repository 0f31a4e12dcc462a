//! Logging initialization: stderr sink with environment overrides.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initializes the tracing subscriber; verbose mode turns on the wire-level
/// request/response dumps.
pub fn init_logging(verbose: bool) {
    let default_filter = if verbose { "httpsrv=debug" } else { "httpsrv=info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
