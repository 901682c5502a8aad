use tracing_subscriber::{fmt, EnvFilter};

/// Filter used when `RUST_LOG` is unset. sqlx logs every statement at
/// `info`, which drowns out guard decisions.
const DEFAULT_FILTER: &str = "info,sqlx=warn";

/// Install the global tracing subscriber. Call once, first thing in `main`.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Logging initialized");
}
