use tracing_subscriber::{fmt, EnvFilter};

/// Initialize the global tracing subscriber.
///
/// Honors `RUST_LOG`; defaults to `info` for this crate and `warn` for
/// dependencies. Safe to call once from `main`.
pub fn init_logger() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,kiro2cc=info"));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
