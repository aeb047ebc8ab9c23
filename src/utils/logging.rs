use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "warn";

/// Pick the filter directive: `RUST_LOG` wins, then the configured one.
pub fn filter_from(configured: Option<&str>) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        configured
            .and_then(|directive| EnvFilter::try_new(directive).ok())
            .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER))
    })
}

/// Install the global subscriber. Diagnostics go to stderr so streamed
/// replies on stdout stay clean. Calling this twice is harmless.
pub fn init_tracing(configured: Option<&str>) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter_from(configured))
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
