use tracing_subscriber::EnvFilter;

/// Used when `RUST_LOG` is unset: ferry's own crates at `info`, everything
/// else (hyper, reqwest, tower) only at `warn`.
pub const DEFAULT_LOG_DIRECTIVES: &str = "warn,ferry_core=info,ferry_server=info";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_DIRECTIVES))
}

/// Install the global tracing subscriber.
///
/// Debug builds log human-readable lines with targets; release builds log
/// JSON with the current span attached, so queue and operation fields from
/// `#[instrument]` travel with each line.
pub fn init_tracing() {
    let subscriber = tracing_subscriber::fmt().with_env_filter(env_filter());

    if cfg!(debug_assertions) {
        subscriber.with_target(true).init();
    } else {
        subscriber.json().with_current_span(true).init();
    }
}
