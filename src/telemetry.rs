use tracing_subscriber::{EnvFilter, fmt};

/// Filter used when neither `--log-filter` nor `RUST_LOG` is set.
pub const DEFAULT_FILTER: &str = "warn";

/// Installs the global `tracing` subscriber, writing to stderr.
///
/// `filter` takes precedence over `RUST_LOG`. An unparsable directive falls
/// back to [`DEFAULT_FILTER`] rather than aborting the run. Calling this
/// twice is harmless; the second call leaves the first subscriber in place.
pub fn init_tracing(filter: Option<&str>) {
    let env_filter = match filter {
        Some(directives) => EnvFilter::try_new(directives).ok(),
        None => EnvFilter::try_from_default_env().ok(),
    }
    .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER));

    let _ = fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(false)
        .try_init();
}
