// src/logging.rs

use tracing_subscriber::{fmt, EnvFilter};

pub const DEFAULT_FILTER: &str = "info,laptime_tracker=debug";

/// Install the global subscriber. `RUST_LOG` wins over `default_filter`.
/// A second call is a no-op.
pub fn init(default_filter: &str) {
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .try_init();
}

/// Subscriber for unit tests; output goes through the test harness.
#[cfg(test)]
pub(crate) fn init_test_logging() {
    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,laptime_tracker=debug")),
        )
        .with_test_writer()
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}
