//! Tracing subscriber initialization.
//!
//! Filters come from `RUST_LOG` (e.g. `RUST_LOG=streamfold_infra=debug`).

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info";
const DEFAULT_TEST_FILTER: &str = "debug";

fn filter_or(default: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

/// JSON logs with timestamps, one object per line.
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter_or(DEFAULT_FILTER))
        .json()
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false)
        .try_init();
}

/// Human-readable logs captured by the test harness.
///
/// Every test may call this; only the first call installs the subscriber.
pub fn init_for_tests() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter_or(DEFAULT_TEST_FILTER))
        .with_test_writer()
        .try_init();
}
