//! Logging utilities for rtab
//!
//! The library only emits `tracing` events: table lifecycle at `info`, batch and
//! chunk traffic at `debug`, discarded rows and oversized sorts at `warn`. These
//! helpers install a subscriber for binaries and tests that want to see them.

#[cfg(feature = "logging")]
use tracing_subscriber::{EnvFilter, fmt};

/// Filter used when `RUST_LOG` is unset: rtab events at `level`, everything else at `warn`.
#[cfg(feature = "logging")]
fn default_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,rtab_core={level}")))
}

/// Initialize logging at `info`.
///
/// # Environment Variables
/// - `RUST_LOG` - overrides the filter entirely
///
/// # Example
/// ```rust
/// rtab_core::logging::init();
/// ```
#[cfg(feature = "logging")]
pub fn init() {
    init_with_level("info")
}

/// Initialize logging with rtab events at `level` (trace, debug, info, warn, error).
///
/// A second call is ignored.
#[cfg(feature = "logging")]
pub fn init_with_level(level: &str) {
    let _ = fmt()
        .with_env_filter(default_filter(level))
        .with_target(true)
        .with_thread_ids(true)
        .try_init();
}

/// Initialize logging for tests: `debug` level, captured by the test harness.
#[cfg(feature = "logging")]
pub fn init_test() {
    let _ = fmt()
        .with_env_filter(default_filter("debug"))
        .with_test_writer()
        .try_init();
}

// No-ops when the logging feature is disabled
#[cfg(not(feature = "logging"))]
pub fn init() {}

#[cfg(not(feature = "logging"))]
pub fn init_with_level(_level: &str) {}

#[cfg(not(feature = "logging"))]
pub fn init_test() {}
