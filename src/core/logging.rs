//! Logging setup for applications and tests

/// Filter used when `RUST_LOG` is unset
pub const DEFAULT_FILTER: &str = "info";

/// Install the `env_logger` backend with the default filter.
///
/// Override with RUST_LOG, e.g. `RUST_LOG=chanbind::bind=debug` to see every
/// bind and every released control. Returns false if a logger was already
/// installed.
///
/// # Example
/// ```
/// chanbind::core::logging::init();
/// log::info!("Animation system started");
/// ```
pub fn init() -> bool {
    init_with_filter(DEFAULT_FILTER)
}

/// Install the backend with another default filter; RUST_LOG still wins
pub fn init_with_filter(default_filter: &str) -> bool {
    builder(default_filter).try_init().is_ok()
}

/// Logger for unit tests: captured per test, debug output from this crate
pub fn init_for_tests() {
    let _ = builder("chanbind=debug").is_test(true).try_init();
}

fn builder(default_filter: &str) -> env_logger::Builder {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter));
    builder.format_timestamp_millis();
    builder
}
