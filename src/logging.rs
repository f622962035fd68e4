//! Test/host-binary tracing setup.
//!
//! This crate itself only emits `tracing` events; it never installs a
//! subscriber. `init()` is a convenience for tests and embedding binaries
//! that want a sensible default quickly.

pub fn init() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("turnstile_sync=debug")),
        )
        .with_test_writer()
        .try_init();
}
