//! Telemetry helpers for structured logging.

/// Install a default env-filtered fmt subscriber unless the application has
/// already set one. `RUST_LOG` controls verbosity.
pub fn init_tracing() {
    if tracing::dispatcher::has_been_set() {
        return;
    }
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .try_init();
}
