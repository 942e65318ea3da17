use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

/// Install the global subscriber: fmt output filtered by `RUST_LOG`,
/// `info` when unset. Calling it twice is harmless.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .try_init();
}

/// Numeric training metric in one fixed shape, on its own target so it can
/// be switched on with `RUST_LOG=enemy_drl::scalar=debug` and grepped out.
pub fn scalar(step: u64, name: &str, value: f32) {
    tracing::debug!(target: "enemy_drl::scalar", step, name, value);
}
