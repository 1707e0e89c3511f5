//! Structured logging setup.
//!
//! The teacher crate declares `tracing`/`tracing-subscriber` but never calls
//! into them, logging with bare `println!` instead. This wires the declared
//! dependency up for real: every binary calls [`init_tracing`] first thing
//! in `main`.

use tracing_subscriber::EnvFilter;

/// Initializes the global tracing subscriber from `RUST_LOG`, defaulting to
/// `info` when unset or invalid.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
