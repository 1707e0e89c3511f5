//! Per-process Tokio runtime construction.
//!
//! The teacher sizes its RocksDB background-job parallelism from
//! `num_cpus::get()` (`storage.rs`); this crate has no storage layer to
//! tune, but §2's "per-RPC worker pool" still needs sizing, so the same
//! crate is reused to size each binary's Tokio worker pool explicitly
//! instead of relying on the `#[tokio::main]` macro's implicit default.

use tokio::runtime::Runtime;

/// Builds a multi-threaded runtime with one worker per available core.
pub fn build() -> std::io::Result<Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(num_cpus::get())
        .enable_all()
        .build()
}
