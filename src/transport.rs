//! Shared RPC client plumbing.
//!
//! Generalizes the teacher's `ConnectionPool` (`connection_pool.rs`), which
//! cached reusable handles keyed by identity, into a cache of lazily
//! connected `tonic` channels keyed by peer address. `tonic::transport::Channel`
//! is itself cheap to clone and multiplexes internally, so there is no need
//! to reproduce the teacher's min/max-size bookkeeping — only the "connect
//! once, reuse after" behavior is worth keeping.

use dashmap::DashMap;
use std::time::Duration;
use tonic::transport::{Channel, Endpoint};
use tower::timeout::Timeout;

use crate::error::{ConcordError, Result};

/// Caches one [`Channel`] per peer address, connecting lazily on first use.
#[derive(Default)]
pub struct ChannelCache {
    channels: DashMap<String, Channel>,
}

impl ChannelCache {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Returns a cached channel to `address`, connecting it if this is the
    /// first request. `address` must be a bare `host:port` pair; this
    /// mirrors the original Python implementation's use of
    /// `grpc.insecure_channel(addr)`.
    pub async fn get(&self, address: &str) -> Result<Channel> {
        if let Some(channel) = self.channels.get(address) {
            return Ok(channel.clone());
        }

        let uri = format!("http://{address}");
        let endpoint = Endpoint::from_shared(uri).map_err(ConcordError::Transport)?;
        let channel = endpoint.connect().await.map_err(ConcordError::Transport)?;
        self.channels.insert(address.to_string(), channel.clone());
        Ok(channel)
    }

    pub fn invalidate(&self, address: &str) {
        self.channels.remove(address);
    }
}

/// Wraps `channel` with the per-call timeout required at this call site
/// (§6: 5s for voting/decision-phase calls, 2s for `NotifyVote`/Raft peer
/// RPCs). Building this fresh per call is cheap; `Timeout` is a thin wrapper.
pub fn with_timeout(channel: Channel, timeout: Duration) -> Timeout<Channel> {
    Timeout::new(channel, timeout)
}
