//! Environment-driven configuration for each binary.
//!
//! Generalizes the teacher's `*Config` + `impl Default` convention
//! (`RaftConfig::default()`, `P2PConfig::default()`,
//! `TopologyConfig::default()` in the teacher's distributed modules) to also
//! read overrides from the process environment, per §6/§9.

use crate::error::{ConcordError, Result};
use std::collections::HashMap;
use std::time::Duration;

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match env_var(key) {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|_| ConcordError::Config(format!("{key}={raw} is not valid"))),
    }
}

/// Voting-phase and decision-phase RPC timeout, per §4.1 step 2 / step 4.
pub const COORDINATOR_RPC_TIMEOUT: Duration = Duration::from_secs(5);
/// Timeout for the intra-node `NotifyVote` hand-off, per §4.2.
pub const NOTIFY_VOTE_TIMEOUT: Duration = Duration::from_secs(2);
/// Per-RPC timeout for Raft peer calls (`RequestVote`/`AppendEntries`).
pub const RAFT_RPC_TIMEOUT: Duration = Duration::from_millis(2000);
/// Per-peer timeout while probing client endpoints for the current leader
/// (§4.5 leader discovery), matching
/// `original_source/Task_Scheduler_System/raft/raft_node.py`'s
/// `_find_leader`'s `timeout=1` per probe.
pub const LEADER_PROBE_TIMEOUT: Duration = Duration::from_secs(1);
/// Ceiling for the leader's majority-replication wait, per §4.4 step 3.
pub const MAJORITY_WAIT_TIMEOUT: Duration = Duration::from_secs(5);
/// Poll interval while waiting for majority replication.
pub const MAJORITY_WAIT_POLL: Duration = Duration::from_millis(100);
/// Leader replication-loop interval, per §4.4.
pub const REPLICATION_INTERVAL: Duration = Duration::from_millis(500);
/// Leader heartbeat interval, per §4.3.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);
/// Randomized election timeout bounds, per §4.3.
pub const ELECTION_TIMEOUT_MIN: Duration = Duration::from_millis(1500);
pub const ELECTION_TIMEOUT_MAX: Duration = Duration::from_millis(3000);

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub port: u16,
    pub participant_addresses: Vec<String>,
}

impl CoordinatorConfig {
    pub fn from_env() -> Result<Self> {
        let port = env_parse("COORDINATOR_PORT", 50050u16)?;
        let participant_addresses = match env_var("PARTICIPANT_ADDRESSES") {
            Some(raw) => raw.split(',').map(|s| s.trim().to_string()).collect(),
            None => Vec::new(),
        };
        Ok(Self {
            port,
            participant_addresses,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ParticipantConfig {
    pub voting_port: u16,
    pub decision_port: u16,
    pub participant_id: String,
    pub service_name: String,
}

impl ParticipantConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            voting_port: env_parse("VOTING_PORT", 50051u16)?,
            decision_port: env_parse("DECISION_PORT", 60051u16)?,
            participant_id: env_var("PARTICIPANT_ID").unwrap_or_else(|| "PARTICIPANT_1".into()),
            service_name: env_var("SERVICE_NAME").unwrap_or_else(|| "GenericService".into()),
        })
    }
}

/// Fixed offset between a node's Raft peer port and its client port, per
/// `original_source/Task_Scheduler_System/raft/raft_node.py`'s
/// `client_port = str(int(port) + 90)` convention (§6 `CLIENT_PORT` default).
pub const CLIENT_PORT_OFFSET: u16 = 90;

/// Derives a peer's client-service address from its Raft peer address,
/// applying [`CLIENT_PORT_OFFSET`]. Used when forwarding a client request
/// to the current leader (§4.5): the leader is only known by its Raft peer
/// address, never its client address directly.
pub fn client_address_for(raft_peer_address: &str) -> Result<String> {
    let (host, port) = raft_peer_address.rsplit_once(':').ok_or_else(|| {
        ConcordError::Config(format!("{raft_peer_address} is not a host:port pair"))
    })?;
    let port: u16 = port
        .parse()
        .map_err(|_| ConcordError::Config(format!("{raft_peer_address} has an invalid port")))?;
    Ok(format!("{host}:{}", port + CLIENT_PORT_OFFSET))
}

#[derive(Debug, Clone)]
pub struct RaftNodeConfig {
    pub node_id: String,
    pub port: u16,
    pub client_port: u16,
    pub all_node_ids: Vec<String>,
}

impl RaftNodeConfig {
    pub fn from_env() -> Result<Self> {
        let node_id = env_var("NODE_ID").ok_or_else(|| {
            ConcordError::Config("NODE_ID must be set".to_string())
        })?;
        let port = env_parse("PORT", 50051u16)?;
        let client_port = match env_var("CLIENT_PORT") {
            Some(raw) => raw
                .parse()
                .map_err(|_| ConcordError::Config(format!("CLIENT_PORT={raw} is not valid")))?,
            None => port + 90,
        };
        let all_node_ids = match env_var("ALL_NODE_IDS") {
            Some(raw) => raw.split(',').map(|s| s.trim().to_string()).collect(),
            None => Vec::new(),
        };
        Ok(Self {
            node_id,
            port,
            client_port,
            all_node_ids,
        })
    }

    /// Resolves [`Self::all_node_ids`] into a peer id -> Raft peer address
    /// map, excluding this node. Each entry is either a bare `host:port`
    /// (the peer's id is taken to be the host, mirroring
    /// `original_source/Task_Scheduler_System/raft/raft_node.py`'s
    /// `peer.split(":")[0]` convention for one-hostname-per-node Docker
    /// deployments) or an explicit `node_id=host:port` pair, needed when
    /// multiple nodes share a host (e.g. `127.0.0.1`) in local testing.
    pub fn peers(&self) -> Result<HashMap<String, String>> {
        let mut peers = HashMap::new();
        for entry in &self.all_node_ids {
            let (id, address) = match entry.split_once('=') {
                Some((id, address)) => (id.to_string(), address.to_string()),
                None => {
                    let host = entry.rsplit_once(':').map(|(host, _)| host).ok_or_else(|| {
                        ConcordError::Config(format!("{entry} is not a host:port pair"))
                    })?;
                    (host.to_string(), entry.clone())
                }
            };
            if id != self.node_id {
                peers.insert(id, address);
            }
        }
        Ok(peers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn coordinator_defaults_without_env() {
        std::env::remove_var("COORDINATOR_PORT");
        std::env::remove_var("PARTICIPANT_ADDRESSES");
        let cfg = CoordinatorConfig::from_env().unwrap();
        assert_eq!(cfg.port, 50050);
        assert!(cfg.participant_addresses.is_empty());
    }

    #[test]
    #[serial]
    fn raft_node_requires_node_id() {
        std::env::remove_var("NODE_ID");
        let err = RaftNodeConfig::from_env().unwrap_err();
        assert!(matches!(err, ConcordError::Config(_)));
    }

    #[test]
    fn peers_excludes_self_and_supports_explicit_ids() {
        let cfg = RaftNodeConfig {
            node_id: "node1".to_string(),
            port: 50051,
            client_port: 50141,
            all_node_ids: vec![
                "node1=127.0.0.1:50051".to_string(),
                "node2=127.0.0.1:50052".to_string(),
            ],
        };
        let peers = cfg.peers().unwrap();
        assert_eq!(peers.len(), 1);
        assert_eq!(peers.get("node2").unwrap(), "127.0.0.1:50052");
    }

    #[test]
    fn client_address_applies_fixed_offset() {
        assert_eq!(
            client_address_for("127.0.0.1:50051").unwrap(),
            "127.0.0.1:50141"
        );
    }

    #[test]
    fn client_address_rejects_malformed_input() {
        assert!(client_address_for("not-a-host-port").is_err());
    }

    #[test]
    #[serial]
    fn raft_client_port_defaults_to_port_plus_90() {
        std::env::set_var("NODE_ID", "n1");
        std::env::set_var("PORT", "50051");
        std::env::remove_var("CLIENT_PORT");
        let cfg = RaftNodeConfig::from_env().unwrap();
        assert_eq!(cfg.client_port, 50141);
        std::env::remove_var("NODE_ID");
        std::env::remove_var("PORT");
    }
}
