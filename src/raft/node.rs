//! Node state and wiring (§3, §4.3, §4.4), grounded on the teacher's
//! `RaftNode` in `distributed_consensus.rs`: same field layout (role, term,
//! voted_for, log, commit/apply indices, leader-only next/match index maps,
//! last-heartbeat clock), generalized from the teacher's in-process
//! `P2PNetwork` message passing to real gRPC peers and from `std::sync` to
//! `parking_lot` locks (the teacher declares `parking_lot` but never uses
//! it).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tonic::{Request, Response, Status};

use crate::raft::state_machine::StateMachine;
use crate::raft::types::{CommitState, LeaderVolatileState, Log, Role};
use crate::rpc::raft::raft_server::Raft as RaftPeerService;
use crate::rpc::raft::{
    AppendEntriesMessage, AppendEntriesResponseMessage, RequestVoteMessage, VoteResponseMessage,
};
use crate::transport::ChannelCache;

pub struct RaftNode {
    pub node_id: String,
    /// peer id -> `host:port`, excluding this node.
    pub(crate) peers: HashMap<String, String>,
    pub(crate) channels: ChannelCache,

    pub(crate) role: RwLock<Role>,
    pub(crate) current_term: RwLock<u64>,
    pub(crate) voted_for: RwLock<Option<String>>,
    pub(crate) log: RwLock<Log>,
    pub(crate) current_leader: RwLock<Option<String>>,
    pub(crate) last_heartbeat: Mutex<Instant>,
    pub(crate) commit_state: RwLock<CommitState>,
    pub(crate) leader_state: RwLock<Option<LeaderVolatileState>>,

    pub(crate) state_machine: Arc<dyn StateMachine>,
    pub(crate) cancellation: CancellationToken,
}

impl RaftNode {
    pub fn new(
        node_id: String,
        peers: HashMap<String, String>,
        state_machine: Arc<dyn StateMachine>,
    ) -> Arc<Self> {
        Arc::new(Self {
            node_id,
            peers,
            channels: ChannelCache::new(),
            role: RwLock::new(Role::Follower),
            current_term: RwLock::new(0),
            voted_for: RwLock::new(None),
            log: RwLock::new(Log::new()),
            current_leader: RwLock::new(None),
            last_heartbeat: Mutex::new(Instant::now()),
            commit_state: RwLock::new(CommitState::default()),
            leader_state: RwLock::new(None),
            state_machine,
            cancellation: CancellationToken::new(),
        })
    }

    pub fn role(&self) -> Role {
        *self.role.read()
    }

    pub fn is_leader(&self) -> bool {
        self.role() == Role::Leader
    }

    pub fn current_term(&self) -> u64 {
        *self.current_term.read()
    }

    pub fn current_leader(&self) -> Option<String> {
        self.current_leader.read().clone()
    }

    pub fn commit_index(&self) -> u64 {
        self.commit_state.read().commit_index
    }

    /// Quorum size for this cluster, counting this node.
    pub(crate) fn quorum(&self) -> usize {
        (self.peers.len() + 1) / 2 + 1
    }

    /// Starts the election timer, heartbeat loop, replication loop, and
    /// apply loop as background tasks. Cancellable via [`Self::shutdown`].
    pub fn start(self: &Arc<Self>) {
        self.spawn_election_timer();
        self.spawn_heartbeat_loop();
        self.spawn_replication_loop();
        self.spawn_apply_loop();
    }

    /// Stops every background loop started by [`Self::start`]. Generalizes
    /// the teacher's bare `tokio::spawn(async move { loop { ... } })`
    /// pattern, which never exits, into one that a test harness can tear
    /// down deterministically between cases.
    pub fn shutdown(&self) {
        self.cancellation.cancel();
    }
}

// Implemented on `Arc<RaftNode>`, not `RaftNode` directly: the node is
// always shared (background loops, both gRPC services, and the owning
// binary all hold a clone), and tonic's generated `XServer<T>` needs an
// owned `T` to wrap, so `T = Arc<RaftNode>` is what gets registered.
#[tonic::async_trait]
impl RaftPeerService for Arc<RaftNode> {
    async fn request_vote(
        &self,
        request: Request<RequestVoteMessage>,
    ) -> Result<Response<VoteResponseMessage>, Status> {
        Ok(Response::new(self.handle_request_vote(request.into_inner()).await))
    }

    async fn append_entries(
        &self,
        request: Request<AppendEntriesMessage>,
    ) -> Result<Response<AppendEntriesResponseMessage>, Status> {
        Ok(Response::new(
            self.handle_append_entries(request.into_inner()).await,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raft::state_machine::LoggingStateMachine;
    use proptest::prelude::*;

    fn node_with_peer_count(peer_count: usize) -> Arc<RaftNode> {
        let peers = (0..peer_count)
            .map(|i| (format!("peer{i}"), format!("127.0.0.1:{}", 9000 + i)))
            .collect();
        RaftNode::new("self".to_string(), peers, Arc::new(LoggingStateMachine))
    }

    proptest! {
        /// Quorum (§3 glossary "majority") is `floor(N/2) + 1` of the full
        /// cluster size N = peers + self, for any cluster size the config
        /// layer can produce.
        #[test]
        fn quorum_is_majority_of_full_cluster(peer_count in 0usize..64) {
            let node = node_with_peer_count(peer_count);
            let cluster_size = peer_count + 1;
            prop_assert_eq!(node.quorum(), cluster_size / 2 + 1);
            // A quorum always exceeds half the cluster, and two disjoint
            // quorums always overlap (Election Safety's arithmetic basis).
            prop_assert!(node.quorum() * 2 > cluster_size);
        }
    }
}
