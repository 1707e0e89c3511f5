//! Client-facing submission endpoint (§4.4 step 1, §5 "single-hop
//! forwarding"), grounded on the teacher's absence of a client surface:
//! `distributed_consensus.rs` only exposes `append_entry` to in-process
//! callers. This adds the gRPC front door the distilled spec requires,
//! including the single-hop-only forward to the current leader.

use std::sync::Arc;

use tonic::{Request, Response, Status};
use tracing::info;

use crate::config::{client_address_for, LEADER_PROBE_TIMEOUT, RAFT_RPC_TIMEOUT};
use crate::error::ConcordError;
use crate::raft::node::RaftNode;
use crate::rpc::raft::raft_client_client::RaftClientClient as RaftClientForwardingClient;
use crate::rpc::raft::raft_client_server::RaftClient as RaftClientService;
use crate::rpc::raft::{ClientRequest, ClientResponse};
use crate::transport::with_timeout;

impl RaftNode {
    /// Locates the current leader for forwarding (§4.5 step "else attempt
    /// to locate leader"): prefers the leader observed from a real
    /// `AppendEntries`, falls back to `voted_for` as a weaker hint, and
    /// finally probes every peer's client endpoint — mirroring
    /// `original_source/Task_Scheduler_System/raft/raft_node.py`'s
    /// `_find_leader`.
    async fn discover_leader_id(&self) -> Option<String> {
        if let Some(leader) = self.current_leader() {
            return Some(leader);
        }
        if let Some(candidate) = self.voted_for.read().clone() {
            if candidate != self.node_id {
                return Some(candidate);
            }
        }
        self.probe_peers_for_leader().await
    }

    /// Asks every peer's client endpoint who it believes the leader is and
    /// returns the first non-empty answer, exactly as the original's
    /// `_find_leader` pings each peer with a throwaway request bounded by a
    /// short timeout.
    async fn probe_peers_for_leader(&self) -> Option<String> {
        for (peer_id, raft_address) in &self.peers {
            let Ok(address) = client_address_for(raft_address) else {
                continue;
            };
            let Ok(channel) = self.channels.get(&address).await else {
                continue;
            };
            info!("Node {} sends RPC SubmitOperation to Node {peer_id}", self.node_id);
            let channel = with_timeout(channel, LEADER_PROBE_TIMEOUT);
            let mut client = RaftClientForwardingClient::new(channel);
            let probe = ClientRequest {
                operation: "PING".to_string(),
                client_id: "leader-probe".to_string(),
            };
            if let Ok(response) = client.submit_operation(Request::new(probe)).await {
                let leader_id = response.into_inner().leader_id;
                if !leader_id.is_empty() {
                    return Some(leader_id);
                }
            }
        }
        None
    }
}

// See the matching note in `raft::node` on `RaftPeerService`: registered as
// `T = Arc<RaftNode>` for the same reason.
#[tonic::async_trait]
impl RaftClientService for Arc<RaftNode> {
    async fn submit_operation(
        &self,
        request: Request<ClientRequest>,
    ) -> Result<Response<ClientResponse>, Status> {
        let req = request.into_inner();
        info!(
            "Node {} runs RPC SubmitOperation called by Node {}",
            self.node_id, req.client_id
        );

        if self.is_leader() {
            let index = self.append_entry(req.operation.clone()).map_err(Status::from)?;
            let committed = self.wait_for_majority(index).await;
            info!(
                node_id = %self.node_id,
                index,
                committed,
                client_id = %req.client_id,
                "submitted client operation"
            );
            return Ok(Response::new(ClientResponse {
                success: committed,
                message: if committed {
                    "committed".to_string()
                } else {
                    "accepted but not yet committed by a majority".to_string()
                },
                leader_id: self.node_id.clone(),
            }));
        }

        // Forward exactly once, to whoever we currently believe is leader
        // (§5): a client that keeps landing on followers after one forward
        // is expected to retry with fresh leader info, not chase hops.
        let Some(leader_id) = self.discover_leader_id().await else {
            return Err(ConcordError::NoLeaderAvailable.into());
        };
        let Some(raft_address) = self.peers.get(&leader_id) else {
            return Err(ConcordError::NoLeaderAvailable.into());
        };
        let address = client_address_for(raft_address).map_err(Status::from)?;

        let channel = self
            .channels
            .get(&address)
            .await
            .map_err(Status::from)?;
        info!(
            "Node {} sends RPC SubmitOperation to Node {leader_id}",
            self.node_id
        );
        let channel = with_timeout(channel, RAFT_RPC_TIMEOUT);
        let mut client = RaftClientForwardingClient::new(channel);
        let response = client
            .submit_operation(Request::new(req))
            .await?
            .into_inner();
        Ok(Response::new(response))
    }
}
