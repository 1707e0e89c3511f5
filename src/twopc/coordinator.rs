//! Coordinator role (§4.1): drives the voting phase and the decision phase.

use dashmap::DashMap;
use tonic::{Request, Response, Status};
use tracing::{info, warn};

use crate::config::COORDINATOR_RPC_TIMEOUT;
use crate::rpc::twopc::{
    participant_decision_phase_client::ParticipantDecisionPhaseClient,
    participant_voting_phase_client::ParticipantVotingPhaseClient,
    two_phase_commit_coordinator_server::TwoPhaseCommitCoordinator as CoordinatorService,
    Decision as WireDecision, GlobalDecisionMessage, TransactionRequest as WireTransactionRequest,
    TransactionResponse as WireTransactionResponse, Vote as WireVote, VoteRequestMessage,
};
use crate::transport::{with_timeout, ChannelCache};
use crate::twopc::types::{CoordinatorLogEntry, CoordinatorStatus, TransactionRequest};

/// Coordinates transactions across a fixed, statically-configured set of
/// participants. Matches the teacher's preference for injected collaborators
/// over service discovery.
pub struct Coordinator {
    participant_addresses: Vec<String>,
    channels: ChannelCache,
    log: DashMap<String, CoordinatorLogEntry>,
}

impl Coordinator {
    pub fn new(participant_addresses: Vec<String>) -> Self {
        Self {
            participant_addresses,
            channels: ChannelCache::new(),
            log: DashMap::new(),
        }
    }

    /// Current status for a previously-initiated transaction, if any. Used
    /// by tests and by a future admin surface; not exposed over RPC today.
    pub fn status_of(&self, transaction_id: &str) -> Option<CoordinatorStatus> {
        self.log.get(transaction_id).map(|e| e.status.clone())
    }

    async fn request_vote(
        &self,
        address: &str,
        participant_label: String,
        msg: VoteRequestMessage,
    ) -> Option<WireVote> {
        let channel = match self.channels.get(address).await {
            Ok(c) => c,
            Err(err) => {
                warn!(%address, %err, "could not connect to participant for vote request");
                return None;
            }
        };
        info!("Node COORDINATOR sends RPC VoteRequest to Node {participant_label}");
        let channel = with_timeout(channel, COORDINATOR_RPC_TIMEOUT);
        let mut client = ParticipantVotingPhaseClient::new(channel);
        match client.vote_request(Request::new(msg)).await {
            Ok(resp) => Some(resp.into_inner().decision()),
            Err(status) => {
                warn!(%address, %status, "vote request failed or timed out");
                self.channels.invalidate(address);
                None
            }
        }
    }

    async fn notify_decision(&self, address: &str, participant_label: String, msg: GlobalDecisionMessage) {
        let channel = match self.channels.get(address).await {
            Ok(c) => c,
            Err(err) => {
                warn!(%address, %err, "could not connect to participant for decision phase");
                return;
            }
        };
        info!("Node COORDINATOR sends RPC GlobalDecision to Node {participant_label}");
        let channel = with_timeout(channel, COORDINATOR_RPC_TIMEOUT);
        let mut client = ParticipantDecisionPhaseClient::new(channel);
        // Best-effort only: the decision phase has no retry, per the
        // protocol as specified. A participant that misses this message
        // stays blocked on its prepared transaction until an operator
        // intervenes.
        if let Err(status) = client.global_decision(Request::new(msg)).await {
            warn!(%address, %status, "participant did not acknowledge global decision");
        }
    }
}

#[tonic::async_trait]
impl CoordinatorService for Coordinator {
    async fn initiate_transaction(
        &self,
        request: Request<WireTransactionRequest>,
    ) -> Result<Response<WireTransactionResponse>, Status> {
        let req = TransactionRequest::from_wire(request.into_inner());
        info!(
            transaction_id = %req.transaction_id,
            operation = %req.operation_type,
            "initiating transaction"
        );

        self.log.insert(
            req.transaction_id.clone(),
            CoordinatorLogEntry::new(req.operation_type.clone()),
        );

        let vote_msg = VoteRequestMessage {
            transaction_id: req.transaction_id.clone(),
            operation_type: req.operation_type.clone(),
            parameters: req.parameters.clone(),
            timestamp: req.timestamp,
        };

        let votes = futures::future::join_all(self.participant_addresses.iter().enumerate().map(
            |(i, address)| self.request_vote(address, format!("PARTICIPANT_{}", i + 1), vote_msg.clone()),
        ))
        .await;

        // Presumed-abort: any missing, timed-out, or ABORT vote aborts the
        // whole transaction (§4.1 step 3).
        let unanimous_commit = !votes.is_empty()
            && votes
                .iter()
                .all(|v| matches!(v, Some(WireVote::Commit)));

        let decision = if unanimous_commit {
            CoordinatorStatus::GlobalCommit
        } else {
            CoordinatorStatus::GlobalAbort
        };
        let wire_decision = match decision {
            CoordinatorStatus::GlobalCommit => WireDecision::GlobalCommit,
            _ => WireDecision::GlobalAbort,
        };

        info!(
            transaction_id = %req.transaction_id,
            decision = wire_decision.as_str_name(),
            "decision reached"
        );

        if let Some(mut entry) = self.log.get_mut(&req.transaction_id) {
            entry.status = decision.clone();
            entry.decided_at = Some(chrono::Utc::now().timestamp());
        }

        let decision_msg = GlobalDecisionMessage {
            transaction_id: req.transaction_id.clone(),
            decision: wire_decision.into(),
            timestamp: chrono::Utc::now().timestamp(),
        };

        futures::future::join_all(self.participant_addresses.iter().enumerate().map(|(i, address)| {
            self.notify_decision(address, format!("PARTICIPANT_{}", i + 1), decision_msg.clone())
        }))
        .await;

        Ok(Response::new(WireTransactionResponse {
            transaction_id: req.transaction_id,
            success: matches!(decision, CoordinatorStatus::GlobalCommit),
            message: format!("transaction {}", wire_decision.as_str_name()),
            timestamp: chrono::Utc::now().timestamp(),
            final_decision: wire_decision.as_str_name().to_string(),
        }))
    }
}
