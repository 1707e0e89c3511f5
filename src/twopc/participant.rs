//! Participant role (§4.2): votes on proposed transactions and applies the
//! coordinator's eventual decision.
//!
//! The original protocol has the coordinator call the participant's own
//! decision endpoint over loopback (`NotifyVote`) immediately after a
//! COMMIT vote, purely to let the same process record "I voted commit,
//! awaiting decision" before replying to the coordinator. Per the redesign
//! noted in `SPEC_FULL.md`, that loopback RPC is replaced with an in-process
//! `tokio::sync::mpsc` channel: same ordering guarantee, no socket round
//! trip. `NotifyVote`/`VoteAck` are not present on the wire as a result.

use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tonic::{Request, Response, Status};
use tracing::{info, warn};

use crate::config::NOTIFY_VOTE_TIMEOUT;
use crate::error::ConcordError;
use crate::rpc::twopc::{
    participant_decision_phase_server::ParticipantDecisionPhase as DecisionPhaseService,
    participant_voting_phase_server::ParticipantVotingPhase as VotingPhaseService, DecisionAck,
    Decision as WireDecision, GlobalDecisionMessage, Vote as WireVote, VoteRequestMessage,
    VoteResponseMessage,
};
use crate::twopc::validator::ValidatorRegistry;
use crate::twopc::types::{PreparedTxn, Vote};

/// A prepared-to-commit transaction handed from the voting endpoint to the
/// decision endpoint, mirroring the original process-local `NotifyVote` call.
struct NotifyVoteMessage {
    transaction_id: String,
    txn: PreparedTxn,
    ack: oneshot::Sender<()>,
}

/// Cheap to clone: every field is an owned `String` or an `Arc`/`Sender`
/// handle, so the same participant state can back both the voting-phase
/// and decision-phase gRPC servers, which listen on separate ports.
#[derive(Clone)]
pub struct Participant {
    participant_id: String,
    service_name: String,
    validators: Arc<ValidatorRegistry>,
    prepared: Arc<DashMap<String, PreparedTxn>>,
    notify_tx: mpsc::Sender<NotifyVoteMessage>,
}

impl Participant {
    /// Builds a participant and spawns the task that applies `NotifyVote`
    /// hand-offs into the shared prepared-transaction table.
    pub fn new(participant_id: String, service_name: String, validators: ValidatorRegistry) -> Self {
        let prepared: Arc<DashMap<String, PreparedTxn>> = Arc::new(DashMap::new());
        let (notify_tx, mut notify_rx) = mpsc::channel::<NotifyVoteMessage>(64);

        let prepared_for_task = prepared.clone();
        tokio::spawn(async move {
            while let Some(message) = notify_rx.recv().await {
                prepared_for_task.insert(message.transaction_id, message.txn);
                let _ = message.ack.send(());
            }
        });

        Self {
            participant_id,
            service_name,
            validators,
            prepared,
            notify_tx,
        }
    }

    /// Sends `txn` across the in-process channel and waits for it to be
    /// recorded, bounded by [`NOTIFY_VOTE_TIMEOUT`]. The voting RPC must not
    /// reply COMMIT to the coordinator until this completes (§9 hazard: a
    /// crash between voting COMMIT and recording it would otherwise lose
    /// the fact that this participant is obligated to honor the decision).
    async fn notify_vote(&self, transaction_id: String, txn: PreparedTxn) -> Result<(), ConcordError> {
        info!(
            "Node {} sends RPC NotifyVote to Node {}",
            self.participant_id, self.participant_id
        );
        let (ack_tx, ack_rx) = oneshot::channel();
        self.notify_tx
            .send(NotifyVoteMessage {
                transaction_id,
                txn,
                ack: ack_tx,
            })
            .await
            .map_err(|_| ConcordError::Validation("notify-vote channel closed".into()))?;

        tokio::time::timeout(NOTIFY_VOTE_TIMEOUT, ack_rx)
            .await
            .map_err(|_| ConcordError::Timeout)?
            .map_err(|_| ConcordError::Validation("notify-vote ack dropped".into()))
    }

    /// Performs the service-specific effect of a `GLOBAL_COMMIT` (§4.2 step
    /// "perform the service-specific apply"), mirroring
    /// `original_source/Ride_Sharing_System/two_phase_commit/participant.py`'s
    /// `_do_commit`, which branches on `service_name` to log the concrete
    /// action before returning `"COMMITTED"`.
    fn apply_commit(&self, transaction_id: &str, txn: &PreparedTxn) {
        match self.service_name.as_str() {
            "DriverService" => {
                let driver_id = txn.parameters.get("driver_id").map_or("unknown", |v| v.as_str());
                info!(%transaction_id, driver_id, "assigning driver to ride");
            }
            "PaymentService" => {
                let amount = txn.parameters.get("amount").map_or("0", |v| v.as_str());
                let rider_id = txn.parameters.get("rider_id").map_or("unknown", |v| v.as_str());
                info!(%transaction_id, amount, rider_id, "charging rider");
            }
            "BookingService" => {
                info!(%transaction_id, "creating booking record");
            }
            "NotificationService" => {
                info!(%transaction_id, "sending ride confirmation notification");
            }
            "AnalyticsService" => {
                info!(%transaction_id, "recording ride metrics");
            }
            other => {
                info!(%transaction_id, service = other, "committing generic operation");
            }
        }
    }

    /// Releases whatever `apply_commit` would have reserved, on
    /// `GLOBAL_ABORT` (§4.2 step "release reservations"), mirroring
    /// `_do_abort`'s service branch.
    fn release_reservation(&self, transaction_id: &str, txn: &PreparedTxn) {
        match self.service_name.as_str() {
            "DriverService" => info!(%transaction_id, operation = %txn.operation, "releasing driver reservation"),
            "PaymentService" => info!(%transaction_id, operation = %txn.operation, "canceling payment authorization"),
            "BookingService" => info!(%transaction_id, operation = %txn.operation, "releasing booking slot"),
            "NotificationService" => info!(%transaction_id, operation = %txn.operation, "discarding queued notification"),
            "AnalyticsService" => info!(%transaction_id, operation = %txn.operation, "discarding uncommitted metrics"),
            other => info!(%transaction_id, service = other, operation = %txn.operation, "rolling back generic operation"),
        }
    }
}

#[tonic::async_trait]
impl VotingPhaseService for Participant {
    async fn vote_request(
        &self,
        request: Request<VoteRequestMessage>,
    ) -> Result<Response<VoteResponseMessage>, Status> {
        let req = request.into_inner();
        info!(
            "Node {} runs RPC VoteRequest called by Node COORDINATOR",
            self.participant_id
        );
        let validator = self.validators.for_service(&self.service_name);
        let (approved, reason) = validator.validate(&req.operation_type, &req.parameters);

        let vote = if approved { Vote::Commit } else { Vote::Abort };
        let wire_vote = match vote {
            Vote::Commit => WireVote::Commit,
            Vote::Abort => WireVote::Abort,
        };

        info!(
            transaction_id = %req.transaction_id,
            participant_id = %self.participant_id,
            vote = wire_vote.as_str_name(),
            %reason,
            "cast vote"
        );

        if approved {
            let txn = PreparedTxn {
                operation: req.operation_type.clone(),
                parameters: req.parameters.clone(),
                timestamp: req.timestamp,
                vote,
            };
            if let Err(err) = self.notify_vote(req.transaction_id.clone(), txn).await {
                warn!(%err, transaction_id = %req.transaction_id, "failed to record prepared vote locally");
                return Ok(Response::new(VoteResponseMessage {
                    transaction_id: req.transaction_id,
                    participant_id: self.participant_id.clone(),
                    decision: WireVote::Abort.into(),
                    reason: "failed to durably record vote".to_string(),
                }));
            }
        }

        Ok(Response::new(VoteResponseMessage {
            transaction_id: req.transaction_id,
            participant_id: self.participant_id.clone(),
            decision: wire_vote.into(),
            reason,
        }))
    }
}

#[tonic::async_trait]
impl DecisionPhaseService for Participant {
    async fn global_decision(
        &self,
        request: Request<GlobalDecisionMessage>,
    ) -> Result<Response<DecisionAck>, Status> {
        let req = request.into_inner();
        info!(
            "Node {} runs RPC GlobalDecision called by Node COORDINATOR",
            self.participant_id
        );
        let decision = req.decision();

        let status = match self.prepared.remove(&req.transaction_id) {
            Some((_, txn)) => {
                info!(
                    transaction_id = %req.transaction_id,
                    decision = decision.as_str_name(),
                    operation = %txn.operation,
                    "applying global decision"
                );
                match decision {
                    WireDecision::GlobalCommit => {
                        self.apply_commit(&req.transaction_id, &txn);
                        "COMMITTED"
                    }
                    _ => {
                        self.release_reservation(&req.transaction_id, &txn);
                        "ABORTED"
                    }
                }
            }
            None => {
                // Either this participant voted ABORT and was never
                // prepared, or the decision arrived twice. Both are benign.
                warn!(
                    transaction_id = %req.transaction_id,
                    "global decision for unknown or already-resolved transaction"
                );
                match decision {
                    WireDecision::GlobalCommit => "COMMITTED",
                    _ => "ABORTED",
                }
            }
        };

        Ok(Response::new(DecisionAck {
            transaction_id: req.transaction_id,
            participant_id: self.participant_id.clone(),
            acknowledged: true,
            status: status.to_string(),
        }))
    }
}
