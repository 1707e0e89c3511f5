//! 2PC data model (§3 of the distilled spec).

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub type TransactionId = String;
pub type ParticipantId = String;

/// Coordinator-side vote/decision outcome, mirrored 1:1 onto the
/// `Vote`/`Decision` wire enums in `rpc::twopc`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Vote {
    Commit,
    Abort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    GlobalCommit,
    GlobalAbort,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::GlobalCommit => "GLOBAL_COMMIT",
            Decision::GlobalAbort => "GLOBAL_ABORT",
        }
    }
}

/// Coordinator's durable-in-memory record of a transaction (§3 table).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CoordinatorStatus {
    Initiated,
    GlobalCommit,
    GlobalAbort,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorLogEntry {
    pub status: CoordinatorStatus,
    pub operation: String,
    pub created_at: i64,
    pub decided_at: Option<i64>,
}

impl CoordinatorLogEntry {
    pub fn new(operation: String) -> Self {
        Self {
            status: CoordinatorStatus::Initiated,
            operation,
            created_at: Utc::now().timestamp(),
            decided_at: None,
        }
    }
}

/// A participant's record of a transaction it voted `COMMIT` on, held until
/// a `GlobalDecision` arrives (§3 invariant ii).
#[derive(Debug, Clone)]
pub struct PreparedTxn {
    pub operation: String,
    pub parameters: HashMap<String, String>,
    pub timestamp: i64,
    pub vote: Vote,
}

/// Parsed form of the wire `TransactionRequest`, with the coordinator's
/// id-minting behavior already applied.
#[derive(Debug, Clone)]
pub struct TransactionRequest {
    pub transaction_id: TransactionId,
    pub operation_type: String,
    pub parameters: HashMap<String, String>,
    pub timestamp: i64,
}

impl TransactionRequest {
    pub fn from_wire(req: crate::rpc::twopc::TransactionRequest) -> Self {
        let transaction_id = if req.transaction_id.is_empty() {
            uuid::Uuid::new_v4().to_string()
        } else {
            req.transaction_id
        };
        Self {
            transaction_id,
            operation_type: req.operation_type,
            parameters: req.parameters,
            timestamp: if req.timestamp != 0 {
                req.timestamp
            } else {
                Utc::now().timestamp()
            },
        }
    }
}
