//! Crate-wide error type.
//!
//! The teacher crate propagates ad hoc `Result<_, String>` (see
//! `distributed_2pc.rs`, `distributed_consensus.rs`). Here that is
//! generalized into a typed enum so callers can match on failure kind
//! instead of parsing strings, while still never letting a panic escape
//! across an RPC boundary (§7).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConcordError {
    #[error("transaction {0} not found")]
    TransactionNotFound(String),

    #[error("not the leader")]
    NotLeader {
        /// Best-effort hint at who the leader might be; empty if unknown.
        leader_hint: String,
    },

    #[error("no leader currently available")]
    NoLeaderAvailable,

    #[error("rpc transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    #[error("rpc call failed: {0}")]
    Status(#[from] tonic::Status),

    #[error("rpc call timed out")]
    Timeout,

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, ConcordError>;

impl From<ConcordError> for tonic::Status {
    fn from(err: ConcordError) -> Self {
        match err {
            ConcordError::TransactionNotFound(id) => {
                tonic::Status::not_found(format!("transaction {id} not found"))
            }
            ConcordError::NotLeader { leader_hint } => {
                tonic::Status::failed_precondition(format!("not leader, try {leader_hint}"))
            }
            ConcordError::NoLeaderAvailable => {
                tonic::Status::unavailable("no leader currently available")
            }
            ConcordError::Transport(e) => tonic::Status::unavailable(e.to_string()),
            ConcordError::Status(s) => s,
            ConcordError::Timeout => tonic::Status::deadline_exceeded("rpc call timed out"),
            ConcordError::Validation(reason) => tonic::Status::invalid_argument(reason),
            ConcordError::Config(reason) => tonic::Status::invalid_argument(reason),
        }
    }
}
