//! Concord: a two-phase commit fabric and a Raft replication engine,
//! sharing one process model, error type, and configuration convention.
//!
//! - 2PC (`twopc`): a coordinator drives participants through a voting
//!   phase and a decision phase to atomically commit or abort an operation
//!   across services.
//! - Raft (`raft`): leader election and log replication across a fixed
//!   cluster of nodes, with a pluggable [`raft::StateMachine`] applying
//!   committed entries.

pub mod config;
pub mod error;
pub mod logging;
pub mod raft;
pub mod rpc;
pub mod runtime;
pub mod transport;
pub mod twopc;

pub use error::{ConcordError, Result};
