//! Raft leader-election and log-replication engine (§4.3, §4.4).

pub mod client;
pub mod election;
pub mod node;
pub mod replication;
pub mod state_machine;
pub mod types;

pub use node::RaftNode;
pub use state_machine::{InMemoryStateMachine, LoggingStateMachine, StateMachine};
