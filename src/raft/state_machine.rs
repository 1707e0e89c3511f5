//! Applied-command sink (§4.4 step "apply"), grounded on the teacher's
//! `StateMachine` trait in `distributed_consensus.rs`.
//!
//! The original implementation only ever logged applied commands; this
//! trait lets a real application plug in durable state without touching
//! the replication loop, per the redesign noted in `SPEC_FULL.md`.

use parking_lot::Mutex;

pub trait StateMachine: Send + Sync {
    fn apply(&self, index: u64, command: &str);
}

/// Default: logs every applied command at `info`, matching the teacher's
/// own behavior exactly.
pub struct LoggingStateMachine;

impl StateMachine for LoggingStateMachine {
    fn apply(&self, index: u64, command: &str) {
        tracing::info!(index, command, "applied log entry");
    }
}

/// Records applied commands in order, for tests that assert on what a node
/// actually committed rather than just its log contents.
#[derive(Default)]
pub struct InMemoryStateMachine {
    applied: Mutex<Vec<(u64, String)>>,
}

impl InMemoryStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn applied(&self) -> Vec<(u64, String)> {
        self.applied.lock().clone()
    }
}

impl StateMachine for InMemoryStateMachine {
    fn apply(&self, index: u64, command: &str) {
        self.applied.lock().push((index, command.to_string()));
    }
}
