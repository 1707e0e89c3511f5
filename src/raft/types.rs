//! Raft data model (§3, §4.3, §4.4).

use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Follower,
    Candidate,
    Leader,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub term: u64,
    pub index: u64,
    pub command: String,
}

/// Replicated log, always starting with a sentinel entry at index 0 so that
/// `prev_log_index = 0` is a well-formed reference for the very first real
/// entry, per the original implementation's bootstrapping convention.
#[derive(Debug, Clone)]
pub struct Log {
    entries: Vec<LogEntry>,
}

impl Log {
    pub fn new() -> Self {
        Self {
            entries: vec![LogEntry {
                term: 0,
                index: 0,
                command: "INIT".to_string(),
            }],
        }
    }

    pub fn last_index(&self) -> u64 {
        self.entries.last().map(|e| e.index).unwrap_or(0)
    }

    pub fn last_term(&self) -> u64 {
        self.entries.last().map(|e| e.term).unwrap_or(0)
    }

    pub fn get(&self, index: u64) -> Option<&LogEntry> {
        self.entries.iter().find(|e| e.index == index)
    }

    pub fn term_at(&self, index: u64) -> Option<u64> {
        self.get(index).map(|e| e.term)
    }

    pub fn append(&mut self, entry: LogEntry) {
        self.entries.push(entry);
    }

    /// Removes every entry with index strictly greater than `index`, used
    /// when a follower's log conflicts with the leader's and must be
    /// truncated before accepting new entries (§4.4 step 6).
    pub fn truncate_after(&mut self, index: u64) {
        self.entries.retain(|e| e.index <= index);
    }

    pub fn entries_from(&self, index: u64) -> Vec<LogEntry> {
        self.entries
            .iter()
            .filter(|e| e.index >= index)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for Log {
    fn default() -> Self {
        Self::new()
    }
}

/// Volatile leader-only state, reset every time a node becomes leader
/// (§4.3 step "on election").
#[derive(Debug, Clone, Default)]
pub struct LeaderVolatileState {
    pub next_index: HashMap<String, u64>,
    pub match_index: HashMap<String, u64>,
}

impl LeaderVolatileState {
    pub fn initialize(peer_ids: &[String], last_log_index: u64) -> Self {
        let mut next_index = HashMap::new();
        let mut match_index = HashMap::new();
        for peer in peer_ids {
            next_index.insert(peer.clone(), last_log_index + 1);
            match_index.insert(peer.clone(), 0);
        }
        Self {
            next_index,
            match_index,
        }
    }
}

/// Volatile state present on every node regardless of role (§3).
#[derive(Debug, Clone, Default)]
pub struct CommitState {
    pub commit_index: u64,
    pub last_applied: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::collection::vec;
    use proptest::prelude::*;

    /// Log Matching (§3 invariant iii, §8): truncating after index `i` must
    /// leave every entry at or before `i` untouched, and must remove every
    /// entry after it — the property `handle_append_entries`'s conflict
    /// resolution relies on.
    proptest! {
        #[test]
        fn truncate_after_preserves_prefix_and_drops_suffix(
            appended_terms in vec(1u64..10, 1..30),
            cut_offset in 0u64..30,
        ) {
            let mut log = Log::new();
            for term in &appended_terms {
                let index = log.last_index() + 1;
                log.append(LogEntry { term: *term, index, command: "cmd".to_string() });
            }

            let before_cut: Vec<LogEntry> = log
                .entries_from(0)
                .into_iter()
                .filter(|e| e.index <= cut_offset)
                .collect();

            log.truncate_after(cut_offset);

            prop_assert!(log.last_index() <= cut_offset);
            for entry in &before_cut {
                prop_assert_eq!(log.get(entry.index), Some(entry));
            }
            prop_assert!(log.entries_from(cut_offset + 1).is_empty());
        }

        /// Two logs built from the same prefix of appends agree at every
        /// index in that prefix regardless of what either log does
        /// afterwards — the basis for the Log Matching property across
        /// nodes (§8 "for any two nodes, if log_a[i].term == log_b[i].term
        /// then log_a[0..i] == log_b[0..i]").
        #[test]
        fn shared_prefix_stays_identical_across_independent_logs(
            shared_terms in vec(1u64..10, 1..20),
            extra_a in vec(1u64..10, 0..10),
            extra_b in vec(1u64..10, 0..10),
        ) {
            let mut log_a = Log::new();
            let mut log_b = Log::new();
            for term in &shared_terms {
                let index = log_a.last_index() + 1;
                log_a.append(LogEntry { term: *term, index, command: "cmd".to_string() });
                log_b.append(LogEntry { term: *term, index, command: "cmd".to_string() });
            }
            let prefix_end = log_a.last_index();

            for term in &extra_a {
                let index = log_a.last_index() + 1;
                log_a.append(LogEntry { term: *term, index, command: "cmd".to_string() });
            }
            for term in &extra_b {
                let index = log_b.last_index() + 1;
                log_b.append(LogEntry { term: *term, index, command: "cmd".to_string() });
            }

            for index in 0..=prefix_end {
                prop_assert_eq!(log_a.term_at(index), log_b.term_at(index));
            }
        }
    }
}
