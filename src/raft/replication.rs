//! Log replication (§4.4), grounded on the teacher's `append_entry`,
//! `send_heartbeats`, `handle_append_entries`, and `advance_commit_index`
//! in `distributed_consensus.rs`.

use std::sync::Arc;
use std::time::Instant;

use tonic::Request;
use tracing::{info, warn};

use crate::config::{MAJORITY_WAIT_POLL, MAJORITY_WAIT_TIMEOUT, RAFT_RPC_TIMEOUT, REPLICATION_INTERVAL};
use crate::error::ConcordError;
use crate::raft::node::RaftNode;
use crate::raft::types::{LogEntry, Role};
use crate::rpc::raft::raft_client::RaftClient as RaftPeerClient;
use crate::rpc::raft::{AppendEntriesMessage, AppendEntriesResponseMessage, LogEntryMessage};
use crate::transport::with_timeout;

impl RaftNode {
    /// Appends `command` to the leader's log and returns the new entry's
    /// index. Fails with [`ConcordError::NotLeader`] on a follower or
    /// candidate (§4.4 step 1).
    pub fn append_entry(&self, command: String) -> Result<u64, ConcordError> {
        if !self.is_leader() {
            return Err(ConcordError::NotLeader {
                leader_hint: self.current_leader().unwrap_or_default(),
            });
        }
        let term = self.current_term();
        let mut log = self.log.write();
        let index = log.last_index() + 1;
        log.append(LogEntry {
            term,
            index,
            command,
        });
        Ok(index)
    }

    /// Blocks until `index` is replicated to a majority of the cluster or
    /// [`MAJORITY_WAIT_TIMEOUT`] elapses (§4.4 step 3).
    pub async fn wait_for_majority(&self, index: u64) -> bool {
        let deadline = Instant::now() + MAJORITY_WAIT_TIMEOUT;
        loop {
            if self.commit_index() >= index {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(MAJORITY_WAIT_POLL).await;
        }
    }

    pub(crate) fn spawn_replication_loop(self: &Arc<Self>) {
        let node = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(REPLICATION_INTERVAL);
            loop {
                tokio::select! {
                    _ = node.cancellation.cancelled() => return,
                    _ = ticker.tick() => {}
                }
                if node.is_leader() {
                    node.replicate_to_followers().await;
                }
            }
        });
    }

    pub(crate) fn spawn_apply_loop(self: &Arc<Self>) {
        let node = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(std::time::Duration::from_millis(50));
            loop {
                tokio::select! {
                    _ = node.cancellation.cancelled() => return,
                    _ = ticker.tick() => {}
                }
                node.apply_committed_entries();
            }
        });
    }

    fn apply_committed_entries(&self) {
        loop {
            let (last_applied, commit_index) = {
                let state = self.commit_state.read();
                (state.last_applied, state.commit_index)
            };
            if last_applied >= commit_index {
                return;
            }
            let next = last_applied + 1;
            let entry = self.log.read().get(next).cloned();
            if let Some(entry) = entry {
                self.state_machine.apply(entry.index, &entry.command);
            }
            self.commit_state.write().last_applied = next;
        }
    }

    /// Sends an empty `AppendEntries` to every peer; used as the leader
    /// heartbeat (§4.3) and piggybacks `leader_commit` so followers advance
    /// their own commit index even with nothing new to append.
    pub(crate) async fn send_heartbeats(self: &Arc<Self>) {
        self.replicate_to_followers().await;
    }

    async fn replicate_to_followers(self: &Arc<Self>) {
        let peers: Vec<(String, String)> =
            self.peers.iter().map(|(k, v)| (k.clone(), v.clone())).collect();

        let results = futures::future::join_all(
            peers
                .iter()
                .map(|(peer_id, address)| self.send_append_entries_to(peer_id, address)),
        )
        .await;

        for (peer_id, result) in peers.iter().map(|(id, _)| id).zip(results) {
            match result {
                Some((term, success, match_index)) => {
                    if term > self.current_term() {
                        self.step_down(term);
                        return;
                    }
                    if success {
                        if let Some(leader_state) = self.leader_state.write().as_mut() {
                            leader_state.match_index.insert(peer_id.clone(), match_index);
                            leader_state.next_index.insert(peer_id.clone(), match_index + 1);
                        }
                    } else if let Some(leader_state) = self.leader_state.write().as_mut() {
                        // Log inconsistency: back off next_index and retry
                        // on the following replication tick (§4.4 step 6).
                        let next = leader_state.next_index.entry(peer_id.clone()).or_insert(1);
                        *next = next.saturating_sub(1).max(1);
                    }
                }
                None => continue,
            }
        }

        self.advance_commit_index();
    }

    async fn send_append_entries_to(
        &self,
        peer_id: &str,
        address: &str,
    ) -> Option<(u64, bool, u64)> {
        let next_index = {
            let leader_state = self.leader_state.read();
            leader_state
                .as_ref()
                .and_then(|s| s.next_index.get(peer_id).copied())
                .unwrap_or(1)
        };
        let prev_log_index = next_index.saturating_sub(1);
        let (prev_log_term, entries) = {
            let log = self.log.read();
            let prev_log_term = log.term_at(prev_log_index).unwrap_or(0);
            let entries = log
                .entries_from(next_index)
                .into_iter()
                .map(|e| LogEntryMessage {
                    term: e.term,
                    index: e.index,
                    command: e.command,
                })
                .collect();
            (prev_log_term, entries)
        };

        let channel = self.channels.get(address).await.ok()?;
        info!("Node {} sends RPC AppendEntries to Node {peer_id}", self.node_id);
        let channel = with_timeout(channel, RAFT_RPC_TIMEOUT);
        let mut client = RaftPeerClient::new(channel);
        let response = client
            .append_entries(Request::new(AppendEntriesMessage {
                term: self.current_term(),
                leader_id: self.node_id.clone(),
                prev_log_index,
                prev_log_term,
                entries,
                leader_commit: self.commit_index(),
            }))
            .await;

        match response {
            Ok(resp) => {
                let resp = resp.into_inner();
                Some((resp.term, resp.success, resp.match_index))
            }
            Err(status) => {
                warn!(%address, %status, "append_entries failed");
                None
            }
        }
    }

    /// Commits index `n` once it is present on a quorum of nodes (§4.4
    /// step 5). Only entries from the current term are counted, per the
    /// Raft safety rule against committing entries from prior terms purely
    /// by count.
    fn advance_commit_index(&self) {
        let Some(leader_state) = self.leader_state.read().clone() else {
            return;
        };
        let current_term = self.current_term();
        let last_index = self.log.read().last_index();
        let commit_index = self.commit_index();

        for n in (commit_index + 1..=last_index).rev() {
            let Some(term_at_n) = self.log.read().term_at(n) else {
                continue;
            };
            if term_at_n != current_term {
                continue;
            }
            let mut count = 1; // self
            for match_index in leader_state.match_index.values() {
                if *match_index >= n {
                    count += 1;
                }
            }
            if count >= self.quorum() {
                self.commit_state.write().commit_index = n;
                info!(node_id = %self.node_id, commit_index = n, "advanced commit index");
                break;
            }
        }
    }

    pub(crate) async fn handle_append_entries(
        &self,
        req: AppendEntriesMessage,
    ) -> AppendEntriesResponseMessage {
        info!(
            "Node {} runs RPC AppendEntries called by Node {}",
            self.node_id, req.leader_id
        );
        if req.term > self.current_term() {
            self.step_down(req.term);
        }
        let current_term = self.current_term();

        if req.term < current_term {
            return AppendEntriesResponseMessage {
                term: current_term,
                success: false,
                match_index: self.log.read().last_index(),
            };
        }

        // A valid leader for our term: reset the election clock and
        // recognize it, even on an otherwise-empty heartbeat.
        *self.role.write() = Role::Follower;
        *self.current_leader.write() = Some(req.leader_id.clone());
        *self.last_heartbeat.lock() = Instant::now();

        {
            let log = self.log.read();
            let consistent = req.prev_log_index == 0
                || log
                    .term_at(req.prev_log_index)
                    .map(|t| t == req.prev_log_term)
                    .unwrap_or(false);
            if !consistent {
                return AppendEntriesResponseMessage {
                    term: current_term,
                    success: false,
                    match_index: log.last_index(),
                };
            }
        }

        if !req.entries.is_empty() {
            let mut log = self.log.write();
            log.truncate_after(req.prev_log_index);
            for entry in req.entries {
                log.append(LogEntry {
                    term: entry.term,
                    index: entry.index,
                    command: entry.command,
                });
            }
        }

        let last_index = self.log.read().last_index();
        if req.leader_commit > self.commit_index() {
            self.commit_state.write().commit_index = req.leader_commit.min(last_index);
        }

        AppendEntriesResponseMessage {
            term: current_term,
            success: true,
            match_index: last_index,
        }
    }
}
