// Copyright 2020 TiKV Project Authors. Licensed under Apache-2.0.

use std::cmp;
use std::mem;

use slog::Logger;

use crate::action::{Action, ConfChangeResult};
use crate::config::Config;
use crate::errors::Result;
use crate::membership::{ConfigStatus, Membership};
use crate::message::{
    AppendOutcome, ClusterConfig, Entry, EntryPayload, Index, Message, ReplicaId, Term,
};
use crate::raft_log::RaftLog;
use crate::{HashMap, HashSet};

/// The role of the replica.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum StateRole {
    /// The replica is a follower of the leader.
    Follower,
    /// The replica could become a leader.
    Candidate,
    /// The replica is a leader.
    Leader,
}

impl Default for StateRole {
    fn default() -> StateRole {
        StateRole::Follower
    }
}

/// A struct that represents the raft consensus itself.
///
/// The replica owns no clock, sockets, files or threads: the driver feeds
/// it one input at a time (a peer message, a timer expiry, a client command
/// or a snapshot event) and executes the returned [`Action`] list in order.
#[derive(Getters)]
pub struct Raft {
    /// The ID of this replica.
    pub id: ReplicaId,

    /// The current election term.
    pub term: Term,

    /// Which peer this replica voted for in the current term.
    pub vote: Option<ReplicaId>,

    /// The persistent log.
    pub raft_log: RaftLog,

    /// The current role of this replica.
    pub state: StateRole,

    /// The known leader of the current term, if any.
    pub leader_id: Option<ReplicaId>,

    /// The membership tracker.
    #[get = "pub"]
    membership: Membership,

    // The index of the next entry to send to each peer. Leader only.
    next_index: HashMap<ReplicaId, Index>,

    // The highest index known replicated on each peer. Leader only.
    match_index: HashMap<ReplicaId, Index>,

    /// Peers with a snapshot transfer in flight. Leader only.
    #[get = "pub"]
    snapshot_transfers: HashSet<ReplicaId>,

    /// The votes granted to this replica in the current term.
    ///
    /// Reset when changing role.
    #[get = "pub"]
    votes: HashSet<ReplicaId>,

    // The actions accumulated while handling the current input.
    actions: Vec<Action>,

    /// The logger for the raft structure.
    pub(crate) logger: Logger,
}

impl Raft {
    /// Creates a new replica for use on the node.
    pub fn new(c: &Config, logger: &Logger) -> Result<Raft> {
        c.validate()?;
        let logger = logger.new(o!("id" => c.id.clone()));
        let r = Raft {
            id: c.id.clone(),
            term: c.term,
            vote: c.voted_for.clone(),
            raft_log: RaftLog::new(logger.clone()),
            state: StateRole::Follower,
            leader_id: None,
            membership: Membership::make(c.id.clone(), &c.membership),
            next_index: HashMap::default(),
            match_index: HashMap::default(),
            snapshot_transfers: HashSet::default(),
            votes: HashSet::default(),
            actions: Vec::new(),
            logger,
        };
        info!(
            r.logger,
            "newRaft";
            "term" => r.term,
            "peers" => ?r.membership.peers(),
        );
        Ok(r)
    }

    /// Reloads the log a driver persisted before a restart: the snapshot
    /// sentinel, the saved entry suffix and the commit/applied cursors.
    /// Configuration entries found in the suffix are re-adopted in order.
    ///
    /// Call once, right after [`Raft::new`], before feeding any input.
    pub fn load_state(
        &mut self,
        snapshot_index: Index,
        snapshot_term: Term,
        entries: Vec<Entry>,
        committed: Index,
        applied: Index,
    ) {
        self.raft_log.restore(snapshot_index, snapshot_term);
        self.raft_log.append_entries(&entries);
        for e in &entries {
            if let EntryPayload::Config(config) = &e.payload {
                self.membership.apply_config_entry(e.index, config);
            }
        }
        self.raft_log.commit_to(committed);
        self.raft_log.applied_to(applied);
        // A pending joint entry the old commit already covered.
        let _ = self.membership.commit(committed);
        info!(
            self.logger,
            "loaded state";
            "commit" => self.raft_log.committed,
            "applied" => self.raft_log.applied,
            "last index" => self.raft_log.last_index(),
            "last term" => self.raft_log.last_term(),
        );
    }

    fn emit(&mut self, action: Action) {
        self.actions.push(action);
    }

    fn take_actions(&mut self) -> Vec<Action> {
        mem::take(&mut self.actions)
    }

    fn send(&mut self, to: ReplicaId, m: Message) {
        debug!(
            self.logger,
            "sending message to {to}",
            to = &to;
            "msg" => ?m,
        );
        self.emit(Action::Send(to, m));
    }

    fn reset(&mut self, term: Term) {
        if self.term != term {
            self.term = term;
            self.vote = None;
        }
        self.leader_id = None;
        self.votes.clear();
        self.next_index.clear();
        self.match_index.clear();
        self.snapshot_transfers.clear();
    }

    /// Converts this replica to a follower.
    fn become_follower(&mut self, term: Term, leader_id: Option<ReplicaId>) {
        self.reset(term);
        self.leader_id = leader_id.clone();
        self.state = StateRole::Follower;
        self.emit(Action::BecomeFollower(leader_id));
        info!(
            self.logger,
            "became follower at term {term}",
            term = self.term;
        );
    }

    /// Converts this replica to a candidate at the next term.
    fn become_candidate(&mut self) {
        let term = self.term + 1;
        self.reset(term);
        self.vote = Some(self.id.clone());
        self.votes.insert(self.id.clone());
        self.state = StateRole::Candidate;
        self.emit(Action::BecomeCandidate);
        info!(
            self.logger,
            "became candidate at term {term}",
            term = self.term;
        );
    }

    /// Makes this replica the leader.
    fn become_leader(&mut self) {
        self.leader_id = Some(self.id.clone());
        self.state = StateRole::Leader;
        self.emit(Action::BecomeLeader);

        // A leader may only directly commit entries of its own term, so it
        // starts by appending one: a blank entry, or the pending
        // configuration target when a membership change is in flight and
        // must be re-asserted under the new term.
        let payload = match self.membership.pending_target() {
            Some(target) => EntryPayload::Config(target),
            None => EntryPayload::Nop,
        };
        let idx = self.raft_log.append(self.term, payload.clone());
        if let EntryPayload::Config(config) = &payload {
            self.membership.apply_config_entry(idx, config);
        }

        // Point every peer at the fresh entry so the first send carries it.
        self.next_index.clear();
        self.match_index.clear();
        for p in self.membership.peers() {
            self.next_index.insert(p.clone(), idx);
            self.match_index.insert(p, 0);
        }
        self.snapshot_transfers.clear();

        info!(
            self.logger,
            "became leader at term {term}",
            term = self.term;
        );
        self.bcast_append();
        self.update_commit_index();
        self.try_commit();
    }

    /// Sends entries (or a snapshot, if the needed prefix is compacted
    /// away) to the given peer, starting at its next index.
    fn send_append(&mut self, to: &ReplicaId) {
        if self.snapshot_transfers.contains(to) {
            trace!(
                self.logger,
                "skipping sending to {to}, snapshot transfer in flight",
                to = to;
            );
            return;
        }
        let next = cmp::max(
            1,
            self.next_index
                .get(to)
                .cloned()
                .unwrap_or_else(|| self.raft_log.last_index() + 1),
        );
        match self.raft_log.term(next - 1) {
            Some(prev_log_term) => {
                let entries = self.raft_log.entries_from(next);
                let m = Message::AppendEntries {
                    term: self.term,
                    leader_id: self.id.clone(),
                    prev_log_index: next - 1,
                    prev_log_term,
                    entries,
                    leader_commit: self.raft_log.committed,
                };
                self.send(to.clone(), m);
            }
            None => {
                // The prefix the peer needs is gone; stream a snapshot.
                let config = self.membership.last_commit();
                debug!(
                    self.logger,
                    "log prefix for {to} is compacted away, sending snapshot",
                    to = to;
                    "from_index" => next,
                );
                self.snapshot_transfers.insert(to.clone());
                self.emit(Action::SendSnapshot {
                    to: to.clone(),
                    from_index: next,
                    config,
                });
            }
        }
    }

    /// Sends entries to all the peers.
    fn bcast_append(&mut self) {
        for p in self.membership.peers() {
            self.send_append(&p);
        }
    }

    /// Steps the replica along via a message received from `from`. This
    /// should be called every time the driver receives a peer message.
    pub fn step(&mut self, from: &ReplicaId, m: Message) -> Vec<Action> {
        if !self.membership.mem_active(from) {
            debug!(
                self.logger,
                "ignored message from {from}, not an active member",
                from = from;
                "msg" => ?m,
            );
            return self.take_actions();
        }

        let term = m.term();
        if term > self.term {
            info!(
                self.logger,
                "received a message with higher term from {from}",
                from = from;
                "term" => self.term,
                "message_term" => term,
            );
            self.become_follower(term, None);
            if let Message::AppendEntries { .. } = m {
                // Record the sender as our vote to preclude competing
                // candidacies within the new term.
                self.vote = Some(from.clone());
            }
        } else if term < self.term {
            match &m {
                Message::RequestVote { .. } => {
                    self.log_vote_reject(from, &m);
                    self.send(
                        from.clone(),
                        Message::VoteResult {
                            term: self.term,
                            vote_granted: false,
                        },
                    );
                }
                Message::AppendEntries { prev_log_index, .. } => {
                    debug!(
                        self.logger,
                        "rejected stale append from {from}",
                        from = from;
                        "term" => self.term,
                        "msg term" => term,
                    );
                    let result = AppendOutcome::Failure(*prev_log_index);
                    self.send(
                        from.clone(),
                        Message::AppendResult {
                            term: self.term,
                            result,
                        },
                    );
                }
                _ => {
                    debug!(
                        self.logger,
                        "ignored a message with lower term from {from}",
                        from = from;
                        "term" => self.term,
                        "msg term" => term,
                    );
                }
            }
            return self.take_actions();
        }

        #[cfg(feature = "failpoints")]
        fail_point!("before_step");

        match m {
            Message::RequestVote {
                candidate_id,
                last_log_index,
                last_log_term,
                ..
            } => self.handle_request_vote(from, candidate_id, last_log_index, last_log_term),
            Message::VoteResult { vote_granted, .. } => {
                self.handle_vote_result(from, vote_granted)
            }
            Message::AppendEntries {
                prev_log_index,
                prev_log_term,
                entries,
                leader_commit,
                ..
            } => self.handle_append_entries(
                from,
                prev_log_index,
                prev_log_term,
                entries,
                leader_commit,
            ),
            Message::AppendResult { result, .. } => self.handle_append_result(from, result),
        }
        self.take_actions()
    }

    fn log_vote_reject(&self, from: &ReplicaId, m: &Message) {
        info!(
            self.logger,
            "[logterm: {log_term}, index: {log_index}, vote: {vote:?}] rejected vote from {from}",
            log_term = self.raft_log.last_term(),
            log_index = self.raft_log.last_index(),
            vote = self.vote.clone(),
            from = from;
            "term" => self.term,
            "msg" => ?m,
        );
    }

    fn handle_request_vote(
        &mut self,
        from: &ReplicaId,
        candidate_id: ReplicaId,
        last_log_index: Index,
        last_log_term: Term,
    ) {
        // We can vote if this is a repeat of a vote we've already cast...
        let can_vote = match &self.vote {
            Some(v) => *v == candidate_id,
            // ...or we haven't voted in this term...
            None => true,
        };
        // ...we are not ourselves campaigning or leading this term, and we
        // believe the candidate is up to date.
        if self.state == StateRole::Follower
            && can_vote
            && self.raft_log.is_up_to_date(last_log_index, last_log_term)
        {
            info!(
                self.logger,
                "[logterm: {log_term}, index: {log_index}] cast vote for {candidate}",
                log_term = self.raft_log.last_term(),
                log_index = self.raft_log.last_index(),
                candidate = &candidate_id;
                "term" => self.term,
            );
            self.vote = Some(candidate_id);
            self.emit(Action::BecomeFollower(None));
            self.send(
                from.clone(),
                Message::VoteResult {
                    term: self.term,
                    vote_granted: true,
                },
            );
        } else {
            self.log_vote_reject(
                from,
                &Message::RequestVote {
                    term: self.term,
                    candidate_id,
                    last_log_index,
                    last_log_term,
                },
            );
            self.send(
                from.clone(),
                Message::VoteResult {
                    term: self.term,
                    vote_granted: false,
                },
            );
        }
    }

    fn handle_vote_result(&mut self, from: &ReplicaId, vote_granted: bool) {
        if self.state != StateRole::Candidate {
            debug!(
                self.logger,
                "ignored vote result from {from}, not campaigning",
                from = from;
            );
            return;
        }
        if !vote_granted {
            info!(
                self.logger,
                "received rejection from {from}",
                from = from;
                "term" => self.term,
            );
            return;
        }
        info!(
            self.logger,
            "received vote from {from}",
            from = from;
            "term" => self.term,
        );
        self.votes.insert(from.clone());
        if self.membership.has_quorum(&self.votes) {
            self.become_leader();
        }
    }

    fn handle_append_entries(
        &mut self,
        from: &ReplicaId,
        prev_log_index: Index,
        prev_log_term: Term,
        mut entries: Vec<Entry>,
        leader_commit: Index,
    ) {
        match self.state {
            StateRole::Candidate => {
                // Someone else won the election at our term.
                self.become_follower(self.term, Some(from.clone()));
            }
            StateRole::Follower => {
                self.emit(Action::ResetElectionTimeout);
            }
            StateRole::Leader => {
                // Two leaders at one term would break election safety.
                error!(
                    self.logger,
                    "unexpected append entries from {from} at our own term",
                    from = from;
                    "term" => self.term,
                );
                return;
            }
        }

        let mut prev_log_index = prev_log_index;
        let mut prev_log_term = prev_log_term;
        if prev_log_index < self.raft_log.prev_log_index() {
            // The claimed previous entry is covered by our snapshot. If the
            // batch reaches across the snapshot boundary, re-anchor it
            // there; otherwise fall through to the mismatch reply below.
            let snap_idx = self.raft_log.prev_log_index();
            if let Some(e) = entries.iter().find(|e| e.index == snap_idx) {
                prev_log_index = snap_idx;
                prev_log_term = e.term;
                entries.retain(|e| e.index > snap_idx);
            }
        }

        match self.raft_log.term(prev_log_index) {
            None => {
                // We do not have the previous entry at all; hand the leader
                // our last index so it can rewind quickly.
                let last = self.raft_log.last_index();
                debug!(
                    self.logger,
                    "rejected append from {from}, no entry at {prev}",
                    from = from,
                    prev = prev_log_index;
                    "last index" => last,
                );
                self.send(
                    from.clone(),
                    Message::AppendResult {
                        term: self.term,
                        result: AppendOutcome::Failure(last),
                    },
                );
            }
            Some(t) if t != prev_log_term => {
                debug!(
                    self.logger,
                    "rejected append from {from}, term mismatch at {prev}",
                    from = from,
                    prev = prev_log_index;
                    "existing term" => t,
                    "msg log term" => prev_log_term,
                );
                self.send(
                    from.clone(),
                    Message::AppendResult {
                        term: self.term,
                        result: AppendOutcome::Failure(prev_log_index),
                    },
                );
            }
            Some(_) => {
                let prior_last = self.raft_log.last_index();
                let conflict = self.raft_log.append_entries(&entries);
                if let Some(c) = conflict {
                    // A truncated joint entry no longer governs us.
                    self.membership.drop_pending(c);
                }
                let adopt_from = conflict.unwrap_or(prior_last + 1);
                for e in &entries {
                    if e.index < adopt_from {
                        continue;
                    }
                    if let EntryPayload::Config(config) = &e.payload {
                        info!(
                            self.logger,
                            "adopting configuration from entry {index}",
                            index = e.index;
                            "config" => ?config,
                        );
                        self.membership.apply_config_entry(e.index, config);
                    }
                }
                self.leader_id = Some(from.clone());
                let last = self.raft_log.last_index();
                if leader_commit > self.raft_log.committed {
                    self.raft_log.commit_to(cmp::min(leader_commit, last));
                }
                self.send(
                    from.clone(),
                    Message::AppendResult {
                        term: self.term,
                        result: AppendOutcome::Success(last),
                    },
                );
                self.try_commit();
            }
        }
    }

    fn handle_append_result(&mut self, from: &ReplicaId, result: AppendOutcome) {
        if self.state != StateRole::Leader {
            debug!(
                self.logger,
                "ignored append result from {from}, not leader",
                from = from;
            );
            return;
        }
        match result {
            AppendOutcome::Success(last_idx) => {
                let next = self.next_index.entry(from.clone()).or_insert(1);
                *next = cmp::max(*next, last_idx + 1);
                let matched = self.match_index.entry(from.clone()).or_insert(0);
                *matched = cmp::max(*matched, last_idx);
                // A successful response is evidence our leadership is still
                // acknowledged; keep the election timer quiet.
                self.emit(Action::ResetElectionTimeout);
                self.update_commit_index();
                self.try_commit();
            }
            AppendOutcome::Failure(prev_log_index) => {
                debug!(
                    self.logger,
                    "received append rejection from {from}",
                    from = from;
                    "reject index" => prev_log_index,
                );
                let next = self.next_index.entry(from.clone()).or_insert(1);
                *next = cmp::max(1, cmp::min(*next, prev_log_index));
                self.send_append(from);
            }
        }
    }

    /// Attempts to advance the commit index from the match indices of the
    /// active members. Returns true if the commit index changed.
    ///
    /// A leader may only directly commit entries of its own term; earlier
    /// entries commit with them.
    fn update_commit_index(&mut self) -> bool {
        let last = self.raft_log.last_index();
        let match_index = &self.match_index;
        let id = &self.id;
        let n = self.membership.quorum_min(|m| {
            if m == id.as_str() {
                last
            } else {
                match_index.get(m).cloned().unwrap_or(0)
            }
        });
        if n > self.raft_log.committed && self.raft_log.term(n) == Some(self.term) {
            self.raft_log.commit_to(n);
            return true;
        }
        false
    }

    /// Hands newly committed entries to the driver and advances the
    /// membership change cycle when the commit covers configuration
    /// entries.
    fn try_commit(&mut self) {
        loop {
            let committed = self.raft_log.committed;
            if committed <= self.raft_log.applied {
                return;
            }
            let ents = self.raft_log.range(self.raft_log.applied + 1, committed);
            self.raft_log.applied_to(committed);

            let mut ops = Vec::new();
            let mut last_config = None;
            for e in &ents {
                match &e.payload {
                    EntryPayload::Op(data) => ops.push((e.index, data.clone(), e.term)),
                    EntryPayload::Config(config) => last_config = Some(config.clone()),
                    EntryPayload::Nop => {}
                }
            }
            if !ops.is_empty() {
                self.emit(Action::Apply(ops));
            }

            let mut advanced = false;
            if let Some((new_active, passive)) = self.membership.commit(committed) {
                if self.state == StateRole::Leader {
                    info!(
                        self.logger,
                        "joint entry committed, appending the closing configuration";
                        "new active" => ?new_active,
                    );
                    let config = ClusterConfig::Simple {
                        active: new_active,
                        passive,
                    };
                    let idx = self
                        .raft_log
                        .append(self.term, EntryPayload::Config(config.clone()));
                    self.membership.apply_config_entry(idx, &config);
                    // Replicated on the next heartbeat; a single-voter
                    // quorum may already cover it.
                    advanced = self.update_commit_index();
                }
            }
            if last_config.is_some() {
                self.emit(Action::ChangedConfig);
            }
            if let Some(config) = &last_config {
                if !config.contains(&self.id) {
                    info!(
                        self.logger,
                        "committed a configuration that excludes this replica, stopping";
                    );
                    self.emit(Action::Stop);
                }
            }
            if !advanced {
                return;
            }
        }
    }

    /// The election timer expired: campaign for leadership at the next
    /// term. For a leader this means its followers went quiet for a whole
    /// election timeout, so it steps down into the campaign as well.
    pub fn election_timeout(&mut self) -> Vec<Action> {
        if !self.membership.mem_active(&self.id) {
            warn!(
                self.logger,
                "not an active member, refusing to campaign";
            );
            return self.take_actions();
        }
        info!(
            self.logger,
            "starting a new election";
            "term" => self.term + 1,
        );
        self.become_candidate();
        if self.membership.has_quorum(&self.votes) {
            // A single-voter cluster elects itself on the spot.
            self.become_leader();
            return self.take_actions();
        }
        let last_log_index = self.raft_log.last_index();
        let last_log_term = self.raft_log.last_term();
        for p in self.membership.peers() {
            info!(
                self.logger,
                "[logterm: {log_term}, index: {log_index}] sent vote request to {to}",
                log_term = last_log_term,
                log_index = last_log_index,
                to = &p;
                "term" => self.term,
            );
            self.send(
                p,
                Message::RequestVote {
                    term: self.term,
                    candidate_id: self.id.clone(),
                    last_log_index,
                    last_log_term,
                },
            );
        }
        self.take_actions()
    }

    /// The heartbeat timer expired: replicate to every peer. Peers that
    /// are caught up receive an empty batch, which serves as the
    /// heartbeat.
    pub fn heartbeat_timeout(&mut self) -> Vec<Action> {
        if self.state != StateRole::Leader {
            debug!(self.logger, "ignored heartbeat timeout, not leader";);
            return self.take_actions();
        }
        self.emit(Action::ResetHeartbeat);
        self.bcast_append();
        self.take_actions()
    }

    /// Proposes a client command. A non-leader redirects the command to
    /// the leader it knows of; the leader appends it and fans out
    /// replication.
    pub fn client_command(&mut self, op: Vec<u8>) -> Vec<Action> {
        if self.state != StateRole::Leader {
            debug!(
                self.logger,
                "redirecting client command";
                "leader" => ?self.leader_id,
            );
            let leader = self.leader_id.clone();
            self.emit(Action::Redirect(leader, op));
            return self.take_actions();
        }
        self.raft_log.append(self.term, EntryPayload::Op(op));
        let before = self.actions.len();
        self.bcast_append();
        if self.actions.len() > before {
            self.actions.insert(before, Action::ResetHeartbeat);
        }
        self.update_commit_index();
        self.try_commit();
        self.take_actions()
    }

    /// Installs a snapshot the driver received from the leader. Returns
    /// false if the replica is not a follower or the snapshot is stale.
    ///
    /// The log keeps its suffix when it still matches at the snapshot
    /// index; otherwise it is reset to the snapshot boundary.
    pub fn install_snapshot(
        &mut self,
        last_term: Term,
        last_index: Index,
        config: ClusterConfig,
    ) -> bool {
        if self.state != StateRole::Follower {
            info!(
                self.logger,
                "ignored snapshot [index: {index}, term: {term}], not a follower",
                index = last_index,
                term = last_term;
            );
            return false;
        }
        if last_index < self.raft_log.committed {
            info!(
                self.logger,
                "[commit: {commit}] ignored stale snapshot [index: {index}, term: {term}]",
                commit = self.raft_log.committed,
                index = last_index,
                term = last_term;
            );
            return false;
        }
        self.membership = Membership::make(self.id.clone(), &config);
        if self.raft_log.match_term(last_index, last_term) {
            self.raft_log.compact(last_index, last_term);
            self.raft_log.commit_to(last_index);
            self.raft_log.applied_to(last_index);
        } else {
            self.raft_log.restore(last_index, last_term);
        }
        info!(
            self.logger,
            "restored snapshot [index: {index}, term: {term}]",
            index = last_index,
            term = last_term;
            "config" => ?self.membership.current(),
        );
        true
    }

    /// The driver finished streaming a snapshot to `peer` covering the log
    /// through `last_index`.
    pub fn snapshot_sent(&mut self, peer: &ReplicaId, last_index: Index) -> Vec<Action> {
        if self.state != StateRole::Leader {
            return self.take_actions();
        }
        if !self.snapshot_transfers.remove(peer) {
            debug!(
                self.logger,
                "snapshot completion for {peer} without a transfer in flight",
                peer = peer;
            );
        }
        let next = self.next_index.entry(peer.clone()).or_insert(1);
        *next = cmp::max(*next, last_index + 1);
        debug!(
            self.logger,
            "snapshot sent to {peer}, resuming replication",
            peer = peer;
            "next index" => *next,
        );
        self.send_append(peer);
        self.take_actions()
    }

    /// The driver failed to stream a snapshot to `peer`. The next
    /// heartbeat will retry.
    pub fn snapshot_send_failed(&mut self, peer: &ReplicaId) -> Vec<Action> {
        if self.state != StateRole::Leader {
            return self.take_actions();
        }
        self.snapshot_transfers.remove(peer);
        warn!(
            self.logger,
            "snapshot transfer to {peer} failed",
            peer = peer;
        );
        self.take_actions()
    }

    /// Discards the log prefix through `last_index` after the driver took
    /// a snapshot there. Leader only, and refused while any snapshot
    /// transfer is in flight, since a transfer may still need the prefix.
    pub fn compact_log(&mut self, last_index: Index) -> bool {
        if self.state != StateRole::Leader {
            debug!(self.logger, "ignored log compaction, not leader";);
            return false;
        }
        if !self.snapshot_transfers.is_empty() {
            info!(
                self.logger,
                "refused log compaction, snapshot transfers in flight";
                "transfers" => ?self.snapshot_transfers,
            );
            return false;
        }
        if last_index > self.raft_log.applied {
            warn!(
                self.logger,
                "refused log compaction beyond the applied index";
                "index" => last_index,
                "applied" => self.raft_log.applied,
            );
            return false;
        }
        match self.raft_log.term(last_index) {
            Some(term) => {
                self.raft_log.compact(last_index, term);
                info!(
                    self.logger,
                    "compacted log through {index}",
                    index = last_index;
                );
                true
            }
            None => false,
        }
    }

    /// Starts a membership change toward `(new_active, passive)`. The
    /// passive set is kept as-is when `None`.
    ///
    /// On success a joint configuration entry is appended and replicated
    /// like any other entry; once it commits the closing simple
    /// configuration follows automatically.
    pub fn change_config(
        &mut self,
        new_active: Vec<ReplicaId>,
        passive: Option<Vec<ReplicaId>>,
    ) -> (ConfChangeResult, Vec<Action>) {
        if self.state != StateRole::Leader {
            return (
                ConfChangeResult::Redirect(self.leader_id.clone()),
                self.take_actions(),
            );
        }
        match self.membership.status() {
            ConfigStatus::Transitional | ConfigStatus::Joint => {
                info!(self.logger, "membership change already in progress";);
                return (ConfChangeResult::ChangeInProcess, self.take_actions());
            }
            ConfigStatus::Normal => {}
        }
        if self.membership.committed_equals(&new_active, passive.as_deref()) {
            info!(self.logger, "membership already matches the request";);
            return (ConfChangeResult::AlreadyChanged, self.take_actions());
        }
        if new_active.is_empty() {
            fatal!(self.logger, "empty active set in membership change");
        }
        let idx = self.raft_log.last_index() + 1;
        let target = match self.membership.join(idx, &new_active, passive.as_deref()) {
            Ok(target) => target,
            Err(e) => fatal!(self.logger, "{}", e),
        };
        info!(
            self.logger,
            "beginning membership change at index {index}",
            index = idx;
            "config" => ?target,
        );
        self.raft_log.append(self.term, EntryPayload::Config(target));
        self.update_commit_index();
        self.try_commit();
        (ConfChangeResult::Started, self.take_actions())
    }
}
