//! The wire-level vocabulary of the protocol: log entries, cluster
//! configurations and the messages replicas exchange.
//!
//! Binary encoding is the driver's concern. Every type here derives
//! `serde::{Serialize, Deserialize}` so any serializer preserving the field
//! semantics can carry it.

// Copyright 2020 TiKV Project Authors. Licensed under Apache-2.0.

use serde::{Deserialize, Serialize};

/// A logical epoch. Increases on every election attempt.
pub type Term = u64;

/// A log position. 1-based; index 0 is the sentinel "before the log".
pub type Index = u64;

/// An opaque replica identifier, globally unique within a cluster.
pub type ReplicaId = String;

/// A constant represents invalid index of raft log.
pub const INVALID_INDEX: Index = 0;

/// The payload carried by a log entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryPayload {
    /// A blank entry committed by a new leader at the start of its term to
    /// discover its commit index.
    Nop,
    /// An opaque client command.
    Op(Vec<u8>),
    /// A cluster membership change.
    Config(ClusterConfig),
}

/// An entry in the replicated log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// The term in which the entry was appended.
    pub term: Term,
    /// The position assigned at append time. Strictly increasing and
    /// contiguous within a log.
    pub index: Index,
    /// What the entry carries.
    pub payload: EntryPayload,
}

impl Entry {
    /// Creates an entry at a given log position.
    pub fn new(term: Term, index: Index, payload: EntryPayload) -> Entry {
        Entry {
            term,
            index,
            payload,
        }
    }
}

/// A cluster membership configuration.
///
/// Active members vote and can be elected leader; passive members (learners)
/// only receive replication and never count toward quorums.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClusterConfig {
    /// The steady-state configuration.
    Simple {
        /// Voting members.
        active: Vec<ReplicaId>,
        /// Non-voting learners.
        passive: Vec<ReplicaId>,
    },
    /// The transitional configuration during a membership change. Quorums
    /// require majorities in both `old_active` and `new_active`.
    Joint {
        /// The active set being replaced.
        old_active: Vec<ReplicaId>,
        /// The active set being installed.
        new_active: Vec<ReplicaId>,
        /// Non-voting learners.
        passive: Vec<ReplicaId>,
    },
}

impl ClusterConfig {
    /// Creates a simple configuration.
    pub fn simple(active: Vec<ReplicaId>, passive: Vec<ReplicaId>) -> ClusterConfig {
        ClusterConfig::Simple { active, passive }
    }

    /// Whether this is a joint configuration.
    pub fn is_joint(&self) -> bool {
        match self {
            ClusterConfig::Simple { .. } => false,
            ClusterConfig::Joint { .. } => true,
        }
    }

    /// Membership test, counting active and passive members alike.
    pub fn contains(&self, id: &str) -> bool {
        match self {
            ClusterConfig::Simple { active, passive } => {
                active.iter().any(|m| m == id) || passive.iter().any(|m| m == id)
            }
            ClusterConfig::Joint {
                old_active,
                new_active,
                passive,
            } => {
                old_active.iter().any(|m| m == id)
                    || new_active.iter().any(|m| m == id)
                    || passive.iter().any(|m| m == id)
            }
        }
    }
}

/// The outcome a follower reports back for an `AppendEntries`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AppendOutcome {
    /// The entries were installed; carries the follower's new last log index.
    Success(Index),
    /// The follower's log did not match at `prev_log_index`; carries the
    /// index the leader should rewind `next_index` to.
    Failure(Index),
}

/// A message exchanged between replicas.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    /// A candidate soliciting a vote.
    RequestVote {
        /// The term the candidate is campaigning in.
        term: Term,
        /// The campaigning replica.
        candidate_id: ReplicaId,
        /// Index of the candidate's last log entry.
        last_log_index: Index,
        /// Term of the candidate's last log entry.
        last_log_term: Term,
    },
    /// A voter's reply to `RequestVote`.
    VoteResult {
        /// The voter's current term.
        term: Term,
        /// Whether the vote was granted.
        vote_granted: bool,
    },
    /// Log replication (and heartbeat, when `entries` is empty).
    AppendEntries {
        /// The leader's term.
        term: Term,
        /// The sending leader.
        leader_id: ReplicaId,
        /// Index of the entry immediately preceding `entries`.
        prev_log_index: Index,
        /// Term of the entry at `prev_log_index`.
        prev_log_term: Term,
        /// The entries to install; may be empty.
        entries: Vec<Entry>,
        /// The leader's commit index.
        leader_commit: Index,
    },
    /// A follower's reply to `AppendEntries`.
    AppendResult {
        /// The follower's current term.
        term: Term,
        /// Success or failure, with the relevant log index.
        result: AppendOutcome,
    },
}

impl Message {
    /// The term the message was sent at.
    pub fn term(&self) -> Term {
        match self {
            Message::RequestVote { term, .. }
            | Message::VoteResult { term, .. }
            | Message::AppendEntries { term, .. }
            | Message::AppendResult { term, .. } => *term,
        }
    }
}
