// Copyright 2020 TiKV Project Authors. Licensed under Apache-2.0.

use crate::membership::ConfigStatus;
use crate::message::{Index, ReplicaId, Term};
use crate::raft::{Raft, StateRole};

/// Represents the current status of a replica, for drivers, logs and tests.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Status {
    /// The replica's id.
    pub id: ReplicaId,
    /// The current term.
    pub term: Term,
    /// Which peer the replica voted for in the current term.
    pub vote: Option<ReplicaId>,
    /// The current role.
    pub role: StateRole,
    /// The known leader, if any.
    pub leader_id: Option<ReplicaId>,
    /// The highest committed log index.
    pub commit_index: Index,
    /// The highest log index handed to the driver for application.
    pub last_applied: Index,
    /// The last log index.
    pub last_index: Index,
    /// The phase of the membership change cycle.
    pub config_status: ConfigStatus,
}

impl Status {
    /// Gets a copy of the current replica status.
    pub fn new(raft: &Raft) -> Status {
        Status {
            id: raft.id.clone(),
            term: raft.term,
            vote: raft.vote.clone(),
            role: raft.state,
            leader_id: raft.leader_id.clone(),
            commit_index: raft.raft_log.committed,
            last_applied: raft.raft_log.applied,
            last_index: raft.raft_log.last_index(),
            config_status: raft.membership().status(),
        }
    }
}
