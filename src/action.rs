//! The action vocabulary the core hands back to its driver.
//!
//! Every input fed to a [`Raft`](crate::Raft) returns an ordered list of
//! actions. The ordering is significant and the driver must execute the
//! list in order: role-change notifications precede sends, `Apply` precedes
//! `Stop`, and timer resets are emitted before the sends they pertain to.
//! Reordering can violate the persist-before-send guarantee.

// Copyright 2020 TiKV Project Authors. Licensed under Apache-2.0.

use crate::message::{ClusterConfig, Index, Message, ReplicaId, Term};

/// A side effect for the driver to execute.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    /// Apply these committed client commands, in index order, to the
    /// replicated state machine. Blank and configuration entries are
    /// already filtered out.
    Apply(Vec<(Index, Vec<u8>, Term)>),
    /// The replica started campaigning.
    BecomeCandidate,
    /// The replica reverted to follower, optionally knowing the leader.
    BecomeFollower(Option<ReplicaId>),
    /// The replica won an election.
    BecomeLeader,
    /// A configuration entry just committed.
    ChangedConfig,
    /// A client command arrived at a non-leader; forward it to the given
    /// leader, if one is known.
    Redirect(Option<ReplicaId>, Vec<u8>),
    /// Restart the election timer.
    ResetElectionTimeout,
    /// Restart the heartbeat timer.
    ResetHeartbeat,
    /// Send a message to a peer.
    Send(ReplicaId, Message),
    /// Stream a snapshot to a peer that has fallen behind the compacted
    /// log. The transfer is long-running in the driver; its completion
    /// comes back through `snapshot_sent` or `snapshot_send_failed`.
    SendSnapshot {
        /// The peer to stream to.
        to: ReplicaId,
        /// The first index the peer is missing.
        from_index: Index,
        /// The most recently committed configuration, recorded in the
        /// snapshot metadata.
        config: ClusterConfig,
    },
    /// The replica committed a configuration that excludes itself and must
    /// halt once the preceding `Apply` has been delivered upward.
    Stop,
}

/// The outcome of [`Raft::change_config`](crate::Raft::change_config).
///
/// These are tagged outcomes, not errors: a rejected change is a normal
/// reply to the caller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfChangeResult {
    /// This replica is not the leader; retry against the given one, if known.
    Redirect(Option<ReplicaId>),
    /// A membership change is already in flight.
    ChangeInProcess,
    /// The committed configuration already equals the requested one
    /// (order-insensitively).
    AlreadyChanged,
    /// The joint configuration entry was appended and the change started.
    Started,
}
