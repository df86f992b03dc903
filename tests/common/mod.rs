// Copyright 2020 TiKV Project Authors. Licensed under Apache-2.0.

// Each test binary compiles its own copy and uses a different subset.
#![allow(dead_code)]

//! A simulated cluster for driving replicas against each other.
//!
//! No actual network calls are made: the harness plays the driver for every
//! replica, delivering `Send` actions as inputs, emulating snapshot
//! transfers, and recording the `Apply` stream and role changes so tests
//! can assert protocol invariants over whole runs.

use std::collections::{BTreeMap, BTreeSet};

use raft_core::{Action, ClusterConfig, Config, Message, Raft, ReplicaId, StateRole};
use slog::o;

pub fn default_logger() -> slog::Logger {
    use slog::Drain;
    use std::sync::{Mutex, Once};

    static LOGGER_INITIALIZED: Once = Once::new();
    static mut LOGGER: Option<slog::Logger> = None;

    let logger = unsafe {
        LOGGER_INITIALIZED.call_once(|| {
            let decorator = slog_term::TermDecorator::new().build();
            let drain = slog_term::CompactFormat::new(decorator).build();
            let drain = slog_envlogger::new(drain);
            LOGGER = Some(slog::Logger::root(Mutex::new(drain).fuse(), o!()));
        });
        LOGGER.as_ref().unwrap()
    };
    if let Some(case) = std::thread::current()
        .name()
        .and_then(|v| v.split(':').last())
    {
        logger.new(o!("case" => case.to_string()))
    } else {
        logger.new(o!())
    }
}

pub fn ids(names: &[&str]) -> Vec<ReplicaId> {
    names.iter().map(|s| s.to_string()).collect()
}

/// An undelivered message on the simulated wire.
pub type Envelope = (ReplicaId, ReplicaId, Message);

/// A simulated network of replicas.
pub struct Cluster {
    /// The replicas, keyed by id.
    pub peers: BTreeMap<ReplicaId, Raft>,
    /// The `Apply` stream each replica has emitted, in order.
    pub applied: BTreeMap<ReplicaId, Vec<(u64, Vec<u8>, u64)>>,
    /// Replicas that emitted `Stop`.
    pub stopped: BTreeSet<ReplicaId>,
    /// Which replica became leader in which term, across the whole run.
    /// Election safety means at most one per term.
    pub leaders_by_term: BTreeMap<u64, ReplicaId>,
    cutm: BTreeSet<(ReplicaId, ReplicaId)>,
}

impl Cluster {
    /// Builds a cluster where every replica boots with the same simple
    /// configuration of active members.
    pub fn new(active: &[&str], logger: &slog::Logger) -> Cluster {
        Cluster::with_config(active, &[], logger)
    }

    /// Builds a cluster with active members and passive learners.
    pub fn with_config(active: &[&str], passive: &[&str], logger: &slog::Logger) -> Cluster {
        let membership = ClusterConfig::simple(ids(active), ids(passive));
        let mut peers = BTreeMap::new();
        for id in active.iter().chain(passive.iter()) {
            let c = Config::new(*id, membership.clone());
            peers.insert(id.to_string(), Raft::new(&c, logger).unwrap());
        }
        Cluster {
            peers,
            applied: BTreeMap::new(),
            stopped: BTreeSet::new(),
            leaders_by_term: BTreeMap::new(),
            cutm: BTreeSet::new(),
        }
    }

    /// Adds a fresh replica booted with the given membership, e.g. a node
    /// being provisioned ahead of a membership change.
    pub fn add_replica(&mut self, id: &str, membership: ClusterConfig, logger: &slog::Logger) {
        let c = Config::new(id, membership);
        self.peers.insert(id.to_string(), Raft::new(&c, logger).unwrap());
    }

    /// Cut the communication between the two given replicas.
    pub fn cut(&mut self, one: &str, other: &str) {
        self.cutm.insert((one.to_string(), other.to_string()));
        self.cutm.insert((other.to_string(), one.to_string()));
    }

    /// Isolate the given replica to and from the rest of the cluster.
    pub fn isolate(&mut self, id: &str) {
        let others: Vec<ReplicaId> = self.peers.keys().cloned().collect();
        for other in others {
            if other != id {
                self.cut(id, &other);
            }
        }
    }

    /// Recover the link conditions applied with `cut` and `isolate`.
    pub fn recover(&mut self) {
        self.cutm.clear();
    }

    fn delivers(&self, from: &str, to: &str) -> bool {
        !self.cutm.contains(&(from.to_string(), to.to_string()))
            && !self.stopped.contains(to)
            && self.peers.contains_key(to)
    }

    /// Turns one replica's action list into wire traffic, executing every
    /// driver-side effect along the way. Snapshot transfers complete
    /// immediately unless the link is down.
    pub fn process(&mut self, owner: &str, actions: Vec<Action>) -> Vec<Envelope> {
        let mut out = Vec::new();
        for action in actions {
            match action {
                Action::Send(to, m) => out.push((owner.to_string(), to, m)),
                Action::Apply(ops) => {
                    self.applied
                        .entry(owner.to_string())
                        .or_insert_with(Vec::new)
                        .extend(ops);
                }
                Action::Stop => {
                    self.stopped.insert(owner.to_string());
                }
                Action::BecomeLeader => {
                    let term = self.peers[owner].term;
                    let prev = self
                        .leaders_by_term
                        .insert(term, owner.to_string());
                    if let Some(prev) = prev {
                        assert_eq!(
                            prev, owner,
                            "two leaders elected in term {}: {} and {}",
                            term, prev, owner
                        );
                    }
                }
                Action::SendSnapshot {
                    to,
                    from_index: _,
                    config,
                } => {
                    let (last_index, last_term) = {
                        let r = &self.peers[owner];
                        (r.raft_log.prev_log_index(), r.raft_log.prev_log_term())
                    };
                    let installed = if self.delivers(owner, &to) {
                        self.peers
                            .get_mut(&to)
                            .unwrap()
                            .install_snapshot(last_term, last_index, config)
                    } else {
                        false
                    };
                    let next = if installed {
                        self.peers
                            .get_mut(owner)
                            .unwrap()
                            .snapshot_sent(&to, last_index)
                    } else {
                        self.peers.get_mut(owner).unwrap().snapshot_send_failed(&to)
                    };
                    let mut more = self.process(owner, next);
                    out.append(&mut more);
                }
                // Timer and role bookkeeping the real driver would act on.
                Action::BecomeCandidate
                | Action::BecomeFollower(_)
                | Action::ChangedConfig
                | Action::Redirect(..)
                | Action::ResetElectionTimeout
                | Action::ResetHeartbeat => {}
            }
        }
        out
    }

    /// Delivers the given messages, and every message produced in response,
    /// until the network is quiet.
    pub fn dispatch(&mut self, mut queue: Vec<Envelope>) {
        while !queue.is_empty() {
            let mut next = Vec::new();
            for (from, to, m) in queue.drain(..) {
                if !self.delivers(&from, &to) {
                    continue;
                }
                let actions = self.peers.get_mut(&to).unwrap().step(&from, m);
                next.extend(self.process(&to, actions));
            }
            queue = next;
        }
    }

    /// Expires the election timer on a replica and runs the resulting
    /// campaign to completion.
    pub fn election_timeout(&mut self, id: &str) {
        if self.stopped.contains(id) {
            return;
        }
        let actions = self.peers.get_mut(id).unwrap().election_timeout();
        let msgs = self.process(id, actions);
        self.dispatch(msgs);
    }

    /// Expires the heartbeat timer on a replica and delivers the traffic.
    pub fn heartbeat_timeout(&mut self, id: &str) {
        if self.stopped.contains(id) {
            return;
        }
        let actions = self.peers.get_mut(id).unwrap().heartbeat_timeout();
        let msgs = self.process(id, actions);
        self.dispatch(msgs);
    }

    /// Proposes a client command on a replica, following a single redirect
    /// if it is not the leader. Returns false if nobody accepted it.
    pub fn propose(&mut self, id: &str, op: &[u8]) -> bool {
        if self.stopped.contains(id) {
            return false;
        }
        let actions = self.peers.get_mut(id).unwrap().client_command(op.to_vec());
        let mut redirect = None;
        for a in &actions {
            if let Action::Redirect(leader, op) = a {
                redirect = Some((leader.clone(), op.clone()));
            }
        }
        let msgs = self.process(id, actions);
        self.dispatch(msgs);
        match redirect {
            None => true,
            Some((Some(leader), op)) if leader != id && self.delivers(id, &leader) => {
                let actions = self.peers.get_mut(&leader).unwrap().client_command(op);
                let redirected_again = actions
                    .iter()
                    .any(|a| matches!(a, Action::Redirect(..)));
                let msgs = self.process(&leader, actions);
                self.dispatch(msgs);
                !redirected_again
            }
            Some(_) => false,
        }
    }

    /// The current leader, if exactly one non-stopped replica is leading.
    pub fn leader(&self) -> Option<ReplicaId> {
        let leaders: Vec<ReplicaId> = self
            .peers
            .iter()
            .filter(|(id, r)| r.state == StateRole::Leader && !self.stopped.contains(*id))
            .map(|(id, _)| id.clone())
            .collect();
        match leaders.as_slice() {
            [single] => Some(single.clone()),
            _ => None,
        }
    }

    /// Asserts the log-matching property over every pair of replicas: logs
    /// that agree on the term at some index agree on everything before it.
    pub fn assert_log_matching(&self) {
        let ids: Vec<&ReplicaId> = self.peers.keys().collect();
        for a in &ids {
            for b in &ids {
                if a >= b {
                    continue;
                }
                let ra = &self.peers[*a];
                let rb = &self.peers[*b];
                let lo = std::cmp::max(
                    ra.raft_log.prev_log_index(),
                    rb.raft_log.prev_log_index(),
                ) + 1;
                let hi = std::cmp::min(ra.raft_log.last_index(), rb.raft_log.last_index());
                let mut agreed_from = None;
                for idx in (lo..=hi).rev() {
                    if ra.raft_log.term(idx) == rb.raft_log.term(idx) {
                        agreed_from = Some(idx);
                        break;
                    }
                }
                if let Some(top) = agreed_from {
                    for idx in lo..=top {
                        assert_eq!(
                            ra.raft_log.term(idx),
                            rb.raft_log.term(idx),
                            "log matching violated between {} and {} at index {}",
                            a,
                            b,
                            idx
                        );
                    }
                }
            }
        }
    }

    /// Asserts state-machine safety: every pair of `Apply` streams agrees
    /// on the prefix both have produced.
    pub fn assert_applied_prefix_agreement(&self) {
        let ids: Vec<&ReplicaId> = self.applied.keys().collect();
        for a in &ids {
            for b in &ids {
                if a >= b {
                    continue;
                }
                let sa = &self.applied[*a];
                let sb = &self.applied[*b];
                // Streams may start at different indices when one replica
                // caught up from a snapshot; compare the overlap.
                for (idx, op, term) in sa {
                    if let Some((_, other_op, other_term)) =
                        sb.iter().find(|(i, _, _)| i == idx)
                    {
                        assert_eq!(
                            (op, term),
                            (other_op, other_term),
                            "state machine safety violated between {} and {} at index {}",
                            a,
                            b,
                            idx
                        );
                    }
                }
            }
        }
    }
}
