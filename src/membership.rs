//! Tracks the cluster membership a replica currently operates under,
//! including the two-phase joint-consensus cycle, and answers the quorum
//! queries election and commit tracking are built on.
//!
//! The tracker cycles `Normal -> Transitional -> Joint -> Normal`: a joint
//! configuration entry appended at `join_index` moves it to `Transitional`,
//! committing that entry moves it to `Joint`, and appending the closing
//! simple configuration returns it to `Normal`. In both joint phases every
//! quorum decision requires majorities in the old and the new active set.

// Copyright 2020 TiKV Project Authors. Licensed under Apache-2.0.

use crate::errors::{Error, Result};
use crate::message::{ClusterConfig, Index, ReplicaId};
use crate::util::majority;
use crate::HashSet;

/// The externally visible phase of the membership change cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigStatus {
    /// Steady state; a single active set.
    Normal,
    /// A joint configuration entry is in the log but not yet committed.
    Transitional,
    /// The joint entry committed; the closing simple configuration has not
    /// been appended yet.
    Joint,
}

#[derive(Clone, Debug, PartialEq)]
enum Phase {
    Normal,
    Transitional {
        join_index: Index,
        next_active: HashSet<ReplicaId>,
    },
    Joint {
        next_active: HashSet<ReplicaId>,
    },
}

/// The membership tracker of a single replica.
#[derive(Clone, Debug, PartialEq)]
pub struct Membership {
    id: ReplicaId,
    active: HashSet<ReplicaId>,
    passive: HashSet<ReplicaId>,
    phase: Phase,
}

fn to_set(ids: &[ReplicaId]) -> HashSet<ReplicaId> {
    ids.iter().cloned().collect()
}

fn sorted(set: &HashSet<ReplicaId>) -> Vec<ReplicaId> {
    let mut ids: Vec<ReplicaId> = set.iter().cloned().collect();
    ids.sort();
    ids
}

impl Membership {
    /// Initializes the tracker from a configuration, typically the one a
    /// driver bootstraps with or the one carried by a snapshot.
    ///
    /// A joint configuration initializes straight into the `Joint` phase:
    /// a snapshot only ever carries committed configurations.
    pub fn make(id: ReplicaId, config: &ClusterConfig) -> Membership {
        match config {
            ClusterConfig::Simple { active, passive } => Membership {
                id,
                active: to_set(active),
                passive: to_set(passive),
                phase: Phase::Normal,
            },
            ClusterConfig::Joint {
                old_active,
                new_active,
                passive,
            } => Membership {
                id,
                active: to_set(old_active),
                passive: to_set(passive),
                phase: Phase::Joint {
                    next_active: to_set(new_active),
                },
            },
        }
    }

    /// The phase the tracker is in.
    pub fn status(&self) -> ConfigStatus {
        match self.phase {
            Phase::Normal => ConfigStatus::Normal,
            Phase::Transitional { .. } => ConfigStatus::Transitional,
            Phase::Joint { .. } => ConfigStatus::Joint,
        }
    }

    /// All members, active and passive, except this replica. Sorted for
    /// deterministic iteration.
    pub fn peers(&self) -> Vec<ReplicaId> {
        let mut all = self.active.clone();
        if let Phase::Transitional { next_active, .. } | Phase::Joint { next_active } = &self.phase
        {
            all.extend(next_active.iter().cloned());
        }
        all.extend(self.passive.iter().cloned());
        all.remove(&self.id);
        sorted(&all)
    }

    /// Membership test, including passive members.
    pub fn mem(&self, id: &str) -> bool {
        self.mem_active(id) || self.passive.contains(id)
    }

    /// Active-only membership test.
    pub fn mem_active(&self, id: &str) -> bool {
        if self.active.contains(id) {
            return true;
        }
        match &self.phase {
            Phase::Normal => false,
            Phase::Transitional { next_active, .. } | Phase::Joint { next_active } => {
                next_active.contains(id)
            }
        }
    }

    /// Whether `voters` contains a strict majority of every active set in
    /// the current configuration. Non-members in `voters` are ignored.
    pub fn has_quorum(&self, voters: &HashSet<ReplicaId>) -> bool {
        let won = |set: &HashSet<ReplicaId>| {
            let granted = set.iter().filter(|m| voters.contains(*m)).count();
            granted >= majority(set.len())
        };
        match &self.phase {
            Phase::Normal => won(&self.active),
            Phase::Transitional { next_active, .. } | Phase::Joint { next_active } => {
                won(&self.active) && won(next_active)
            }
        }
    }

    /// Returns the largest `N` such that a quorum of active members has
    /// `get(id) >= N`. In joint phases this is the minimum of the two
    /// active sets' values, so an index only clears when it is acknowledged
    /// by majorities of both.
    pub fn quorum_min(&self, get: impl Fn(&str) -> Index) -> Index {
        let set_min = |set: &HashSet<ReplicaId>| {
            let mut acked: Vec<Index> = set.iter().map(|m| get(m)).collect();
            // Reverse sort; the quorum-th largest value is the answer.
            acked.sort_unstable_by(|a, b| b.cmp(a));
            acked[majority(acked.len()) - 1]
        };
        match &self.phase {
            Phase::Normal => set_min(&self.active),
            Phase::Transitional { next_active, .. } | Phase::Joint { next_active } => {
                std::cmp::min(set_min(&self.active), set_min(next_active))
            }
        }
    }

    /// Starts a membership change: moves to `Transitional` keyed by the log
    /// index the joint entry will occupy, and returns the joint
    /// configuration to append there. Only valid from `Normal`.
    pub fn join(
        &mut self,
        idx: Index,
        new_active: &[ReplicaId],
        passive: Option<&[ReplicaId]>,
    ) -> Result<ClusterConfig> {
        if self.phase != Phase::Normal {
            return Err(Error::ViolatesContract(
                "membership change already in progress".to_owned(),
            ));
        }
        if let Some(passive) = passive {
            self.passive = to_set(passive);
        }
        let target = ClusterConfig::Joint {
            old_active: sorted(&self.active),
            new_active: new_active.to_vec(),
            passive: sorted(&self.passive),
        };
        self.phase = Phase::Transitional {
            join_index: idx,
            next_active: to_set(new_active),
        };
        Ok(target)
    }

    /// Reverts a pending change whose joint entry was truncated away: if the
    /// tracker is `Transitional` with `join_index >= idx`, fall back to
    /// `Normal` under the old active set.
    pub fn drop_pending(&mut self, idx: Index) {
        if let Phase::Transitional { join_index, .. } = self.phase {
            if join_index >= idx {
                self.phase = Phase::Normal;
            }
        }
    }

    /// Notes that the log is committed through `idx`. If that covers the
    /// pending joint entry, advance `Transitional -> Joint` and return the
    /// `(new_active, passive)` pair the leader must now append as a simple
    /// configuration to finish the change.
    pub fn commit(&mut self, idx: Index) -> Option<(Vec<ReplicaId>, Vec<ReplicaId>)> {
        if let Phase::Transitional {
            join_index,
            next_active,
        } = &self.phase
        {
            if *join_index <= idx {
                let next = next_active.clone();
                let wanted = (sorted(&next), sorted(&self.passive));
                self.phase = Phase::Joint { next_active: next };
                return Some(wanted);
            }
        }
        None
    }

    /// The most recently committed configuration; this is what snapshot
    /// metadata carries. In `Transitional` the joint entry is not committed
    /// yet, so the previous simple configuration still rules.
    pub fn last_commit(&self) -> ClusterConfig {
        match &self.phase {
            Phase::Normal | Phase::Transitional { .. } => ClusterConfig::Simple {
                active: sorted(&self.active),
                passive: sorted(&self.passive),
            },
            Phase::Joint { next_active } => ClusterConfig::Joint {
                old_active: sorted(&self.active),
                new_active: sorted(next_active),
                passive: sorted(&self.passive),
            },
        }
    }

    /// The configuration the tracker currently operates under, i.e. the one
    /// quorum decisions are made against.
    pub fn current(&self) -> ClusterConfig {
        match &self.phase {
            Phase::Normal => ClusterConfig::Simple {
                active: sorted(&self.active),
                passive: sorted(&self.passive),
            },
            Phase::Transitional { next_active, .. } | Phase::Joint { next_active } => {
                ClusterConfig::Joint {
                    old_active: sorted(&self.active),
                    new_active: sorted(next_active),
                    passive: sorted(&self.passive),
                }
            }
        }
    }

    /// The configuration entry a freshly elected leader must re-assert in
    /// its own term: the joint entry while a change is pending, or the
    /// closing simple entry once the joint one committed.
    pub fn pending_target(&self) -> Option<ClusterConfig> {
        match &self.phase {
            Phase::Normal => None,
            Phase::Transitional { next_active, .. } => Some(ClusterConfig::Joint {
                old_active: sorted(&self.active),
                new_active: sorted(next_active),
                passive: sorted(&self.passive),
            }),
            Phase::Joint { next_active } => Some(ClusterConfig::Simple {
                active: sorted(next_active),
                passive: sorted(&self.passive),
            }),
        }
    }

    /// Adopts a configuration entry installed in the log at `idx`.
    /// Configurations take effect when appended, not when committed.
    pub fn apply_config_entry(&mut self, idx: Index, config: &ClusterConfig) {
        match config {
            ClusterConfig::Simple { active, passive } => {
                self.active = to_set(active);
                self.passive = to_set(passive);
                self.phase = Phase::Normal;
            }
            ClusterConfig::Joint {
                old_active,
                new_active,
                passive,
            } => {
                self.active = to_set(old_active);
                self.passive = to_set(passive);
                self.phase = Phase::Transitional {
                    join_index: idx,
                    next_active: to_set(new_active),
                };
            }
        }
    }

    /// Order-insensitive comparison of the committed configuration against
    /// a requested `(active, passive)` pair.
    pub fn committed_equals(&self, active: &[ReplicaId], passive: Option<&[ReplicaId]>) -> bool {
        match self.last_commit() {
            ClusterConfig::Simple {
                active: cur_active,
                passive: cur_passive,
            } => {
                to_set(&cur_active) == to_set(active)
                    && match passive {
                        Some(p) => to_set(&cur_passive) == to_set(p),
                        None => true,
                    }
            }
            ClusterConfig::Joint { .. } => false,
        }
    }
}
