// Copyright 2020 TiKV Project Authors. Licensed under Apache-2.0.

use crate::errors::{Error, Result};
use crate::message::{ClusterConfig, ReplicaId, Term};
use crate::HashSet;

/// Config contains the parameters to start a replica.
#[derive(Clone, Debug)]
pub struct Config {
    /// The identity of the local replica. It cannot be empty, and must be
    /// unique in the group.
    pub id: ReplicaId,

    /// The membership the replica boots under: the cluster's bootstrap
    /// configuration on first start, or the configuration recovered from
    /// the latest snapshot on restart.
    pub membership: ClusterConfig,

    /// The persisted term, restored on restart. Leave 0 on first start.
    pub term: Term,

    /// The persisted vote, restored on restart. Leave `None` on first
    /// start.
    pub voted_for: Option<ReplicaId>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            id: ReplicaId::default(),
            membership: ClusterConfig::simple(Vec::new(), Vec::new()),
            term: 0,
            voted_for: None,
        }
    }
}

impl Config {
    /// Creates a new config with the given id and bootstrap membership.
    pub fn new(id: impl Into<ReplicaId>, membership: ClusterConfig) -> Self {
        Self {
            id: id.into(),
            membership,
            ..Self::default()
        }
    }

    /// Runs validations against the config.
    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(Error::ConfigInvalid("invalid replica id".to_owned()));
        }

        if !self.membership.contains(&self.id) {
            return Err(Error::ConfigInvalid(format!(
                "replica {} is not part of its bootstrap membership",
                self.id
            )));
        }

        let (actives, passive): (Vec<&[ReplicaId]>, &[ReplicaId]) = match &self.membership {
            ClusterConfig::Simple { active, passive } => (vec![active.as_slice()], passive),
            ClusterConfig::Joint {
                old_active,
                new_active,
                passive,
            } => (vec![old_active.as_slice(), new_active.as_slice()], passive),
        };

        let mut voters: HashSet<&ReplicaId> = HashSet::default();
        for active in &actives {
            if active.is_empty() {
                return Err(Error::ConfigInvalid("empty active set".to_owned()));
            }
            let unique: HashSet<&ReplicaId> = active.iter().collect();
            if unique.len() != active.len() {
                return Err(Error::ConfigInvalid(
                    "duplicate id in an active set".to_owned(),
                ));
            }
            voters.extend(unique);
        }

        let mut seen: HashSet<&ReplicaId> = HashSet::default();
        for learner in passive {
            if voters.contains(learner) {
                return Err(Error::Exists(learner.clone(), "active"));
            }
            if !seen.insert(learner) {
                return Err(Error::ConfigInvalid(
                    "duplicate id in the passive set".to_owned(),
                ));
            }
        }

        Ok(())
    }
}
