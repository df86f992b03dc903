// Copyright 2020 TiKV Project Authors. Licensed under Apache-2.0.

use std::{cmp, result};

use crate::message::ReplicaId;

quick_error! {
    /// The base error type for raft-core.
    ///
    /// Protocol-level negative outcomes (stale-term rejections, log
    /// mismatches, redirects to the leader) are never errors; they surface
    /// as replies and actions. `Error` is reserved for driver mistakes.
    #[derive(Debug)]
    pub enum Error {
        /// The configuration is invalid.
        ConfigInvalid(desc: String) {
            display("configuration invalid: {}", desc)
        }
        /// The replica exists in a set, but should not.
        Exists(id: ReplicaId, set: &'static str) {
            display("the replica {} already exists in the {} set", id, set)
        }
        /// The replica does not exist in a set, but should.
        NotExists(id: ReplicaId, set: &'static str) {
            display("the replica {} is not in the {} set", id, set)
        }
        /// An argument violates a calling contract.
        ViolatesContract(contract: String) {
            display("an argument violates a calling contract: {}", contract)
        }
    }
}

impl cmp::PartialEq for Error {
    fn eq(&self, other: &Error) -> bool {
        match (self, other) {
            (Error::ConfigInvalid(e1), Error::ConfigInvalid(e2)) => e1 == e2,
            (Error::Exists(id1, set1), Error::Exists(id2, set2)) => id1 == id2 && set1 == set2,
            (Error::NotExists(id1, set1), Error::NotExists(id2, set2)) => {
                id1 == id2 && set1 == set2
            }
            (Error::ViolatesContract(c1), Error::ViolatesContract(c2)) => c1 == c2,
            _ => false,
        }
    }
}

/// A result type that wraps up the raft-core errors.
pub type Result<T> = result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_equal() {
        assert_eq!(
            Error::ConfigInvalid(String::from("config error")),
            Error::ConfigInvalid(String::from("config error"))
        );
        assert_ne!(
            Error::ConfigInvalid(String::from("config error")),
            Error::ConfigInvalid(String::from("other error"))
        );
        assert_eq!(
            Error::Exists("a".to_owned(), "active"),
            Error::Exists("a".to_owned(), "active")
        );
        assert_ne!(
            Error::NotExists("a".to_owned(), "active"),
            Error::Exists("a".to_owned(), "active")
        );
    }
}
