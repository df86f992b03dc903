// Copyright 2020 TiKV Project Authors. Licensed under Apache-2.0.

/*!

## Creating a replica

A [`Raft`](struct.Raft.html) value is the pure core of one consensus
replica. It performs no I/O: it never touches the network, the disk, or a
clock. You create it from a [`Config`](struct.Config.html) naming the
replica and its bootstrap membership, plus a `slog` logger:

```rust
use raft_core::{ClusterConfig, Config, Raft};
use slog::{Drain, o};

let decorator = slog_term::TermDecorator::new().build();
let drain = slog_term::CompactFormat::new(decorator).build().fuse();
let drain = std::sync::Mutex::new(drain).fuse();
let logger = slog::Logger::root(drain, o!());

let config = Config::new(
    "a",
    ClusterConfig::simple(vec!["a".to_owned(), "b".to_owned(), "c".to_owned()], vec![]),
);
let mut replica = Raft::new(&config, &logger).unwrap();

// The first input: the driver's election timer fired.
let actions = replica.election_timeout();
assert!(!actions.is_empty());
```

## Driving the replica

The driver owns the event loop. It feeds the core one input at a time —
a peer message through [`step`](struct.Raft.html#method.step), a timer
expiry through [`election_timeout`](struct.Raft.html#method.election_timeout)
or [`heartbeat_timeout`](struct.Raft.html#method.heartbeat_timeout), a
client command through [`client_command`](struct.Raft.html#method.client_command),
or a snapshot event — and executes the returned
[`Action`](enum.Action.html) list **in order**:

```rust
# use raft_core::{Action, ClusterConfig, Config, Raft};
# use slog::{Drain, o};
# let logger = slog::Logger::root(slog::Discard, o!());
# let config = Config::new("a", ClusterConfig::simple(vec!["a".to_owned()], vec![]));
# let mut replica = Raft::new(&config, &logger).unwrap();
for action in replica.election_timeout() {
    match action {
        Action::Send(to, msg) => { /* hand msg to the transport */ }
        Action::Apply(ops) => { /* apply committed ops to the state machine */ }
        Action::ResetElectionTimeout => { /* rearm the election timer */ }
        _ => { /* role changes, heartbeat resets, snapshots, ... */ }
    }
}
```

Two contracts make this safe:

1. **Persist before send.** Before executing a `Send` that acknowledges new
   state — a granted vote or an append success — the driver must durably
   record the current term, the vote, and the log suffix the reply covers.
2. **Execute in order.** Role-change notifications precede the sends made
   on their behalf, `Apply` precedes `Stop`, and timer resets precede the
   sends they pertain to. Reordering breaks those guarantees.

Driver-side failures never enter the core. If persistence or transport
fails, the driver simply withholds input; timeouts eventually turn the
silence into a new election.

## Membership changes

Clusters reconfigure through joint consensus:
[`change_config`](struct.Raft.html#method.change_config) on the leader
appends a joint configuration entry under which quorums require majorities
in both the old and the new active set. Once the joint entry commits the
leader automatically appends the closing simple configuration. Passive
members (learners) receive replication but never vote, and a leader that
commits a configuration excluding itself emits
[`Action::Stop`](enum.Action.html) once the preceding applies are
delivered.

*/

#![deny(clippy::all)]
#![deny(missing_docs)]

#[cfg(feature = "failpoints")]
#[macro_use]
extern crate fail;

#[macro_use]
extern crate getset;
#[macro_use]
extern crate quick_error;
#[macro_use]
extern crate slog;

macro_rules! fatal {
    ($logger:expr, $msg:expr) => {{
        let owned_kv = ($logger).list();
        let s = crate::util::format_kv_list(&owned_kv);
        if s.is_empty() {
            panic!("{}", $msg)
        } else {
            panic!("{}, {}", $msg, s)
        }
    }};
    ($logger:expr, $fmt:expr, $($arg:tt)+) => {{
        fatal!($logger, format_args!($fmt, $($arg)+))
    }};
}

mod action;
mod config;
mod errors;
mod membership;
mod message;
#[cfg(test)]
/// Raft core state machine logic.
pub mod raft;
#[cfg(not(test))]
mod raft;
mod raft_log;
mod status;
pub mod util;

pub use self::action::{Action, ConfChangeResult};
pub use self::config::Config;
pub use self::errors::{Error, Result};
pub use self::membership::{ConfigStatus, Membership};
pub use self::message::{
    AppendOutcome, ClusterConfig, Entry, EntryPayload, Index, Message, ReplicaId, Term,
    INVALID_INDEX,
};
pub use self::raft::{Raft, StateRole};
pub use self::raft_log::RaftLog;
pub use self::status::Status;
pub use self::util::majority;

pub mod prelude {
    //! A "prelude" for crates using the `raft-core` crate.
    //!
    //! This prelude is similar to the standard library's prelude in that you'll
    //! almost always want to import its entire contents, but unlike the standard
    //! library's prelude you'll have to do so manually:
    //!
    //! ```
    //! use raft_core::prelude::*;
    //! ```
    //!
    //! The prelude may grow over time as additional items see ubiquitous use.

    pub use crate::action::{Action, ConfChangeResult};
    pub use crate::config::Config;
    pub use crate::membership::ConfigStatus;
    pub use crate::message::{
        AppendOutcome, ClusterConfig, Entry, EntryPayload, Index, Message, ReplicaId, Term,
    };
    pub use crate::raft::{Raft, StateRole};
    pub use crate::status::Status;
}

/// The default logger we fall back to when passed `None` in external facing constructors.
///
/// Currently, this is a `log` adaptor behind a `Once` to ensure there is no clobbering.
#[cfg(any(test, feature = "default-logger"))]
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

type DefaultHashBuilder = std::hash::BuildHasherDefault<fxhash::FxHasher>;
type HashMap<K, V> = std::collections::HashMap<K, V, DefaultHashBuilder>;
type HashSet<K> = std::collections::HashSet<K, DefaultHashBuilder>;
