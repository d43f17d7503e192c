//! Builds the set of long-lived handles a provider node runs with.
//!
//! [`Bootstrapper::populate_remaining`] fills a [`Deps`] bundle step by step:
//! repo, database, effective configuration, verifier, address selector,
//! journal and storage index, full node client, listen address, local and
//! remote storage, worker and miner addresses.

pub mod cleanup;
mod deps;
pub mod fullnode;
pub mod journal;
pub mod listen;
pub mod paths;
pub mod repo;
pub mod worker;

pub use cleanup::{spawn_closer, CleanupErrorSink, CollectingErrorSink, LogErrorSink};
pub use deps::{
    get_deps, BootstrapError, Bootstrapper, DbConnector, Deps, HarmonyConnector, Slot,
};
pub use fullnode::{FullNodeApi, FullNodeConnector, FullNodeError, RpcFullNodeConnector};
pub use journal::{AlertingSystem, FsJournal, Journal, JournalError};
pub use listen::{resolve_listen_address, ListenAddressError};
