//! Sector storage handles: the shared index of storage paths, the local
//! mount and the authenticated remote client.

mod index;
mod local;
mod remote;

pub use index::{DbIndex, StorageId, StoragePathInfo};
pub use local::{BasicLocalStorage, LocalPath, LocalStore, PathsError, StorageConfig};
pub use remote::{RemoteStore, DEFAULT_FETCH_LIMIT};

#[cfg(test)]
pub(crate) use index::tests::test_index;
