use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

/// Common result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(String),
    #[error("cannot discover routable ip: {0}")]
    RoutableIp(String),
}

impl StorageError {
    pub fn from_source(err: impl std::fmt::Display) -> Self {
        Self::Database(err.to_string())
    }
}

/// Outcome of looking up a config layer by title.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayerLookup {
    Found(String),
    NotFound,
}

#[async_trait]
pub trait ConfigLayerStore: Send + Sync {
    /// Fetches the TOML text stored under `title`.
    async fn layer_text(&self, title: &str) -> StorageResult<LayerLookup>;
}

#[async_trait]
pub trait RoutableIpSource: Send + Sync {
    /// Returns the address peers can use to reach this node.
    async fn routable_ip(&self) -> StorageResult<IpAddr>;
}

/// The shared database handle as seen by the node: a layer store that also
/// knows how this host is reached over the network.
pub trait HarmonyDb: ConfigLayerStore + RoutableIpSource {}

impl<T> HarmonyDb for T where T: ConfigLayerStore + RoutableIpSource {}

pub type SharedDb = Arc<dyn HarmonyDb>;
