use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use provider_node_domain::storage::SharedDb;
use tracing::debug;

use crate::journal::AlertingSystem;

pub type StorageId = String;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoragePathInfo {
    pub id: StorageId,
    pub urls: Vec<String>,
    pub weight: u64,
    pub can_seal: bool,
    pub can_store: bool,
}

/// Index of every storage path known to the cluster, bound to the shared
/// database and the alerting system.
pub struct DbIndex {
    alerting: Arc<AlertingSystem>,
    db: SharedDb,
    paths: RwLock<HashMap<StorageId, StoragePathInfo>>,
}

impl DbIndex {
    pub fn new(alerting: Arc<AlertingSystem>, db: SharedDb) -> Self {
        Self {
            alerting,
            db,
            paths: RwLock::new(HashMap::new()),
        }
    }

    /// Registers `info`, merging its URLs into an already attached path.
    pub fn attach(&self, info: StoragePathInfo) {
        let Ok(mut paths) = self.paths.write() else {
            return;
        };
        debug!(id = %info.id, urls = ?info.urls, "attaching storage path");
        match paths.get_mut(&info.id) {
            Some(existing) => {
                for url in info.urls {
                    if !existing.urls.contains(&url) {
                        existing.urls.push(url);
                    }
                }
                existing.weight = info.weight;
                existing.can_seal = info.can_seal;
                existing.can_store = info.can_store;
            }
            None => {
                paths.insert(info.id.clone(), info);
            }
        }
    }

    pub fn storage_info(&self, id: &str) -> Option<StoragePathInfo> {
        self.paths
            .read()
            .ok()
            .and_then(|paths| paths.get(id).cloned())
    }

    pub fn list(&self) -> Vec<StoragePathInfo> {
        let mut all: Vec<_> = self
            .paths
            .read()
            .map(|paths| paths.values().cloned().collect())
            .unwrap_or_default();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    pub fn alerting(&self) -> &Arc<AlertingSystem> {
        &self.alerting
    }

    pub fn db(&self) -> &SharedDb {
        &self.db
    }
}
