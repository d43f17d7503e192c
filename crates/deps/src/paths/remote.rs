use std::sync::Arc;

use provider_node_domain::StorageAuth;
use reqwest::header::HeaderMap;
use tokio::sync::{AcquireError, Semaphore, SemaphorePermit};

use super::index::DbIndex;
use super::local::LocalStore;

/// Parallel sector fetches allowed per node.
pub const DEFAULT_FETCH_LIMIT: usize = 10;

/// Client for sector data held by other nodes. Every request carries the
/// storage bearer token.
pub struct RemoteStore {
    local: Arc<LocalStore>,
    index: Arc<DbIndex>,
    auth: StorageAuth,
    fetch_limit: usize,
    fetches: Semaphore,
}

impl RemoteStore {
    pub fn new(
        local: Arc<LocalStore>,
        index: Arc<DbIndex>,
        auth: StorageAuth,
        fetch_limit: usize,
    ) -> Self {
        let fetch_limit = fetch_limit.max(1);
        Self {
            local,
            index,
            auth,
            fetch_limit,
            fetches: Semaphore::new(fetch_limit),
        }
    }

    pub fn auth_headers(&self) -> &HeaderMap {
        self.auth.headers()
    }

    pub fn fetch_limit(&self) -> usize {
        self.fetch_limit
    }

    /// Waits until another fetch may start.
    pub async fn acquire_fetch_slot(&self) -> Result<SemaphorePermit<'_>, AcquireError> {
        self.fetches.acquire().await
    }

    pub fn local(&self) -> &Arc<LocalStore> {
        &self.local
    }

    pub fn index(&self) -> &Arc<DbIndex> {
        &self.index
    }
}
