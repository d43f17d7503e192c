//! Local compute worker handle and the store tracking its calls.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::paths::{DbIndex, LocalStore, RemoteStore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    pub parallel_fetch_limit: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            parallel_fetch_limit: crate::paths::DEFAULT_FETCH_LIMIT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallState {
    Running { method: String },
    Done { method: String, error: Option<String> },
}

/// Persistence for in-flight worker calls.
pub trait CallStore: Send + Sync {
    fn put(&self, call_id: u64, state: CallState);
    fn get(&self, call_id: u64) -> Option<CallState>;
}

#[derive(Debug, Default)]
pub struct MemCallStore {
    calls: Mutex<HashMap<u64, CallState>>,
}

impl CallStore for MemCallStore {
    fn put(&self, call_id: u64, state: CallState) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.insert(call_id, state);
        }
    }

    fn get(&self, call_id: u64) -> Option<CallState> {
        self.calls
            .lock()
            .ok()
            .and_then(|calls| calls.get(&call_id).cloned())
    }
}

pub struct LocalWorker {
    config: WorkerConfig,
    remote: Arc<RemoteStore>,
    local: Arc<LocalStore>,
    index: Arc<DbIndex>,
    calls: Arc<dyn CallStore>,
    next_call: AtomicU64,
}

impl LocalWorker {
    pub fn new(
        config: WorkerConfig,
        remote: Arc<RemoteStore>,
        local: Arc<LocalStore>,
        index: Arc<DbIndex>,
        calls: Arc<dyn CallStore>,
    ) -> Self {
        Self {
            config,
            remote,
            local,
            index,
            calls,
            next_call: AtomicU64::new(1),
        }
    }

    /// Starts tracking a call and returns its id.
    pub fn track(&self, method: &str) -> u64 {
        let call_id = self.next_call.fetch_add(1, Ordering::Relaxed);
        debug!(call_id, method, "tracking worker call");
        self.calls.put(
            call_id,
            CallState::Running {
                method: method.to_string(),
            },
        );
        call_id
    }

    pub fn finish(&self, call_id: u64, error: Option<String>) {
        if let Some(CallState::Running { method }) = self.calls.get(call_id) {
            self.calls.put(call_id, CallState::Done { method, error });
        }
    }

    pub fn call_state(&self, call_id: u64) -> Option<CallState> {
        self.calls.get(call_id)
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn remote(&self) -> &Arc<RemoteStore> {
        &self.remote
    }

    pub fn local(&self) -> &Arc<LocalStore> {
        &self.local
    }

    pub fn index(&self) -> &Arc<DbIndex> {
        &self.index
    }
}

#[cfg(test)]
mod tests {
    use provider_node_domain::storage_auth;

    use super::*;
    use crate::paths::test_index;
    use crate::paths::BasicLocalStorage;

    #[tokio::test]
    async fn tracks_call_lifecycle() {
        let dir = tempfile::tempdir().expect("tempdir");
        let index = Arc::new(test_index());
        let local = Arc::new(
            LocalStore::open(
                BasicLocalStorage::new(dir.path().join("storage.json")),
                index.clone(),
                vec![],
            )
            .await
            .expect("local opens"),
        );
        let remote = Arc::new(RemoteStore::new(
            local.clone(),
            index.clone(),
            storage_auth("cHJvdmlkZXItbm9kZS1zaGFyZWQtc2VjcmV0").expect("token"),
            4,
        ));
        let worker = LocalWorker::new(
            WorkerConfig::default(),
            remote,
            local,
            index,
            Arc::new(MemCallStore::default()),
        );

        let first = worker.track("SealPreCommit1");
        let second = worker.track("Fetch");
        assert_eq!((first, second), (1, 2));
        assert_eq!(
            worker.call_state(first),
            Some(CallState::Running {
                method: "SealPreCommit1".into()
            })
        );

        worker.finish(first, Some("out of space".into()));
        assert_eq!(
            worker.call_state(first),
            Some(CallState::Done {
                method: "SealPreCommit1".into(),
                error: Some("out of space".into())
            })
        );
        assert_eq!(worker.call_state(99), None);
    }
}
