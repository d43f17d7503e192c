use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use super::index::{DbIndex, StoragePathInfo};

const SECTORSTORE_FILE: &str = "sectorstore.json";

#[derive(Debug, Error)]
pub enum PathsError {
    #[error("storage io at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid json in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("storage id {id} is mounted twice ({path})")]
    DuplicateId { id: String, path: PathBuf },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StorageConfig {
    #[serde(default)]
    pub storage_paths: Vec<LocalPath>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LocalPath {
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SectorStoreMeta {
    #[serde(rename = "ID")]
    id: String,
    #[serde(default)]
    weight: u64,
    #[serde(default)]
    can_seal: bool,
    #[serde(default)]
    can_store: bool,
}

/// Storage path list kept in a JSON file next to the repo.
#[derive(Debug, Clone)]
pub struct BasicLocalStorage {
    path_to_json: PathBuf,
}

impl BasicLocalStorage {
    pub fn new(path_to_json: impl Into<PathBuf>) -> Self {
        Self {
            path_to_json: path_to_json.into(),
        }
    }

    pub fn path_to_json(&self) -> &Path {
        &self.path_to_json
    }

    /// A missing file means no paths are mounted yet.
    pub async fn storage(&self) -> Result<StorageConfig, PathsError> {
        match tokio::fs::read(&self.path_to_json).await {
            Ok(raw) => serde_json::from_slice(&raw).map_err(|source| PathsError::Json {
                path: self.path_to_json.clone(),
                source,
            }),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(StorageConfig::default()),
            Err(source) => Err(PathsError::Io {
                path: self.path_to_json.clone(),
                source,
            }),
        }
    }
}

/// Storage paths mounted on this node and advertised through the index.
pub struct LocalStore {
    storage: BasicLocalStorage,
    index: Arc<DbIndex>,
    urls: Vec<String>,
    paths: Vec<(String, PathBuf)>,
}

impl LocalStore {
    pub async fn open(
        storage: BasicLocalStorage,
        index: Arc<DbIndex>,
        urls: Vec<String>,
    ) -> Result<Self, PathsError> {
        let config = storage.storage().await?;
        let mut paths: Vec<(String, PathBuf)> = Vec::with_capacity(config.storage_paths.len());

        for local in config.storage_paths {
            let meta_path = local.path.join(SECTORSTORE_FILE);
            let raw = tokio::fs::read(&meta_path)
                .await
                .map_err(|source| PathsError::Io {
                    path: meta_path.clone(),
                    source,
                })?;
            let meta: SectorStoreMeta =
                serde_json::from_slice(&raw).map_err(|source| PathsError::Json {
                    path: meta_path.clone(),
                    source,
                })?;

            if paths.iter().any(|(id, _)| *id == meta.id) {
                return Err(PathsError::DuplicateId {
                    id: meta.id,
                    path: local.path,
                });
            }

            debug!(id = %meta.id, path = %local.path.display(), "mounting storage path");
            index.attach(StoragePathInfo {
                id: meta.id.clone(),
                urls: urls.clone(),
                weight: meta.weight,
                can_seal: meta.can_seal,
                can_store: meta.can_store,
            });
            paths.push((meta.id, local.path));
        }

        info!(paths = paths.len(), "local storage opened");
        Ok(Self {
            storage,
            index,
            urls,
            paths,
        })
    }

    pub fn storage(&self) -> &BasicLocalStorage {
        &self.storage
    }

    pub fn index(&self) -> &Arc<DbIndex> {
        &self.index
    }

    pub fn urls(&self) -> &[String] {
        &self.urls
    }

    pub fn local_path(&self, id: &str) -> Option<&Path> {
        self.paths
            .iter()
            .find(|(known, _)| known == id)
            .map(|(_, path)| path.as_path())
    }

    pub fn path_count(&self) -> usize {
        self.paths.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paths::test_index;

    fn write_sector_store(dir: &Path, id: &str) {
        std::fs::create_dir_all(dir).expect("create path dir");
        std::fs::write(
            dir.join(SECTORSTORE_FILE),
            format!(r#"{{"ID":"{id}","Weight":10,"CanSeal":true,"CanStore":false}}"#),
        )
        .expect("write sectorstore.json");
    }

    fn write_storage_json(file: &Path, paths: &[&Path]) {
        let config = StorageConfig {
            storage_paths: paths
                .iter()
                .map(|p| LocalPath {
                    path: p.to_path_buf(),
                })
                .collect(),
        };
        std::fs::write(file, serde_json::to_vec(&config).expect("encode"))
            .expect("write storage.json");
    }

    #[tokio::test]
    async fn missing_storage_json_mounts_nothing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = LocalStore::open(
            BasicLocalStorage::new(dir.path().join("storage.json")),
            Arc::new(test_index()),
            vec!["http://10.0.0.5:12300/remote".into()],
        )
        .await
        .expect("opens");
        assert_eq!(store.path_count(), 0);
    }

    #[tokio::test]
    async fn mounts_paths_into_the_index() {
        let dir = tempfile::tempdir().expect("tempdir");
        let sealing = dir.path().join("sealing");
        write_sector_store(&sealing, "seal-1");
        let json = dir.path().join("storage.json");
        write_storage_json(&json, &[&sealing]);

        let index = Arc::new(test_index());
        let url = "http://10.0.0.5:12300/remote".to_string();
        let store = LocalStore::open(BasicLocalStorage::new(&json), index.clone(), vec![url.clone()])
            .await
            .expect("opens");

        assert_eq!(store.local_path("seal-1"), Some(sealing.as_path()));
        let info = index.storage_info("seal-1").expect("attached");
        assert_eq!(info.urls, vec![url]);
        assert!(info.can_seal);
    }

    #[tokio::test]
    async fn duplicate_ids_are_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let first = dir.path().join("one");
        let second = dir.path().join("two");
        write_sector_store(&first, "same");
        write_sector_store(&second, "same");
        let json = dir.path().join("storage.json");
        write_storage_json(&json, &[&first, &second]);

        let result = LocalStore::open(BasicLocalStorage::new(&json), Arc::new(test_index()), vec![]).await;
        assert!(matches!(result, Err(PathsError::DuplicateId { .. })));
    }

    #[tokio::test]
    async fn malformed_storage_json_is_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let json = dir.path().join("storage.json");
        std::fs::write(&json, b"{not json").expect("write");

        let result = BasicLocalStorage::new(&json).storage().await;
        assert!(matches!(result, Err(PathsError::Json { .. })));
    }
}
