use provider_node_domain::storage::{StorageError, StorageResult};
use sea_orm::Database;

use crate::{migration::run_migrations, HarmonyStorage};

#[derive(Default)]
pub struct StorageBuilder {
    database_url: Option<String>,
    route_targets: Vec<(String, u16)>,
}

impl StorageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = Some(url.into());
        self
    }

    /// Adds a host probed by routable-IP discovery.
    pub fn route_target(mut self, host: impl Into<String>, port: u16) -> Self {
        self.route_targets.push((host.into(), port));
        self
    }

    pub async fn build(self) -> StorageResult<HarmonyStorage> {
        let url = self
            .database_url
            .ok_or_else(|| StorageError::Database("missing database url".into()))?;
        let db = Database::connect(url)
            .await
            .map_err(StorageError::from_source)?;
        run_migrations(&db).await?;
        Ok(HarmonyStorage::from_connection(db, self.route_targets))
    }
}
