//! SeaORM-backed database handle for the provider node: the config layer
//! table and routable-IP discovery. PostgreSQL-compatible clusters in
//! production, SQLite for tests.

mod builder;
mod entity;
mod layer_store;
mod migration;
mod routable_ip;

use std::sync::Arc;

use builder::StorageBuilder;
use migration::run_migrations;
use provider_node_domain::config::HarmonyDbConfig;
use provider_node_domain::storage::{StorageError, StorageResult};
use sea_orm::{Database, DatabaseConnection};
use tracing::{info, warn};

/// Shared database handle used by the bootstrapper and task runners.
#[derive(Clone)]
pub struct HarmonyStorage {
    db: Arc<DatabaseConnection>,
    route_targets: Arc<Vec<(String, u16)>>,
}

impl HarmonyStorage {
    /// Tries each configured host in order; the first reachable one wins and
    /// is probed first for routable-IP discovery.
    pub async fn connect(config: &HarmonyDbConfig) -> StorageResult<Self> {
        let mut last_err = String::from("no database hosts configured");
        for (idx, host) in config.hosts.iter().enumerate() {
            let url = match config.url_for(host) {
                Ok(url) => url,
                Err(err) => {
                    warn!(host = %host, %err, "skipping database host");
                    last_err = err.to_string();
                    continue;
                }
            };
            match Database::connect(url).await {
                Ok(db) => {
                    run_migrations(&db).await?;
                    info!(host = %host, port = config.port, database = %config.database, "connected to database");

                    let mut targets = vec![(host.clone(), config.port)];
                    targets.extend(
                        config
                            .hosts
                            .iter()
                            .enumerate()
                            .filter(|(other, _)| *other != idx)
                            .map(|(_, other)| (other.clone(), config.port)),
                    );
                    return Ok(Self::from_connection(db, targets));
                }
                Err(err) => {
                    warn!(host = %host, %err, "database host unreachable");
                    last_err = format!("{host}: {err}");
                }
            }
        }
        Err(StorageError::Database(last_err))
    }

    /// Connects to a single URL. Handles built this way cannot discover a
    /// routable IP unless a target is added through the builder.
    pub async fn connect_url(database_url: &str) -> StorageResult<Self> {
        Self::builder().database_url(database_url).build().await
    }

    pub fn builder() -> StorageBuilder {
        StorageBuilder::new()
    }

    pub(crate) fn from_connection(db: DatabaseConnection, route_targets: Vec<(String, u16)>) -> Self {
        Self {
            db: Arc::new(db),
            route_targets: Arc::new(route_targets),
        }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        self.db.as_ref()
    }

    pub(crate) fn route_targets(&self) -> &[(String, u16)] {
        &self.route_targets
    }
}
