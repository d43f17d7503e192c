//! The dependency bundle and the bootstrapper that fills it.
//!
//! Steps run strictly in order and each one only fills a slot that is still
//! [`Slot::Unset`], so callers may pre-inject any handle and a repeated pass
//! leaves existing handles untouched.

use std::sync::Arc;

use async_trait::async_trait;
use metrics::counter;
use provider_node_domain::auth::secret_fingerprint;
use provider_node_domain::config::{BootstrapInputs, HarmonyDbConfig};
use provider_node_domain::storage::{SharedDb, StorageError};
use provider_node_domain::{
    default_verifier, parse_miner_addresses, storage_auth, AddressSelector,
    AddressSelectorError, LayerError, LayerResolver, MinerAddress, ProviderConfig,
    SharedVerifier, StorageAuthError,
};
use provider_node_storage::HarmonyStorage;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::instrument::WithSubscriber;
use tracing::{debug, info, Dispatch};

use crate::cleanup::{spawn_closer, CleanupErrorSink, LogErrorSink};
use crate::fullnode::{FullNodeConnector, FullNodeError, RpcFullNodeConnector, SharedFullNode};
use crate::journal::{parse_disabled_events, AlertingSystem, FsJournal, Journal, JournalError};
use crate::listen::{resolve_listen_address, ListenAddressError};
use crate::paths::{
    BasicLocalStorage, DbIndex, LocalStore, PathsError, RemoteStore, DEFAULT_FETCH_LIMIT,
};
use crate::repo::{FsRepo, RepoError, RepoRole};
use crate::worker::{LocalWorker, MemCallStore, WorkerConfig};

/// A bundle field that is either still to be computed or already holds a
/// value that must not be replaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Slot<T> {
    Unset,
    Set(T),
}

impl<T> Default for Slot<T> {
    fn default() -> Self {
        Slot::Unset
    }
}

impl<T> Slot<T> {
    pub fn is_set(&self) -> bool {
        matches!(self, Slot::Set(_))
    }

    pub fn get(&self) -> Option<&T> {
        match self {
            Slot::Set(value) => Some(value),
            Slot::Unset => None,
        }
    }

    /// Stores `value` if the slot is empty. Returns whether it was stored.
    pub fn fill(&mut self, value: T) -> bool {
        if self.is_set() {
            return false;
        }
        *self = Slot::Set(value);
        true
    }
}

/// Every long-lived handle the node runs with.
#[derive(Default)]
pub struct Deps {
    pub db: Slot<SharedDb>,
    pub cfg: Slot<Arc<ProviderConfig>>,
    pub full: Slot<SharedFullNode>,
    pub verif: Slot<SharedVerifier>,
    pub address_selector: Slot<Arc<AddressSelector>>,
    pub listen_addr: Slot<String>,
    pub local_store: Slot<Arc<LocalStore>>,
    pub index: Slot<Arc<DbIndex>>,
    pub remote_store: Slot<Arc<RemoteStore>>,
    pub worker: Slot<Arc<LocalWorker>>,
    pub miner_addresses: Slot<Vec<MinerAddress>>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("repo error: {0}")]
    Repo(#[from] RepoError),
    #[error("could not connect to database: {0}")]
    Database(#[from] StorageError),
    #[error("could not resolve config layers: {0}")]
    Config(#[from] LayerError),
    #[error("invalid address selection policy: {0}")]
    AddressSelector(#[source] AddressSelectorError),
    #[error("journal error: {0}")]
    Journal(#[from] JournalError),
    #[error("full node api error: {0}")]
    FullNode(#[from] FullNodeError),
    #[error("listen address error: {0}")]
    ListenAddress(#[from] ListenAddressError),
    #[error("local storage error: {0}")]
    LocalStore(#[from] PathsError),
    #[error(
        "could not create storage auth token from [Apis] StorageRPCSecret \
         (fingerprint {fingerprint}): {source}; set it to base64 encoded random bytes, \
         e.g. the output of `head -c 32 /dev/urandom | base64`"
    )]
    StorageAuth {
        #[source]
        source: StorageAuthError,
        fingerprint: String,
    },
    #[error("invalid miner address: {0}")]
    MinerAddress(#[source] AddressSelectorError),
}

/// Opens the shared database handle.
#[async_trait]
pub trait DbConnector: Send + Sync {
    async fn connect(&self, config: &HarmonyDbConfig) -> Result<SharedDb, StorageError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct HarmonyConnector;

#[async_trait]
impl DbConnector for HarmonyConnector {
    async fn connect(&self, config: &HarmonyDbConfig) -> Result<SharedDb, StorageError> {
        let storage = HarmonyStorage::connect(config).await?;
        Ok(Arc::new(storage))
    }
}

pub struct Bootstrapper {
    inputs: BootstrapInputs,
    shutdown: CancellationToken,
    db_connector: Arc<dyn DbConnector>,
    full_node_connector: Arc<dyn FullNodeConnector>,
    error_sink: Arc<dyn CleanupErrorSink>,
    dispatch: Option<Dispatch>,
    resolver: LayerResolver,
    fetch_limit: usize,
}

impl Bootstrapper {
    /// `shutdown` only triggers the cleanup tasks; it never interrupts a
    /// running bootstrap step.
    pub fn new(inputs: BootstrapInputs, shutdown: CancellationToken) -> Self {
        Self {
            inputs,
            shutdown,
            db_connector: Arc::new(HarmonyConnector),
            full_node_connector: Arc::new(RpcFullNodeConnector),
            error_sink: Arc::new(LogErrorSink),
            dispatch: None,
            resolver: LayerResolver::new(),
            fetch_limit: DEFAULT_FETCH_LIMIT,
        }
    }

    pub fn with_db_connector(mut self, connector: Arc<dyn DbConnector>) -> Self {
        self.db_connector = connector;
        self
    }

    pub fn with_full_node_connector(mut self, connector: Arc<dyn FullNodeConnector>) -> Self {
        self.full_node_connector = connector;
        self
    }

    pub fn with_error_sink(mut self, sink: Arc<dyn CleanupErrorSink>) -> Self {
        self.error_sink = sink;
        self
    }

    /// Routes every log event of the bootstrap, cleanup tasks included,
    /// to `dispatch` instead of the process-wide subscriber.
    pub fn with_dispatch(mut self, dispatch: Dispatch) -> Self {
        self.dispatch = Some(dispatch);
        self
    }

    pub fn with_resolver(mut self, resolver: LayerResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_fetch_limit(mut self, limit: usize) -> Self {
        self.fetch_limit = limit;
        self
    }

    pub fn inputs(&self) -> &BootstrapInputs {
        &self.inputs
    }

    /// Fills every unset slot of `deps`. The first failing step aborts the
    /// pass; slots filled before it keep their values.
    pub async fn populate_remaining(&self, deps: &mut Deps) -> Result<(), BootstrapError> {
        match &self.dispatch {
            Some(dispatch) => self.populate(deps).with_subscriber(dispatch.clone()).await,
            None => self.populate(deps).await,
        }
    }

    async fn populate(&self, deps: &mut Deps) -> Result<(), BootstrapError> {
        self.ensure_repo()?;

        let db = match deps.db.get().cloned() {
            Some(db) => skipped("database", db),
            None => {
                let db = self.db_connector.connect(self.inputs.db()).await?;
                deps.db.fill(db.clone());
                populated("database", db)
            }
        };

        let cfg = match deps.cfg.get().cloned() {
            Some(cfg) => skipped("config", cfg),
            None => {
                let resolved = self.resolver.resolve(db.as_ref(), self.inputs.layers()).await?;
                info!(layers = ?self.inputs.layers(), "effective configuration resolved");
                let cfg = Arc::new(resolved.config);
                deps.cfg.fill(cfg.clone());
                populated("config", cfg)
            }
        };

        record_step("verifier", deps.verif.fill(default_verifier()));

        if deps.address_selector.is_set() {
            record_step("address_selector", false);
        } else {
            let selector = AddressSelector::from_config(&cfg.addresses)
                .map_err(BootstrapError::AddressSelector)?;
            deps.address_selector.fill(Arc::new(selector));
            record_step("address_selector", true);
        }

        let index = match deps.index.get().cloned() {
            Some(index) => skipped("journal", index),
            None => {
                let index = Arc::new(self.open_index(&cfg, db.clone())?);
                deps.index.fill(index.clone());
                populated("journal", index)
            }
        };

        if deps.full.is_set() {
            record_step("full_node", false);
        } else {
            let (full, closer) = self
                .full_node_connector
                .connect(&cfg.apis.chain_api_info)
                .await?;
            spawn_closer(
                "full_node",
                self.shutdown.clone(),
                self.error_sink.clone(),
                closer,
            );
            deps.full.fill(full);
            record_step("full_node", true);
        }

        let listen_addr = match deps.listen_addr.get().cloned() {
            Some(addr) => skipped("listen_address", addr),
            None => {
                let addr = resolve_listen_address(self.inputs.listen(), db.as_ref()).await?;
                deps.listen_addr.fill(addr.clone());
                populated("listen_address", addr)
            }
        };

        let local = match deps.local_store.get().cloned() {
            Some(local) => skipped("local_store", local),
            None => {
                let local = Arc::new(
                    LocalStore::open(
                        BasicLocalStorage::new(self.inputs.storage_json()),
                        index.clone(),
                        vec![format!("http://{listen_addr}/remote")],
                    )
                    .await?,
                );
                deps.local_store.fill(local.clone());
                populated("local_store", local)
            }
        };

        let remote = match deps.remote_store.get().cloned() {
            Some(remote) => skipped("remote_store", remote),
            None => {
                let secret = &cfg.apis.storage_rpc_secret;
                let auth = storage_auth(secret).map_err(|source| BootstrapError::StorageAuth {
                    source,
                    fingerprint: secret_fingerprint(secret),
                })?;
                let remote = Arc::new(RemoteStore::new(
                    local.clone(),
                    index.clone(),
                    auth,
                    self.fetch_limit,
                ));
                deps.remote_store.fill(remote.clone());
                populated("remote_store", remote)
            }
        };

        if deps.worker.is_set() {
            record_step("worker", false);
        } else {
            let config = WorkerConfig {
                parallel_fetch_limit: self.fetch_limit,
            };
            let worker = LocalWorker::new(
                config,
                remote,
                local,
                index,
                Arc::new(MemCallStore::default()),
            );
            deps.worker.fill(Arc::new(worker));
            record_step("worker", true);
        }

        if deps.miner_addresses.is_set() {
            record_step("miner_addresses", false);
        } else {
            let miners = parse_miner_addresses(&cfg.addresses.miner_addresses)
                .map_err(BootstrapError::MinerAddress)?;
            deps.miner_addresses.fill(miners);
            record_step("miner_addresses", true);
        }

        info!(listen = %listen_addr, "dependencies ready");
        Ok(())
    }

    fn ensure_repo(&self) -> Result<(), BootstrapError> {
        if !self.inputs.make_repo() {
            record_step("repo", false);
            return Ok(());
        }

        let repo = FsRepo::new(self.inputs.repo_path());
        if repo.exists()? {
            record_step("repo", false);
            return Ok(());
        }
        repo.init(RepoRole::Provider)?;
        info!(path = %repo.path().display(), "initialized provider repo");
        record_step("repo", true);
        Ok(())
    }

    fn open_index(&self, cfg: &ProviderConfig, db: SharedDb) -> Result<DbIndex, BootstrapError> {
        let disabled = parse_disabled_events(&cfg.journal.disabled_events)?;
        let journal: Arc<dyn Journal> =
            Arc::new(FsJournal::open(self.inputs.journal_path(), disabled)?);

        let closing = journal.clone();
        spawn_closer(
            "journal",
            self.shutdown.clone(),
            self.error_sink.clone(),
            move || closing.close().map_err(|err| err.to_string()),
        );

        let alerting = Arc::new(AlertingSystem::new(journal));
        Ok(DbIndex::new(alerting, db))
    }
}

/// Runs a full bootstrap into an empty bundle.
pub async fn get_deps(
    inputs: BootstrapInputs,
    shutdown: CancellationToken,
) -> Result<Deps, BootstrapError> {
    let mut deps = Deps::default();
    Bootstrapper::new(inputs, shutdown)
        .populate_remaining(&mut deps)
        .await?;
    Ok(deps)
}

fn record_step(step: &'static str, filled: bool) {
    let result = if filled { "populated" } else { "skipped" };
    counter!("provider_bootstrap_steps_total", "step" => step, "result" => result).increment(1);
    debug!(step, result, "bootstrap step");
}

fn populated<T>(step: &'static str, value: T) -> T {
    record_step(step, true);
    value
}

fn skipped<T>(step: &'static str, value: T) -> T {
    record_step(step, false);
    value
}
