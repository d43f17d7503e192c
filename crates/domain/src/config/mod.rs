//! Effective configuration of a provider node plus the loaders that produce
//! it: the layered TOML resolver and the environment-driven bootstrap inputs.

mod env;
mod layers;

use serde::{Deserialize, Serialize};

pub use env::{hydrate_env_file, BootstrapInputs, ConfigError, HarmonyDbConfig};
pub use layers::{LayerError, LayerResolver, ResolvedConfig, BASE_LAYER};

/// Effective configuration. Every section falls back to the baseline defaults
/// so a layer only has to carry the keys it overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ProviderConfig {
    pub subsystems: SubsystemsConfig,
    pub fees: FeesConfig,
    pub addresses: AddressesConfig,
    pub proving: ProvingConfig,
    pub journal: JournalConfig,
    pub apis: ApisConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct SubsystemsConfig {
    pub enable_window_post: bool,
    pub window_post_max_tasks: u32,
    pub enable_winning_post: bool,
    pub winning_post_max_tasks: u32,
}

/// Fee caps, kept as human-readable FIL amounts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct FeesConfig {
    pub default_max_fee: String,
    pub max_pre_commit_gas_fee: String,
    pub max_commit_gas_fee: String,
    pub max_terminate_gas_fee: String,
    #[serde(rename = "MaxWindowPoStGasFee")]
    pub max_window_post_gas_fee: String,
    pub max_publish_deals_fee: String,
}

impl Default for FeesConfig {
    fn default() -> Self {
        Self {
            default_max_fee: "0.07 FIL".to_string(),
            max_pre_commit_gas_fee: "0.025 FIL".to_string(),
            max_commit_gas_fee: "0.05 FIL".to_string(),
            max_terminate_gas_fee: "0.5 FIL".to_string(),
            max_window_post_gas_fee: "5 FIL".to_string(),
            max_publish_deals_fee: "0.05 FIL".to_string(),
        }
    }
}

/// Sending-address policy plus the miner actors this node serves.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct AddressesConfig {
    pub pre_commit_control: Vec<String>,
    pub commit_control: Vec<String>,
    pub terminate_control: Vec<String>,
    pub disable_owner_fallback: bool,
    pub disable_worker_fallback: bool,
    pub miner_addresses: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ProvingConfig {
    pub parallel_check_limit: u32,
    pub single_check_timeout_secs: u64,
    pub partition_check_timeout_secs: u64,
    #[serde(rename = "DisableBuiltinWindowPoSt")]
    pub disable_builtin_window_post: bool,
}

impl Default for ProvingConfig {
    fn default() -> Self {
        Self {
            parallel_check_limit: 32,
            single_check_timeout_secs: 600,
            partition_check_timeout_secs: 1200,
            disable_builtin_window_post: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct JournalConfig {
    /// Comma separated `system:event` pairs that must not be journaled.
    pub disabled_events: String,
}

#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ApisConfig {
    pub chain_api_info: Vec<String>,
    #[serde(rename = "StorageRPCSecret")]
    pub storage_rpc_secret: String,
}

impl std::fmt::Debug for ApisConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApisConfig")
            .field("chain_api_info", &self.chain_api_info.len())
            .field(
                "storage_rpc_secret",
                &crate::auth::secret_fingerprint(&self.storage_rpc_secret),
            )
            .finish()
    }
}
