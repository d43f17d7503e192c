//! Domain-level building blocks of the provider node: the effective
//! configuration and its layer resolver, storage auth tokens, actor
//! addresses, the verifier capability and the collaborator contracts the
//! storage crate implements.

pub mod address;
pub mod auth;
pub mod config;
pub mod services;
pub mod storage;
pub mod verifier;

pub use address::{
    parse_miner_addresses, Address, AddressError, AddressSelector, AddressSelectorError,
    AddressUse, MinerAddress,
};
pub use auth::{storage_auth, verify_storage_token, StorageAuth, StorageAuthError};
pub use config::{BootstrapInputs, LayerError, LayerResolver, ProviderConfig, ResolvedConfig};
pub use storage::*;
pub use verifier::{default_verifier, ProofVerifier, SharedVerifier};
