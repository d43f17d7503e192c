//! Resolves the effective configuration from named TOML layers stored in the
//! database. Layers are applied in request order on top of the baseline
//! defaults, so a later layer wins for every key it sets.

use thiserror::Error;
use tracing::debug;

use super::ProviderConfig;
use crate::storage::{ConfigLayerStore, LayerLookup, StorageError};

/// Conventional name of the layer every node is expected to start from.
pub const BASE_LAYER: &str = "base";

#[derive(Debug, Error)]
pub enum LayerError {
    #[error("no config layers requested")]
    NoLayers,
    #[error("missing layer '{name}'")]
    MissingLayer { name: String },
    #[error(
        "the node defaults to a layer named '{name}'; either run a migration or write a \
         {name}.toml and store it as the '{name}' layer before starting"
    )]
    NoBaseLayer { name: String },
    #[error("could not read layer '{name}': {source}")]
    Store {
        name: String,
        #[source]
        source: StorageError,
    },
    #[error("could not read layer, bad toml {name}: {source}")]
    BadSyntax {
        name: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("cannot encode configuration: {0}")]
    Encode(#[from] toml::ser::Error),
}

/// Effective configuration plus the key paths each layer set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConfig {
    pub config: ProviderConfig,
    pub touched: Vec<(String, Vec<String>)>,
}

impl ResolvedConfig {
    /// Space-joined key paths set by `layer`, e.g. `Apis StorageRPCSecret`.
    pub fn keys_for(&self, layer: &str) -> Option<&[String]> {
        self.touched
            .iter()
            .find(|(name, _)| name == layer)
            .map(|(_, keys)| keys.as_slice())
    }
}

#[derive(Debug, Clone)]
pub struct LayerResolver {
    base_layer: String,
}

impl Default for LayerResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl LayerResolver {
    pub fn new() -> Self {
        Self {
            base_layer: BASE_LAYER.to_string(),
        }
    }

    pub fn with_base_layer(name: impl Into<String>) -> Self {
        Self {
            base_layer: name.into(),
        }
    }

    pub fn base_layer(&self) -> &str {
        &self.base_layer
    }

    /// Fetches and applies every layer in `layers`. Any missing or malformed
    /// layer aborts resolution; no partial configuration is returned.
    pub async fn resolve<S>(
        &self,
        store: &S,
        layers: &[String],
    ) -> Result<ResolvedConfig, LayerError>
    where
        S: ConfigLayerStore + ?Sized,
    {
        if layers.is_empty() {
            return Err(LayerError::NoLayers);
        }

        let mut config = ProviderConfig::default();
        let mut touched = Vec::with_capacity(layers.len());

        for name in layers {
            let lookup = store
                .layer_text(name)
                .await
                .map_err(|source| LayerError::Store {
                    name: name.clone(),
                    source,
                })?;

            let text = match lookup {
                LayerLookup::Found(text) => text,
                LayerLookup::NotFound if *name == self.base_layer => {
                    return Err(LayerError::NoBaseLayer { name: name.clone() });
                }
                LayerLookup::NotFound => {
                    return Err(LayerError::MissingLayer { name: name.clone() });
                }
            };

            let (next, keys) = apply_layer(config, name, &text)?;
            debug!(layer = %name, keys = keys.len(), "applied config layer");
            config = next;
            touched.push((name.clone(), keys));
        }

        Ok(ResolvedConfig { config, touched })
    }
}

/// Decodes `text` on top of `config`. Keys absent from the layer keep their
/// current value.
pub fn apply_layer(
    config: ProviderConfig,
    name: &str,
    text: &str,
) -> Result<(ProviderConfig, Vec<String>), LayerError> {
    let bad_syntax = |source| LayerError::BadSyntax {
        name: name.to_string(),
        source,
    };

    let overlay: toml::Table = toml::from_str(text).map_err(bad_syntax)?;

    let mut keys = Vec::new();
    collect_keys(&overlay, &mut Vec::new(), &mut keys);

    let current = toml::Value::try_from(&config)?;
    let merged = merge_toml(current, toml::Value::Table(overlay));
    let next: ProviderConfig = merged.try_into().map_err(bad_syntax)?;

    Ok((next, keys))
}

/// Tables merge key by key; any other overlay value replaces the base value.
fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_tbl), toml::Value::Table(overlay_tbl)) => {
            for (key, value) in overlay_tbl {
                let merged = match base_tbl.remove(&key) {
                    Some(existing) => merge_toml(existing, value),
                    None => value,
                };
                base_tbl.insert(key, merged);
            }
            toml::Value::Table(base_tbl)
        }
        (_, overlay) => overlay,
    }
}

fn collect_keys(table: &toml::Table, prefix: &mut Vec<String>, out: &mut Vec<String>) {
    for (key, value) in table {
        prefix.push(key.clone());
        out.push(prefix.join(" "));
        if let toml::Value::Table(inner) = value {
            collect_keys(inner, prefix, out);
        }
        prefix.pop();
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::storage::StorageResult;

    #[derive(Default)]
    struct MemoryLayers {
        layers: HashMap<String, String>,
        lookups: AtomicUsize,
    }

    impl MemoryLayers {
        fn with(mut self, name: &str, text: &str) -> Self {
            self.layers.insert(name.to_string(), text.to_string());
            self
        }
    }

    #[async_trait]
    impl ConfigLayerStore for MemoryLayers {
        async fn layer_text(&self, title: &str) -> StorageResult<LayerLookup> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            Ok(match self.layers.get(title) {
                Some(text) => LayerLookup::Found(text.clone()),
                None => LayerLookup::NotFound,
            })
        }
    }

    struct BrokenStore;

    #[async_trait]
    impl ConfigLayerStore for BrokenStore {
        async fn layer_text(&self, _title: &str) -> StorageResult<LayerLookup> {
            Err(StorageError::Database("connection reset".into()))
        }
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|name| name.to_string()).collect()
    }

    #[tokio::test]
    async fn later_layers_override_earlier_ones() {
        let store = MemoryLayers::default()
            .with(
                "base",
                r#"
                [Proving]
                ParallelCheckLimit = 1
                SingleCheckTimeoutSecs = 30

                [Addresses]
                MinerAddresses = ["f01000"]
                "#,
            )
            .with(
                "fast",
                r#"
                [Proving]
                ParallelCheckLimit = 2
                "#,
            );

        let resolved = LayerResolver::new()
            .resolve(&store, &names(&["base", "fast"]))
            .await
            .expect("layers resolve");

        let config = resolved.config;
        assert_eq!(config.proving.parallel_check_limit, 2);
        assert_eq!(config.proving.single_check_timeout_secs, 30);
        assert_eq!(config.addresses.miner_addresses, vec!["f01000".to_string()]);
        // untouched by every layer
        assert_eq!(config.proving.partition_check_timeout_secs, 1200);
        assert_eq!(config.fees.default_max_fee, "0.07 FIL");
    }

    #[tokio::test]
    async fn arrays_are_replaced_not_appended() {
        let store = MemoryLayers::default()
            .with("base", "[Apis]\nChainApiInfo = [\"a:/ip4/10.0.0.1/tcp/1234/http\"]")
            .with("alt", "[Apis]\nChainApiInfo = [\"b:/ip4/10.0.0.2/tcp/1234/http\"]");

        let resolved = LayerResolver::new()
            .resolve(&store, &names(&["base", "alt"]))
            .await
            .expect("layers resolve");
        assert_eq!(
            resolved.config.apis.chain_api_info,
            vec!["b:/ip4/10.0.0.2/tcp/1234/http".to_string()]
        );
    }

    #[tokio::test]
    async fn records_touched_keys_per_layer() {
        let store = MemoryLayers::default()
            .with("base", "[Apis]\nStorageRPCSecret = \"c2VjcmV0\"")
            .with("post", "[Subsystems]\nEnableWindowPost = true");

        let resolved = LayerResolver::new()
            .resolve(&store, &names(&["base", "post"]))
            .await
            .expect("layers resolve");

        assert_eq!(
            resolved.keys_for("base"),
            Some(&["Apis".to_string(), "Apis StorageRPCSecret".to_string()][..])
        );
        assert!(resolved
            .keys_for("post")
            .expect("post keys")
            .contains(&"Subsystems EnableWindowPost".to_string()));
        assert!(resolved.config.subsystems.enable_window_post);
    }

    #[tokio::test]
    async fn missing_layer_names_the_layer() {
        let store = MemoryLayers::default().with("base", "");
        let err = LayerResolver::new()
            .resolve(&store, &names(&["base", "gpu"]))
            .await
            .unwrap_err();
        assert!(matches!(err, LayerError::MissingLayer { ref name } if name == "gpu"));
        assert_eq!(err.to_string(), "missing layer 'gpu'");
    }

    #[tokio::test]
    async fn missing_base_layer_is_distinguished() {
        let store = MemoryLayers::default();
        let err = LayerResolver::new()
            .resolve(&store, &names(&["base"]))
            .await
            .unwrap_err();
        assert!(matches!(err, LayerError::NoBaseLayer { ref name } if name == "base"));
        assert!(err.to_string().contains("defaults to a layer named 'base'"));
    }

    #[tokio::test]
    async fn custom_base_layer_name_is_honoured() {
        let store = MemoryLayers::default();
        let resolver = LayerResolver::with_base_layer("root");

        let err = resolver
            .resolve(&store, &names(&["root"]))
            .await
            .unwrap_err();
        assert!(matches!(err, LayerError::NoBaseLayer { .. }));

        let err = resolver
            .resolve(&store, &names(&["base"]))
            .await
            .unwrap_err();
        assert!(matches!(err, LayerError::MissingLayer { .. }));
    }

    #[tokio::test]
    async fn bad_toml_names_the_layer_and_stops() {
        let store = MemoryLayers::default()
            .with("base", "[Proving\nParallelCheckLimit = 3")
            .with("next", "");
        let err = LayerResolver::new()
            .resolve(&store, &names(&["base", "next"]))
            .await
            .unwrap_err();
        assert!(matches!(err, LayerError::BadSyntax { ref name, .. } if name == "base"));
        assert_eq!(store.lookups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn type_mismatch_is_reported_as_bad_syntax() {
        let store =
            MemoryLayers::default().with("base", "[Proving]\nParallelCheckLimit = \"many\"");
        let err = LayerResolver::new()
            .resolve(&store, &names(&["base"]))
            .await
            .unwrap_err();
        assert!(matches!(err, LayerError::BadSyntax { .. }));
    }

    #[tokio::test]
    async fn store_failures_carry_layer_name() {
        let err = LayerResolver::new()
            .resolve(&BrokenStore, &names(&["base"]))
            .await
            .unwrap_err();
        assert!(matches!(err, LayerError::Store { ref name, .. } if name == "base"));
    }

    #[tokio::test]
    async fn empty_layer_list_is_rejected() {
        let err = LayerResolver::new()
            .resolve(&MemoryLayers::default(), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, LayerError::NoLayers));
    }

    #[test]
    fn unknown_keys_are_tolerated() {
        let (config, keys) =
            apply_layer(ProviderConfig::default(), "extra", "[Market]\nEnabled = true")
                .expect("layer applies");
        assert_eq!(config, ProviderConfig::default());
        assert_eq!(keys, vec!["Market".to_string(), "Market Enabled".to_string()]);
    }
}
