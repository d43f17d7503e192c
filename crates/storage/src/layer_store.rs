use provider_node_domain::storage::{ConfigLayerStore, LayerLookup, StorageError, StorageResult};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};

use crate::entity::harmony_config;
use crate::HarmonyStorage;

#[async_trait::async_trait]
impl ConfigLayerStore for HarmonyStorage {
    async fn layer_text(&self, title: &str) -> StorageResult<LayerLookup> {
        let maybe = harmony_config::Entity::find()
            .filter(harmony_config::Column::Title.eq(title))
            .one(self.connection())
            .await
            .map_err(StorageError::from_source)?;
        Ok(match maybe {
            Some(model) => LayerLookup::Found(model.config),
            None => LayerLookup::NotFound,
        })
    }
}
