use sea_orm::sea_query::{ColumnDef, Table, TableCreateStatement};
use sea_orm::{ConnectionTrait, DatabaseBackend, DatabaseConnection};

use crate::entity::harmony_config;
use provider_node_domain::storage::{StorageError, StorageResult};

/// Creates the layer table when it is missing. Existing rows are untouched.
pub async fn run_migrations(db: &DatabaseConnection) -> StorageResult<()> {
    let backend = db.get_database_backend();

    let config_table = Table::create()
        .if_not_exists()
        .table(harmony_config::Entity)
        .col(
            ColumnDef::new(harmony_config::Column::Id)
                .integer()
                .not_null()
                .auto_increment()
                .primary_key(),
        )
        .col(
            ColumnDef::new(harmony_config::Column::Title)
                .string_len(300)
                .not_null()
                .unique_key(),
        )
        .col(
            ColumnDef::new(harmony_config::Column::Config)
                .text()
                .not_null(),
        )
        .to_owned();
    create_table(db, backend, config_table).await?;

    Ok(())
}

async fn create_table(
    db: &DatabaseConnection,
    backend: DatabaseBackend,
    mut statement: TableCreateStatement,
) -> StorageResult<()> {
    statement.if_not_exists();
    db.execute(backend.build(&statement))
        .await
        .map_err(StorageError::from_source)?;
    Ok(())
}
