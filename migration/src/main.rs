use blog_common::{database::Database, telemetry};

use crate::{
    domain::{blog_tables, migration::Migration},
    infrastructure::{persistence::PostgresCatalog, settings::Settings},
};

pub mod domain;
pub mod infrastructure;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::from_env()?;
    telemetry::init(&settings.log_filter);

    let database = Database::connect(&settings.database).await?;
    let persistence = PostgresCatalog::new(database);

    let migration = Migration::new(blog_tables(), persistence);
    let created = migration.migrate().await?;
    tracing::info!(created, "schema migrated");

    Ok(())
}
