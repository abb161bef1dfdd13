use std::collections::HashSet;

use anyhow::Context;
use blog_common::database::Database;
use futures::TryStreamExt;

use crate::domain::migration::MigrationStep;
use crate::domain::persistence::Persistence;

const EXISTING_TABLES: &str = "SELECT table_name FROM information_schema.tables \
    WHERE table_schema = $1 AND table_type = 'BASE TABLE'";

/// Postgres view of the blog schema: which tables exist and how to add the
/// missing ones.
#[derive(Clone)]
pub struct PostgresCatalog {
    database: Database,
}

impl PostgresCatalog {
    pub fn new(database: Database) -> Self {
        Self { database }
    }
}

impl Persistence for PostgresCatalog {
    async fn load(&self) -> Result<HashSet<String>, anyhow::Error> {
        let schema = self.database.database_schema();
        let tables: HashSet<String> = sqlx::query_scalar(EXISTING_TABLES)
            .bind(schema)
            .fetch(self.database.database_pool())
            .try_collect()
            .await
            .with_context(|| format!("failed to list tables of schema {schema}"))?;

        tracing::debug!(schema, existing = tables.len(), "catalog loaded");
        Ok(tables)
    }

    async fn apply_migration_steps(
        &self,
        steps: Vec<impl MigrationStep>,
    ) -> Result<(), anyhow::Error> {
        let total = steps.len();
        for (index, step) in steps.into_iter().enumerate() {
            let ctx = step.ctx();
            let ddls = step.ddls();
            if ddls.is_empty() {
                continue;
            }
            tracing::info!(step = index + 1, total, "{ctx}");
            self.database.execute_in_transaction(ddls, ctx).await?;
        }
        Ok(())
    }

    fn database_schema(&self) -> &str {
        self.database.database_schema()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_sees_only_base_tables_of_bound_schema() {
        assert!(EXISTING_TABLES.contains("table_schema = $1"));
        assert!(EXISTING_TABLES.contains("table_type = 'BASE TABLE'"));
        assert!(!EXISTING_TABLES.contains("$2"));
    }
}
