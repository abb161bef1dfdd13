use std::collections::HashSet;

use crate::domain::persistence::Persistence;
use crate::domain::tables::{Column, Index, Table};

pub trait MigrationStep {
    fn ctx(&self) -> &'static str;
    fn ddls(self) -> Vec<String>;
}

#[derive(Debug)]
pub struct CreateTableStep {
    ddls: Vec<String>,
}

impl CreateTableStep {
    fn new(database_schema: &str, table: &Table) -> Self {
        let ddls = create_table_ddl(database_schema, table);
        Self { ddls }
    }
}

impl MigrationStep for CreateTableStep {
    fn ctx(&self) -> &'static str {
        "CREATE TABLE"
    }

    fn ddls(self) -> Vec<String> {
        self.ddls
    }
}

/// Brings the database in line with `tables`, creating what is missing.
pub struct Migration<P> {
    tables: Vec<Table>,
    persistence: P,
}

impl<P: Persistence> Migration<P> {
    pub fn new(tables: Vec<Table>, persistence: P) -> Self {
        Self {
            tables,
            persistence,
        }
    }

    /// Returns the number of tables created.
    pub async fn migrate(&self) -> Result<usize, anyhow::Error> {
        let existing = self.persistence.load().await?;
        let steps = migration_steps(self.persistence.database_schema(), &self.tables, &existing);
        let created = steps.len();

        self.persistence.apply_migration_steps(steps).await?;
        Ok(created)
    }
}

pub fn migration_steps(
    database_schema: &str,
    needed: &[Table],
    existing: &HashSet<String>,
) -> Vec<CreateTableStep> {
    needed
        .iter()
        .filter(|table| !existing.contains(&table.name))
        .map(|table| CreateTableStep::new(database_schema, table))
        .collect()
}

fn create_table_ddl(schema: &str, table: &Table) -> Vec<String> {
    let mut columns = Vec::new();
    let mut pk_columns = Vec::new();

    for column in table.columns.iter() {
        columns.push(column_ddl(column));
        if column.primary_key {
            pk_columns.push(format!("\"{}\"", column.name));
        }
    }

    if !pk_columns.is_empty() {
        columns.push(format!("PRIMARY KEY({})", pk_columns.join(", ")));
    }

    let table_ddl = format!(
        "CREATE TABLE IF NOT EXISTS \"{}\".\"{}\" (\n    {}\n)",
        schema,
        table.name,
        columns.join(",\n    ")
    );

    let mut ddls = vec![table_ddl];
    ddls.extend(table.indexes.iter().map(|index| create_index_ddl(schema, index)));
    ddls
}

fn column_ddl(column: &Column) -> String {
    let mut sql = format!("\"{}\" {}", column.name, column.column_type);
    if column.not_null {
        sql.push_str(" NOT NULL");
    }
    if let Some(default_value) = &column.default_value {
        sql.push_str(&format!(" DEFAULT {default_value}"));
    }
    sql
}

fn create_index_ddl(schema: &str, index: &Index) -> String {
    let columns_sql = index
        .columns
        .iter()
        .map(|column| format!("\"{column}\""))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "CREATE {}INDEX IF NOT EXISTS \"{}\" ON \"{}\".\"{}\" ({})",
        if index.unique { "UNIQUE " } else { "" },
        index.name(),
        schema,
        index.table_name,
        columns_sql
    )
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::domain::blog_tables;
    use crate::domain::tables::ColumnType;

    #[test]
    fn table_ddl() {
        let table = Table::new(
            "article_likes",
            vec![
                Column::primary_key("id"),
                Column::required("article_id", ColumnType::BigInt),
                Column::new("user_id", ColumnType::BigInt),
                Column::required("created_at", ColumnType::TimestampTZ).default_value("now()"),
            ],
        )
        .unique_index(&["article_id", "user_id"]);

        let ddls = create_table_ddl("blog", &table);

        assert_eq!(
            ddls[0],
            "CREATE TABLE IF NOT EXISTS \"blog\".\"article_likes\" (\n    \
             \"id\" BIGSERIAL,\n    \
             \"article_id\" BIGINT NOT NULL,\n    \
             \"user_id\" BIGINT,\n    \
             \"created_at\" TIMESTAMPTZ NOT NULL DEFAULT now(),\n    \
             PRIMARY KEY(\"id\")\n)"
        );
        assert_eq!(
            ddls[1],
            "CREATE UNIQUE INDEX IF NOT EXISTS \"article_likes_article_id_user_id_idx\" \
             ON \"blog\".\"article_likes\" (\"article_id\", \"user_id\")"
        );
    }

    #[test]
    fn plain_index_ddl() {
        let index = Index::new("bus_messages", &["queue_name", "available_at"], false);
        assert_eq!(
            create_index_ddl("public", &index),
            "CREATE INDEX IF NOT EXISTS \"bus_messages_queue_name_available_at_idx\" \
             ON \"public\".\"bus_messages\" (\"queue_name\", \"available_at\")"
        );
    }

    #[derive(Clone, Default)]
    struct FakePersistence {
        existing: HashSet<String>,
        applied: Arc<Mutex<Vec<Vec<String>>>>,
    }

    impl Persistence for FakePersistence {
        async fn load(&self) -> Result<HashSet<String>, anyhow::Error> {
            Ok(self.existing.clone())
        }

        async fn apply_migration_steps(
            &self,
            steps: Vec<impl MigrationStep>,
        ) -> Result<(), anyhow::Error> {
            let mut applied = self.applied.lock().unwrap();
            for step in steps {
                applied.push(step.ddls());
            }
            Ok(())
        }

        fn database_schema(&self) -> &str {
            "blog"
        }
    }

    #[tokio::test]
    async fn creates_only_missing_tables() {
        let persistence = FakePersistence {
            existing: ["articles", "article_views"]
                .into_iter()
                .map(String::from)
                .collect(),
            ..Default::default()
        };
        let migration = Migration::new(blog_tables(), persistence.clone());

        let created = migration.migrate().await.unwrap();

        assert_eq!(created, blog_tables().len() - 2);
        let applied = persistence.applied.lock().unwrap();
        assert!(applied.iter().all(|ddls| !ddls[0].contains("\"articles\"")));
        assert!(applied.iter().any(|ddls| ddls[0].contains("\"bus_messages\"")));
    }

    #[tokio::test]
    async fn migrated_database_needs_nothing() {
        let persistence = FakePersistence {
            existing: blog_tables().into_iter().map(|table| table.name).collect(),
            ..Default::default()
        };
        let migration = Migration::new(blog_tables(), persistence.clone());

        assert_eq!(migration.migrate().await.unwrap(), 0);
    }
}
