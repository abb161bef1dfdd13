use blog_common::{ARTICLE_ID_FIELD_NAME, CREATED_FIELD_NAME, UPDATED_FIELD_NAME, USER_ID_FIELD_NAME};

use crate::domain::tables::{Column, ColumnType, Table};

pub mod migration;
pub mod persistence;
pub mod tables;

pub const ARTICLES_TABLE: &str = "articles";
pub const ARTICLE_VIEWS_TABLE: &str = "article_views";
pub const ARTICLE_LIKES_TABLE: &str = "article_likes";
pub const BUS_BINDINGS_TABLE: &str = "bus_bindings";
pub const BUS_MESSAGES_TABLE: &str = "bus_messages";
pub const BUS_DEAD_LETTERS_TABLE: &str = "bus_dead_letters";

/// Every table the services expect, in creation order.
pub fn blog_tables() -> Vec<Table> {
    vec![
        articles(),
        article_views(),
        article_likes(),
        bus_bindings(),
        bus_messages(),
        bus_dead_letters(),
    ]
}

fn created_at() -> Column {
    Column::required(CREATED_FIELD_NAME, ColumnType::TimestampTZ).default_value("now()")
}

fn articles() -> Table {
    Table::new(
        ARTICLES_TABLE,
        vec![
            Column::primary_key("id"),
            Column::required(USER_ID_FIELD_NAME, ColumnType::BigInt),
            Column::required("title", ColumnType::Varchar(200)),
            Column::required("content", ColumnType::Text),
            Column::required("visibility", ColumnType::Varchar(16)).default_value("'public'"),
            Column::new("access_token", ColumnType::Text),
            created_at(),
            Column::required(UPDATED_FIELD_NAME, ColumnType::TimestampTZ).default_value("now()"),
        ],
    )
    .index(&[USER_ID_FIELD_NAME])
    .index(&["visibility", CREATED_FIELD_NAME])
}

// one row per view occurrence; anonymous views have no user
fn article_views() -> Table {
    Table::new(
        ARTICLE_VIEWS_TABLE,
        vec![
            Column::primary_key("id"),
            Column::required(ARTICLE_ID_FIELD_NAME, ColumnType::BigInt),
            Column::new(USER_ID_FIELD_NAME, ColumnType::BigInt),
            created_at(),
        ],
    )
    .index(&[ARTICLE_ID_FIELD_NAME])
}

fn article_likes() -> Table {
    Table::new(
        ARTICLE_LIKES_TABLE,
        vec![
            Column::primary_key("id"),
            Column::required(ARTICLE_ID_FIELD_NAME, ColumnType::BigInt),
            Column::required(USER_ID_FIELD_NAME, ColumnType::BigInt),
            created_at(),
        ],
    )
    .unique_index(&[ARTICLE_ID_FIELD_NAME, USER_ID_FIELD_NAME])
}

fn bus_bindings() -> Table {
    Table::new(
        BUS_BINDINGS_TABLE,
        vec![
            Column::primary_key("id"),
            Column::required("queue_name", ColumnType::Text),
            Column::required("exchange", ColumnType::Text),
            Column::required("pattern", ColumnType::Text),
            created_at(),
        ],
    )
    .unique_index(&["queue_name", "exchange", "pattern"])
}

fn bus_messages() -> Table {
    Table::new(
        BUS_MESSAGES_TABLE,
        vec![
            Column::primary_key("id"),
            Column::required("queue_name", ColumnType::Text),
            Column::required("routing_key", ColumnType::Text),
            Column::required("body", ColumnType::Bytea),
            Column::required("attempts", ColumnType::Integer).default_value("0"),
            Column::required("available_at", ColumnType::TimestampTZ).default_value("now()"),
            Column::new("locked_until", ColumnType::TimestampTZ),
            created_at(),
        ],
    )
    .index(&["queue_name", "available_at"])
}

fn bus_dead_letters() -> Table {
    Table::new(
        BUS_DEAD_LETTERS_TABLE,
        vec![
            Column::primary_key("id"),
            Column::required("message_id", ColumnType::BigInt),
            Column::required("queue_name", ColumnType::Text),
            Column::required("routing_key", ColumnType::Text),
            Column::required("body", ColumnType::Bytea),
            Column::required("attempts", ColumnType::Integer),
            Column::required("reason", ColumnType::Text),
            created_at(),
        ],
    )
    .index(&["queue_name"])
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn table_names_are_unique() {
        let tables = blog_tables();
        let names: HashSet<_> = tables.iter().map(|table| table.name.as_str()).collect();
        assert_eq!(names.len(), tables.len());
    }

    #[test]
    fn every_table_has_a_primary_key() {
        for table in blog_tables() {
            assert_eq!(
                table.columns.iter().filter(|column| column.primary_key).count(),
                1,
                "{}",
                table.name
            );
        }
    }

    #[test]
    fn likes_are_unique_per_user() {
        let likes = article_likes();
        let index = &likes.indexes[0];
        assert!(index.unique);
        assert_eq!(index.columns, vec!["article_id", "user_id"]);
    }
}
