use std::fmt;

/// Represents table in a database, used for ddl generation
#[derive(Debug)]
pub struct Table {
    pub name: String,
    pub columns: Vec<Column>,
    pub indexes: Vec<Index>,
}

/// Represents one column in the database table
#[derive(Debug)]
pub struct Column {
    pub name: String,
    pub column_type: ColumnType,
    pub not_null: bool,
    pub primary_key: bool,
    pub default_value: Option<String>,
}

/// Represents Column types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    BigSerial,
    BigInt,
    Integer,
    Text,
    Varchar(usize),
    Bytea,
    TimestampTZ,
}

/// Represents an index in the database table
#[derive(Debug)]
pub struct Index {
    pub table_name: String,
    pub columns: Vec<String>,
    pub unique: bool,
}

impl Table {
    pub fn new(name: impl Into<String>, columns: Vec<Column>) -> Self {
        Self {
            name: name.into(),
            columns,
            indexes: Vec::new(),
        }
    }

    pub fn index(mut self, columns: &[&str]) -> Self {
        self.indexes.push(Index::new(&self.name, columns, false));
        self
    }

    pub fn unique_index(mut self, columns: &[&str]) -> Self {
        self.indexes.push(Index::new(&self.name, columns, true));
        self
    }
}

impl Column {
    /// Nullable column without default.
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            not_null: false,
            primary_key: false,
            default_value: None,
        }
    }

    pub fn primary_key(name: impl Into<String>) -> Self {
        Self {
            primary_key: true,
            ..Self::new(name, ColumnType::BigSerial)
        }
    }

    pub fn required(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self::new(name, column_type).not_null()
    }

    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    pub fn default_value(mut self, value: impl Into<String>) -> Self {
        self.default_value = Some(value.into());
        self
    }
}

impl Index {
    pub fn new(table_name: &str, columns: &[&str], unique: bool) -> Self {
        Self {
            table_name: table_name.to_owned(),
            columns: columns.iter().map(|column| (*column).to_owned()).collect(),
            unique,
        }
    }

    pub fn name(&self) -> String {
        format!("{}_{}_idx", self.table_name, self.columns.join("_"))
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::BigSerial => f.write_str("BIGSERIAL"),
            ColumnType::BigInt => f.write_str("BIGINT"),
            ColumnType::Integer => f.write_str("INTEGER"),
            ColumnType::Text => f.write_str("TEXT"),
            ColumnType::Varchar(length) => write!(f, "VARCHAR({length})"),
            ColumnType::Bytea => f.write_str("BYTEA"),
            ColumnType::TimestampTZ => f.write_str("TIMESTAMPTZ"),
        }
    }
}
