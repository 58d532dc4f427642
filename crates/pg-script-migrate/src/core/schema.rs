//! Catalog descriptors.
//!
//! Descriptors are read-only snapshots taken once per export run and only
//! ever used to render SQL text.

use serde::{Deserialize, Serialize};

/// Table metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDescriptor {
    /// Table name, unique within the namespace.
    pub name: String,

    /// Column definitions in ordinal order.
    pub columns: Vec<ColumnDescriptor>,

    /// Primary key column names in constraint order.
    pub primary_key: Vec<String>,
}

impl TableDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            primary_key: Vec::new(),
        }
    }

    /// Check if the table has a primary key.
    pub fn has_pk(&self) -> bool {
        !self.primary_key.is_empty()
    }

    /// Look up a column by name.
    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Column names in ordinal order.
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }
}

/// Column metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    /// Column name.
    pub name: String,

    /// Declared type as PostgreSQL prints it (e.g. "integer", "character varying(80)").
    pub data_type: String,

    /// Whether the column allows NULL.
    pub is_nullable: bool,

    /// Default expression as raw SQL text.
    pub default: Option<String>,
}

impl ColumnDescriptor {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>, is_nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            is_nullable,
            default: None,
        }
    }

    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }
}

/// Foreign key metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyDescriptor {
    /// Constraint name.
    pub name: String,

    /// Owning table.
    pub table: String,

    /// Owning column names.
    pub columns: Vec<String>,

    /// Referenced table name.
    pub ref_table: String,

    /// Referenced column names.
    pub ref_columns: Vec<String>,

    /// ON DELETE action ("NO ACTION", "CASCADE", ...).
    pub on_delete: String,

    /// ON UPDATE action.
    pub on_update: String,
}

impl ForeignKeyDescriptor {
    /// Single-column foreign key with default referential actions.
    pub fn simple(
        name: impl Into<String>,
        table: impl Into<String>,
        column: impl Into<String>,
        ref_table: impl Into<String>,
        ref_column: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            columns: vec![column.into()],
            ref_table: ref_table.into(),
            ref_columns: vec![ref_column.into()],
            on_delete: "NO ACTION".to_string(),
            on_update: "NO ACTION".to_string(),
        }
    }

    pub fn is_self_reference(&self) -> bool {
        self.table == self.ref_table
    }
}

/// Sequence metadata. Ownership by table columns is not tracked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceDescriptor {
    pub name: String,

    /// Underlying integer type ("bigint", "integer", "smallint").
    pub data_type: Option<String>,

    pub start: i64,
    pub min: i64,
    pub max: i64,
    pub increment: i64,
}

/// A per-entity catalog failure that was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogWarning {
    /// Affected object, e.g. "table users (columns)" or "sequences".
    pub entity: String,
    pub message: String,
}

impl CatalogWarning {
    pub fn new(entity: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for CatalogWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.entity, self.message)
    }
}

/// Everything read from the source catalog in one export run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogSnapshot {
    /// Tables in alphabetical order.
    pub tables: Vec<TableDescriptor>,

    /// Foreign keys of all tables.
    pub foreign_keys: Vec<ForeignKeyDescriptor>,

    /// Sequences in alphabetical order.
    pub sequences: Vec<SequenceDescriptor>,
}

impl CatalogSnapshot {
    /// Foreign keys owned by one table, in constraint-name order.
    pub fn foreign_keys_of(&self, table: &str) -> Vec<&ForeignKeyDescriptor> {
        let mut fks: Vec<_> = self
            .foreign_keys
            .iter()
            .filter(|fk| fk.table == table)
            .collect();
        fks.sort_by(|a, b| a.name.cmp(&b.name));
        fks
    }
}
