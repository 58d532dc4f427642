//! Core data model shared by the catalog reader, serializer and replay engine.
//!
//! - [`schema`]: table, column, foreign key and sequence descriptors
//! - [`value`]: tagged SQL values and row sets
//! - [`identifier`]: identifier validation and quoting
//! - [`script`]: the three script artifacts and their replay ranks

pub mod identifier;
pub mod schema;
pub mod script;
pub mod value;

pub use schema::{
    CatalogSnapshot, CatalogWarning, ColumnDescriptor, ForeignKeyDescriptor, SequenceDescriptor,
    TableDescriptor,
};
pub use script::{ScriptArtifact, ScriptKind};
pub use value::{RowSet, SqlValue, ValueKind};
