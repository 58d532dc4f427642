//! Catalog reader: read-only metadata and row queries against the source.

mod postgres;

pub use postgres::PgCatalog;

use crate::core::{ColumnDescriptor, ForeignKeyDescriptor, RowSet, SequenceDescriptor, TableDescriptor};
use crate::error::Result;
use async_trait::async_trait;

/// Source of catalog metadata and table rows for one namespace.
///
/// Every call is a read-only query. Failures are returned to the caller,
/// which decides whether they are fatal for the run.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Base table names, alphabetical.
    async fn list_tables(&self) -> Result<Vec<String>>;

    /// Columns of a table in ordinal order.
    async fn load_columns(&self, table: &str) -> Result<Vec<ColumnDescriptor>>;

    /// Primary key column names in constraint order. Empty when there is none.
    async fn load_primary_key(&self, table: &str) -> Result<Vec<String>>;

    /// Foreign keys owned by a table.
    async fn load_foreign_keys(&self, table: &str) -> Result<Vec<ForeignKeyDescriptor>>;

    /// Sequences of the namespace, alphabetical.
    async fn list_sequences(&self) -> Result<Vec<SequenceDescriptor>>;

    /// Rows of a table with values in the descriptor's column order.
    async fn fetch_rows(&self, table: &TableDescriptor, limit: Option<u64>) -> Result<RowSet>;

    /// Get the database type identifier (e.g., "postgres").
    fn db_type(&self) -> &str;
}
