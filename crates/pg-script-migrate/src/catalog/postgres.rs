//! PostgreSQL catalog reader.

use super::CatalogSource;
use crate::config::DatabaseConfig;
use crate::core::{
    ColumnDescriptor, ForeignKeyDescriptor, RowSet, SequenceDescriptor, SqlValue,
    TableDescriptor, ValueKind,
};
use crate::error::{MigrateError, Result};
use crate::pg::{connect_pool, quote_ident};
use async_trait::async_trait;
use deadpool_postgres::{Object, Pool};
use tokio_postgres::SimpleQueryMessage;
use tracing::{debug, info};

/// Catalog reader backed by a deadpool-postgres pool.
pub struct PgCatalog {
    pool: Pool,
    schema: String,
}

impl PgCatalog {
    /// Connect to the source database described by `config`.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = connect_pool(config, 2).await?;
        Ok(Self::from_pool(pool, config.schema.clone()))
    }

    pub fn from_pool(pool: Pool, schema: impl Into<String>) -> Self {
        Self {
            pool,
            schema: schema.into(),
        }
    }

    async fn client(&self, context: &str) -> Result<Object> {
        self.pool
            .get()
            .await
            .map_err(|e| MigrateError::pool(e, format!("getting connection for {}", context)))
    }
}

/// A query failure for one entity, unless the connection itself is gone.
fn query_error(entity: impl Into<String>, e: tokio_postgres::Error) -> MigrateError {
    if e.is_closed() {
        MigrateError::connection(e, "source catalog")
    } else {
        MigrateError::catalog(entity, e)
    }
}

/// Map a `pg_constraint` action code to its SQL keyword.
fn action_name(code: &str) -> &'static str {
    match code {
        "r" => "RESTRICT",
        "c" => "CASCADE",
        "n" => "SET NULL",
        "d" => "SET DEFAULT",
        _ => "NO ACTION",
    }
}

/// Build the row query for a table with an explicit column list.
fn select_rows_sql(schema: &str, table: &TableDescriptor, limit: Option<u64>) -> String {
    let cols: Vec<String> = table.columns.iter().map(|c| quote_ident(&c.name)).collect();
    let mut sql = format!(
        "SELECT {} FROM {}.{}",
        cols.join(", "),
        quote_ident(schema),
        quote_ident(&table.name)
    );
    if let Some(n) = limit {
        sql.push_str(&format!(" LIMIT {}", n));
    }
    sql
}

#[async_trait]
impl CatalogSource for PgCatalog {
    async fn list_tables(&self) -> Result<Vec<String>> {
        let client = self.client("list_tables").await?;

        let query = r#"
            SELECT table_name::text
            FROM information_schema.tables
            WHERE table_type = 'BASE TABLE'
              AND table_schema = $1::text
            ORDER BY table_name
        "#;

        let rows = client
            .query(query, &[&self.schema])
            .await
            .map_err(|e| query_error(format!("schema {}", self.schema), e))?;
        let tables: Vec<String> = rows.iter().map(|r| r.get::<_, String>(0)).collect();

        info!("Found {} tables in schema '{}'", tables.len(), self.schema);
        Ok(tables)
    }

    async fn load_columns(&self, table: &str) -> Result<Vec<ColumnDescriptor>> {
        let client = self.client("load_columns").await?;

        let query = r#"
            SELECT
                a.attname::text,
                format_type(a.atttypid, a.atttypmod),
                NOT a.attnotnull,
                pg_get_expr(d.adbin, d.adrelid)
            FROM pg_catalog.pg_attribute a
            JOIN pg_catalog.pg_class c ON c.oid = a.attrelid
            JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
            LEFT JOIN pg_catalog.pg_attrdef d
                ON d.adrelid = a.attrelid AND d.adnum = a.attnum
            WHERE n.nspname = $1
              AND c.relname = $2
              AND a.attnum > 0
              AND NOT a.attisdropped
            ORDER BY a.attnum
        "#;

        let rows = client
            .query(query, &[&self.schema, &table])
            .await
            .map_err(|e| query_error(format!("table {} (columns)", table), e))?;

        let columns: Vec<ColumnDescriptor> = rows
            .iter()
            .map(|row| ColumnDescriptor {
                name: row.get::<_, String>(0),
                data_type: row.get::<_, String>(1),
                is_nullable: row.get::<_, bool>(2),
                default: row.get::<_, Option<String>>(3),
            })
            .collect();

        debug!("Loaded {} columns for {}", columns.len(), table);
        Ok(columns)
    }

    async fn load_primary_key(&self, table: &str) -> Result<Vec<String>> {
        let client = self.client("load_primary_key").await?;

        let query = r#"
            SELECT a.attname::text
            FROM pg_catalog.pg_constraint c
            JOIN pg_catalog.pg_class t ON t.oid = c.conrelid
            JOIN pg_catalog.pg_namespace n ON n.oid = t.relnamespace
            JOIN pg_catalog.pg_attribute a ON a.attrelid = t.oid
            WHERE n.nspname = $1
              AND t.relname = $2
              AND c.contype = 'p'
              AND a.attnum = ANY(c.conkey)
            ORDER BY array_position(c.conkey, a.attnum)
        "#;

        let rows = client
            .query(query, &[&self.schema, &table])
            .await
            .map_err(|e| query_error(format!("table {} (primary key)", table), e))?;
        let pk: Vec<String> = rows.iter().map(|r| r.get::<_, String>(0)).collect();

        debug!("Primary key for {}: {:?}", table, pk);
        Ok(pk)
    }

    async fn load_foreign_keys(&self, table: &str) -> Result<Vec<ForeignKeyDescriptor>> {
        let client = self.client("load_foreign_keys").await?;

        let query = r#"
            SELECT
                c.conname::text,
                ARRAY(
                    SELECT a.attname::text
                    FROM unnest(c.conkey) WITH ORDINALITY AS k(attnum, ord)
                    JOIN pg_catalog.pg_attribute a
                        ON a.attrelid = c.conrelid AND a.attnum = k.attnum
                    ORDER BY k.ord
                ),
                rt.relname::text,
                ARRAY(
                    SELECT a.attname::text
                    FROM unnest(c.confkey) WITH ORDINALITY AS k(attnum, ord)
                    JOIN pg_catalog.pg_attribute a
                        ON a.attrelid = c.confrelid AND a.attnum = k.attnum
                    ORDER BY k.ord
                ),
                c.confdeltype::text,
                c.confupdtype::text
            FROM pg_catalog.pg_constraint c
            JOIN pg_catalog.pg_class t ON t.oid = c.conrelid
            JOIN pg_catalog.pg_namespace n ON n.oid = t.relnamespace
            JOIN pg_catalog.pg_class rt ON rt.oid = c.confrelid
            WHERE n.nspname = $1
              AND t.relname = $2
              AND c.contype = 'f'
            ORDER BY c.conname
        "#;

        let rows = client
            .query(query, &[&self.schema, &table])
            .await
            .map_err(|e| query_error(format!("table {} (foreign keys)", table), e))?;

        let fks: Vec<ForeignKeyDescriptor> = rows
            .iter()
            .map(|row| ForeignKeyDescriptor {
                name: row.get::<_, String>(0),
                table: table.to_string(),
                columns: row.get::<_, Vec<String>>(1),
                ref_table: row.get::<_, String>(2),
                ref_columns: row.get::<_, Vec<String>>(3),
                on_delete: action_name(&row.get::<_, String>(4)).to_string(),
                on_update: action_name(&row.get::<_, String>(5)).to_string(),
            })
            .collect();

        debug!("Loaded {} foreign keys for {}", fks.len(), table);
        Ok(fks)
    }

    async fn list_sequences(&self) -> Result<Vec<SequenceDescriptor>> {
        let client = self.client("list_sequences").await?;

        let query = r#"
            SELECT
                sequence_name::text,
                data_type::text,
                start_value::int8,
                minimum_value::int8,
                maximum_value::int8,
                increment::int8
            FROM information_schema.sequences
            WHERE sequence_schema = $1::text
            ORDER BY sequence_name
        "#;

        let rows = client
            .query(query, &[&self.schema])
            .await
            .map_err(|e| query_error("sequences", e))?;

        let sequences: Vec<SequenceDescriptor> = rows
            .iter()
            .map(|row| SequenceDescriptor {
                name: row.get::<_, String>(0),
                data_type: row.get::<_, Option<String>>(1),
                start: row.get::<_, i64>(2),
                min: row.get::<_, i64>(3),
                max: row.get::<_, i64>(4),
                increment: row.get::<_, i64>(5),
            })
            .collect();

        debug!("Found {} sequences", sequences.len());
        Ok(sequences)
    }

    async fn fetch_rows(&self, table: &TableDescriptor, limit: Option<u64>) -> Result<RowSet> {
        if table.columns.is_empty() {
            return Ok(RowSet::empty(&table.name));
        }
        let client = self.client("fetch_rows").await?;

        let kinds: Vec<ValueKind> = table
            .columns
            .iter()
            .map(|c| ValueKind::from_data_type(&c.data_type))
            .collect();
        let sql = select_rows_sql(&self.schema, table, limit);

        let messages = client
            .simple_query(&sql)
            .await
            .map_err(|e| query_error(format!("table {} (rows)", table.name), e))?;

        let mut rows = Vec::new();
        for msg in messages {
            if let SimpleQueryMessage::Row(row) = msg {
                let values: Vec<SqlValue> = kinds
                    .iter()
                    .enumerate()
                    .map(|(idx, kind)| SqlValue::from_pg_text(*kind, row.get(idx)))
                    .collect();
                rows.push(values);
            }
        }

        debug!("Fetched {} rows from {}", rows.len(), table.name);
        Ok(RowSet {
            table: table.name.clone(),
            columns: table.column_names(),
            rows,
        })
    }

    fn db_type(&self) -> &str {
        "postgres"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_codes() {
        assert_eq!(action_name("a"), "NO ACTION");
        assert_eq!(action_name("c"), "CASCADE");
        assert_eq!(action_name("n"), "SET NULL");
        assert_eq!(action_name("d"), "SET DEFAULT");
        assert_eq!(action_name("r"), "RESTRICT");
    }

    #[test]
    fn test_select_rows_sql() {
        let mut table = TableDescriptor::new("Order Lines");
        table.columns = vec![
            ColumnDescriptor::new("id", "integer", false),
            ColumnDescriptor::new("note", "text", true),
        ];
        assert_eq!(
            select_rows_sql("public", &table, Some(10)),
            r#"SELECT "id", "note" FROM "public"."Order Lines" LIMIT 10"#
        );
        assert_eq!(
            select_rows_sql("public", &table, None),
            r#"SELECT "id", "note" FROM "public"."Order Lines""#
        );
    }
}
