//! Replay targets.

use crate::config::DatabaseConfig;
use crate::error::{MigrateError, Result};
use crate::pg::{connect_client, quote_ident};
use async_trait::async_trait;
use tokio_postgres::Client;
use tracing::debug;

/// Destination database for script replay.
///
/// Methods take `&mut self`: a target is owned by exactly one replay at a
/// time. Outside `begin`/`commit` every statement runs in autocommit.
#[async_trait]
pub trait ScriptTarget: Send {
    /// Base table names of the namespace.
    async fn list_tables(&mut self) -> Result<Vec<String>>;

    /// Sequence names of the namespace.
    async fn list_sequences(&mut self) -> Result<Vec<String>>;

    /// Execute one statement.
    async fn execute(&mut self, sql: &str) -> Result<()>;

    async fn begin(&mut self) -> Result<()>;

    async fn commit(&mut self) -> Result<()>;

    async fn rollback(&mut self) -> Result<()>;

    /// Get the database type identifier (e.g., "postgres").
    fn db_type(&self) -> &str;
}

/// PostgreSQL target on one dedicated connection.
pub struct PgTarget {
    client: Client,
    schema: String,
}

impl PgTarget {
    /// Connect and point `search_path` at the configured namespace.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let client = connect_client(config).await?;
        client
            .batch_execute(&format!("SET search_path TO {}", quote_ident(&config.schema)))
            .await
            .map_err(|e| MigrateError::connection(e, config.display_name()))?;
        Ok(Self {
            client,
            schema: config.schema.clone(),
        })
    }
}

#[async_trait]
impl ScriptTarget for PgTarget {
    async fn list_tables(&mut self) -> Result<Vec<String>> {
        let rows = self
            .client
            .query(
                "SELECT table_name::text FROM information_schema.tables \
                 WHERE table_type = 'BASE TABLE' AND table_schema = $1::text \
                 ORDER BY table_name",
                &[&self.schema],
            )
            .await?;
        Ok(rows.iter().map(|r| r.get::<_, String>(0)).collect())
    }

    async fn list_sequences(&mut self) -> Result<Vec<String>> {
        let rows = self
            .client
            .query(
                "SELECT sequence_name::text FROM information_schema.sequences \
                 WHERE sequence_schema = $1::text ORDER BY sequence_name",
                &[&self.schema],
            )
            .await?;
        Ok(rows.iter().map(|r| r.get::<_, String>(0)).collect())
    }

    async fn execute(&mut self, sql: &str) -> Result<()> {
        debug!("Executing: {}", sql);
        self.client.batch_execute(sql).await?;
        Ok(())
    }

    async fn begin(&mut self) -> Result<()> {
        self.client.batch_execute("BEGIN").await?;
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        self.client.batch_execute("COMMIT").await?;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.client.batch_execute("ROLLBACK").await?;
        Ok(())
    }

    fn db_type(&self) -> &str {
        "postgres"
    }
}
