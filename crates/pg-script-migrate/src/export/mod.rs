//! Exporter: catalog reader -> serializer -> script store.

use crate::catalog::CatalogSource;
use crate::config::ExportConfig;
use crate::core::{CatalogSnapshot, CatalogWarning, RowSet, TableDescriptor};
use crate::error::{MigrateError, Result};
use crate::serialize::{data_order, render_scripts};
use crate::store::ScriptStore;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Summary of one export run.
#[derive(Debug, Clone, Serialize)]
pub struct ExportResult {
    /// Unique run identifier.
    pub run_id: String,

    /// Hash of the configuration the run was started with.
    pub config_hash: Option<String>,

    pub source: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_seconds: f64,

    /// Tables written to the schema script.
    pub tables: usize,
    pub sequences: usize,
    pub foreign_keys: usize,

    /// Rows written to the data script.
    pub rows: usize,

    /// Row cap per table, when sampling.
    pub sample_rows: Option<u64>,

    /// Written files in rank order.
    pub files: Vec<PathBuf>,

    /// Per-entity failures that were skipped.
    pub warnings: Vec<CatalogWarning>,
}

impl ExportResult {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Reads a namespace through a [`CatalogSource`] and stores the three scripts.
pub struct Exporter<S: CatalogSource> {
    source: S,
    config: ExportConfig,
    config_hash: Option<String>,
    cancel: CancellationToken,
}

impl<S: CatalogSource> Exporter<S> {
    pub fn new(source: S, config: ExportConfig) -> Self {
        Self {
            source,
            config,
            config_hash: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_config_hash(mut self, hash: impl Into<String>) -> Self {
        self.config_hash = Some(hash.into());
        self
    }

    /// Stop between tables when `cancel` fires. Nothing is written then.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(MigrateError::Cancelled);
        }
        Ok(())
    }

    /// Read table, key and sequence metadata.
    ///
    /// Listing tables is the only fatal query. Other per-entity failures
    /// become warnings; a table whose columns cannot be read is left out.
    /// Connection and pool failures abort.
    pub async fn read_snapshot(&self) -> Result<(CatalogSnapshot, Vec<CatalogWarning>)> {
        let mut warnings = Vec::new();
        let mut snapshot = CatalogSnapshot::default();

        let names = self.source.list_tables().await?;
        for name in names {
            self.check_cancelled()?;

            let columns = match self.source.load_columns(&name).await {
                Ok(columns) if columns.is_empty() => {
                    skip(&mut warnings, format!("table {}", name), "table has no columns");
                    continue;
                }
                Ok(columns) => columns,
                Err(e) => {
                    downgrade(&mut warnings, format!("table {} (columns)", name), e)?;
                    continue;
                }
            };

            let primary_key = match self.source.load_primary_key(&name).await {
                Ok(pk) => pk,
                Err(e) => {
                    downgrade(&mut warnings, format!("table {} (primary key)", name), e)?;
                    Vec::new()
                }
            };

            match self.source.load_foreign_keys(&name).await {
                Ok(fks) => snapshot.foreign_keys.extend(fks),
                Err(e) => downgrade(&mut warnings, format!("table {} (foreign keys)", name), e)?,
            }

            snapshot.tables.push(TableDescriptor {
                name,
                columns,
                primary_key,
            });
        }

        // Constraints pointing at excluded tables cannot be created.
        let kept: Vec<&str> = snapshot.tables.iter().map(|t| t.name.as_str()).collect();
        let before = snapshot.foreign_keys.len();
        snapshot
            .foreign_keys
            .retain(|fk| kept.contains(&fk.table.as_str()) && kept.contains(&fk.ref_table.as_str()));
        if snapshot.foreign_keys.len() < before {
            skip(
                &mut warnings,
                "foreign keys",
                format!(
                    "{} constraint(s) reference tables that were not exported",
                    before - snapshot.foreign_keys.len()
                ),
            );
        }

        match self.source.list_sequences().await {
            Ok(sequences) => snapshot.sequences = sequences,
            Err(e) => downgrade(&mut warnings, "sequences", e)?,
        }

        snapshot.tables.sort_by(|a, b| a.name.cmp(&b.name));
        snapshot.sequences.sort_by(|a, b| a.name.cmp(&b.name));

        info!(
            "Catalog: {} tables, {} foreign keys, {} sequences",
            snapshot.tables.len(),
            snapshot.foreign_keys.len(),
            snapshot.sequences.len()
        );
        Ok((snapshot, warnings))
    }

    /// Run the export and write all three scripts to `store`.
    pub async fn run(&self, store: &ScriptStore) -> Result<ExportResult> {
        let started_at = Utc::now();
        let start = Instant::now();
        let run_id = uuid::Uuid::new_v4().to_string();
        let limit = self.config.row_limit();
        info!(
            "Starting export {} from {} into {}",
            run_id,
            self.source.db_type(),
            store.dir().display()
        );

        let (snapshot, mut warnings) = self.read_snapshot().await?;

        let names: Vec<String> = snapshot.tables.iter().map(|t| t.name.clone()).collect();
        let order = data_order(&names, &snapshot.foreign_keys);
        if !order.cyclic.is_empty() {
            skip(
                &mut warnings,
                "foreign keys",
                format!(
                    "reference cycle among tables {}; their data may not load",
                    order.cyclic.join(", ")
                ),
            );
        }

        let mut row_sets = Vec::with_capacity(order.tables.len());
        for name in &order.tables {
            self.check_cancelled()?;
            let Some(table) = snapshot.tables.iter().find(|t| &t.name == name) else {
                continue;
            };
            match self.source.fetch_rows(table, limit).await {
                Ok(rows) => row_sets.push(rows),
                Err(e) => downgrade(&mut warnings, format!("table {} (rows)", name), e)?,
            }
        }
        let rows: usize = row_sets.iter().map(RowSet::len).sum();

        let scripts = render_scripts(&snapshot, &row_sets)?;
        let files = store.write_all(&scripts)?;

        let result = ExportResult {
            run_id,
            config_hash: self.config_hash.clone(),
            source: self.source.db_type().to_string(),
            started_at,
            completed_at: Utc::now(),
            duration_seconds: start.elapsed().as_secs_f64(),
            tables: snapshot.tables.len(),
            sequences: snapshot.sequences.len(),
            foreign_keys: snapshot.foreign_keys.len(),
            rows,
            sample_rows: limit,
            files,
            warnings,
        };
        info!(
            "Export complete: {} tables, {} rows, {} warnings in {:.2}s",
            result.tables,
            result.rows,
            result.warnings.len(),
            result.duration_seconds
        );
        Ok(result)
    }
}

/// Record a per-entity failure as a warning, or propagate anything broader.
fn downgrade(
    warnings: &mut Vec<CatalogWarning>,
    entity: impl Into<String>,
    err: MigrateError,
) -> Result<()> {
    if !err.is_per_entity() {
        return Err(err);
    }
    skip(warnings, entity, err);
    Ok(())
}

fn skip(warnings: &mut Vec<CatalogWarning>, entity: impl Into<String>, message: impl ToString) {
    let warning = CatalogWarning::new(entity, message.to_string());
    warn!("Skipping {}", warning);
    warnings.push(warning);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{
        ColumnDescriptor, ForeignKeyDescriptor, ScriptKind, SequenceDescriptor, SqlValue,
    };
    use crate::replay::{split_statements, ReplayEngine, ReplayOptions, ScriptTarget};
    use crate::serialize::parse_create_table;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;
    use tempfile::TempDir;

    /// Catalog fake with optional per-entity failures.
    #[derive(Default)]
    struct FakeCatalog {
        tables: Vec<TableDescriptor>,
        foreign_keys: Vec<ForeignKeyDescriptor>,
        sequences: Vec<SequenceDescriptor>,
        rows: HashMap<String, Vec<Vec<SqlValue>>>,
        broken: Vec<String>,
        disconnected: Vec<String>,
        fail_listing: bool,
    }

    impl FakeCatalog {
        fn check(&self, entity: &str) -> Result<()> {
            if self.broken.iter().any(|b| b == entity) {
                return Err(MigrateError::catalog(entity, "relation is broken"));
            }
            if self.disconnected.iter().any(|d| d == entity) {
                return Err(MigrateError::pool("connection closed", entity));
            }
            Ok(())
        }

        fn table(&self, name: &str) -> Option<&TableDescriptor> {
            self.tables.iter().find(|t| t.name == name)
        }
    }

    #[async_trait]
    impl CatalogSource for FakeCatalog {
        async fn list_tables(&self) -> Result<Vec<String>> {
            if self.fail_listing {
                return Err(MigrateError::catalog("schema public", "permission denied"));
            }
            Ok(self.tables.iter().map(|t| t.name.clone()).collect())
        }

        async fn load_columns(&self, table: &str) -> Result<Vec<ColumnDescriptor>> {
            self.check(&format!("{}.columns", table))?;
            Ok(self.table(table).map(|t| t.columns.clone()).unwrap_or_default())
        }

        async fn load_primary_key(&self, table: &str) -> Result<Vec<String>> {
            self.check(&format!("{}.pk", table))?;
            Ok(self.table(table).map(|t| t.primary_key.clone()).unwrap_or_default())
        }

        async fn load_foreign_keys(&self, table: &str) -> Result<Vec<ForeignKeyDescriptor>> {
            self.check(&format!("{}.fks", table))?;
            Ok(self
                .foreign_keys
                .iter()
                .filter(|fk| fk.table == table)
                .cloned()
                .collect())
        }

        async fn list_sequences(&self) -> Result<Vec<SequenceDescriptor>> {
            self.check("sequences")?;
            Ok(self.sequences.clone())
        }

        async fn fetch_rows(&self, table: &TableDescriptor, limit: Option<u64>) -> Result<RowSet> {
            self.check(&format!("{}.rows", table.name))?;
            let mut rows = self.rows.get(&table.name).cloned().unwrap_or_default();
            if let Some(n) = limit {
                rows.truncate(n as usize);
            }
            Ok(RowSet {
                table: table.name.clone(),
                columns: table.column_names(),
                rows,
            })
        }

        fn db_type(&self) -> &str {
            "fake"
        }
    }

    /// Target that accepts everything and records executed statements.
    #[derive(Default)]
    struct RecordingTarget {
        executed: Vec<String>,
    }

    #[async_trait]
    impl ScriptTarget for RecordingTarget {
        async fn list_tables(&mut self) -> Result<Vec<String>> {
            Ok(Vec::new())
        }

        async fn list_sequences(&mut self) -> Result<Vec<String>> {
            Ok(Vec::new())
        }

        async fn execute(&mut self, sql: &str) -> Result<()> {
            self.executed.push(sql.to_string());
            Ok(())
        }

        async fn begin(&mut self) -> Result<()> {
            Ok(())
        }

        async fn commit(&mut self) -> Result<()> {
            Ok(())
        }

        async fn rollback(&mut self) -> Result<()> {
            Ok(())
        }

        fn db_type(&self) -> &str {
            "recording"
        }
    }

    fn users_catalog() -> FakeCatalog {
        let mut users = TableDescriptor::new("users");
        users.columns = vec![
            ColumnDescriptor::new("id", "integer", false),
            ColumnDescriptor::new("email", "text", false),
            ColumnDescriptor::new("meta", "json", true),
        ];
        users.primary_key = vec!["id".into()];

        let mut rows = HashMap::new();
        rows.insert(
            "users".to_string(),
            vec![vec![
                SqlValue::Int(1),
                SqlValue::Text("a@b.com".into()),
                SqlValue::Json(json!({"x": 1})),
            ]],
        );

        FakeCatalog {
            tables: vec![users],
            rows,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_users_end_to_end() {
        let tmp = TempDir::new().unwrap();
        let store = ScriptStore::new(tmp.path());
        let exporter = Exporter::new(users_catalog(), ExportConfig::default()).with_config_hash("abc");
        let result = exporter.run(&store).await.unwrap();

        assert_eq!(result.tables, 1);
        assert_eq!(result.rows, 1);
        assert!(result.warnings.is_empty());
        assert_eq!(result.config_hash.as_deref(), Some("abc"));
        assert_eq!(result.files.len(), 3);

        let schema = store.read(ScriptKind::Schema).unwrap().unwrap();
        assert!(schema.contains(
            "CREATE TABLE users (\n    id integer NOT NULL,\n    email text NOT NULL,\n    meta json,\n    CONSTRAINT pk_users PRIMARY KEY (id)\n);"
        ));
        let statements = split_statements(&schema);
        assert_eq!(statements.len(), 1);
        let parsed = parse_create_table(&statements[0]).unwrap();
        assert_eq!(parsed, users_catalog().tables[0]);

        let data = store.read(ScriptKind::Data).unwrap().unwrap();
        let inserts = split_statements(&data);
        assert_eq!(
            inserts,
            vec!["INSERT INTO users (id, email, meta) VALUES\n(1, 'a@b.com', '{\"x\": 1}'::json)"]
        );

        let fks = store.read(ScriptKind::ForeignKeys).unwrap().unwrap();
        assert!(split_statements(&fks).is_empty());

        // Replaying into an empty target executes exactly the exported statements.
        let mut engine = ReplayEngine::new(RecordingTarget::default(), ReplayOptions::default());
        let report = engine.run(&store).await.unwrap();
        assert!(report.is_success());
        assert_eq!(report.warnings.len(), 1);
        let executed = engine.into_target().executed;
        assert_eq!(executed.len(), 2);
        assert!(executed[0].starts_with("CREATE TABLE users"));
        assert_eq!(executed[1], inserts[0]);
    }

    #[tokio::test]
    async fn test_column_failure_excludes_table() {
        let mut catalog = users_catalog();
        let mut audit = TableDescriptor::new("audit");
        audit.columns = vec![ColumnDescriptor::new("id", "bigint", false)];
        catalog.tables.push(audit);
        catalog.broken = vec!["audit.columns".into(), "sequences".into()];

        let exporter = Exporter::new(catalog, ExportConfig::default());
        let (snapshot, warnings) = exporter.read_snapshot().await.unwrap();

        assert_eq!(snapshot.tables.len(), 1);
        assert_eq!(snapshot.tables[0].name, "users");
        assert_eq!(warnings.len(), 2);
        assert_eq!(warnings[0].entity, "table audit (columns)");
        assert_eq!(warnings[1].entity, "sequences");
    }

    #[tokio::test]
    async fn test_row_failure_leaves_no_data_marker() {
        let mut catalog = users_catalog();
        catalog.broken = vec!["users.rows".into()];
        let tmp = TempDir::new().unwrap();
        let store = ScriptStore::new(tmp.path());

        let result = Exporter::new(catalog, ExportConfig::default())
            .run(&store)
            .await
            .unwrap();
        assert_eq!(result.rows, 0);
        assert_eq!(result.warnings.len(), 1);
        let data = store.read(ScriptKind::Data).unwrap().unwrap();
        assert!(data.contains("-- No data for table: users"));
    }

    #[tokio::test]
    async fn test_lost_connection_while_reading_columns_aborts() {
        let mut catalog = users_catalog();
        catalog.disconnected = vec!["users.columns".into()];

        let exporter = Exporter::new(catalog, ExportConfig::default());
        let err = exporter.read_snapshot().await.unwrap_err();
        assert!(matches!(err, MigrateError::Pool { .. }));
    }

    #[tokio::test]
    async fn test_lost_connection_while_fetching_rows_keeps_previous_scripts() {
        let tmp = TempDir::new().unwrap();
        let store = ScriptStore::new(tmp.path());
        store
            .write(&crate::core::ScriptArtifact::new(ScriptKind::Schema, "-- previous run\n"))
            .unwrap();

        let mut catalog = users_catalog();
        catalog.disconnected = vec!["users.rows".into()];
        let err = Exporter::new(catalog, ExportConfig::default())
            .run(&store)
            .await
            .unwrap_err();

        assert!(matches!(err, MigrateError::Pool { .. }));
        assert_eq!(
            store.read(ScriptKind::Schema).unwrap().as_deref(),
            Some("-- previous run\n")
        );
        assert!(!store.exists(ScriptKind::Data));
    }

    #[tokio::test]
    async fn test_table_listing_failure_is_fatal() {
        let catalog = FakeCatalog {
            fail_listing: true,
            ..Default::default()
        };
        let tmp = TempDir::new().unwrap();
        let store = ScriptStore::new(tmp.path());
        let err = Exporter::new(catalog, ExportConfig::default())
            .run(&store)
            .await
            .unwrap_err();
        assert!(matches!(err, MigrateError::CatalogQuery { .. }));
        assert!(!store.exists(ScriptKind::Schema));
    }

    #[tokio::test]
    async fn test_sample_limit_and_dependency_order() {
        let mut catalog = users_catalog();
        let mut orders = TableDescriptor::new("accounts");
        orders.columns = vec![
            ColumnDescriptor::new("id", "integer", false),
            ColumnDescriptor::new("user_id", "integer", true),
        ];
        catalog.tables.push(orders);
        catalog.foreign_keys.push(ForeignKeyDescriptor::simple(
            "fk_accounts_user",
            "accounts",
            "user_id",
            "users",
            "id",
        ));
        catalog.rows.insert(
            "accounts".into(),
            (0..20).map(|i| vec![SqlValue::Int(i), SqlValue::Int(1)]).collect(),
        );

        let config = ExportConfig {
            sample_data: true,
            ..Default::default()
        };
        let tmp = TempDir::new().unwrap();
        let store = ScriptStore::new(tmp.path());
        let result = Exporter::new(catalog, config).run(&store).await.unwrap();

        assert_eq!(result.sample_rows, Some(10));
        assert_eq!(result.rows, 11);
        assert_eq!(result.foreign_keys, 1);

        let data = store.read(ScriptKind::Data).unwrap().unwrap();
        assert!(data.contains("-- 10 rows"));
        let users = data.find("INSERT INTO users").unwrap();
        let accounts = data.find("INSERT INTO accounts").unwrap();
        assert!(users < accounts);
    }

    #[tokio::test]
    async fn test_cancelled_export_writes_nothing() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let tmp = TempDir::new().unwrap();
        let store = ScriptStore::new(tmp.path());
        let err = Exporter::new(users_catalog(), ExportConfig::default())
            .with_cancel(cancel)
            .run(&store)
            .await
            .unwrap_err();
        assert!(matches!(err, MigrateError::Cancelled));
        assert!(!store.exists(ScriptKind::Data));
    }
}
