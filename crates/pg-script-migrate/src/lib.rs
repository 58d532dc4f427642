//! # pg-script-migrate
//!
//! Export a PostgreSQL namespace to portable SQL scripts and replay them
//! against another database.
//!
//! - **Export**: tables, primary keys, foreign keys, sequences and rows are
//!   read from the catalog and rendered into `01_schema.sql`,
//!   `02_foreign_keys.sql` and `03_data.sql`
//! - **Replay**: the target namespace is optionally cleared, then each
//!   script runs in its own transaction, in that order
//! - **Direct**: `pg_dump` / `pg_restore` relay between two databases with
//!   streamed progress output
//!
//! ## Example
//!
//! ```rust,no_run
//! use pg_script_migrate::{
//!     Config, Exporter, PgCatalog, PgTarget, ReplayEngine, ReplayOptions, ScriptStore,
//! };
//!
//! # async fn run() -> pg_script_migrate::Result<()> {
//! let config = Config::load("config.yaml")?;
//! let store = ScriptStore::new(&config.export.output_dir);
//!
//! let source = PgCatalog::connect(config.require_source()?).await?;
//! let export = Exporter::new(source, config.export.clone()).run(&store).await?;
//! println!("Exported {} tables", export.tables);
//!
//! let target = PgTarget::connect(config.require_target()?).await?;
//! let mut engine = ReplayEngine::new(target, ReplayOptions::default());
//! let report = engine.run(&store).await?.into_result()?;
//! println!("Replayed {} statements", report.statements_executed());
//! # Ok(())
//! # }
//! ```

pub mod catalog;
pub mod config;
pub mod core;
pub mod dump;
pub mod error;
pub mod export;
pub mod pg;
pub mod replay;
pub mod serialize;
pub mod store;

// Re-exports for convenient access
pub use catalog::{CatalogSource, PgCatalog};
pub use config::{Config, DatabaseConfig, DumpConfig, ExportConfig, ReplayConfig};
pub use crate::core::{
    CatalogSnapshot, CatalogWarning, ColumnDescriptor, ForeignKeyDescriptor, RowSet,
    ScriptArtifact, ScriptKind, SequenceDescriptor, SqlValue, TableDescriptor,
};
pub use dump::{DumpOutcome, DumpPipeline};
pub use error::{MigrateError, Result};
pub use export::{ExportResult, Exporter};
pub use replay::{
    PgTarget, ReplayEngine, ReplayOptions, ReplayPhase, ReplayReport, ReplayStatus, ScriptTarget,
};
pub use store::ScriptStore;
