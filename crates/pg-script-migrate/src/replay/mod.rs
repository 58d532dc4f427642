//! Replay engine: rebuilds a database from the stored scripts.
//!
//! The engine optionally drops everything in the target namespace, then runs
//! the schema, foreign key and data scripts in that order. Each script runs
//! inside its own transaction; the first failing statement rolls back its
//! script and stops the replay. Scripts already committed stay applied.

mod split;
mod target;

pub use split::{preview, split_statements};
pub use target::{PgTarget, ScriptTarget};

use crate::core::identifier::ident;
use crate::core::ScriptKind;
use crate::error::{MigrateError, Result};
use crate::store::ScriptStore;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Characters of a failing statement kept in reports.
pub const PREVIEW_CHARS: usize = 200;

/// Replay options.
#[derive(Debug, Clone)]
pub struct ReplayOptions {
    /// Drop all tables and sequences of the target namespace first.
    pub drop_existing: bool,
}

impl Default for ReplayOptions {
    fn default() -> Self {
        Self {
            drop_existing: true,
        }
    }
}

/// Where a replay is, or where it stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplayPhase {
    Connected,
    Cleaning,
    ExecutingSchema,
    ExecutingForeignKeys,
    ExecutingData,
    Done,
    Failed,
}

impl ReplayPhase {
    fn executing(kind: ScriptKind) -> Self {
        match kind {
            ScriptKind::Schema => ReplayPhase::ExecutingSchema,
            ScriptKind::ForeignKeys => ReplayPhase::ExecutingForeignKeys,
            ScriptKind::Data => ReplayPhase::ExecutingData,
        }
    }
}

/// Final status of a replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplayStatus {
    Completed,
    Failed,
    Cancelled,
}

/// Outcome of the cleanup step. Failures never abort the replay.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CleanupReport {
    pub tables_dropped: usize,
    pub sequences_dropped: usize,
    pub warnings: Vec<String>,
}

/// A script that ran and committed.
#[derive(Debug, Clone, Serialize)]
pub struct ScriptReport {
    pub kind: ScriptKind,
    pub statements: usize,
    pub duration_ms: u64,
}

/// The statement that stopped the replay.
#[derive(Debug, Clone, Serialize)]
pub struct StatementFailure {
    pub kind: ScriptKind,
    /// 1-based position within its script.
    pub ordinal: usize,
    /// First characters of the statement.
    pub preview: String,
    pub message: String,
}

/// Result of one replay run.
#[derive(Debug, Clone, Serialize)]
pub struct ReplayReport {
    pub status: ReplayStatus,

    /// Phase reached: `done` on success, `failed` otherwise.
    pub phase: ReplayPhase,

    /// Present when `drop_existing` was set.
    pub cleanup: Option<CleanupReport>,

    /// Committed scripts in execution order.
    pub scripts: Vec<ScriptReport>,

    /// Scripts that were missing or empty.
    pub warnings: Vec<String>,

    pub failure: Option<StatementFailure>,

    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_seconds: f64,
}

impl ReplayReport {
    pub fn is_success(&self) -> bool {
        self.status == ReplayStatus::Completed
    }

    /// Total statements committed.
    pub fn statements_executed(&self) -> usize {
        self.scripts.iter().map(|s| s.statements).sum()
    }

    /// Turn a failed or cancelled report into an error.
    pub fn into_result(self) -> Result<ReplayReport> {
        match (self.status, &self.failure) {
            (ReplayStatus::Completed, _) => Ok(self),
            (ReplayStatus::Cancelled, _) => Err(MigrateError::Cancelled),
            (ReplayStatus::Failed, Some(f)) => Err(MigrateError::Statement {
                script: f.kind.file_name().to_string(),
                ordinal: f.ordinal,
                preview: f.preview.clone(),
                message: f.message.clone(),
            }),
            (ReplayStatus::Failed, None) => {
                Err(MigrateError::Config("replay failed without a statement".into()))
            }
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

enum ScriptOutcome {
    Committed(ScriptReport),
    Skipped(String),
    Failed(StatementFailure),
    Cancelled,
}

/// Drives one replay against an exclusively owned target.
pub struct ReplayEngine<T: ScriptTarget> {
    target: T,
    options: ReplayOptions,
    cancel: CancellationToken,
    phase: ReplayPhase,
}

impl<T: ScriptTarget> ReplayEngine<T> {
    pub fn new(target: T, options: ReplayOptions) -> Self {
        Self {
            target,
            options,
            cancel: CancellationToken::new(),
            phase: ReplayPhase::Connected,
        }
    }

    /// Stop at the next statement boundary when `cancel` fires.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn phase(&self) -> ReplayPhase {
        self.phase
    }

    pub fn into_target(self) -> T {
        self.target
    }

    fn enter(&mut self, phase: ReplayPhase) {
        info!("Replay phase: {:?} -> {:?}", self.phase, phase);
        self.phase = phase;
    }

    /// Run cleanup (if enabled) and all scripts in rank order.
    ///
    /// A failing statement is reported in the returned report; `Err` is
    /// reserved for problems outside statement execution (unreadable script
    /// files, a broken transaction handshake).
    pub async fn run(&mut self, store: &ScriptStore) -> Result<ReplayReport> {
        let started_at = Utc::now();
        let start = Instant::now();
        self.phase = ReplayPhase::Connected;
        info!(
            "Replaying scripts from {} into {}",
            store.dir().display(),
            self.target.db_type()
        );

        let cleanup = if self.options.drop_existing {
            self.enter(ReplayPhase::Cleaning);
            Some(self.cleanup().await)
        } else {
            None
        };

        let mut scripts = Vec::new();
        let mut warnings = Vec::new();
        let mut failure = None;
        let mut status = ReplayStatus::Completed;

        for kind in store.list() {
            self.enter(ReplayPhase::executing(kind));
            let outcome = match store.read(kind) {
                Ok(content) => self.run_script(kind, content.as_deref()).await,
                Err(e) => Err(e),
            };
            let outcome = match outcome {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!("Replay of {} aborted: {}", kind.file_name(), e);
                    self.enter(ReplayPhase::Failed);
                    return Err(e);
                }
            };
            match outcome {
                ScriptOutcome::Committed(report) => scripts.push(report),
                ScriptOutcome::Skipped(reason) => {
                    warn!("{}", reason);
                    warnings.push(reason);
                }
                ScriptOutcome::Failed(f) => {
                    error!(
                        "Statement #{} of {} failed: {}",
                        f.ordinal,
                        kind.file_name(),
                        f.message
                    );
                    failure = Some(f);
                    status = ReplayStatus::Failed;
                    break;
                }
                ScriptOutcome::Cancelled => {
                    warn!("Replay cancelled during {}", kind.file_name());
                    status = ReplayStatus::Cancelled;
                    break;
                }
            }
        }

        match status {
            ReplayStatus::Completed => self.enter(ReplayPhase::Done),
            _ => self.enter(ReplayPhase::Failed),
        }

        let report = ReplayReport {
            status,
            phase: self.phase,
            cleanup,
            scripts,
            warnings,
            failure,
            started_at,
            completed_at: Utc::now(),
            duration_seconds: start.elapsed().as_secs_f64(),
        };
        info!(
            "Replay finished: {:?}, {} statements in {:.2}s",
            report.status,
            report.statements_executed(),
            report.duration_seconds
        );
        Ok(report)
    }

    /// Drop every table, then every remaining sequence, in autocommit.
    async fn cleanup(&mut self) -> CleanupReport {
        let mut report = CleanupReport::default();

        match self.target.list_tables().await {
            Ok(tables) => {
                for table in tables {
                    let sql = format!("DROP TABLE IF EXISTS {} CASCADE", ident(&table));
                    match self.target.execute(&sql).await {
                        Ok(()) => {
                            debug!("Dropped table {}", table);
                            report.tables_dropped += 1;
                        }
                        Err(e) => {
                            let msg = format!("could not drop table {}: {}", table, e);
                            warn!("{}", msg);
                            report.warnings.push(msg);
                        }
                    }
                }
            }
            Err(e) => {
                let msg = format!("could not list tables: {}", e);
                warn!("{}", msg);
                report.warnings.push(msg);
            }
        }

        match self.target.list_sequences().await {
            Ok(sequences) => {
                for seq in sequences {
                    let sql = format!("DROP SEQUENCE IF EXISTS {} CASCADE", ident(&seq));
                    match self.target.execute(&sql).await {
                        Ok(()) => {
                            debug!("Dropped sequence {}", seq);
                            report.sequences_dropped += 1;
                        }
                        Err(e) => {
                            let msg = format!("could not drop sequence {}: {}", seq, e);
                            warn!("{}", msg);
                            report.warnings.push(msg);
                        }
                    }
                }
            }
            Err(e) => {
                let msg = format!("could not list sequences: {}", e);
                warn!("{}", msg);
                report.warnings.push(msg);
            }
        }

        info!(
            "Cleanup dropped {} tables and {} sequences",
            report.tables_dropped, report.sequences_dropped
        );
        report
    }

    async fn run_script(&mut self, kind: ScriptKind, content: Option<&str>) -> Result<ScriptOutcome> {
        let Some(content) = content else {
            return Ok(ScriptOutcome::Skipped(format!(
                "{} not found, skipping",
                kind.file_name()
            )));
        };
        let statements = split_statements(content);
        if statements.is_empty() {
            return Ok(ScriptOutcome::Skipped(format!(
                "{} contains no statements, skipping",
                kind.file_name()
            )));
        }

        let start = Instant::now();
        info!("Executing {} ({} statements)", kind.file_name(), statements.len());
        self.target.begin().await?;

        for (idx, stmt) in statements.iter().enumerate() {
            if self.cancel.is_cancelled() {
                self.target.rollback().await?;
                return Ok(ScriptOutcome::Cancelled);
            }
            if let Err(e) = self.target.execute(stmt).await {
                if let Err(rb) = self.target.rollback().await {
                    warn!("Rollback of {} failed: {}", kind.file_name(), rb);
                }
                return Ok(ScriptOutcome::Failed(StatementFailure {
                    kind,
                    ordinal: idx + 1,
                    preview: preview(stmt, PREVIEW_CHARS),
                    message: e.to_string(),
                }));
            }
        }

        self.target.commit().await?;
        let duration_ms = start.elapsed().as_millis() as u64;
        info!(
            "Committed {} ({} statements, {}ms)",
            kind.file_name(),
            statements.len(),
            duration_ms
        );
        Ok(ScriptOutcome::Committed(ScriptReport {
            kind,
            statements: statements.len(),
            duration_ms,
        }))
    }
}
