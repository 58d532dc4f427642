//! Script store: the three well-known SQL files in one directory.

use crate::core::{ScriptArtifact, ScriptKind, TableDescriptor};
use crate::error::Result;
use crate::replay::split_statements;
use crate::serialize::parse_create_table;
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Directory-backed storage for script artifacts.
#[derive(Debug, Clone)]
pub struct ScriptStore {
    dir: PathBuf,
}

impl ScriptStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file holding `kind`.
    pub fn path(&self, kind: ScriptKind) -> PathBuf {
        self.dir.join(kind.file_name())
    }

    pub fn exists(&self, kind: ScriptKind) -> bool {
        self.path(kind).is_file()
    }

    /// Kinds in replay order.
    pub fn list(&self) -> [ScriptKind; 3] {
        ScriptKind::ALL
    }

    /// Replace the stored artifact. Creates the directory if needed.
    pub fn write(&self, artifact: &ScriptArtifact) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.path(artifact.kind);

        // Atomic write: write to temp file, then rename
        let temp_path = path.with_extension("sql.tmp");
        std::fs::write(&temp_path, &artifact.content)?;
        std::fs::rename(&temp_path, &path)?;

        debug!(
            "Wrote {} ({} bytes)",
            path.display(),
            artifact.content.len()
        );
        Ok(path)
    }

    /// Write all artifacts, returning their paths in the same order.
    pub fn write_all(&self, artifacts: &[ScriptArtifact]) -> Result<Vec<PathBuf>> {
        artifacts.iter().map(|a| self.write(a)).collect()
    }

    /// Load an artifact; `None` when the file does not exist.
    pub fn read(&self, kind: ScriptKind) -> Result<Option<String>> {
        match std::fs::read_to_string(self.path(kind)) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// What one stored script contains.
#[derive(Debug, Clone, Serialize)]
pub struct ScriptSummary {
    pub kind: ScriptKind,
    pub path: PathBuf,
    pub present: bool,
    pub statements: usize,

    /// Tables parsed from CREATE TABLE statements (schema script only).
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tables: Vec<TableDescriptor>,
}

impl ScriptStore {
    /// Summarize every script in rank order without touching a database.
    pub fn inspect(&self) -> Result<Vec<ScriptSummary>> {
        let mut summaries = Vec::with_capacity(3);
        for kind in self.list() {
            let content = self.read(kind)?;
            let statements = content.as_deref().map(split_statements).unwrap_or_default();

            let mut tables = Vec::new();
            if kind == ScriptKind::Schema {
                for stmt in statements.iter().filter(|s| s.starts_with("CREATE TABLE")) {
                    match parse_create_table(stmt) {
                        Ok(table) => tables.push(table),
                        Err(e) => debug!("Could not parse statement: {}", e),
                    }
                }
            }

            summaries.push(ScriptSummary {
                kind,
                path: self.path(kind),
                present: content.is_some(),
                statements: statements.len(),
                tables,
            });
        }
        Ok(summaries)
    }
}
