//! Script artifacts: the three ordered SQL units produced by an export.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of a script artifact. Declaration order is replay order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptKind {
    /// Sequences and CREATE TABLE statements.
    Schema,
    /// ALTER TABLE ... ADD CONSTRAINT ... FOREIGN KEY statements.
    ForeignKeys,
    /// INSERT statements.
    Data,
}

impl ScriptKind {
    /// All kinds in ascending rank order.
    pub const ALL: [ScriptKind; 3] = [ScriptKind::Schema, ScriptKind::ForeignKeys, ScriptKind::Data];

    /// Fixed execution rank (schema=1, foreign_keys=2, data=3).
    pub fn rank(self) -> u8 {
        match self {
            ScriptKind::Schema => 1,
            ScriptKind::ForeignKeys => 2,
            ScriptKind::Data => 3,
        }
    }

    /// Well-known file name inside the script directory.
    pub fn file_name(self) -> &'static str {
        match self {
            ScriptKind::Schema => "01_schema.sql",
            ScriptKind::ForeignKeys => "02_foreign_keys.sql",
            ScriptKind::Data => "03_data.sql",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ScriptKind::Schema => "schema",
            ScriptKind::ForeignKeys => "foreign_keys",
            ScriptKind::Data => "data",
        }
    }
}

impl fmt::Display for ScriptKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One generated SQL text blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptArtifact {
    pub kind: ScriptKind,
    pub content: String,
}

impl ScriptArtifact {
    pub fn new(kind: ScriptKind, content: impl Into<String>) -> Self {
        Self {
            kind,
            content: content.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ranks_follow_declaration_order() {
        let ranks: Vec<u8> = ScriptKind::ALL.iter().map(|k| k.rank()).collect();
        assert_eq!(ranks, vec![1, 2, 3]);
        let mut sorted = ScriptKind::ALL;
        sorted.sort();
        assert_eq!(sorted, ScriptKind::ALL);
    }

    #[test]
    fn test_file_names() {
        assert_eq!(ScriptKind::Schema.file_name(), "01_schema.sql");
        assert_eq!(ScriptKind::ForeignKeys.file_name(), "02_foreign_keys.sql");
        assert_eq!(ScriptKind::Data.file_name(), "03_data.sql");
    }
}
