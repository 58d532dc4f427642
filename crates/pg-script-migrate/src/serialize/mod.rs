//! SQL serializer: pure rendering of catalog snapshots and rows into the
//! three script artifacts.
//!
//! - [`ddl`]: CREATE SEQUENCE, CREATE TABLE, ALTER TABLE ... FOREIGN KEY
//! - [`dml`]: INSERT statements and value literals
//! - [`order`]: foreign-key dependency order for data inserts

pub mod ddl;
pub mod dml;
pub mod order;

pub use ddl::{
    parse_create_table, render_create_table, render_foreign_key, render_foreign_keys,
    render_sequence,
};
pub use dml::{format_value, render_insert};
pub use order::{data_order, DataOrder};

use crate::core::{CatalogSnapshot, RowSet, ScriptArtifact, ScriptKind};
use crate::error::Result;
use std::collections::HashMap;

const GENERATED_BY: &str = "-- Generated by pg-script-migrate\n\n";

/// Render the schema script: sequences first, then one CREATE TABLE per table.
pub fn render_schema_script(snapshot: &CatalogSnapshot) -> Result<ScriptArtifact> {
    let mut content = String::from("-- Database Schema Export\n");
    content.push_str(GENERATED_BY);

    if !snapshot.sequences.is_empty() {
        content.push_str("-- Sequences\n");
        for seq in &snapshot.sequences {
            content.push_str(&render_sequence(seq));
            content.push_str("\n\n");
        }
    }

    for table in &snapshot.tables {
        content.push_str(&format!("-- Table: {}\n", table.name));
        content.push_str(&render_create_table(table)?);
        content.push_str("\n\n");
    }

    Ok(ScriptArtifact::new(ScriptKind::Schema, content))
}

/// Render the foreign key script, grouped by owning table.
pub fn render_foreign_key_script(snapshot: &CatalogSnapshot) -> ScriptArtifact {
    let mut content = String::from("-- Foreign Key Constraints\n");
    content.push_str(GENERATED_BY);

    for table in &snapshot.tables {
        let fks = snapshot.foreign_keys_of(&table.name);
        if fks.is_empty() {
            continue;
        }
        content.push_str(&format!("-- Foreign keys for table: {}\n", table.name));
        content.push_str(&render_foreign_keys(fks));
        content.push_str("\n\n");
    }

    ScriptArtifact::new(ScriptKind::ForeignKeys, content)
}

/// Render all three artifacts in rank order from a snapshot and its rows.
///
/// Row sets are emitted in foreign-key dependency order. Tables of the
/// snapshot without a row set get a `No data` marker.
pub fn render_scripts(snapshot: &CatalogSnapshot, rows: &[RowSet]) -> Result<[ScriptArtifact; 3]> {
    let schema = render_schema_script(snapshot)?;
    let foreign_keys = render_foreign_key_script(snapshot);

    let by_table: HashMap<&str, &RowSet> = rows.iter().map(|r| (r.table.as_str(), r)).collect();
    let names: Vec<String> = snapshot.tables.iter().map(|t| t.name.clone()).collect();
    let order = data_order(&names, &snapshot.foreign_keys);

    let mut data = DataScriptBuilder::new();
    for table in &order.tables {
        match by_table.get(table.as_str()) {
            Some(set) => data.push(set),
            None => data.push(&RowSet::empty(table.as_str())),
        }
    }

    Ok([schema, foreign_keys, data.finish()])
}

/// Builds the data script one table at a time.
#[derive(Debug)]
pub struct DataScriptBuilder {
    content: String,
}

impl Default for DataScriptBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DataScriptBuilder {
    pub fn new() -> Self {
        let mut content = String::from("-- Data Export\n");
        content.push_str(GENERATED_BY);
        Self { content }
    }

    /// Append the section for one table. Empty tables get a comment marker only.
    pub fn push(&mut self, rows: &RowSet) {
        match render_insert(rows) {
            Some(insert) => {
                self.content
                    .push_str(&format!("-- Data for table: {}\n", rows.table));
                self.content.push_str(&format!("-- {} rows\n", rows.len()));
                self.content.push_str(&insert);
                self.content.push_str("\n\n");
            }
            None => {
                self.content
                    .push_str(&format!("-- No data for table: {}\n\n", rows.table));
            }
        }
    }

    pub fn finish(self) -> ScriptArtifact {
        ScriptArtifact::new(ScriptKind::Data, self.content)
    }
}
