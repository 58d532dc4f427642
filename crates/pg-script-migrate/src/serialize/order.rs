//! Foreign-key dependency ordering for data inserts.
//!
//! Foreign keys are created before the data script runs, so rows of a
//! referenced table must be inserted before the rows that point at them.

use crate::core::ForeignKeyDescriptor;
use std::collections::{BTreeMap, BTreeSet};

/// Insert order for a set of tables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataOrder {
    /// Every table exactly once, referenced tables first.
    pub tables: Vec<String>,

    /// Tables caught in a reference cycle, appended alphabetically at the end.
    pub cyclic: Vec<String>,
}

/// Topologically sort `tables` by their foreign keys (Kahn's algorithm).
///
/// Ties are broken alphabetically so the output is deterministic.
/// Self-references and references to tables outside the set are ignored.
pub fn data_order(tables: &[String], foreign_keys: &[ForeignKeyDescriptor]) -> DataOrder {
    let known: BTreeSet<&str> = tables.iter().map(String::as_str).collect();

    // table -> tables it depends on
    let mut depends_on: BTreeMap<&str, BTreeSet<&str>> =
        known.iter().map(|t| (*t, BTreeSet::new())).collect();
    // table -> tables that depend on it
    let mut dependents: BTreeMap<&str, BTreeSet<&str>> =
        known.iter().map(|t| (*t, BTreeSet::new())).collect();

    for fk in foreign_keys {
        if fk.is_self_reference()
            || !known.contains(fk.table.as_str())
            || !known.contains(fk.ref_table.as_str())
        {
            continue;
        }
        if let Some(deps) = depends_on.get_mut(fk.table.as_str()) {
            deps.insert(fk.ref_table.as_str());
        }
        if let Some(children) = dependents.get_mut(fk.ref_table.as_str()) {
            children.insert(fk.table.as_str());
        }
    }

    let mut ready: BTreeSet<&str> = depends_on
        .iter()
        .filter(|(_, deps)| deps.is_empty())
        .map(|(t, _)| *t)
        .collect();
    let mut ordered = Vec::with_capacity(known.len());

    while let Some(table) = ready.pop_first() {
        ordered.push(table.to_string());
        if let Some(children) = dependents.get(table) {
            for child in children {
                if let Some(deps) = depends_on.get_mut(child) {
                    deps.remove(table);
                    if deps.is_empty() {
                        ready.insert(child);
                    }
                }
            }
        }
        depends_on.remove(table);
    }

    let cyclic: Vec<String> = depends_on.keys().map(|t| t.to_string()).collect();
    ordered.extend(cyclic.iter().cloned());

    DataOrder {
        tables: ordered,
        cyclic,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parents_before_children() {
        let fks = vec![
            ForeignKeyDescriptor::simple("fk1", "a_items", "order_id", "orders", "id"),
            ForeignKeyDescriptor::simple("fk2", "orders", "user_id", "users", "id"),
        ];
        let order = data_order(&names(&["a_items", "orders", "users", "zebra"]), &fks);
        assert_eq!(order.tables, names(&["users", "orders", "a_items", "zebra"]));
        assert!(order.cyclic.is_empty());
    }

    #[test]
    fn test_without_foreign_keys_order_is_alphabetical() {
        let order = data_order(&names(&["c", "a", "b"]), &[]);
        assert_eq!(order.tables, names(&["a", "b", "c"]));
    }

    #[test]
    fn test_self_reference_is_ignored() {
        let fks = vec![ForeignKeyDescriptor::simple(
            "fk_parent", "nodes", "parent_id", "nodes", "id",
        )];
        let order = data_order(&names(&["nodes"]), &fks);
        assert_eq!(order.tables, names(&["nodes"]));
        assert!(order.cyclic.is_empty());
    }

    #[test]
    fn test_cycle_is_appended() {
        let fks = vec![
            ForeignKeyDescriptor::simple("fk1", "a", "b_id", "b", "id"),
            ForeignKeyDescriptor::simple("fk2", "b", "a_id", "a", "id"),
        ];
        let order = data_order(&names(&["a", "b", "c"]), &fks);
        assert_eq!(order.tables, names(&["c", "a", "b"]));
        assert_eq!(order.cyclic, names(&["a", "b"]));
    }
}
