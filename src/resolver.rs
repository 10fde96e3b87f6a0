// src/resolver.rs

//! Dependency resolution
//!
//! Builds the directed graph of included tables from their foreign-key
//! edges (self-references excluded), detects cycles with an iterative
//! depth-first search that reports complete cycle paths, and writes the
//! topological order back to the config store. Cycles are never broken
//! automatically: the full dependency map is dumped to a human-editable
//! JSON file and processing halts until the operator reshapes the edges.

use crate::db::models::{ForeignKeyEntry, TableEntry};
use crate::error::{Error, Result};
use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;
use tracing::info;

/// Dependency map: table to the set of included tables it references.
pub type DepsMap = BTreeMap<String, BTreeSet<String>>;

/// Build the dependency map for the included table set. Edges to tables
/// outside the set and self-references are dropped.
pub fn build_deps(store: &rusqlite::Connection) -> Result<DepsMap> {
    let included: BTreeSet<String> = TableEntry::list_included(store)?
        .into_iter()
        .map(|table| table.source_name)
        .collect();

    let mut deps = DepsMap::new();
    for table in &included {
        let mut table_deps = BTreeSet::new();
        for fk in ForeignKeyEntry::for_table(store, table)? {
            if fk.source_ref_table != *table && included.contains(&fk.source_ref_table) {
                table_deps.insert(fk.source_ref_table);
            }
        }
        deps.insert(table.clone(), table_deps);
    }
    Ok(deps)
}

/// Find every cycle in the dependency map. Each reported path is of the
/// form `a -> b -> a`. Self-references never count as cycles.
pub fn detect_cycles(deps: &DepsMap) -> Vec<String> {
    let mut visited: HashSet<&str> = HashSet::new();
    let mut cycles = Vec::new();
    let empty = BTreeSet::new();

    for start in deps.keys() {
        if visited.contains(start.as_str()) {
            continue;
        }

        // Iterative DFS: each frame holds a node and its remaining
        // neighbors; `path` mirrors the frame stack.
        let mut stack: Vec<(&str, std::collections::btree_set::Iter<'_, String>)> = Vec::new();
        let mut path: Vec<&str> = Vec::new();
        let mut on_path: HashSet<&str> = HashSet::new();

        visited.insert(start);
        stack.push((start.as_str(), deps.get(start).unwrap_or(&empty).iter()));
        path.push(start);
        on_path.insert(start);

        loop {
            let next = match stack.last_mut() {
                Some((_, neighbors)) => neighbors.next().map(String::as_str),
                None => break,
            };
            match next {
                Some(next) => {
                    if on_path.contains(next) {
                        let from = path.iter().position(|n| *n == next).unwrap_or(0);
                        let mut cycle: Vec<&str> = path[from..].to_vec();
                        cycle.push(next);
                        cycles.push(cycle.join(" -> "));
                    } else if !visited.contains(next) {
                        visited.insert(next);
                        stack.push((next, deps.get(next).map(|d| d.iter()).unwrap_or(empty.iter())));
                        path.push(next);
                        on_path.insert(next);
                    }
                }
                None => {
                    if let Some((done, _)) = stack.pop() {
                        path.pop();
                        on_path.remove(done);
                    }
                }
            }
        }
    }

    cycles
}

/// Resolve the dependency order of the included tables.
///
/// On success every included table gets a 1-indexed `deps_order` with
/// referenced tables strictly lower, its comma-joined dependency list,
/// and the foreign keys internal to the included set are enabled. On a
/// cycle the dependency map is written to `deps_path` and the run halts.
pub fn resolve(store: &rusqlite::Connection, deps_path: &Path) -> Result<()> {
    info!("Get dependencies per table...");

    let deps = build_deps(store)?;

    let cycles = detect_cycles(&deps);
    if !cycles.is_empty() {
        let dump: BTreeMap<&String, Vec<&String>> = deps
            .iter()
            .map(|(table, refs)| (table, refs.iter().collect()))
            .collect();
        std::fs::write(deps_path, serde_json::to_string_pretty(&dump)?)?;
        return Err(Error::CycleDetected {
            cycles,
            deps_path: deps_path.to_path_buf(),
        });
    }

    // Edges point from a referenced table to its dependents, so the
    // topological order lists dependencies first.
    let names: Vec<&String> = deps.keys().collect();
    let mut graph: DiGraphMap<usize, ()> = DiGraphMap::new();
    for idx in 0..names.len() {
        graph.add_node(idx);
    }
    for (idx, table) in names.iter().enumerate() {
        for referenced in &deps[*table] {
            if let Ok(ref_idx) = names.binary_search(&referenced) {
                graph.add_edge(ref_idx, idx, ());
            }
        }
    }

    let sorted = toposort(&graph, None)
        .map_err(|_| Error::Reflection("Dependency graph changed during sort".to_string()))?;

    for (order, node) in sorted.iter().enumerate() {
        let table = names[*node];
        let table_deps = if deps[table].is_empty() {
            table.clone()
        } else {
            deps[table].iter().cloned().collect::<Vec<_>>().join(",")
        };
        TableEntry::set_deps(store, table, &table_deps, (order + 1) as i64)?;
    }

    // Only edges internal to the included set take part in emitted
    // schemas and target DDL
    ForeignKeyEntry::disable_all(store)?;
    let included: HashSet<String> = deps.keys().cloned().collect();
    for fk in ForeignKeyEntry::list_all(store)? {
        if included.contains(&fk.source_table) && included.contains(&fk.source_ref_table) {
            ForeignKeyEntry::set_enabled(store, &fk.source_name, true)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::db::models::{ColumnEntry, ForeignKeyEntry, TableEntry};
    use rusqlite::Connection;

    fn seed(store: &Connection, tables: &[&str], fks: &[(&str, &str)]) {
        for name in tables {
            let mut table = TableEntry::new(name.to_string(), name.to_lowercase());
            table.source_row_count = 1;
            table.include = true;
            table.upsert(store).unwrap();

            let column = ColumnEntry {
                tbl_col_pos: ColumnEntry::key(name, 1),
                source_table: name.to_string(),
                source_column: "ID".to_string(),
                norm_column: Some("id".to_string()),
                target_column: None,
                jdbc_data_type: Some(4),
                source_data_type: Some("INTEGER".to_string()),
                source_column_size: 0,
                fixed_size: false,
                source_column_nullable: false,
                source_column_position: 1,
                source_column_autoincrement: None,
                source_column_default: None,
            };
            column.insert_source(store).unwrap();
        }
        for (idx, (from, to)) in fks.iter().enumerate() {
            let fk = ForeignKeyEntry {
                source_name: ForeignKeyEntry::constraint_name(from, idx + 1),
                source_table: from.to_string(),
                source_column: "ID".to_string(),
                source_ref_table: to.to_string(),
                source_ref_column: "ID".to_string(),
                tbl_col_pos: None,
                ref_tbl_col_pos: None,
                is_enabled: false,
            };
            fk.insert_source(store).unwrap();
        }
    }

    #[test]
    fn test_resolve_linear_chain() {
        let store = db::open_in_memory().unwrap();
        seed(&store, &["A", "B", "C"], &[("B", "A"), ("C", "B")]);
        let tmp = tempfile::tempdir().unwrap();

        resolve(&store, &tmp.path().join("deps.json")).unwrap();

        let a = TableEntry::find(&store, "A").unwrap().unwrap();
        let b = TableEntry::find(&store, "B").unwrap().unwrap();
        let c = TableEntry::find(&store, "C").unwrap().unwrap();
        assert!(a.deps_order.unwrap() < b.deps_order.unwrap());
        assert!(b.deps_order.unwrap() < c.deps_order.unwrap());
        // A has no dependencies and records itself
        assert_eq!(a.deps.as_deref(), Some("A"));
        assert_eq!(b.deps.as_deref(), Some("A"));

        // Both edges are internal to the included set
        assert_eq!(ForeignKeyEntry::enabled_for_table(&store, "B").unwrap().len(), 1);
        assert_eq!(ForeignKeyEntry::enabled_for_table(&store, "C").unwrap().len(), 1);
    }

    #[test]
    fn test_resolve_orders_every_enabled_edge() {
        let store = db::open_in_memory().unwrap();
        seed(
            &store,
            &["P", "Q", "R", "S"],
            &[("Q", "P"), ("R", "P"), ("S", "Q"), ("S", "R")],
        );
        let tmp = tempfile::tempdir().unwrap();
        resolve(&store, &tmp.path().join("deps.json")).unwrap();

        for fk in ForeignKeyEntry::list_all(&store).unwrap() {
            assert!(fk.is_enabled);
            let table = TableEntry::find(&store, &fk.source_table).unwrap().unwrap();
            let referenced = TableEntry::find(&store, &fk.source_ref_table).unwrap().unwrap();
            assert!(
                referenced.deps_order.unwrap() < table.deps_order.unwrap(),
                "{} must be created before {}",
                fk.source_ref_table,
                fk.source_table
            );
        }
    }

    #[test]
    fn test_self_reference_is_not_a_cycle() {
        let store = db::open_in_memory().unwrap();
        seed(&store, &["EMP"], &[("EMP", "EMP")]);
        let tmp = tempfile::tempdir().unwrap();

        resolve(&store, &tmp.path().join("deps.json")).unwrap();
        let emp = TableEntry::find(&store, "EMP").unwrap().unwrap();
        assert_eq!(emp.deps_order, Some(1));
    }

    #[test]
    fn test_cycle_detection_reports_path_and_dumps_map() {
        let store = db::open_in_memory().unwrap();
        seed(&store, &["X", "Y"], &[("X", "Y"), ("Y", "X")]);
        let tmp = tempfile::tempdir().unwrap();
        let deps_path = tmp.path().join("deps.json");

        let err = resolve(&store, &deps_path).unwrap_err();
        assert_eq!(err.exit_code(), 2);
        match &err {
            Error::CycleDetected { cycles, deps_path: dumped } => {
                assert!(!cycles.is_empty());
                assert!(cycles[0].contains(" -> "));
                assert_eq!(dumped, &deps_path);
            }
            other => panic!("expected CycleDetected, got {other:?}"),
        }

        // The dump holds both edges for the operator to edit
        let dump: BTreeMap<String, Vec<String>> =
            serde_json::from_str(&std::fs::read_to_string(&deps_path).unwrap()).unwrap();
        assert_eq!(dump["X"], vec!["Y"]);
        assert_eq!(dump["Y"], vec!["X"]);

        // No order was assigned
        let x = TableEntry::find(&store, "X").unwrap().unwrap();
        assert!(x.deps_order.is_none());
    }

    #[test]
    fn test_cycle_detection_is_complete_on_dags() {
        // A diamond is acyclic and must never trigger the error
        let mut deps = DepsMap::new();
        deps.insert("a".into(), BTreeSet::from(["b".to_string(), "c".to_string()]));
        deps.insert("b".into(), BTreeSet::from(["d".to_string()]));
        deps.insert("c".into(), BTreeSet::from(["d".to_string()]));
        deps.insert("d".into(), BTreeSet::new());
        assert!(detect_cycles(&deps).is_empty());
    }

    #[test]
    fn test_cycle_detection_finds_long_cycle() {
        let mut deps = DepsMap::new();
        deps.insert("a".into(), BTreeSet::from(["b".to_string()]));
        deps.insert("b".into(), BTreeSet::from(["c".to_string()]));
        deps.insert("c".into(), BTreeSet::from(["a".to_string()]));
        let cycles = detect_cycles(&deps);
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0], "a -> b -> c -> a");
    }

    #[test]
    fn test_edges_to_excluded_tables_stay_disabled() {
        let store = db::open_in_memory().unwrap();
        seed(&store, &["A", "B"], &[("B", "A"), ("B", "GONE")]);
        // GONE is not in the store at all; the edge referencing it must
        // neither order nor enable
        let tmp = tempfile::tempdir().unwrap();
        resolve(&store, &tmp.path().join("deps.json")).unwrap();

        let edges = ForeignKeyEntry::for_table(&store, "B").unwrap();
        let enabled: Vec<&ForeignKeyEntry> = edges.iter().filter(|fk| fk.is_enabled).collect();
        assert_eq!(enabled.len(), 1);
        assert_eq!(enabled[0].source_ref_table, "A");
    }
}
