// src/reflect.rs

//! Metadata reflection
//!
//! Queries the source database for tables, columns, primary keys, foreign
//! keys and row counts, and writes them into the config store. On the
//! first run against a source every non-empty table is fully reflected;
//! later runs only re-count rows and re-check presence, never rewriting
//! existing column or foreign-key rows.

use crate::config::RunOptions;
use crate::db::models::{ColumnEntry, ForeignKeyEntry, TableEntry};
use crate::db::normalize_name;
use crate::error::{Error, Result};
use crate::source::DbConnection;
use crate::types;
use rusqlite::Connection;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

/// Table expression for counting: quoted when the name needs it and
/// schema-qualified when a schema override is set.
fn count_expr(table: &str, schema: Option<&str>) -> String {
    let needs_quoting = table.contains(' ') || table.contains('$');
    let name = if needs_quoting {
        format!("\"{table}\"")
    } else {
        table.to_string()
    };
    match schema {
        Some(schema) if !schema.is_empty() => format!("{schema}.{name}"),
        _ => name,
    }
}

/// Enumerate the source schema and populate the config store.
///
/// Tables are numbered in enumeration order; the ordinal disambiguates
/// truncated normalized names. Column and foreign-key rows are only
/// written for non-empty tables and never rewritten on re-reflection.
pub fn reflect_source(
    source: &dyn DbConnection,
    store: &Connection,
    opts: &RunOptions,
) -> Result<HashMap<String, i64>> {
    info!("Retrieving metadata from source schema...");

    let schema = opts.schema.as_deref();
    let tables = source
        .list_tables(schema.unwrap_or(""))
        .map_err(|e| Error::Reflection(format!("Cannot enumerate source tables: {e}")))?;

    let mut counts = HashMap::new();
    for (idx, table_name) in tables.iter().enumerate() {
        let tbl_index = (idx + 1) as i64;
        let row_count = source.count(&count_expr(table_name, schema))?;
        let include = row_count > 0;

        let mut entry = TableEntry::new(
            table_name.clone(),
            normalize_name(table_name, tbl_index),
        );
        entry.source_row_count = row_count;
        entry.include = include;
        entry.upsert(store)?;
        counts.insert(table_name.clone(), row_count);

        if include {
            reflect_table(source, store, table_name)?;
        }
    }

    Ok(counts)
}

/// Reflect primary key, columns and foreign keys of one table.
fn reflect_table(source: &dyn DbConnection, store: &Connection, table: &str) -> Result<()> {
    debug!("Reflecting table {table}");

    let pk_columns = source
        .primary_key(table)
        .map_err(|e| Error::Reflection(format!("Cannot read primary key of {table}: {e}")))?;
    TableEntry::set_source_pk(store, table, &pk_columns.join(","))?;

    for column in source
        .table_columns(table)
        .map_err(|e| Error::Reflection(format!("Cannot read columns of {table}: {e}")))?
    {
        let entry = ColumnEntry {
            tbl_col_pos: ColumnEntry::key(table, column.position),
            source_table: table.to_string(),
            source_column: column.name.clone(),
            norm_column: Some(normalize_name(&column.name, column.position)),
            target_column: None,
            jdbc_data_type: Some(column.type_code),
            source_data_type: Some(column.declared_type.clone()),
            source_column_size: column.size,
            fixed_size: false,
            source_column_nullable: column.nullable,
            source_column_position: column.position,
            source_column_autoincrement: Some(if column.autoincrement {
                "YES".to_string()
            } else {
                "NO".to_string()
            }),
            source_column_default: column.default,
        };
        entry.insert_source(store)?;
    }

    for (idx, fk) in source
        .foreign_keys(table)
        .map_err(|e| Error::Reflection(format!("Cannot read foreign keys of {table}: {e}")))?
        .iter()
        .enumerate()
    {
        let entry = ForeignKeyEntry {
            source_name: ForeignKeyEntry::constraint_name(table, idx + 1),
            source_table: table.to_string(),
            source_column: fk.column.clone(),
            source_ref_table: fk.ref_table.clone(),
            source_ref_column: fk.ref_column.clone(),
            tbl_col_pos: None,
            ref_tbl_col_pos: None,
            is_enabled: false,
        };
        entry.insert_source(store)?;
    }

    Ok(())
}

/// Re-check the target side: record counts for tables that exist there
/// and reset tables that have gone missing since the last run.
pub fn reflect_target(target: &dyn DbConnection, store: &Connection) -> Result<()> {
    info!("Retrieving metadata from target schema...");

    let db_tables = target
        .list_tables("")
        .map_err(|e| Error::Reflection(format!("Cannot enumerate target tables: {e}")))?;
    let norm_tables = TableEntry::norm_map(store)?;

    for (source_name, norm_name) in &norm_tables {
        let present = db_tables.iter().any(|t| t.to_lowercase() == *norm_name);
        if !present {
            TableEntry::reset_target(store, source_name)?;
        }
    }

    for db_table in &db_tables {
        let norm_table = db_table.to_lowercase();
        let Some((source_name, _)) = norm_tables.iter().find(|(_, norm)| **norm == norm_table)
        else {
            continue;
        };
        let row_count = target.count(&count_expr(db_table, None))?;
        TableEntry::set_target_state(store, source_name, db_table, row_count)?;
    }

    Ok(())
}

/// Write the included-tables list for manual editing.
pub fn write_tables_file(path: &Path, counts: &HashMap<String, i64>) -> Result<Vec<String>> {
    if path.is_file() {
        std::fs::remove_file(path)?;
    }

    let mut tables: Vec<String> = counts
        .iter()
        .filter(|(_, count)| **count > 0)
        .map(|(name, _)| name.clone())
        .collect();
    tables.sort();

    let mut body = String::from("# Included tables in source schema:\n");
    for table in &tables {
        body.push_str(table);
        body.push('\n');
    }
    std::fs::write(path, body)?;

    info!("List of tables written to '{}'", path.display());
    Ok(tables)
}

/// Read back the (possibly edited) table list.
pub fn read_tables_file(path: &Path) -> Result<Vec<String>> {
    let text = std::fs::read_to_string(path)?;
    Ok(text
        .lines()
        .filter(|line| !line.starts_with("# ") && !line.trim().is_empty())
        .map(|line| line.trim().to_string())
        .collect())
}

/// Correct oversized character columns: probe the true maximum length of
/// every unsized-probed character column declared past the LOB threshold,
/// then reconcile foreign-key endpoint sizes so target-side inserts
/// cannot fail on length mismatch.
pub fn fix_column_size(
    source: &dyn DbConnection,
    store: &Connection,
    tables: &[String],
    first_run: bool,
) -> Result<()> {
    if first_run {
        ForeignKeyEntry::connect_column_positions(store)?;
    }

    info!("Correcting column lengths...");

    let mut fixed: HashMap<String, i64> = HashMap::new();
    for table in tables {
        for column in ColumnEntry::for_table(store, table)? {
            let Some(code) = column.jdbc_data_type else {
                continue;
            };
            if column.fixed_size
                || !types::is_probed_character(code)
                || column.source_column_size <= types::LOB_THRESHOLD
            {
                continue;
            }

            let max_length = source.max_length(table, &column.source_column)?;
            ColumnEntry::set_probed_size(store, &column.tbl_col_pos, max_length)?;
            fixed.insert(column.tbl_col_pos.clone(), max_length);
            debug!(
                "Probed {}: declared {} actual {}",
                column.tbl_col_pos, column.source_column_size, max_length
            );
        }
    }

    // The larger size of an FK pair wins on both endpoints
    for fk in ForeignKeyEntry::list_all(store)? {
        let (Some(pos), Some(ref_pos)) = (fk.tbl_col_pos.clone(), fk.ref_tbl_col_pos.clone())
        else {
            continue;
        };
        let Some(&max_length) = fixed.get(&pos) else {
            continue;
        };
        let Some(ref_column) = ColumnEntry::find(store, &ref_pos)? else {
            continue;
        };

        let ref_length = ref_column.source_column_size;
        if ref_length == max_length {
            continue;
        }
        if ref_length > max_length {
            ColumnEntry::set_size(store, &pos, ref_length)?;
        } else {
            ColumnEntry::set_size(store, &ref_pos, max_length)?;
        }
    }

    Ok(())
}

/// First pass of a copy run: reflect or re-count, maintain the editable
/// table list, and recompute include flags. Returns the included table
/// names and whether anything changed since the last completed run.
pub fn ensure_include_tables(
    source: &dyn DbConnection,
    target: Option<&dyn DbConnection>,
    store: &Connection,
    tables_file: &Path,
    opts: &RunOptions,
) -> Result<(Vec<String>, bool)> {
    use crate::config::StopPhase;

    let copied_tables = TableEntry::list_copied(store)?;
    let first_run = copied_tables.is_empty();

    if !first_run {
        if let Some(target) = target {
            reflect_target(target, store)?;
        }
    }

    let tables = if !tables_file.is_file() || opts.stop == Some(StopPhase::Tables) {
        let counts = reflect_source(source, store, opts)?;
        if counts.values().all(|count| *count == 0) {
            return Err(Error::Reflection(
                "No tables with rows in source schema".to_string(),
            ));
        }
        write_tables_file(tables_file, &counts)?
    } else {
        info!(
            "Export of table list to '{}' already done.",
            tables_file.display()
        );
        read_tables_file(tables_file)?
    };

    TableEntry::update_include(store, &tables)?;

    let changed = !tables.is_empty()
        && !tables.iter().all(|table| copied_tables.contains(table));
    if changed {
        fix_column_size(source, store, &tables, first_run)?;
    }

    Ok((tables, changed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunOptions;
    use crate::db;
    use crate::source::SqliteConnection;
    use rusqlite::Connection as SqlConnection;

    fn sample_source() -> SqliteConnection {
        let conn = SqlConnection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE customers (id INTEGER PRIMARY KEY, name VARCHAR(100000));
             CREATE TABLE orders (id INTEGER PRIMARY KEY,
                                  customer_id INTEGER REFERENCES customers(id),
                                  placed DATETIME);
             CREATE TABLE empty_table (id INTEGER PRIMARY KEY);
             INSERT INTO customers VALUES (1, 'Alice'), (2, 'Bob');
             INSERT INTO orders VALUES (10, 1, '2023-01-01 10:00:00');",
        )
        .unwrap();
        SqliteConnection::from_connection(conn)
    }

    #[test]
    fn test_reflect_source_populates_store() {
        let source = sample_source();
        let store = db::open_in_memory().unwrap();
        let counts = reflect_source(&source, &store, &RunOptions::new()).unwrap();

        assert_eq!(counts["customers"], 2);
        assert_eq!(counts["orders"], 1);
        assert_eq!(counts["empty_table"], 0);

        let customers = TableEntry::find(&store, "customers").unwrap().unwrap();
        assert!(customers.include);
        assert_eq!(customers.source_pk.as_deref(), Some("id"));

        // Empty tables are recorded but not reflected in depth
        let empty = TableEntry::find(&store, "empty_table").unwrap().unwrap();
        assert!(!empty.include);
        assert!(ColumnEntry::for_table(&store, "empty_table").unwrap().is_empty());

        let columns = ColumnEntry::for_table(&store, "orders").unwrap();
        assert_eq!(columns.len(), 3);
        assert_eq!(columns[2].jdbc_data_type, Some(93));

        let fks = ForeignKeyEntry::for_table(&store, "orders").unwrap();
        assert_eq!(fks.len(), 1);
        assert_eq!(fks[0].source_name, "orders*1");
        assert_eq!(fks[0].source_ref_table, "customers");
    }

    #[test]
    fn test_reflection_never_rewrites_columns() {
        let source = sample_source();
        let store = db::open_in_memory().unwrap();
        reflect_source(&source, &store, &RunOptions::new()).unwrap();
        ColumnEntry::set_probed_size(&store, "customers*2", 5).unwrap();

        reflect_source(&source, &store, &RunOptions::new()).unwrap();
        let column = ColumnEntry::find(&store, "customers*2").unwrap().unwrap();
        assert_eq!(column.source_column_size, 5);
        assert!(column.fixed_size);
    }

    #[test]
    fn test_fix_column_size_probes_and_reconciles() {
        let source = sample_source();
        let store = db::open_in_memory().unwrap();
        reflect_source(&source, &store, &RunOptions::new()).unwrap();

        let tables = vec!["customers".to_string(), "orders".to_string()];
        fix_column_size(&source, &store, &tables, true).unwrap();

        let column = ColumnEntry::find(&store, "customers*2").unwrap().unwrap();
        // Longest value is 'Alice'
        assert_eq!(column.source_column_size, 5);
        assert!(column.fixed_size);
    }

    #[test]
    fn test_fk_size_reconciliation_propagates_larger() {
        let source_conn = SqlConnection::open_in_memory().unwrap();
        source_conn
            .execute_batch(
                "CREATE TABLE codes (code VARCHAR(99999) PRIMARY KEY);
                 CREATE TABLE uses (code VARCHAR(99999) REFERENCES codes(code));
                 INSERT INTO codes VALUES ('abcdef');
                 INSERT INTO uses VALUES ('abc');",
            )
            .unwrap();
        let source = SqliteConnection::from_connection(source_conn);
        let store = db::open_in_memory().unwrap();
        reflect_source(&source, &store, &RunOptions::new()).unwrap();

        let tables = vec!["codes".to_string(), "uses".to_string()];
        fix_column_size(&source, &store, &tables, true).unwrap();

        // Both endpoints end at the larger probed size
        let referencing = ColumnEntry::find(&store, "uses*1").unwrap().unwrap();
        let referenced = ColumnEntry::find(&store, "codes*1").unwrap().unwrap();
        assert_eq!(referencing.source_column_size, 6);
        assert_eq!(referenced.source_column_size, 6);
    }

    #[test]
    fn test_tables_file_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("sys-tables.txt");
        let mut counts = HashMap::new();
        counts.insert("b".to_string(), 3i64);
        counts.insert("a".to_string(), 1i64);
        counts.insert("empty".to_string(), 0i64);

        let written = write_tables_file(&path, &counts).unwrap();
        assert_eq!(written, vec!["a", "b"]);

        let read = read_tables_file(&path).unwrap();
        assert_eq!(read, vec!["a", "b"]);
    }

    #[test]
    fn test_ensure_include_tables_first_run() {
        let source = sample_source();
        let store = db::open_in_memory().unwrap();
        let tmp = tempfile::tempdir().unwrap();
        let tables_file = tmp.path().join("sys-tables.txt");

        let (tables, changed) =
            ensure_include_tables(&source, None, &store, &tables_file, &RunOptions::new())
                .unwrap();
        assert!(changed);
        assert_eq!(tables, vec!["customers", "orders"]);
        assert!(tables_file.is_file());

        let included = TableEntry::list_included(&store).unwrap();
        assert_eq!(included.len(), 2);
    }
}
