// src/executor.rs

//! Copy execution
//!
//! Applies generated DDL to the target and runs the copy plan table by
//! table: skip what is already copied, stream the rest in batches, verify
//! the target row count, and truncate-and-flag on any mismatch so the
//! next run starts clean. Per-table errors never abort sibling tables;
//! the run fails at the end with the full list.

use crate::config::RunOptions;
use crate::copyplan::{self, CopyStatement};
use crate::db::models::TableEntry;
use crate::ddl;
use crate::dialect::Dialect;
use crate::error::{Error, Result};
use crate::source::{CellValue, DbConnection, RowSink};
use rusqlite::Connection;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info, warn};

/// Apply a DDL file to the target, one statement per missing table.
///
/// Tables already created are skipped. A refused statement marks the
/// table `created=0, cp_error=1` and the run continues for independent
/// tables; the failures are returned for the end-of-run summary.
pub fn apply_ddl(
    target: &dyn DbConnection,
    store: &Connection,
    ddl_file: &Path,
    opts: &RunOptions,
) -> Result<Vec<String>> {
    if !ddl_file.is_file() {
        return Err(Error::Configuration(format!(
            "SQL file '{}' missing",
            ddl_file.display()
        )));
    }

    info!("Creating tables from generated DDL...");

    let norm_tables = TableEntry::norm_map(store)?;
    let diff_tables = TableEntry::tables_diff(store)?;
    let text = std::fs::read_to_string(ddl_file)?;

    let mut failed = Vec::new();
    for statement in text.split(';') {
        let statement = statement.trim();
        if statement.is_empty() {
            continue;
        }
        let Some(norm_table) = ddl::table_of_statement(statement) else {
            // Auxiliary statements (enum types) run as-is
            if opts.debug {
                println!("{statement};");
            }
            target.execute(statement)?;
            continue;
        };
        let Some((source_table, _)) = norm_tables.iter().find(|(_, norm)| **norm == norm_table)
        else {
            continue;
        };
        if !diff_tables.contains(source_table) {
            continue;
        }

        println!("Creating table '{source_table}'");
        if opts.debug {
            println!("{statement};");
        }
        match target.execute(statement) {
            Ok(_) => {
                TableEntry::set_created(store, source_table, true)?;
            }
            Err(e) => {
                warn!("DDL failed for {source_table}: {e}");
                TableEntry::set_created(store, source_table, false)?;
                TableEntry::set_copy_error(store, source_table)?;
                failed.push(source_table.clone());
            }
        }
    }

    Ok(failed)
}

/// Remove all rows of a target table, using TRUNCATE where the dialect
/// has it and DELETE elsewhere. Delete failures are recorded on the
/// table so re-runs know the target is dirty.
fn truncate_table(
    target: &dyn DbConnection,
    store: &Connection,
    dialect: &dyn Dialect,
    target_table: &str,
    source_table: &str,
    test_mode: bool,
) -> Result<()> {
    let reason = if test_mode { "Test run." } else { "Error." };
    println!("{reason} Deleting copied table '{source_table}'");

    let sql = dialect.delete_all_sql(&dialect.quote(target_table));
    match target.execute(&sql) {
        Ok(_) => TableEntry::set_delete_error(store, source_table, false)?,
        Err(e) => {
            warn!("Delete failed for {target_table}: {e}");
            TableEntry::set_delete_error(store, source_table, true)?;
        }
    }
    Ok(())
}

/// Streams fetched batches straight into the target insert statement.
struct InsertSink<'a> {
    target: &'a dyn DbConnection,
    insert_sql: String,
    inserted: usize,
}

impl RowSink for InsertSink<'_> {
    fn batch(&mut self, rows: &[Vec<CellValue>]) -> Result<()> {
        self.inserted += self.target.insert_batch(&self.insert_sql, rows)?;
        Ok(())
    }
}

/// Copy one table through batched streaming.
fn copy_table(
    source: &dyn DbConnection,
    target: &dyn DbConnection,
    store: &Connection,
    statement: &CopyStatement,
    opts: &RunOptions,
) -> Result<u64> {
    if let Some(pragmas) = &statement.pragmas {
        let batch: String = pragmas
            .split(';')
            .map(|pragma| format!("{};", pragma.trim()))
            .collect();
        target.execute_batch(&batch)?;
    }

    let dialect = target.kind().dialect();
    let columns: Vec<String> = crate::db::models::ColumnEntry::for_table(store, &statement.source_table)?
        .iter()
        .map(|column| {
            dialect.quote(column.norm_column.as_deref().unwrap_or(&column.source_column))
        })
        .collect();
    let placeholders: Vec<String> = (1..=columns.len()).map(|n| format!("?{n}")).collect();
    let insert_sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        dialect.quote(&statement.target_table),
        columns.join(", "),
        placeholders.join(", ")
    );

    if opts.debug {
        println!("{}", statement.source_query);
        println!("{insert_sql}");
    }

    let mut sink = InsertSink {
        target,
        insert_sql,
        inserted: 0,
    };
    let fetched = source.query_batches(&statement.source_query, opts.batch_size, &mut sink)?;
    debug!(
        "Copied {} rows ({} inserted) into {}",
        fetched, sink.inserted, statement.target_table
    );
    Ok(fetched)
}

/// Run the copy plan against the source and target.
///
/// Each table is verified by re-counting the target; a mismatch or an
/// execution error truncates the target table, flags `cp_error` and the
/// run continues. After the loop, dependents of failed tables are
/// truncated in reverse dependency order. Any remaining error fails the
/// run with the full table list.
pub fn run_plan(
    source: &dyn DbConnection,
    target: &dyn DbConnection,
    store: &Connection,
    copy_path: &Path,
    opts: &RunOptions,
) -> Result<()> {
    let statements = copyplan::parse_plan(copy_path)?;
    let diff_data = TableEntry::data_diff(store)?;
    let old_error_tables = TableEntry::list_cp_errors(store)?;
    let deps_map = TableEntry::deps_map(store)?;
    let dialect = target.kind().dialect();

    info!("Copying tables from source to target database:");

    let mut error_tables: Vec<String> = Vec::new();
    for statement in &statements {
        let source_table = &statement.source_table;
        let Some(entry) = TableEntry::find(store, source_table)? else {
            warn!("Plan statement for unknown table '{source_table}' skipped");
            continue;
        };
        let source_row_count = entry.source_row_count;

        let should_copy = if opts.test {
            // Test runs retry previously errored tables and exercise
            // everything not verified in an earlier run
            entry.cp_error
                || old_error_tables.contains(source_table)
                || entry.target_row_count != entry.source_row_count
        } else {
            diff_data.contains_key(source_table)
        };

        if !should_copy {
            println!("'{source_table}' already copied.");
            continue;
        }

        println!("Copying {source_row_count} rows from '{source_table}':");
        let copy_result = copy_table(source, target, store, statement, opts);

        let target_row_count = target
            .count(&dialect.quote(&statement.target_table))
            .unwrap_or(-1);

        match copy_result {
            Ok(_) if target_row_count == source_row_count => {
                TableEntry::set_copied(store, source_table, target_row_count)?;
                println!("'{source_table}' copied.");

                if opts.test {
                    truncate_table(
                        target,
                        store,
                        dialect,
                        &statement.target_table,
                        source_table,
                        true,
                    )?;
                }
            }
            result => {
                if let Err(e) = result {
                    warn!("Copy of {source_table} failed: {e}");
                } else {
                    warn!(
                        "Row count mismatch on {source_table}: source {source_row_count}, target {target_row_count}"
                    );
                }
                truncate_table(
                    target,
                    store,
                    dialect,
                    &statement.target_table,
                    source_table,
                    false,
                )?;
                TableEntry::set_copy_error(store, source_table)?;
                error_tables.push(source_table.clone());
                println!("'{source_table}' failed.");
            }
        }
    }

    if !error_tables.is_empty() {
        truncate_dependents(target, store, dialect, &error_tables, &deps_map, &statements)?;
        return Err(Error::Copy {
            tables: error_tables,
        });
    }

    Ok(())
}

/// Truncate every table that depends on a failed one, in reverse
/// dependency order, so descendants are never left referencing missing
/// ancestors.
fn truncate_dependents(
    target: &dyn DbConnection,
    store: &Connection,
    dialect: &dyn Dialect,
    error_tables: &[String],
    deps_map: &HashMap<String, String>,
    statements: &[CopyStatement],
) -> Result<()> {
    let mut dependents: Vec<TableEntry> = Vec::new();
    for (table, deps) in deps_map {
        if error_tables.contains(table) {
            continue;
        }
        let depends_on_failed = deps
            .split(',')
            .any(|dep| error_tables.contains(&dep.to_string()));
        if !depends_on_failed {
            continue;
        }
        if let Some(entry) = TableEntry::find(store, table)? {
            if entry.target_row_count > 0 {
                dependents.push(entry);
            }
        }
    }

    dependents.sort_by_key(|entry| std::cmp::Reverse(entry.deps_order.unwrap_or(0)));
    for entry in dependents {
        let target_table = statements
            .iter()
            .find(|statement| statement.source_table == entry.source_name)
            .map(|statement| statement.target_table.clone())
            .unwrap_or_else(|| entry.norm_name.clone());
        truncate_table(target, store, dialect, &target_table, &entry.source_name, false)?;
        TableEntry::reset_target(store, &entry.source_name)?;
    }
    Ok(())
}
