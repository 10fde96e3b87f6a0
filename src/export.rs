// src/export.rs

//! TSV export
//!
//! Streams each included table to a UTF-8 TSV in dependency order. Blob
//! columns and large character LOBs are replaced in the select list by a
//! synthesized sidecar file name and their payloads written to the
//! documents directory. Embedded NUL bytes are stripped before export,
//! control characters are collapsed to spaces in flight, and all-NULL
//! rows are dropped and accounted as `empty_rows`. Once a table's
//! dependency closure is exported, the closed subset is validated in
//! batches against a partial descriptor.

use crate::config::RunOptions;
use crate::datapackage::{self, Field, Package, Resource};
use crate::db::models::{ColumnEntry, TableEntry};
use crate::dialect::DbKind;
use crate::error::{Error, Result};
use crate::project::Project;
use crate::source::{CellValue, DbConnection, RowSink};
use crate::types;
use crate::validate;
use rusqlite::Connection;
use std::collections::HashSet;
use std::io::Write;
use std::path::Path;
use tracing::{debug, info, warn};

/// Tables validated together once their dependency closure is exported.
const VALIDATION_BATCH: usize = 10;

/// Whether a field's payload leaves the TSV for a sidecar file: every
/// blob, and every character LOB whose size is unknown or unbounded.
fn spills(field: &Field) -> bool {
    let code = field.jdbc_code();
    types::is_binary(code)
        || (matches!(code, -16 | -1 | 2005 | 2009 | 2011) && field.max_length() == 0)
}

fn quote(ident: &str) -> String {
    DbKind::Sqlite.dialect().quote(ident)
}

/// The select expression of one field: the column itself, or the
/// synthesized `<table>_<col><rowid>.data` sidecar name for LOBs.
fn select_expr(resource: &Resource, field: &Field) -> String {
    if spills(field) {
        format!(
            "'{}_{}' || rowid || '.data' AS {}",
            resource.name,
            field.name,
            quote(&field.name)
        )
    } else {
        format!("{} AS {}", quote(&field.db_column_name), quote(&field.name))
    }
}

/// Strip embedded NUL bytes from every exported text column, committed
/// as one transaction. Mutates the export source, so non-SQLite sources
/// only run it when explicitly requested.
fn scrub_nul_bytes(source: &dyn DbConnection, resource: &Resource) -> Result<()> {
    debug!("Removing any null bytes before exporting {}", resource.name);

    let mut batch = String::from("BEGIN;\n");
    let mut any = false;
    for field in &resource.schema.fields {
        if spills(field) || !types::is_character(field.jdbc_code()) {
            continue;
        }
        any = true;
        let column = quote(&field.db_column_name);
        batch.push_str(&format!(
            "UPDATE {table} SET {column} = substr({column},1,instr({column},CHAR(0)) - 1) || \
             substr(CAST({column} AS BLOB),instr({column},CHAR(0)) + 1) \
             WHERE instr({column},CHAR(0)) > 0;\n",
            table = quote(&resource.db_table_name),
        ));
    }
    batch.push_str("COMMIT;\n");

    if any {
        source.execute_batch(&batch)?;
    }
    Ok(())
}

/// Collapse embedded tabs and line breaks to single spaces and trim
/// trailing whitespace; the TSV carries no quoting at all.
fn sanitize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '\t' | '\n' | '\r' => out.push(' '),
            '\0' => {}
            _ => out.push(ch),
        }
    }
    out.truncate(out.trim_end().len());
    out
}

fn render_cell(cell: &CellValue) -> String {
    match cell {
        CellValue::Null => String::new(),
        CellValue::Int(v) => v.to_string(),
        CellValue::Real(v) => v.to_string(),
        CellValue::Text(v) => sanitize(v),
        CellValue::Blob(v) => sanitize(&String::from_utf8_lossy(v)),
    }
}

/// Writes sanitized rows to the TSV, dropping all-NULL rows.
struct TsvSink<W: Write> {
    writer: csv::Writer<W>,
    rows_written: i64,
    empty_rows: i64,
}

impl<W: Write> TsvSink<W> {
    fn new(out: W, header: &[String]) -> Result<Self> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .quote_style(csv::QuoteStyle::Never)
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(out);
        writer.write_record(header)?;
        Ok(TsvSink {
            writer,
            rows_written: 0,
            empty_rows: 0,
        })
    }

    fn finish(mut self) -> Result<(i64, i64)> {
        self.writer.flush()?;
        Ok((self.rows_written, self.empty_rows))
    }
}

impl<W: Write> RowSink for TsvSink<W> {
    fn batch(&mut self, rows: &[Vec<CellValue>]) -> Result<()> {
        for row in rows {
            if row.iter().all(CellValue::is_null) {
                self.empty_rows += 1;
                continue;
            }
            let record: Vec<String> = row.iter().map(render_cell).collect();
            self.writer.write_record(&record)?;
            self.rows_written += 1;
        }
        Ok(())
    }
}

/// Count data lines (header excluded) of an exported TSV.
fn tsv_row_count(path: &Path) -> Result<i64> {
    let text = std::fs::read_to_string(path)?;
    let lines = text.lines().filter(|line| !line.is_empty()).count() as i64;
    Ok((lines - 1).max(0))
}

/// Export the payload of one LOB column to sidecar files.
fn export_lob_column(
    source: &dyn DbConnection,
    resource: &Resource,
    field: &Field,
    project: &Project,
) -> Result<()> {
    std::fs::create_dir_all(project.documents_dir())?;

    let sql = format!(
        "SELECT rowid, {} FROM {}",
        quote(&field.db_column_name),
        quote(&resource.db_table_name)
    );
    for (rowid, payload) in source.query_lobs(&sql)? {
        let file_name = format!("{}_{}{}.data", resource.name, field.name, rowid);
        std::fs::write(project.sidecar_path(&file_name), payload)?;
    }
    Ok(())
}

/// Export one table. Returns the written and empty row counts.
fn export_table(
    source: &dyn DbConnection,
    resource: &Resource,
    project: &Project,
    opts: &RunOptions,
) -> Result<(i64, i64)> {
    let tsv_path = project.tsv_path(&resource.name);

    let scrub = opts
        .scrub_nul_bytes
        .unwrap_or(source.kind() == DbKind::Sqlite);
    if scrub {
        scrub_nul_bytes(source, resource)?;
    }

    let header: Vec<String> = resource
        .schema
        .fields
        .iter()
        .map(|field| field.name.clone())
        .collect();
    let select_list: Vec<String> = resource
        .schema
        .fields
        .iter()
        .map(|field| select_expr(resource, field))
        .collect();
    let sql = format!(
        "SELECT {} FROM {}",
        select_list.join(","),
        quote(&resource.db_table_name)
    );

    let file = std::fs::File::create(&tsv_path)?;
    let mut sink = TsvSink::new(file, &header)?;
    source.query_batches(&sql, opts.batch_size, &mut sink)?;
    let (rows_written, empty_rows) = sink.finish()?;

    // The file on disk must agree with what the sink saw
    let lines = tsv_row_count(&tsv_path)?;
    if lines != rows_written {
        std::fs::remove_file(&tsv_path)?;
        return Err(Error::Validation {
            tables: vec![resource.name.clone()],
            report_path: tsv_path,
        });
    }

    for field in resource.schema.fields.iter().filter(|field| spills(field)) {
        export_lob_column(source, resource, field, project)?;
    }

    Ok((rows_written, empty_rows))
}

/// Validate the closed dependency subset against a partial descriptor.
/// Tables with no dependencies of their own that a later table still
/// depends on are deferred so they validate only once.
fn validate_batch(
    store: &Connection,
    project: &Project,
    source_kind: DbKind,
    deps_list: &mut Vec<String>,
    deps_map: &std::collections::HashMap<String, String>,
    archived: &[String],
) -> Result<()> {
    deps_list.sort();
    deps_list.dedup();

    let mut subset: Vec<String> = deps_list.clone();
    subset.retain(|table| {
        let standalone = deps_map
            .get(table)
            .map(|deps| deps == table)
            .unwrap_or(false);
        if !standalone {
            return true;
        }
        // Defer a standalone table still listed as a dependency of an
        // unarchived table
        !deps_map.iter().any(|(other, deps)| {
            !archived.contains(other) && deps.split(',').any(|dep| dep == table)
        })
    });

    let validated = TableEntry::list_validated(store)?;
    let norm_of: std::collections::HashMap<String, String> = TableEntry::norm_map(store)?;
    if subset.is_empty()
        || subset
            .iter()
            .all(|table| norm_of.get(table).map(|norm| validated.contains(norm)).unwrap_or(false))
    {
        deps_list.clear();
        return Ok(());
    }

    info!("Validating dependent tables against datapackage schema...");

    let partial = tempfile::Builder::new()
        .prefix("partial_datapackage")
        .suffix(".json")
        .tempfile_in(project.content_dir())?;
    datapackage::create_schema(store, partial.path(), "partial", source_kind, &subset, true)?;
    let package = Package::from_path(partial.path())?;

    let report = validate::validate_package(&package, &project.data_dir())?;
    if !report.is_valid() {
        let report_path = project
            .tmp_dir()
            .join(format!("{}-validation.json", project.subsystem()));
        report.write(&report_path)?;
        let failing = report.failing_resources();
        for table in &subset {
            if let Some(norm) = norm_of.get(table) {
                if failing.contains(norm) {
                    TableEntry::set_validated(store, table, false)?;
                }
            }
        }
        return Err(Error::Validation {
            tables: failing.into_iter().collect(),
            report_path,
        });
    }

    for table in &subset {
        TableEntry::set_validated(store, table, true)?;
    }
    deps_list.clear();

    Ok(())
}

/// Export every resource of the descriptor in dependency order, with
/// batched validation as dependency closures complete.
pub fn archive_tables(
    source: &dyn DbConnection,
    store: &Connection,
    package: &Package,
    project: &Project,
    source_kind: DbKind,
    opts: &RunOptions,
) -> Result<()> {
    std::fs::create_dir_all(project.data_dir())?;

    let validated_tables = TableEntry::list_validated(store)?;
    let deps_map = TableEntry::deps_map(store)?;
    let mut archived: Vec<String> = Vec::new();
    let mut deps_list: Vec<String> = Vec::new();
    let mut batch_index = 0usize;

    for resource in &package.resources {
        let tsv_path = project.tsv_path(&resource.name);

        if tsv_path.is_file() {
            if std::fs::metadata(&tsv_path)?.len() == 0 {
                std::fs::remove_file(&tsv_path)?;
            } else {
                println!("'{}' already exported.", resource.path);
                archived.push(resource.db_table_name.clone());
                continue;
            }
        } else if validated_tables.contains(&resource.name) {
            // A vanished TSV invalidates its earlier validation
            TableEntry::set_validated(store, &resource.db_table_name, false)?;
        }

        println!(
            "Writing '{}' ({} rows)...",
            resource.path, resource.count_of_rows
        );

        let (rows_written, empty_rows) = export_table(source, resource, project, opts)?;
        TableEntry::set_empty_rows(store, &resource.db_table_name, empty_rows)?;

        let expected: i64 = resource.count_of_rows.parse().unwrap_or(0);
        if rows_written + empty_rows != expected && expected > 0 {
            warn!(
                "Row count drift on {}: expected {expected}, wrote {rows_written} (+{empty_rows} empty)",
                resource.name
            );
        }

        batch_index += 1;
        archived.push(resource.db_table_name.clone());
        deps_list.push(resource.db_table_name.clone());
        deps_list.extend(
            resource
                .db_table_deps
                .split(',')
                .filter(|dep| !dep.is_empty())
                .map(str::to_string),
        );

        let closure_done = deps_list.iter().all(|dep| archived.contains(dep));
        if closure_done && batch_index > VALIDATION_BATCH {
            validate_batch(store, project, source_kind, &mut deps_list, &deps_map, &archived)?;
            batch_index = 0;
        }
    }

    if !deps_list.is_empty() {
        validate_batch(store, project, source_kind, &mut deps_list, &deps_map, &archived)?;
    }

    Ok(())
}

/// Seed an empty config store from an existing datapackage descriptor.
/// Used by the archive command when the store was not produced by a copy
/// run in the same project.
pub fn seed_store_from_package(store: &Connection, package: &Package) -> Result<()> {
    let existing: i64 = store.query_row("SELECT COUNT(*) FROM tables", [], |row| row.get(0))?;
    if existing > 0 {
        return Ok(());
    }

    for (idx, resource) in package.resources.iter().enumerate() {
        let mut table = TableEntry::new(
            resource.db_table_name.clone(),
            resource.name.clone(),
        );
        table.source_row_count = resource.count_of_rows.parse().unwrap_or(0);
        table.include = true;
        table.upsert(store)?;
        TableEntry::set_deps(store, &resource.db_table_name, &resource.db_table_deps, (idx + 1) as i64)?;
        TableEntry::set_created(store, &resource.db_table_name, true)?;

        // Primary key columns arrive normalized; map them back to their
        // source names through the field list
        let norm_pk: HashSet<&str> = resource
            .schema
            .primary_key
            .as_ref()
            .map(|pk| pk.iter().map(String::as_str).collect())
            .unwrap_or_default();
        let mut source_pk = Vec::new();

        for (pos, field) in resource.schema.fields.iter().enumerate() {
            let position = (pos + 1) as i64;
            let entry = ColumnEntry {
                tbl_col_pos: ColumnEntry::key(&resource.db_table_name, position),
                source_table: resource.db_table_name.clone(),
                source_column: field.db_column_name.clone(),
                norm_column: Some(field.name.clone()),
                target_column: None,
                jdbc_data_type: Some(field.jdbc_code()),
                source_data_type: None,
                source_column_size: field.max_length(),
                fixed_size: false,
                source_column_nullable: !field.required(),
                source_column_position: position,
                source_column_autoincrement: None,
                source_column_default: None,
            };
            entry.insert_source(store)?;

            if norm_pk.contains(field.name.as_str()) {
                source_pk.push(field.db_column_name.clone());
            }
        }
        TableEntry::set_source_pk(store, &resource.db_table_name, &source_pk.join(","))?;
    }

    Ok(())
}
