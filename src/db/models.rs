// src/db/models.rs

//! Data models for config store entities
//!
//! One struct per store table with methods for the queries the pipeline
//! stages need. Ownership is split by stage: the reflector is the only
//! writer of columns and foreign keys, the executor of target counts and
//! copy flags, the exporter of validation state and empty-row counts.

use crate::error::Result;
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::collections::HashMap;

/// One source schema under a project.
#[derive(Debug, Clone)]
pub struct Subsystem {
    pub name: String,
    pub source_schema: Option<String>,
    pub target_schema: Option<String>,
    pub source_type: String,
    pub target_type: String,
    pub invocation: Option<String>,
}

impl Subsystem {
    pub fn upsert(&self, conn: &Connection) -> Result<()> {
        conn.execute(
            "INSERT INTO subsystems (name, source_schema, target_schema, source_type, target_type, invocation)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(name) DO UPDATE SET invocation = excluded.invocation",
            params![
                &self.name,
                &self.source_schema,
                &self.target_schema,
                &self.source_type,
                &self.target_type,
                &self.invocation,
            ],
        )?;
        Ok(())
    }

    pub fn find(conn: &Connection, name: &str) -> Result<Option<Self>> {
        let mut stmt = conn.prepare(
            "SELECT name, source_schema, target_schema, source_type, target_type, invocation
             FROM subsystems WHERE name = ?1",
        )?;
        let subsystem = stmt
            .query_row([name], |row| {
                Ok(Subsystem {
                    name: row.get(0)?,
                    source_schema: row.get(1)?,
                    target_schema: row.get(2)?,
                    source_type: row.get(3)?,
                    target_type: row.get(4)?,
                    invocation: row.get(5)?,
                })
            })
            .optional()?;
        Ok(subsystem)
    }
}

/// Processing state of a table, derived from its flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableState {
    Unknown,
    Reflected,
    Planned,
    Populated,
    Validated,
    Errored,
}

/// One source table and its processing state.
#[derive(Debug, Clone)]
pub struct TableEntry {
    pub source_name: String,
    pub norm_name: String,
    pub target_name: Option<String>,
    pub source_row_count: i64,
    pub target_row_count: i64,
    pub source_pk: Option<String>,
    pub target_pk: Option<String>,
    pub deps: Option<String>,
    pub deps_order: Option<i64>,
    pub cp_error: bool,
    pub del_error: bool,
    pub include: bool,
    pub created: bool,
    pub validated: bool,
    pub empty_rows: i64,
}

const TABLE_COLUMNS: &str = "source_name, norm_name, target_name, source_row_count, target_row_count, \
     source_pk, target_pk, deps, deps_order, cp_error, del_error, include, created, validated, empty_rows";

impl TableEntry {
    pub fn new(source_name: String, norm_name: String) -> Self {
        Self {
            source_name,
            norm_name,
            target_name: None,
            source_row_count: 0,
            target_row_count: 0,
            source_pk: None,
            target_pk: None,
            deps: None,
            deps_order: None,
            cp_error: false,
            del_error: false,
            include: false,
            created: false,
            validated: false,
            empty_rows: 0,
        }
    }

    /// Insert the table or, when it already exists, refresh only the
    /// re-countable attributes. Processing flags survive re-reflection.
    pub fn upsert(&self, conn: &Connection) -> Result<()> {
        conn.execute(
            "INSERT INTO tables (source_name, norm_name, source_row_count, source_pk, deps, deps_order, include)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(source_name) DO UPDATE SET
                 source_row_count = excluded.source_row_count,
                 include = excluded.include",
            params![
                &self.source_name,
                &self.norm_name,
                &self.source_row_count,
                &self.source_pk,
                &self.deps,
                &self.deps_order,
                self.include as i64,
            ],
        )?;
        Ok(())
    }

    pub fn find(conn: &Connection, source_name: &str) -> Result<Option<Self>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {TABLE_COLUMNS} FROM tables WHERE source_name = ?1"
        ))?;
        let table = stmt.query_row([source_name], Self::from_row).optional()?;
        Ok(table)
    }

    pub fn find_by_norm(conn: &Connection, norm_name: &str) -> Result<Option<Self>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {TABLE_COLUMNS} FROM tables WHERE norm_name = ?1"
        ))?;
        let table = stmt.query_row([norm_name], Self::from_row).optional()?;
        Ok(table)
    }

    pub fn list_all(conn: &Connection) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {TABLE_COLUMNS} FROM tables ORDER BY source_name"
        ))?;
        let tables = stmt
            .query_map([], Self::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tables)
    }

    /// Included, non-empty tables in dependency order.
    pub fn list_included(conn: &Connection) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {TABLE_COLUMNS} FROM tables
             WHERE source_row_count > 0 AND include = 1
             ORDER BY deps_order ASC"
        ))?;
        let tables = stmt
            .query_map([], Self::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tables)
    }

    /// Normalized names of exported-and-validated tables, in dependency order.
    pub fn list_validated(conn: &Connection) -> Result<Vec<String>> {
        let mut stmt = conn.prepare(
            "SELECT norm_name FROM tables
             WHERE source_row_count > 0 AND validated = 1
             ORDER BY deps_order ASC",
        )?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(names)
    }

    /// Source names of tables whose copy has completed (counts equal).
    pub fn list_copied(conn: &Connection) -> Result<Vec<String>> {
        let mut stmt = conn.prepare(
            "SELECT source_name FROM tables
             WHERE source_row_count > 0 AND source_row_count = target_row_count",
        )?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(names)
    }

    /// Source names of tables flagged with a copy error.
    pub fn list_cp_errors(conn: &Connection) -> Result<Vec<String>> {
        let mut stmt = conn.prepare("SELECT source_name FROM tables WHERE cp_error = 1")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(names)
    }

    /// Included tables not yet created in the target.
    pub fn tables_diff(conn: &Connection) -> Result<Vec<String>> {
        let mut stmt = conn.prepare(
            "SELECT source_name FROM tables
             WHERE source_row_count > 0 AND include = 1 AND created = 0
             ORDER BY deps_order ASC",
        )?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(names)
    }

    /// Included tables whose target row count differs from the source,
    /// with the source count.
    pub fn data_diff(conn: &Connection) -> Result<HashMap<String, i64>> {
        let mut stmt = conn.prepare(
            "SELECT source_name, source_row_count FROM tables
             WHERE source_row_count > 0 AND include = 1
             AND source_row_count != target_row_count",
        )?;
        let diff = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<HashMap<String, i64>>>()?;
        Ok(diff)
    }

    /// Map of source name to normalized name for included, non-empty tables.
    pub fn norm_map(conn: &Connection) -> Result<HashMap<String, String>> {
        let mut stmt = conn.prepare(
            "SELECT source_name, norm_name FROM tables
             WHERE source_row_count > 0 AND include = 1",
        )?;
        let map = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<HashMap<String, String>>>()?;
        Ok(map)
    }

    /// Map of source name to comma-joined dependency list.
    pub fn deps_map(conn: &Connection) -> Result<HashMap<String, String>> {
        let mut stmt = conn.prepare("SELECT source_name, IFNULL(deps, '') FROM tables")?;
        let map = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<HashMap<String, String>>>()?;
        Ok(map)
    }

    /// Recompute include flags from an edited table list: a table stays
    /// included when named in the list or already fully copied, and is
    /// excluded when unnamed and incomplete or empty.
    pub fn update_include(conn: &Connection, keep: &[String]) -> Result<()> {
        for table in Self::list_all(conn)? {
            let named = keep.contains(&table.source_name);
            let copied = table.source_row_count > 0
                && table.target_row_count == table.source_row_count;

            if named || copied {
                conn.execute(
                    "UPDATE tables SET include = 1 WHERE source_name = ?1",
                    [&table.source_name],
                )?;
            }
            if !named && (table.target_row_count != table.source_row_count || table.source_row_count == 0) {
                conn.execute(
                    "UPDATE tables SET include = 0 WHERE source_name = ?1",
                    [&table.source_name],
                )?;
            }
        }
        Ok(())
    }

    pub fn set_deps(conn: &Connection, source_name: &str, deps: &str, order: i64) -> Result<()> {
        conn.execute(
            "UPDATE tables SET deps = ?1, deps_order = ?2 WHERE source_name = ?3",
            params![deps, order, source_name],
        )?;
        Ok(())
    }

    pub fn set_source_pk(conn: &Connection, source_name: &str, pk: &str) -> Result<()> {
        conn.execute(
            "UPDATE tables SET source_pk = ?1 WHERE source_name = ?2",
            params![pk, source_name],
        )?;
        Ok(())
    }

    pub fn set_source_row_count(conn: &Connection, source_name: &str, count: i64) -> Result<()> {
        conn.execute(
            "UPDATE tables SET source_row_count = ?1 WHERE source_name = ?2",
            params![count, source_name],
        )?;
        Ok(())
    }

    /// Record a verified copy: counts match, error flags clear.
    pub fn set_copied(conn: &Connection, source_name: &str, target_row_count: i64) -> Result<()> {
        conn.execute(
            "UPDATE tables SET target_row_count = ?1, cp_error = 0, del_error = 0,
                 include = 1, created = 1
             WHERE source_name = ?2",
            params![target_row_count, source_name],
        )?;
        Ok(())
    }

    pub fn set_copy_error(conn: &Connection, source_name: &str) -> Result<()> {
        conn.execute(
            "UPDATE tables SET cp_error = 1, target_row_count = 0 WHERE source_name = ?1",
            [source_name],
        )?;
        Ok(())
    }

    pub fn set_delete_error(conn: &Connection, source_name: &str, failed: bool) -> Result<()> {
        conn.execute(
            "UPDATE tables SET del_error = ?1 WHERE source_name = ?2",
            params![failed as i64, source_name],
        )?;
        Ok(())
    }

    pub fn set_created(conn: &Connection, source_name: &str, created: bool) -> Result<()> {
        conn.execute(
            "UPDATE tables SET created = ?1 WHERE source_name = ?2",
            params![created as i64, source_name],
        )?;
        Ok(())
    }

    /// Record target-side presence observed during re-reflection.
    pub fn set_target_state(
        conn: &Connection,
        source_name: &str,
        target_name: &str,
        target_row_count: i64,
    ) -> Result<()> {
        conn.execute(
            "UPDATE tables SET target_name = ?1, target_row_count = ?2, created = 1
             WHERE source_name = ?3",
            params![target_name, target_row_count, source_name],
        )?;
        Ok(())
    }

    /// A table present last run but missing from the target now.
    pub fn reset_target(conn: &Connection, source_name: &str) -> Result<()> {
        conn.execute(
            "UPDATE tables SET target_row_count = 0, created = 0 WHERE source_name = ?1",
            [source_name],
        )?;
        Ok(())
    }

    pub fn set_validated(conn: &Connection, source_name: &str, validated: bool) -> Result<()> {
        conn.execute(
            "UPDATE tables SET validated = ?1 WHERE source_name = ?2",
            params![validated as i64, source_name],
        )?;
        Ok(())
    }

    pub fn set_empty_rows(conn: &Connection, source_name: &str, empty_rows: i64) -> Result<()> {
        conn.execute(
            "UPDATE tables SET empty_rows = ?1 WHERE source_name = ?2",
            params![empty_rows, source_name],
        )?;
        Ok(())
    }

    /// Derived processing state.
    pub fn state(&self) -> TableState {
        if self.cp_error || self.del_error {
            TableState::Errored
        } else if self.validated {
            TableState::Validated
        } else if self.created && self.target_row_count == self.source_row_count && self.source_row_count > 0 {
            TableState::Populated
        } else if self.include && self.deps_order.is_some() {
            TableState::Planned
        } else if self.source_row_count > 0 || self.include {
            TableState::Reflected
        } else {
            TableState::Unknown
        }
    }

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            source_name: row.get(0)?,
            norm_name: row.get(1)?,
            target_name: row.get(2)?,
            source_row_count: row.get(3)?,
            target_row_count: row.get(4)?,
            source_pk: row.get(5)?,
            target_pk: row.get(6)?,
            deps: row.get(7)?,
            deps_order: row.get(8)?,
            cp_error: row.get::<_, i64>(9)? != 0,
            del_error: row.get::<_, i64>(10)? != 0,
            include: row.get::<_, i64>(11)? != 0,
            created: row.get::<_, i64>(12)? != 0,
            validated: row.get::<_, i64>(13)? != 0,
            empty_rows: row.get(14)?,
        })
    }
}

/// One column of a source table, keyed by (table, position).
#[derive(Debug, Clone)]
pub struct ColumnEntry {
    pub tbl_col_pos: String,
    pub source_table: String,
    pub source_column: String,
    pub norm_column: Option<String>,
    pub target_column: Option<String>,
    pub jdbc_data_type: Option<i32>,
    pub source_data_type: Option<String>,
    pub source_column_size: i64,
    pub fixed_size: bool,
    pub source_column_nullable: bool,
    pub source_column_position: i64,
    pub source_column_autoincrement: Option<String>,
    pub source_column_default: Option<String>,
}

const COLUMN_COLUMNS: &str = "tbl_col_pos, source_table, source_column, norm_column, target_column, \
     jdbc_data_type, source_data_type, source_column_size, fixed_size, source_column_nullable, \
     source_column_position, source_column_autoincrement, source_column_default";

impl ColumnEntry {
    /// The store key for a (table, position) pair.
    pub fn key(table: &str, position: i64) -> String {
        format!("{table}*{position}")
    }

    /// Insert a reflected column. Existing rows are never rewritten;
    /// re-reflection leaves probed sizes and normalization intact.
    pub fn insert_source(&self, conn: &Connection) -> Result<()> {
        conn.execute(
            "INSERT OR IGNORE INTO columns
             (tbl_col_pos, source_table, source_column, norm_column, jdbc_data_type,
              source_data_type, source_column_size, source_column_nullable,
              source_column_position, source_column_autoincrement, source_column_default)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                &self.tbl_col_pos,
                &self.source_table,
                &self.source_column,
                &self.norm_column,
                &self.jdbc_data_type,
                &self.source_data_type,
                &self.source_column_size,
                self.source_column_nullable as i64,
                &self.source_column_position,
                &self.source_column_autoincrement,
                &self.source_column_default,
            ],
        )?;
        Ok(())
    }

    pub fn find(conn: &Connection, tbl_col_pos: &str) -> Result<Option<Self>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMN_COLUMNS} FROM columns WHERE tbl_col_pos = ?1"
        ))?;
        let column = stmt.query_row([tbl_col_pos], Self::from_row).optional()?;
        Ok(column)
    }

    /// All columns of a table, in ordinal order.
    pub fn for_table(conn: &Connection, source_table: &str) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMN_COLUMNS} FROM columns
             WHERE source_table = ?1 ORDER BY source_column_position ASC"
        ))?;
        let columns = stmt
            .query_map([source_table], Self::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(columns)
    }

    /// Map of "table:column" to normalized column name, restricted to
    /// included, non-empty tables.
    pub fn norm_map(conn: &Connection) -> Result<HashMap<String, String>> {
        let mut stmt = conn.prepare(
            "SELECT c.source_table, c.source_column, c.norm_column
             FROM tables t
             INNER JOIN columns c ON c.source_table = t.source_name
             WHERE t.source_row_count > 0 AND t.include = 1",
        )?;
        let mut map = HashMap::new();
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
            ))
        })?;
        for row in rows {
            let (table, column, norm) = row?;
            if let Some(norm) = norm {
                map.insert(format!("{table}:{column}"), norm);
            }
        }
        Ok(map)
    }

    /// Record a probed true maximum length.
    pub fn set_probed_size(conn: &Connection, tbl_col_pos: &str, size: i64) -> Result<()> {
        conn.execute(
            "UPDATE columns SET source_column_size = ?1, fixed_size = 1 WHERE tbl_col_pos = ?2",
            params![size, tbl_col_pos],
        )?;
        Ok(())
    }

    /// Overwrite the recorded size (used for FK endpoint reconciliation).
    pub fn set_size(conn: &Connection, tbl_col_pos: &str, size: i64) -> Result<()> {
        conn.execute(
            "UPDATE columns SET source_column_size = ?1 WHERE tbl_col_pos = ?2",
            params![size, tbl_col_pos],
        )?;
        Ok(())
    }

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            tbl_col_pos: row.get(0)?,
            source_table: row.get(1)?,
            source_column: row.get(2)?,
            norm_column: row.get(3)?,
            target_column: row.get(4)?,
            jdbc_data_type: row.get(5)?,
            source_data_type: row.get(6)?,
            source_column_size: row.get(7)?,
            fixed_size: row.get::<_, i64>(8)? != 0,
            source_column_nullable: row.get::<_, i64>(9)? != 0,
            source_column_position: row.get(10)?,
            source_column_autoincrement: row.get(11)?,
            source_column_default: row.get(12)?,
        })
    }
}

/// One reflected foreign-key constraint.
#[derive(Debug, Clone)]
pub struct ForeignKeyEntry {
    pub source_name: String,
    pub source_table: String,
    pub source_column: String,
    pub source_ref_table: String,
    pub source_ref_column: String,
    pub tbl_col_pos: Option<String>,
    pub ref_tbl_col_pos: Option<String>,
    pub is_enabled: bool,
}

const FK_COLUMNS: &str = "source_name, source_table, source_column, source_ref_table, \
     source_ref_column, tbl_col_pos, ref_tbl_col_pos, is_enabled";

impl ForeignKeyEntry {
    /// The synthesized stable constraint name for the n-th edge of a table.
    pub fn constraint_name(source_table: &str, index: usize) -> String {
        let prefix: String = source_table.chars().take(25).collect();
        format!("{prefix}*{index}")
    }

    /// Insert a reflected edge. Existing rows are never rewritten.
    pub fn insert_source(&self, conn: &Connection) -> Result<()> {
        conn.execute(
            "INSERT OR IGNORE INTO foreign_keys
             (source_name, source_table, source_column, source_ref_table, source_ref_column)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                &self.source_name,
                &self.source_table,
                &self.source_column,
                &self.source_ref_table,
                &self.source_ref_column,
            ],
        )?;
        Ok(())
    }

    pub fn list_all(conn: &Connection) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {FK_COLUMNS} FROM foreign_keys ORDER BY source_name"
        ))?;
        let fks = stmt
            .query_map([], Self::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(fks)
    }

    pub fn for_table(conn: &Connection, source_table: &str) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {FK_COLUMNS} FROM foreign_keys WHERE source_table = ?1 ORDER BY source_name"
        ))?;
        let fks = stmt
            .query_map([source_table], Self::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(fks)
    }

    pub fn enabled_for_table(conn: &Connection, source_table: &str) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {FK_COLUMNS} FROM foreign_keys
             WHERE source_table = ?1 AND is_enabled = 1 ORDER BY source_name"
        ))?;
        let fks = stmt
            .query_map([source_table], Self::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(fks)
    }

    /// Connect both endpoints of every edge to their (table, position)
    /// column keys. Run once after reflection completes.
    pub fn connect_column_positions(conn: &Connection) -> Result<()> {
        conn.execute(
            "UPDATE foreign_keys SET
                 tbl_col_pos = (SELECT c.tbl_col_pos FROM columns c
                                WHERE c.source_column = foreign_keys.source_column
                                AND   c.source_table = foreign_keys.source_table),
                 ref_tbl_col_pos = (SELECT c.tbl_col_pos FROM columns c
                                    WHERE c.source_column = foreign_keys.source_ref_column
                                    AND   c.source_table = foreign_keys.source_ref_table)",
            [],
        )?;
        Ok(())
    }

    pub fn set_enabled(conn: &Connection, source_name: &str, enabled: bool) -> Result<()> {
        conn.execute(
            "UPDATE foreign_keys SET is_enabled = ?1 WHERE source_name = ?2",
            params![enabled as i64, source_name],
        )?;
        Ok(())
    }

    pub fn disable_all(conn: &Connection) -> Result<()> {
        conn.execute("UPDATE foreign_keys SET is_enabled = 0", [])?;
        Ok(())
    }

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            source_name: row.get(0)?,
            source_table: row.get(1)?,
            source_column: row.get(2)?,
            source_ref_table: row.get(3)?,
            source_ref_column: row.get(4)?,
            tbl_col_pos: row.get(5)?,
            ref_tbl_col_pos: row.get(6)?,
            is_enabled: row.get::<_, i64>(7)? != 0,
        })
    }
}

/// One captured document archive. The core treats this as opaque storage
/// for the document-capture collaborator.
#[derive(Debug, Clone)]
pub struct CapturedFile {
    pub source_path: String,
    pub tar_path: String,
    pub tar_checksum: Option<String>,
    pub tar_mtime: Option<String>,
    pub tar_status: Option<String>,
}

impl CapturedFile {
    pub fn upsert(&self, conn: &Connection) -> Result<()> {
        conn.execute(
            "INSERT INTO files (source_path, tar_path, tar_checksum, tar_mtime, tar_status)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(source_path) DO UPDATE SET
                 tar_path = excluded.tar_path,
                 tar_checksum = excluded.tar_checksum,
                 tar_mtime = excluded.tar_mtime,
                 tar_status = excluded.tar_status",
            params![
                &self.source_path,
                &self.tar_path,
                &self.tar_checksum,
                &self.tar_mtime,
                &self.tar_status,
            ],
        )?;
        Ok(())
    }

    pub fn find(conn: &Connection, source_path: &str) -> Result<Option<Self>> {
        let mut stmt = conn.prepare(
            "SELECT source_path, tar_path, tar_checksum, tar_mtime, tar_status
             FROM files WHERE source_path = ?1",
        )?;
        let file = stmt.query_row([source_path], Self::from_row).optional()?;
        Ok(file)
    }

    pub fn list_all(conn: &Connection) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(
            "SELECT source_path, tar_path, tar_checksum, tar_mtime, tar_status
             FROM files ORDER BY source_path",
        )?;
        let files = stmt
            .query_map([], Self::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(files)
    }

    pub fn delete(conn: &Connection, source_path: &str) -> Result<()> {
        conn.execute("DELETE FROM files WHERE source_path = ?1", [source_path])?;
        Ok(())
    }

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            source_path: row.get(0)?,
            tar_path: row.get(1)?,
            tar_checksum: row.get(2)?,
            tar_mtime: row.get(3)?,
            tar_status: row.get(4)?,
        })
    }
}
