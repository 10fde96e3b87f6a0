// src/db/schema.rs

//! Config store schema and migrations
//!
//! Five entities: subsystems, tables, columns, foreign_keys and files.
//! The schema is created through a versioned migration sequence tracked
//! in a `schema_version` table, so applying it to an existing store is
//! safe and future shape changes slot in as new versions.

use crate::error::Result;
use rusqlite::Connection;
use tracing::{debug, info};

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the schema version tracking table
fn init_schema_version(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;
    Ok(())
}

/// Get the current schema version from the store
pub fn get_schema_version(conn: &Connection) -> Result<i32> {
    init_schema_version(conn)?;

    let version = conn
        .query_row(
            "SELECT version FROM schema_version ORDER BY version DESC LIMIT 1",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    Ok(version)
}

/// Set the schema version
fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute(
        "INSERT INTO schema_version (version) VALUES (?1)",
        [version],
    )?;
    Ok(())
}

/// Apply all pending migrations to bring the store up to date
pub fn migrate(conn: &Connection) -> Result<()> {
    let current_version = get_schema_version(conn)?;
    debug!("Current config store schema version: {}", current_version);

    if current_version >= SCHEMA_VERSION {
        return Ok(());
    }

    // Apply migrations in order
    for version in (current_version + 1)..=SCHEMA_VERSION {
        info!("Applying config store migration to version {}", version);
        apply_migration(conn, version)?;
        set_schema_version(conn, version)?;
    }

    Ok(())
}

/// Apply a specific migration version
fn apply_migration(conn: &Connection, version: i32) -> Result<()> {
    match version {
        1 => migrate_v1(conn),
        _ => panic!("Unknown migration version: {}", version),
    }
}

/// Initial schema - Version 1
///
/// Creates the five config store entities:
/// - subsystems: one per source schema under a project
/// - tables: per-table metadata and processing state
/// - columns: per-(table, ordinal) column metadata
/// - foreign_keys: reflected constraints with enablement state
/// - files: captured document archives (opaque to the engine)
fn migrate_v1(conn: &Connection) -> Result<()> {
    debug!("Creating config store schema version 1");

    conn.execute_batch(
        "
        -- Subsystems: one per source schema under a project
        CREATE TABLE subsystems (
            name TEXT PRIMARY KEY,
            source_schema TEXT,
            target_schema TEXT,
            source_type TEXT NOT NULL,
            target_type TEXT NOT NULL,
            invocation TEXT
        );

        -- Tables: one per source table, with processing state
        CREATE TABLE tables (
            source_name TEXT PRIMARY KEY,
            norm_name TEXT NOT NULL,
            target_name TEXT,
            source_row_count INTEGER NOT NULL DEFAULT 0,
            target_row_count INTEGER NOT NULL DEFAULT 0,
            source_pk TEXT,
            target_pk TEXT,
            deps TEXT,
            deps_order INTEGER,
            cp_error INTEGER NOT NULL DEFAULT 0,
            del_error INTEGER NOT NULL DEFAULT 0,
            include INTEGER NOT NULL DEFAULT 0,
            created INTEGER NOT NULL DEFAULT 0,
            validated INTEGER NOT NULL DEFAULT 0,
            empty_rows INTEGER NOT NULL DEFAULT 0
        );

        CREATE UNIQUE INDEX idx_tables_norm_name ON tables(norm_name);
        CREATE INDEX idx_tables_deps_order ON tables(deps_order);

        -- Columns: one per (table, ordinal), keyed '<table>*<position>'
        CREATE TABLE columns (
            tbl_col_pos TEXT PRIMARY KEY,
            source_table TEXT NOT NULL,
            source_column TEXT NOT NULL,
            norm_column TEXT,
            target_column TEXT,
            jdbc_data_type INTEGER,
            source_data_type TEXT,
            target_data_type TEXT,
            source_column_size INTEGER NOT NULL DEFAULT 0,
            target_column_size INTEGER,
            fixed_size INTEGER NOT NULL DEFAULT 0,
            source_column_nullable INTEGER NOT NULL DEFAULT 1,
            target_column_nullable INTEGER,
            source_column_position INTEGER NOT NULL,
            target_column_position INTEGER,
            source_column_autoincrement TEXT,
            target_column_autoincrement TEXT,
            source_column_default TEXT,
            target_column_default TEXT,
            FOREIGN KEY (source_table) REFERENCES tables(source_name)
        );

        CREATE INDEX idx_columns_source_table ON columns(source_table);

        -- Foreign keys: one per constraint, named '<table[:25]>*<index>'
        CREATE TABLE foreign_keys (
            source_name TEXT PRIMARY KEY,
            target_name TEXT,
            tbl_col_pos TEXT,
            ref_tbl_col_pos TEXT,
            source_table TEXT NOT NULL,
            target_table TEXT,
            source_column TEXT NOT NULL,
            target_column TEXT,
            source_ref_table TEXT NOT NULL,
            target_ref_table TEXT,
            source_ref_column TEXT NOT NULL,
            target_ref_column TEXT,
            is_enabled INTEGER NOT NULL DEFAULT 0,
            FOREIGN KEY (source_table) REFERENCES tables(source_name),
            FOREIGN KEY (tbl_col_pos) REFERENCES columns(tbl_col_pos),
            FOREIGN KEY (ref_tbl_col_pos) REFERENCES columns(tbl_col_pos)
        );

        CREATE INDEX idx_fk_source_table ON foreign_keys(source_table);
        CREATE INDEX idx_fk_ref_table ON foreign_keys(source_ref_table);

        -- Files: captured document archives; opaque to the core engine
        CREATE TABLE files (
            source_path TEXT PRIMARY KEY,
            tar_path TEXT NOT NULL,
            tar_checksum TEXT,
            tar_mtime TEXT,
            tar_status TEXT
        );
        ",
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn create_test_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute("PRAGMA foreign_keys = ON", []).unwrap();
        conn
    }

    #[test]
    fn test_schema_version_tracking() {
        let conn = create_test_db();

        // Initial version should be 0
        let version = get_schema_version(&conn).unwrap();
        assert_eq!(version, 0);

        // Set version to 1
        set_schema_version(&conn, 1).unwrap();
        let version = get_schema_version(&conn).unwrap();
        assert_eq!(version, 1);
    }

    #[test]
    fn test_migrate_creates_all_tables() {
        let conn = create_test_db();
        migrate(&conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();

        for expected in [
            "subsystems",
            "tables",
            "columns",
            "foreign_keys",
            "files",
            "schema_version",
        ] {
            assert!(tables.contains(&expected.to_string()), "missing {expected}");
        }
    }

    #[test]
    fn test_migrate_is_idempotent() {
        let conn = create_test_db();

        // Run migration twice
        migrate(&conn).unwrap();
        let version1 = get_schema_version(&conn).unwrap();

        migrate(&conn).unwrap();
        let version2 = get_schema_version(&conn).unwrap();

        assert_eq!(version1, version2);
        assert_eq!(version1, SCHEMA_VERSION);
    }

    #[test]
    fn test_norm_name_uniqueness() {
        let conn = create_test_db();
        migrate(&conn).unwrap();

        conn.execute(
            "INSERT INTO tables (source_name, norm_name) VALUES ('A', 'a')",
            [],
        )
        .unwrap();
        // Distinct source names normalizing to the same name violate scope
        // uniqueness and must be rejected by the store
        let result = conn.execute(
            "INSERT INTO tables (source_name, norm_name) VALUES ('a ', 'a')",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_column_requires_table() {
        let conn = create_test_db();
        migrate(&conn).unwrap();

        let result = conn.execute(
            "INSERT INTO columns (tbl_col_pos, source_table, source_column, source_column_position)
             VALUES ('GHOST*1', 'GHOST', 'ID', 1)",
            [],
        );
        assert!(result.is_err());
    }
}
