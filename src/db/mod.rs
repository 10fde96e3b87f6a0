// src/db/mod.rs

//! The config store
//!
//! An embedded SQLite database holding the authoritative working state of
//! a migration run: reflected metadata, normalized names, dependency
//! order and per-table processing flags. All mutating operations go
//! through one connection; write-ahead logging lets progress readers run
//! concurrently. Every mutation is committed immediately so a run can
//! resume after a crash.

pub mod models;
pub mod schema;

use crate::error::Result;
use rusqlite::Connection;
use std::path::Path;
use tracing::debug;

/// Open (creating if necessary) the config store at the given path and
/// bring its schema up to date. Idempotent.
pub fn open(db_path: &Path) -> Result<Connection> {
    debug!("Opening config store at: {}", db_path.display());

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let conn = Connection::open(db_path)?;

    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
        PRAGMA busy_timeout = 5000;
        ",
    )?;

    schema::migrate(&conn)?;

    Ok(conn)
}

/// Open an in-memory config store. Used by tests.
pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    schema::migrate(&conn)?;
    Ok(conn)
}

/// Normalize a table or column name for the target side: lower case,
/// separators to underscores, Nordic diacritics folded, and names past
/// 30 characters truncated and disambiguated with their ordinal.
///
/// Idempotent: normalizing a normalized name returns it unchanged.
pub fn normalize_name(name: &str, index: i64) -> String {
    let mut normalized = String::with_capacity(name.len());
    for ch in name.to_lowercase().chars() {
        match ch {
            ' ' | '-' => normalized.push('_'),
            'æ' => normalized.push_str("ae"),
            'ø' => normalized.push_str("oe"),
            'å' => normalized.push_str("aa"),
            _ => normalized.push(ch),
        }
    }

    if normalized.chars().count() > 30 {
        let prefix: String = normalized.chars().take(25).collect();
        normalized = format!("{prefix}_{index}");
    }

    normalized
}
