// src/lib.rs

//! Arkiv database preservation engine
//!
//! Extracts the contents of a relational database, transforms it into a
//! portable, self-describing tabular archive (a datapackage of UTF-8 TSV
//! files), and optionally re-materializes that archive into a different
//! database.
//!
//! # Architecture
//!
//! - Config-store-first: all reflected metadata and per-table processing
//!   state lives in an embedded SQLite store that survives restarts
//! - Every intermediate artefact (metadata store, schema file, DDL, copy
//!   plan, TSV export) is derivable from the previous one and re-entrant
//!   after failure
//! - Dialect differences (quoting, TRUNCATE vs DELETE, date formatting)
//!   are isolated behind one polymorphic dialect object per database

pub mod config;
pub mod copyplan;
pub mod datapackage;
pub mod db;
pub mod ddl;
pub mod dialect;
mod error;
pub mod executor;
pub mod export;
pub mod project;
pub mod reflect;
pub mod resolver;
pub mod source;
pub mod types;
pub mod validate;

pub use error::{Error, Result};
