// src/error.rs

use std::path::PathBuf;
use thiserror::Error;

/// Core error types for Arkiv
#[derive(Error, Debug)]
pub enum Error {
    /// Config store errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Datapackage descriptor (de)serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Driver/alias configuration file errors
    #[error("Configuration file error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// TSV read/write errors
    #[error("TSV error: {0}")]
    Tsv(#[from] csv::Error),

    /// Missing driver entry, unparseable URL, invalid source/target
    /// combination. Fatal at start.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The source driver failed to enumerate metadata. The affected
    /// subsystem is not entered.
    #[error("Reflection error: {0}")]
    Reflection(String),

    /// The foreign-key graph is not a DAG. The edge list has been written
    /// to `deps_path` for the operator to edit before re-running.
    #[error("Dependency cycle detected ({}); edge list written to {}", cycles.join("; "), deps_path.display())]
    CycleDetected {
        cycles: Vec<String>,
        deps_path: PathBuf,
    },

    /// The target refused to create one or more tables.
    #[error("DDL failed for tables: {}", tables.join(", "))]
    Ddl { tables: Vec<String> },

    /// Row count mismatch or execution failure while copying.
    #[error("Copy failed for tables: {}", tables.join(", "))]
    Copy { tables: Vec<String> },

    /// The datapackage validator rejected one or more exported tables.
    #[error("Validation failed for tables: {}; report at {}", tables.join(", "), report_path.display())]
    Validation {
        tables: Vec<String>,
        report_path: PathBuf,
    },
}

impl Error {
    /// Process exit code for this error, per the CLI contract:
    /// 2 for a dependency cycle that needs operator action, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::CycleDetected { .. } => 2,
            _ => 1,
        }
    }
}

/// Result type alias using Arkiv's Error type
pub type Result<T> = std::result::Result<T, Error>;
