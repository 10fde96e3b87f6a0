// src/config.rs

//! Driver and alias configuration
//!
//! Arkiv reads a YAML configuration file with two top-level maps:
//!
//! ```yaml
//! drivers:
//!   postgresql:
//!     jar: /opt/jars/postgresql.jar
//!     class: org.postgresql.Driver
//!     url: jdbc:postgresql://{host}:{port}/{database}
//! aliases:
//!   crm: jdbc:postgresql://db1:5432/crm?user=x&password=y
//! ```
//!
//! A driver entry missing `jar`, `class` or `url` is a hard configuration
//! error. Aliases expand to full connection URLs before parsing.

use crate::dialect::DbKind;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// One driver definition from the configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverEntry {
    /// Path to the driver jar
    pub jar: String,
    /// Fully qualified driver class name
    pub class: String,
    /// URL template for this dialect
    pub url: String,
}

/// Raw driver entry as parsed, before required-field validation.
#[derive(Debug, Deserialize)]
struct RawDriverEntry {
    jar: Option<String>,
    class: Option<String>,
    url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawSettings {
    #[serde(default)]
    drivers: HashMap<String, RawDriverEntry>,
    #[serde(default)]
    aliases: HashMap<String, String>,
}

/// Validated configuration file contents.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub drivers: HashMap<String, DriverEntry>,
    pub aliases: HashMap<String, String>,
}

impl Settings {
    /// Load and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!("Cannot read config file {}: {e}", path.display()))
        })?;
        Self::parse(&text)
    }

    /// Parse configuration text, rejecting incomplete driver entries.
    pub fn parse(text: &str) -> Result<Self> {
        let raw: RawSettings = serde_yaml::from_str(text)?;

        let mut drivers = HashMap::new();
        for (name, entry) in raw.drivers {
            let missing = [
                ("jar", entry.jar.is_none()),
                ("class", entry.class.is_none()),
                ("url", entry.url.is_none()),
            ]
            .iter()
            .filter(|(_, absent)| *absent)
            .map(|(field, _)| *field)
            .collect::<Vec<_>>();

            if !missing.is_empty() {
                return Err(Error::Configuration(format!(
                    "Driver '{name}' is missing required field(s): {}",
                    missing.join(", ")
                )));
            }

            drivers.insert(
                name,
                DriverEntry {
                    jar: entry.jar.unwrap(),
                    class: entry.class.unwrap(),
                    url: entry.url.unwrap(),
                },
            );
        }

        Ok(Settings {
            drivers,
            aliases: raw.aliases,
        })
    }

    /// Expand an alias to its full URL, or return the input unchanged.
    pub fn expand_alias<'a>(&'a self, login: &'a str) -> &'a str {
        self.aliases.get(login).map(String::as_str).unwrap_or(login)
    }

    /// The driver entry for a database family, if configured.
    pub fn driver(&self, kind: DbKind) -> Option<&DriverEntry> {
        self.drivers.get(kind.as_str())
    }
}

/// Phase after which a copy run pauses for manual editing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum StopPhase {
    /// After the included-tables list is written
    Tables,
    /// After the datapackage descriptor is generated
    Json,
    /// After DDL generation
    Ddl,
    /// After copy statements are generated
    Copy,
}

/// Plain record of the options a run was invoked with.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Pause after this phase for manual editing
    pub stop: Option<StopPhase>,
    /// Delete copied data after verification (pipeline test run)
    pub test: bool,
    /// Print generated SQL
    pub debug: bool,
    /// Suppress blob copy (blob columns become NULL in the target)
    pub no_blobs: bool,
    /// Source schema override
    pub schema: Option<String>,
    /// Strip NUL bytes from text columns in the export source before
    /// streaming. Mutates the source database; defaults to on for SQLite
    /// sources only.
    pub scrub_nul_bytes: Option<bool>,
    /// Streaming batch size for fetches
    pub batch_size: usize,
}

impl RunOptions {
    pub fn new() -> Self {
        RunOptions {
            batch_size: 100_000,
            ..Default::default()
        }
    }

    /// Whether processing continues past the given phase.
    pub fn continues_past(&self, phase: StopPhase) -> bool {
        self.stop != Some(phase)
    }
}
