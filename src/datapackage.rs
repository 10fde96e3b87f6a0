// src/datapackage.rs

//! Datapackage descriptor
//!
//! The self-describing envelope of an archive: one resource per included,
//! non-empty table in dependency order, each carrying its TSV dialect,
//! field schema, primary key and the foreign keys internal to the
//! included set. Original database names ride along as custom attributes
//! (`db_table_name`, `db_column_name`, `jdbc_type`) so the descriptor can
//! round-trip back into a relational schema.

use crate::db::models::{ColumnEntry, ForeignKeyEntry, TableEntry};
use crate::dialect::DbKind;
use crate::error::Result;
use crate::types;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Top-level tabular-data-package envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Package {
    pub name: String,
    pub profile: String,
    pub resources: Vec<Resource>,
}

/// One table's worth of archive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    pub name: String,
    pub profile: String,
    pub path: String,
    pub encoding: String,
    /// Original table name in the source database
    pub db_table_name: String,
    /// Comma-joined immediate dependencies (source names)
    pub db_table_deps: String,
    /// Stringified row count, all-NULL rows excluded
    pub count_of_rows: String,
    pub schema: TableSchema,
    pub dialect: TsvDialect,
}

/// The fixed TSV dialect: tab delimited, never quoted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TsvDialect {
    pub delimiter: String,
    #[serde(rename = "quoteChar")]
    pub quote_char: String,
    #[serde(rename = "escapeChar")]
    pub escape_char: String,
    #[serde(rename = "doubleQuote")]
    pub double_quote: bool,
    #[serde(rename = "skipInitialSpace")]
    pub skip_initial_space: bool,
}

impl Default for TsvDialect {
    fn default() -> Self {
        TsvDialect {
            delimiter: "\t".to_string(),
            quote_char: "\0".to_string(),
            escape_char: "\0".to_string(),
            double_quote: false,
            skip_initial_space: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSchema {
    pub fields: Vec<Field>,
    #[serde(rename = "primaryKey", skip_serializing_if = "Option::is_none")]
    pub primary_key: Option<Vec<String>>,
    #[serde(rename = "foreignKeys", skip_serializing_if = "Option::is_none")]
    pub foreign_keys: Option<Vec<ForeignKeyRef>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    /// Original abstract type code, kept as a string for round-trips
    pub jdbc_type: String,
    pub db_column_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub constraints: Option<Constraints>,
}

impl Field {
    /// The abstract type code this field was reflected with.
    pub fn jdbc_code(&self) -> i32 {
        self.jdbc_type.parse().unwrap_or(12)
    }

    pub fn max_length(&self) -> i64 {
        self.constraints
            .as_ref()
            .and_then(|constraints| constraints.max_length)
            .unwrap_or(0)
    }

    pub fn required(&self) -> bool {
        self.constraints
            .as_ref()
            .and_then(|constraints| constraints.required)
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Constraints {
    #[serde(rename = "maxLength", skip_serializing_if = "Option::is_none")]
    pub max_length: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(rename = "enum", skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unique: Option<bool>,
}

impl Constraints {
    fn is_empty(&self) -> bool {
        self.max_length.is_none()
            && self.required.is_none()
            && self.pattern.is_none()
            && self.enum_values.is_none()
            && self.unique.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForeignKeyRef {
    pub fields: String,
    pub reference: Reference,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reference {
    pub resource: String,
    pub fields: String,
}

impl Package {
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn resource(&self, name: &str) -> Option<&Resource> {
        self.resources.iter().find(|resource| resource.name == name)
    }
}

/// Whether a field's `maxLength` constraint is emitted: character-like
/// code, a known positive size at or below the LOB threshold, and not an
/// Oracle LONG column (whose reported size is unreliable).
fn emits_max_length(code: i32, size: i64, source_kind: DbKind) -> bool {
    types::is_character(code)
        && size > 0
        && size <= types::LOB_THRESHOLD
        && !(code == -1 && source_kind == DbKind::Oracle)
}

/// Generate the datapackage descriptor from the config store.
///
/// Idempotent: when the file exists, nothing changed since the last run
/// and no partial subset was requested, the file is left untouched.
/// A non-empty `tables` filter produces a partial descriptor (used for
/// batched validation during export).
pub fn create_schema(
    store: &rusqlite::Connection,
    schema_path: &Path,
    package_name: &str,
    source_kind: DbKind,
    tables: &[String],
    changed: bool,
) -> Result<()> {
    let partial = !tables.is_empty();

    if schema_path.is_file() && !changed && !partial {
        info!("Datapackage descriptor already generated.");
        return Ok(());
    }
    if schema_path.is_file() {
        std::fs::remove_file(schema_path)?;
    }
    if !partial {
        info!("Generating datapackage.json...");
    }

    let package_name = if partial { "partial" } else { package_name };
    let norm_tables = TableEntry::norm_map(store)?;
    let norm_columns = ColumnEntry::norm_map(store)?;

    let mut resources = Vec::new();
    for table in TableEntry::list_included(store)? {
        if partial && !tables.contains(&table.source_name) {
            continue;
        }

        let pk_columns: Vec<String> = table
            .source_pk
            .as_deref()
            .unwrap_or("")
            .split(',')
            .filter(|part| !part.is_empty())
            .map(str::to_string)
            .collect();

        let mut fields = Vec::new();
        let mut primary_key = Vec::new();
        for column in ColumnEntry::for_table(store, &table.source_name)? {
            let code = column.jdbc_data_type.unwrap_or(12);
            let norm_column = column.norm_column.clone().unwrap_or_default();

            let mut constraints = Constraints::default();
            if emits_max_length(code, column.source_column_size, source_kind) {
                constraints.max_length = Some(column.source_column_size);
            }
            if pk_columns.contains(&column.source_column) {
                constraints.required = Some(true);
                primary_key.push(norm_column.clone());
            }

            fields.push(Field {
                name: norm_column,
                field_type: types::datapackage_type(code).to_string(),
                jdbc_type: code.to_string(),
                db_column_name: column.source_column,
                constraints: if constraints.is_empty() {
                    None
                } else {
                    Some(constraints)
                },
            });
        }

        let mut foreign_keys = Vec::new();
        for fk in ForeignKeyEntry::enabled_for_table(store, &table.source_name)? {
            // Edges leaving the included set are dropped silently
            let Some(ref_resource) = norm_tables.get(&fk.source_ref_table) else {
                continue;
            };
            let local = norm_columns
                .get(&format!("{}:{}", fk.source_table, fk.source_column))
                .cloned()
                .unwrap_or_else(|| fk.source_column.to_lowercase());
            let referenced = norm_columns
                .get(&format!("{}:{}", fk.source_ref_table, fk.source_ref_column))
                .cloned()
                .unwrap_or_else(|| fk.source_ref_column.to_lowercase());

            foreign_keys.push(ForeignKeyRef {
                fields: local,
                reference: Reference {
                    resource: ref_resource.clone(),
                    fields: referenced,
                },
            });
        }

        resources.push(Resource {
            name: table.norm_name.clone(),
            profile: "tabular-data-resource".to_string(),
            path: format!("data/{}.tsv", table.norm_name),
            encoding: "UTF-8".to_string(),
            db_table_name: table.source_name.clone(),
            db_table_deps: table.deps.clone().unwrap_or_default(),
            count_of_rows: (table.source_row_count - table.empty_rows).to_string(),
            schema: TableSchema {
                fields,
                primary_key: if primary_key.is_empty() {
                    None
                } else {
                    Some(primary_key)
                },
                foreign_keys: if foreign_keys.is_empty() {
                    None
                } else {
                    Some(foreign_keys)
                },
            },
            dialect: TsvDialect::default(),
        });
    }

    let package = Package {
        name: package_name.to_string(),
        profile: "tabular-data-package".to_string(),
        resources,
    };
    package.write(schema_path)?;

    Ok(())
}
