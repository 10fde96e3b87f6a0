// src/validate.rs

//! Datapackage validation
//!
//! Verifies that exported TSVs conform to the descriptor: logical type,
//! `required`, `maxLength` and `enum` constraints hold row by row,
//! primary keys are unique and non-null, and foreign-key references
//! resolve against the referenced resource. Side-effect-free on success;
//! failures produce a structured report.

use crate::datapackage::{Field, Package, Resource};
use crate::error::Result;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;
use tracing::debug;

/// Issues kept per resource before the rest are dropped from the report.
const MAX_ISSUES_PER_RESOURCE: usize = 100;

/// One validation finding.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationIssue {
    pub resource: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub message: String,
}

/// Structured validation outcome.
#[derive(Debug, Default, Serialize)]
pub struct ValidationReport {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.issues.is_empty()
    }

    /// Normalized names of every resource with at least one issue.
    pub fn failing_resources(&self) -> BTreeSet<String> {
        self.issues
            .iter()
            .map(|issue| issue.resource.clone())
            .collect()
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    fn push(&mut self, resource: &str, row: Option<u64>, field: Option<&str>, message: String) {
        let count = self
            .issues
            .iter()
            .filter(|issue| issue.resource == resource)
            .count();
        if count >= MAX_ISSUES_PER_RESOURCE {
            return;
        }
        self.issues.push(ValidationIssue {
            resource: resource.to_string(),
            row,
            field: field.map(str::to_string),
            message,
        });
    }
}

/// Check one non-empty cell against its declared logical type.
fn type_error(field: &Field, value: &str) -> Option<String> {
    let ok = match field.field_type.as_str() {
        "integer" | "year" => value.parse::<i64>().is_ok(),
        "number" => value.parse::<f64>().is_ok(),
        "boolean" => matches!(
            value.to_ascii_lowercase().as_str(),
            "true" | "false" | "0" | "1"
        ),
        "date" => NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok(),
        "time" => NaiveTime::parse_from_str(value, "%H:%M:%S").is_ok(),
        "datetime" => {
            NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S").is_ok()
                || NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S").is_ok()
                || NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f").is_ok()
        }
        _ => true,
    };
    if ok {
        None
    } else {
        Some(format!(
            "value '{value}' is not a valid {}",
            field.field_type
        ))
    }
}

fn tsv_reader(path: &Path) -> Result<csv::Reader<std::fs::File>> {
    Ok(csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .quoting(false)
        .has_headers(false)
        .flexible(true)
        .from_path(path)?)
}

/// Validate one resource's TSV. Collects values of columns other
/// resources reference so foreign keys can be resolved afterwards.
fn validate_resource(
    resource: &Resource,
    data_dir: &Path,
    referenced: &HashMap<String, HashSet<String>>,
    key_values: &mut HashMap<(String, String), HashSet<String>>,
    report: &mut ValidationReport,
) -> Result<Vec<(u64, String, String, String, String)>> {
    let name = resource.name.as_str();
    let file_name = Path::new(&resource.path)
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_else(|| format!("{name}.tsv"));
    let tsv_path = data_dir.join(file_name);

    if !tsv_path.is_file() {
        report.push(name, None, None, format!("missing data file '{}'", resource.path));
        return Ok(Vec::new());
    }

    let fields = &resource.schema.fields;
    let no_columns = HashSet::new();
    let collect_columns = referenced.get(name).unwrap_or(&no_columns);

    let fk_specs: Vec<(usize, String, String)> = resource
        .schema
        .foreign_keys
        .as_ref()
        .map(|fks| {
            fks.iter()
                .filter_map(|fk| {
                    fields
                        .iter()
                        .position(|field| field.name == fk.fields)
                        .map(|idx| (idx, fk.reference.resource.clone(), fk.reference.fields.clone()))
                })
                .collect()
        })
        .unwrap_or_default();

    let pk_indices: Vec<usize> = resource
        .schema
        .primary_key
        .as_ref()
        .map(|pk| {
            pk.iter()
                .filter_map(|column| fields.iter().position(|field| &field.name == column))
                .collect()
        })
        .unwrap_or_default();

    let mut reader = tsv_reader(&tsv_path)?;
    let mut records = reader.records();

    // Header row must list the declared fields in order
    match records.next() {
        Some(header) => {
            let header = header?;
            let expected: Vec<&str> = fields.iter().map(|field| field.name.as_str()).collect();
            let found: Vec<&str> = header.iter().collect();
            if found != expected {
                report.push(
                    name,
                    Some(1),
                    None,
                    format!("header mismatch: expected {expected:?}, found {found:?}"),
                );
                return Ok(Vec::new());
            }
        }
        None => {
            report.push(name, None, None, "data file has no header row".to_string());
            return Ok(Vec::new());
        }
    }

    let mut seen_keys: HashSet<String> = HashSet::new();
    let mut pending_fks = Vec::new();
    let mut row_number = 1u64;

    for record in records {
        let record = record?;
        row_number += 1;

        if record.len() != fields.len() {
            report.push(
                name,
                Some(row_number),
                None,
                format!("expected {} cells, found {}", fields.len(), record.len()),
            );
            continue;
        }

        for (idx, field) in fields.iter().enumerate() {
            let value = record.get(idx).unwrap_or("");

            if value.is_empty() {
                if field.required() {
                    report.push(
                        name,
                        Some(row_number),
                        Some(&field.name),
                        "required cell is empty".to_string(),
                    );
                }
                continue;
            }

            if let Some(message) = type_error(field, value) {
                report.push(name, Some(row_number), Some(&field.name), message);
            }

            if let Some(constraints) = &field.constraints {
                if let Some(max_length) = constraints.max_length {
                    let length = value.chars().count() as i64;
                    if length > max_length {
                        report.push(
                            name,
                            Some(row_number),
                            Some(&field.name),
                            format!("length {length} exceeds maxLength {max_length}"),
                        );
                    }
                }
                if let Some(values) = &constraints.enum_values {
                    if !values.iter().any(|allowed| allowed == value) {
                        report.push(
                            name,
                            Some(row_number),
                            Some(&field.name),
                            format!("value '{value}' not in enum"),
                        );
                    }
                }
            }

            if collect_columns.contains(&field.name) {
                key_values
                    .entry((name.to_string(), field.name.clone()))
                    .or_default()
                    .insert(value.to_string());
            }
        }

        if !pk_indices.is_empty() {
            let key: Vec<&str> = pk_indices
                .iter()
                .map(|idx| record.get(*idx).unwrap_or(""))
                .collect();
            if key.iter().any(|part| part.is_empty()) {
                report.push(
                    name,
                    Some(row_number),
                    None,
                    "primary key cell is empty".to_string(),
                );
            } else if !seen_keys.insert(key.join("\u{1f}")) {
                report.push(
                    name,
                    Some(row_number),
                    None,
                    format!("duplicate primary key ({})", key.join(", ")),
                );
            }
        }

        for (idx, ref_resource, ref_field) in &fk_specs {
            let value = record.get(*idx).unwrap_or("");
            if value.is_empty() {
                continue;
            }
            pending_fks.push((
                row_number,
                fields[*idx].name.clone(),
                value.to_string(),
                ref_resource.clone(),
                ref_field.clone(),
            ));
        }
    }

    Ok(pending_fks)
}

/// Validate a set of exported TSVs against a descriptor.
pub fn validate_package(package: &Package, data_dir: &Path) -> Result<ValidationReport> {
    debug!("Validating {} resources", package.resources.len());

    // Which columns foreign keys point at, so their values get collected
    let mut referenced: HashMap<String, HashSet<String>> = HashMap::new();
    for resource in &package.resources {
        if let Some(fks) = &resource.schema.foreign_keys {
            for fk in fks {
                referenced
                    .entry(fk.reference.resource.clone())
                    .or_default()
                    .insert(fk.reference.fields.clone());
            }
        }
    }

    let mut report = ValidationReport::default();
    let mut key_values: HashMap<(String, String), HashSet<String>> = HashMap::new();
    let mut pending: Vec<(String, Vec<(u64, String, String, String, String)>)> = Vec::new();

    for resource in &package.resources {
        let fks = validate_resource(resource, data_dir, &referenced, &mut key_values, &mut report)?;
        if !fks.is_empty() {
            pending.push((resource.name.clone(), fks));
        }
    }

    // Resolve foreign keys once every referenced column is loaded.
    // References to resources outside the package are skipped: the
    // emitter already drops those edges.
    for (resource, checks) in pending {
        for (row, field, value, ref_resource, ref_field) in checks {
            if package.resource(&ref_resource).is_none() {
                continue;
            }
            let resolved = key_values
                .get(&(ref_resource.clone(), ref_field.clone()))
                .map(|values| values.contains(&value))
                .unwrap_or(false);
            if !resolved {
                report.push(
                    &resource,
                    Some(row),
                    Some(&field),
                    format!("value '{value}' not found in {ref_resource}.{ref_field}"),
                );
            }
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datapackage::{Constraints, ForeignKeyRef, Reference, TableSchema, TsvDialect};

    fn field(name: &str, field_type: &str, constraints: Option<Constraints>) -> Field {
        Field {
            name: name.to_string(),
            field_type: field_type.to_string(),
            jdbc_type: "12".to_string(),
            db_column_name: name.to_uppercase(),
            constraints,
        }
    }

    fn resource(
        name: &str,
        fields: Vec<Field>,
        primary_key: Option<Vec<String>>,
        foreign_keys: Option<Vec<ForeignKeyRef>>,
    ) -> Resource {
        Resource {
            name: name.to_string(),
            profile: "tabular-data-resource".to_string(),
            path: format!("data/{name}.tsv"),
            encoding: "UTF-8".to_string(),
            db_table_name: name.to_uppercase(),
            db_table_deps: name.to_uppercase(),
            count_of_rows: "0".to_string(),
            schema: TableSchema {
                fields,
                primary_key,
                foreign_keys,
            },
            dialect: TsvDialect::default(),
        }
    }

    fn two_table_package() -> Package {
        Package {
            name: "t".to_string(),
            profile: "tabular-data-package".to_string(),
            resources: vec![
                resource(
                    "a",
                    vec![
                        field("id", "integer", Some(Constraints { required: Some(true), ..Default::default() })),
                        field("name", "string", Some(Constraints { max_length: Some(5), ..Default::default() })),
                    ],
                    Some(vec!["id".to_string()]),
                    None,
                ),
                resource(
                    "b",
                    vec![
                        field("id", "integer", Some(Constraints { required: Some(true), ..Default::default() })),
                        field("a_id", "integer", None),
                    ],
                    Some(vec!["id".to_string()]),
                    Some(vec![ForeignKeyRef {
                        fields: "a_id".to_string(),
                        reference: Reference {
                            resource: "a".to_string(),
                            fields: "id".to_string(),
                        },
                    }]),
                ),
            ],
        }
    }

    fn write_data(dir: &Path, name: &str, body: &str) {
        std::fs::write(dir.join(format!("{name}.tsv")), body).unwrap();
    }

    #[test]
    fn test_valid_package_passes() {
        let tmp = tempfile::tempdir().unwrap();
        write_data(tmp.path(), "a", "id\tname\n1\talice\n2\tbob\n");
        write_data(tmp.path(), "b", "id\ta_id\n10\t1\n11\t2\n12\t\n");

        let report = validate_package(&two_table_package(), tmp.path()).unwrap();
        assert!(report.is_valid(), "unexpected issues: {:?}", report.issues);
    }

    #[test]
    fn test_type_and_length_violations() {
        let tmp = tempfile::tempdir().unwrap();
        write_data(tmp.path(), "a", "id\tname\nnot-a-number\ttoolongname\n");
        write_data(tmp.path(), "b", "id\ta_id\n");

        let report = validate_package(&two_table_package(), tmp.path()).unwrap();
        assert!(!report.is_valid());
        let messages: Vec<&str> = report.issues.iter().map(|i| i.message.as_str()).collect();
        assert!(messages.iter().any(|m| m.contains("not a valid integer")));
        assert!(messages.iter().any(|m| m.contains("exceeds maxLength")));
        assert_eq!(report.failing_resources(), BTreeSet::from(["a".to_string()]));
    }

    #[test]
    fn test_required_and_pk_checks() {
        let tmp = tempfile::tempdir().unwrap();
        write_data(tmp.path(), "a", "id\tname\n1\tx\n1\ty\n\tz\n");
        write_data(tmp.path(), "b", "id\ta_id\n");

        let report = validate_package(&two_table_package(), tmp.path()).unwrap();
        let messages: Vec<&str> = report.issues.iter().map(|i| i.message.as_str()).collect();
        assert!(messages.iter().any(|m| m.contains("duplicate primary key")));
        assert!(messages.iter().any(|m| m.contains("required cell is empty")));
    }

    #[test]
    fn test_foreign_key_resolution() {
        let tmp = tempfile::tempdir().unwrap();
        write_data(tmp.path(), "a", "id\tname\n1\tx\n");
        // a_id=7 has no counterpart in a.id
        write_data(tmp.path(), "b", "id\ta_id\n10\t1\n11\t7\n");

        let report = validate_package(&two_table_package(), tmp.path()).unwrap();
        assert!(!report.is_valid());
        let issue = &report.issues[0];
        assert_eq!(issue.resource, "b");
        assert_eq!(issue.row, Some(3));
        assert!(issue.message.contains("not found in a.id"));
    }

    #[test]
    fn test_enum_and_datetime_checks() {
        let tmp = tempfile::tempdir().unwrap();
        let package = Package {
            name: "t".to_string(),
            profile: "tabular-data-package".to_string(),
            resources: vec![resource(
                "e",
                vec![
                    field("color", "string", Some(Constraints {
                        enum_values: Some(vec!["red".to_string(), "blue".to_string()]),
                        ..Default::default()
                    })),
                    field("seen", "datetime", None),
                    field("day", "date", None),
                ],
                None,
                None,
            )],
        };
        write_data(
            tmp.path(),
            "e",
            "color\tseen\tday\nred\t2023-01-01 10:00:00\t2023-01-01\ngreen\tnot-a-date\t2023-13-01\n",
        );

        let report = validate_package(&package, tmp.path()).unwrap();
        let messages: Vec<&str> = report.issues.iter().map(|i| i.message.as_str()).collect();
        assert_eq!(messages.len(), 3);
        assert!(messages.iter().any(|m| m.contains("not in enum")));
        assert!(messages.iter().any(|m| m.contains("not a valid datetime")));
        assert!(messages.iter().any(|m| m.contains("not a valid date")));
    }

    #[test]
    fn test_missing_file_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        write_data(tmp.path(), "a", "id\tname\n1\tx\n");

        let report = validate_package(&two_table_package(), tmp.path()).unwrap();
        assert!(!report.is_valid());
        assert!(report.issues[0].message.contains("missing data file"));
    }

    #[test]
    fn test_header_mismatch_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        write_data(tmp.path(), "a", "id\twrong\n1\tx\n");
        write_data(tmp.path(), "b", "id\ta_id\n");

        let report = validate_package(&two_table_package(), tmp.path()).unwrap();
        assert!(report.issues.iter().any(|i| i.message.contains("header mismatch")));
    }

    #[test]
    fn test_report_serialization() {
        let mut report = ValidationReport::default();
        report.push("a", Some(2), Some("id"), "boom".to_string());
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("report.json");
        report.write(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"resource\": \"a\""));
        assert!(text.contains("boom"));
    }
}
