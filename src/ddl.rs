// src/ddl.rs

//! DDL generation
//!
//! Renders CREATE TABLE statements for a target dialect from the
//! datapackage descriptor. Two files are produced: base DDL (tables,
//! primary keys, checks, enums) and FK DDL (the same plus foreign-key
//! constraints). SQLite cannot add foreign keys after creation, so for
//! SQLite targets only the FK form exists and is the one applied.

use crate::datapackage::{Field, Package, Resource};
use crate::dialect::{Dialect, DbKind};
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::info;

/// Render the column type of one field.
fn column_type(field: &Field, resource: &Resource, dialect: &dyn Dialect) -> String {
    let constraints = field.constraints.as_ref();

    if let Some(values) = constraints.and_then(|c| c.enum_values.as_ref()) {
        if field.field_type == "string" && dialect.supports_enum() {
            if dialect.name() == "mysql" {
                let quoted: Vec<String> =
                    values.iter().map(|v| format!("'{}'", v.replace('\'', "''"))).collect();
                return format!("ENUM({})", quoted.join(", "));
            }
            return format!("{}_{}_enum", resource.name, field.name);
        }
    }

    let max_length = field.max_length();
    if max_length > 0 {
        return dialect.varchar(max_length);
    }

    dialect.ddl_type(field.jdbc_code(), 0)
}

/// Named enum types needed before the CREATE TABLE (PostgreSQL style).
fn enum_type_ddl(resource: &Resource, dialect: &dyn Dialect) -> Vec<String> {
    let mut statements = Vec::new();
    if !dialect.supports_enum() || dialect.name() == "mysql" {
        return statements;
    }
    for field in &resource.schema.fields {
        if field.field_type != "string" {
            continue;
        }
        let Some(values) = field
            .constraints
            .as_ref()
            .and_then(|c| c.enum_values.as_ref())
        else {
            continue;
        };
        let quoted: Vec<String> = values
            .iter()
            .map(|v| format!("'{}'", v.replace('\'', "''")))
            .collect();
        statements.push(format!(
            "CREATE TYPE {} AS ENUM ({})",
            dialect.quote(&format!("{}_{}_enum", resource.name, field.name)),
            quoted.join(", ")
        ));
    }
    statements
}

/// Render one CREATE TABLE statement.
fn render_table(resource: &Resource, dialect: &dyn Dialect, with_fk: bool) -> String {
    let mut lines: Vec<String> = Vec::new();

    for field in &resource.schema.fields {
        let quoted = dialect.quote(&field.name);
        let mut column = format!("\t{quoted} {}", column_type(field, resource, dialect));

        if field.required() {
            column.push_str(" NOT NULL");
        }

        let constraints = field.constraints.as_ref();
        let unique = constraints.and_then(|c| c.unique).unwrap_or(false);
        if unique && (dialect.allows_text_unique() || field.field_type != "string") {
            column.push_str(" UNIQUE");
        }

        if let Some(pattern) = constraints.and_then(|c| c.pattern.as_ref()) {
            column.push_str(&format!(" CHECK ({})", dialect.regex_check(&quoted, pattern)));
        }
        if let Some(values) = constraints.and_then(|c| c.enum_values.as_ref()) {
            if field.field_type == "string" && !dialect.supports_enum() {
                let quoted_values: Vec<String> = values
                    .iter()
                    .map(|v| format!("'{}'", v.replace('\'', "''")))
                    .collect();
                column.push_str(&format!(" CHECK ({quoted} IN ({}))", quoted_values.join(", ")));
            }
        }

        lines.push(column);
    }

    if let Some(pk) = &resource.schema.primary_key {
        let quoted: Vec<String> = pk.iter().map(|column| dialect.quote(column)).collect();
        lines.push(format!("\tPRIMARY KEY ({})", quoted.join(", ")));
    }

    if with_fk {
        if let Some(fks) = &resource.schema.foreign_keys {
            for fk in fks {
                lines.push(format!(
                    "\tFOREIGN KEY ({}) REFERENCES {} ({})",
                    dialect.quote(&fk.fields),
                    dialect.quote(&fk.reference.resource),
                    dialect.quote(&fk.reference.fields)
                ));
            }
        }
    }

    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n{}\n)",
        dialect.quote(&resource.name),
        lines.join(",\n")
    )
}

/// Render a whole DDL file in descriptor (dependency) order.
pub fn render_package(package: &Package, target_kind: DbKind, with_fk: bool) -> String {
    let dialect = target_kind.dialect();
    let mut out = String::new();
    for resource in &package.resources {
        for enum_ddl in enum_type_ddl(resource, dialect) {
            out.push_str(&enum_ddl);
            out.push_str(";\n\n");
        }
        out.push_str(&render_table(resource, dialect, with_fk));
        out.push_str(";\n\n");
    }
    out
}

/// Generate the DDL files for a target dialect and return the path of
/// the file the executor applies: the FK form for SQLite, the base form
/// for everything else.
pub fn create_ddl(
    schema_path: &Path,
    ddl_path: &Path,
    fk_ddl_path: &Path,
    target_kind: DbKind,
    changed: bool,
) -> Result<PathBuf> {
    let mut files = vec![(fk_ddl_path, true)];
    if target_kind != DbKind::Sqlite {
        files.push((ddl_path, false));
    }

    for (path, with_fk) in files {
        if path.is_file() && !changed {
            info!("DDL for schema already generated.");
            continue;
        }
        if !schema_path.is_file() {
            return Err(Error::Configuration(format!(
                "JSON schema file '{}' missing",
                schema_path.display()
            )));
        }

        info!("Generating DDL from datapackage json schema...");
        if path.is_file() {
            std::fs::remove_file(path)?;
        }

        let package = Package::from_path(schema_path)?;
        std::fs::write(path, render_package(&package, target_kind, with_fk))?;
    }

    if target_kind == DbKind::Sqlite {
        Ok(fk_ddl_path.to_path_buf())
    } else {
        Ok(ddl_path.to_path_buf())
    }
}

/// The table name of a `CREATE TABLE IF NOT EXISTS` statement, with
/// dialect quoting stripped. Used when replaying edited DDL files.
pub fn table_of_statement(statement: &str) -> Option<String> {
    let rest = statement.split("CREATE TABLE IF NOT EXISTS ").nth(1)?;
    let name = rest.split(" (").next()?.trim();
    Some(name.trim_matches(|c| c == '"' || c == '`' || c == '[' || c == ']').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datapackage::{Constraints, Field, ForeignKeyRef, Reference, Resource, TableSchema, TsvDialect};

    fn field(name: &str, field_type: &str, code: i32, constraints: Option<Constraints>) -> Field {
        Field {
            name: name.to_string(),
            field_type: field_type.to_string(),
            jdbc_type: code.to_string(),
            db_column_name: name.to_uppercase(),
            constraints,
        }
    }

    fn sample_package() -> Package {
        let a = Resource {
            name: "a".to_string(),
            profile: "tabular-data-resource".to_string(),
            path: "data/a.tsv".to_string(),
            encoding: "UTF-8".to_string(),
            db_table_name: "A".to_string(),
            db_table_deps: "A".to_string(),
            count_of_rows: "2".to_string(),
            schema: TableSchema {
                fields: vec![
                    field("id", "integer", 4, Some(Constraints { required: Some(true), ..Default::default() })),
                    field("name", "string", 12, Some(Constraints { max_length: Some(100), ..Default::default() })),
                    field("notes", "string", -1, None),
                ],
                primary_key: Some(vec!["id".to_string()]),
                foreign_keys: None,
            },
            dialect: TsvDialect::default(),
        };
        let b = Resource {
            name: "b".to_string(),
            profile: "tabular-data-resource".to_string(),
            path: "data/b.tsv".to_string(),
            encoding: "UTF-8".to_string(),
            db_table_name: "B".to_string(),
            db_table_deps: "A".to_string(),
            count_of_rows: "2".to_string(),
            schema: TableSchema {
                fields: vec![
                    field("id", "integer", 4, Some(Constraints { required: Some(true), ..Default::default() })),
                    field("a_id", "integer", 4, None),
                ],
                primary_key: Some(vec!["id".to_string()]),
                foreign_keys: Some(vec![ForeignKeyRef {
                    fields: "a_id".to_string(),
                    reference: Reference {
                        resource: "a".to_string(),
                        fields: "id".to_string(),
                    },
                }]),
            },
            dialect: TsvDialect::default(),
        };
        Package {
            name: "proj".to_string(),
            profile: "tabular-data-package".to_string(),
            resources: vec![a, b],
        }
    }

    #[test]
    fn test_render_base_ddl() {
        let ddl = render_package(&sample_package(), DbKind::Sqlite, false);
        assert!(ddl.contains("CREATE TABLE IF NOT EXISTS \"a\""));
        assert!(ddl.contains("\"id\" integer NOT NULL"));
        assert!(ddl.contains("\"name\" varchar(100)"));
        // Unbounded string renders as the dialect text type
        assert!(ddl.contains("\"notes\" clob"));
        assert!(ddl.contains("PRIMARY KEY (\"id\")"));
        assert!(!ddl.contains("FOREIGN KEY"));
        // Referenced table comes first
        assert!(ddl.find("\"a\"").unwrap() < ddl.find("\"b\"").unwrap());
    }

    #[test]
    fn test_render_fk_ddl() {
        let ddl = render_package(&sample_package(), DbKind::Sqlite, true);
        assert!(ddl.contains("FOREIGN KEY (\"a_id\") REFERENCES \"a\" (\"id\")"));
    }

    #[test]
    fn test_oracle_promotes_oversized_varchar() {
        let mut package = sample_package();
        package.resources[0].schema.fields[1].constraints = Some(Constraints {
            max_length: Some(4001),
            ..Default::default()
        });
        let ddl = render_package(&package, DbKind::Oracle, false);
        assert!(ddl.contains("\"name\" clob"));
    }

    #[test]
    fn test_enum_rendering_per_dialect() {
        let mut package = sample_package();
        package.resources[0].schema.fields[1].constraints = Some(Constraints {
            enum_values: Some(vec!["red".to_string(), "blue".to_string()]),
            ..Default::default()
        });

        let pg = render_package(&package, DbKind::Postgresql, false);
        assert!(pg.contains("CREATE TYPE \"a_name_enum\" AS ENUM ('red', 'blue')"));
        assert!(pg.contains("\"name\" a_name_enum"));

        let my = render_package(&package, DbKind::Mysql, false);
        assert!(my.contains("`name` ENUM('red', 'blue')"));
        assert!(!my.contains("CREATE TYPE"));

        let sq = render_package(&package, DbKind::Sqlite, false);
        assert!(sq.contains("CHECK (\"name\" IN ('red', 'blue'))"));
    }

    #[test]
    fn test_pattern_check_per_dialect() {
        let mut package = sample_package();
        package.resources[0].schema.fields[1].constraints = Some(Constraints {
            pattern: Some("^[a-z]+$".to_string()),
            ..Default::default()
        });

        let pg = render_package(&package, DbKind::Postgresql, false);
        assert!(pg.contains("CHECK (\"name\" ~ '^[a-z]+$')"));
        let sq = render_package(&package, DbKind::Sqlite, false);
        assert!(sq.contains("CHECK (\"name\" REGEXP '^[a-z]+$')"));
    }

    #[test]
    fn test_mysql_drops_unique_on_text() {
        let mut package = sample_package();
        package.resources[0].schema.fields[1].constraints = Some(Constraints {
            unique: Some(true),
            ..Default::default()
        });

        let my = render_package(&package, DbKind::Mysql, false);
        assert!(!my.contains("UNIQUE"));
        let pg = render_package(&package, DbKind::Postgresql, false);
        assert!(pg.contains("\"name\" text UNIQUE"));
    }

    #[test]
    fn test_create_ddl_files() {
        let tmp = tempfile::tempdir().unwrap();
        let schema_path = tmp.path().join("datapackage.json");
        sample_package().write(&schema_path).unwrap();
        let ddl_path = tmp.path().join("sqlite-ddl.sql");
        let fk_path = tmp.path().join("sqlite-fk-ddl.sql");

        let apply = create_ddl(&schema_path, &ddl_path, &fk_path, DbKind::Sqlite, true).unwrap();
        // SQLite merges the two forms into the FK file
        assert_eq!(apply, fk_path);
        assert!(fk_path.is_file());
        assert!(!ddl_path.is_file());

        let apply = create_ddl(
            &schema_path,
            &tmp.path().join("postgresql-ddl.sql"),
            &tmp.path().join("postgresql-fk-ddl.sql"),
            DbKind::Postgresql,
            true,
        )
        .unwrap();
        assert!(apply.ends_with("postgresql-ddl.sql"));
        assert!(tmp.path().join("postgresql-fk-ddl.sql").is_file());
    }

    #[test]
    fn test_table_of_statement() {
        assert_eq!(
            table_of_statement("CREATE TABLE IF NOT EXISTS \"orders\" (\n\t\"id\" integer\n)"),
            Some("orders".to_string())
        );
        assert_eq!(
            table_of_statement("CREATE TABLE IF NOT EXISTS `orders` (`id` integer)"),
            Some("orders".to_string())
        );
        assert_eq!(table_of_statement("DROP TABLE x"), None);
    }
}
