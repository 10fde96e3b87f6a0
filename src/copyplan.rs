// src/copyplan.rs

//! Copy planning
//!
//! Emits one copy statement per table in dependency order, written to an
//! editable plan file so the operator can adjust statements between
//! planning and execution. Each statement carries the source query with
//! per-column type adapters, the target connection coordinates, and the
//! execution modifiers (INSERT mode, identity columns preserved, SQLite
//! pre-statement pragmas).

use crate::config::{RunOptions, Settings, StopPhase};
use crate::datapackage::Package;
use crate::dialect::DbKind;
use crate::error::{Error, Result};
use crate::source::DbUrl;
use crate::types;
use std::path::Path;
use tracing::info;

/// Pragmas issued before each statement on SQLite targets.
const SQLITE_PRAGMAS: &str =
    "PRAGMA foreign_keys=0;PRAGMA journal_mode=0;PRAGMA synchronous=0;PRAGMA temp_store=MEMORY";

/// One parsed entry of the plan file.
#[derive(Debug, Clone)]
pub struct CopyStatement {
    /// Source table name as reflected
    pub source_table: String,
    /// Target table name (normalized, unquoted)
    pub target_table: String,
    /// The SELECT shipped to the source
    pub source_query: String,
    /// Pre-statement pragmas, when the target needs them
    pub pragmas: Option<String>,
}

/// Table expression for the source side of a copy query.
fn source_table_expr(table: &str, source_kind: DbKind, schema: Option<&str>) -> String {
    let quote = source_kind.dialect();
    let name = if table.contains(' ') || table.contains('$') {
        quote.quote(table)
    } else {
        table.to_string()
    };
    match schema {
        Some(schema) if !schema.is_empty() => format!("{schema}.{name}"),
        _ => name,
    }
}

/// Build the SELECT list of one table with per-cell adapters decided by
/// (source dialect, target dialect, abstract type code).
fn select_columns(
    resource: &crate::datapackage::Resource,
    source_kind: DbKind,
    target_kind: DbKind,
    no_blobs: bool,
) -> Result<Vec<String>> {
    let source_quote = source_kind.dialect();
    let mut columns = Vec::new();

    for field in &resource.schema.fields {
        let code = field.jdbc_code();
        let source_column = field.db_column_name.as_str();
        let target_column = field.name.as_str();

        let expr = if no_blobs && types::is_binary(code) {
            format!("NULL AS {}", source_quote.quote(target_column))
        } else if types::is_date_or_timestamp(code) && target_kind == DbKind::Sqlite {
            let formatted = source_quote
                .datetime_text_expr(&source_quote.quote(source_column))
                .ok_or_else(|| {
                    Error::Configuration(format!(
                        "Datetime to formatted string in sqlite not implemented for '{}'",
                        source_kind.as_str()
                    ))
                })?;
            format!("{formatted} AS {}", source_quote.quote(target_column))
        } else if types::is_time(code) && target_kind == DbKind::Sqlite {
            let formatted = source_quote
                .time_text_expr(&source_quote.quote(source_column))
                .ok_or_else(|| {
                    Error::Configuration(format!(
                        "Time to formatted string in sqlite not implemented for '{}'",
                        source_kind.as_str()
                    ))
                })?;
            format!("{formatted} AS {}", source_quote.quote(target_column))
        } else if source_column.to_lowercase() == target_column.to_lowercase() {
            source_quote.quote(source_column)
        } else {
            format!(
                "{} AS {}",
                source_quote.quote(source_column),
                source_quote.quote(target_column)
            )
        };
        columns.push(expr);
    }

    Ok(columns)
}

/// Render one plan statement.
fn render_statement(
    resource: &crate::datapackage::Resource,
    source: &DbUrl,
    target: &DbUrl,
    settings: &Settings,
    opts: &RunOptions,
) -> Result<String> {
    let target_quote = target.kind.dialect();

    let mut params = String::from("-mode=INSERT -ignoreIdentityColumns=false ");
    let mut url = target.short_url.clone();
    if target.kind == DbKind::Sqlite {
        if let Some(driver) = settings.driver(DbKind::Sqlite) {
            url = format!("{url},driverJar={},driver={}", driver.jar, driver.class);
        }
        params.push_str(&format!("-preTableStatement=\"{SQLITE_PRAGMAS}\" "));
    }

    let columns = select_columns(resource, source.kind, target.kind, opts.no_blobs)?;
    let source_query = format!(
        "SELECT {} FROM {}",
        columns.join(","),
        source_table_expr(&resource.db_table_name, source.kind, opts.schema.as_deref())
    );

    Ok(format!(
        "COPY {params}-targetConnection=\"username={},password={},url={url}\" -targetTable=\"{}\".{} -sourceQuery={source_query};",
        target.user,
        target.password,
        target.schema,
        target_quote.quote(&resource.name),
    ))
}

/// Generate the copy plan file from the descriptor. The file is kept when
/// it exists, nothing is pending and no stop was requested, so manual
/// edits survive re-planning.
pub fn create_plan(
    schema_path: &Path,
    copy_path: &Path,
    source: &DbUrl,
    target: &DbUrl,
    settings: &Settings,
    opts: &RunOptions,
    data_pending: bool,
) -> Result<()> {
    if copy_path.is_file() && opts.stop != Some(StopPhase::Copy) && !data_pending {
        info!("Copy statements already generated.");
        return Ok(());
    }

    if !schema_path.is_file() {
        return Err(Error::Configuration(format!(
            "Datapackage json schema '{}' missing",
            schema_path.display()
        )));
    }

    info!("Generating copy data statements...");
    if copy_path.is_file() {
        std::fs::remove_file(copy_path)?;
    }

    let package = Package::from_path(schema_path)?;
    let mut body = String::new();
    for resource in &package.resources {
        body.push('\n');
        body.push_str(&render_statement(resource, source, target, settings, opts)?);
    }
    std::fs::write(copy_path, body)?;

    Ok(())
}

/// Parse the (possibly edited) plan file back into statements.
pub fn parse_plan(copy_path: &Path) -> Result<Vec<CopyStatement>> {
    if !copy_path.is_file() {
        return Err(Error::Configuration(format!(
            "Copy statements file '{}' missing",
            copy_path.display()
        )));
    }

    let text = std::fs::read_to_string(copy_path)?;
    let mut statements = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        statements.push(parse_statement(line)?);
    }
    Ok(statements)
}

fn parse_statement(line: &str) -> Result<CopyStatement> {
    let bad = |what: &str| Error::Configuration(format!("Malformed copy statement ({what}): {line}"));

    let target_part = line
        .split("-targetTable=")
        .nth(1)
        .ok_or_else(|| bad("missing -targetTable"))?;
    let target_spec = target_part.split(" -sourceQuery=").next().unwrap_or(target_part);
    let target_table = target_spec
        .split('.')
        .next_back()
        .unwrap_or(target_spec)
        .trim()
        .trim_matches(|c| c == '"' || c == '`' || c == '[' || c == ']')
        .to_string();

    let source_query = line
        .split("-sourceQuery=")
        .nth(1)
        .ok_or_else(|| bad("missing -sourceQuery"))?
        .trim_end_matches(';')
        .trim()
        .to_string();

    // The source table is the FROM tail of the query, stripped of
    // quoting and schema qualification
    let from_tail = source_query
        .rsplit(" FROM ")
        .next()
        .ok_or_else(|| bad("missing FROM"))?
        .trim();
    let source_table = from_tail
        .rsplit('.')
        .next()
        .unwrap_or(from_tail)
        .trim_matches('"')
        .to_string();

    let pragmas = line
        .split("-preTableStatement=\"")
        .nth(1)
        .and_then(|rest| rest.split('"').next())
        .map(str::to_string);

    Ok(CopyStatement {
        source_table,
        target_table,
        source_query,
        pragmas,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datapackage::{Field, Package, Resource, TableSchema, TsvDialect};

    fn field(name: &str, source_name: &str, code: i32) -> Field {
        Field {
            name: name.to_string(),
            field_type: crate::types::datapackage_type(code).to_string(),
            jdbc_type: code.to_string(),
            db_column_name: source_name.to_string(),
            constraints: None,
        }
    }

    fn resource(fields: Vec<Field>) -> Resource {
        Resource {
            name: "t".to_string(),
            profile: "tabular-data-resource".to_string(),
            path: "data/t.tsv".to_string(),
            encoding: "UTF-8".to_string(),
            db_table_name: "T".to_string(),
            db_table_deps: "T".to_string(),
            count_of_rows: "1".to_string(),
            schema: TableSchema {
                fields,
                primary_key: None,
                foreign_keys: None,
            },
            dialect: TsvDialect::default(),
        }
    }

    fn urls() -> (DbUrl, DbUrl) {
        let settings = Settings::default();
        (
            DbUrl::parse("jdbc:sqlite:/s.db", &settings).unwrap(),
            DbUrl::parse("jdbc:sqlite:/t.db", &settings).unwrap(),
        )
    }

    #[test]
    fn test_statement_passthrough_and_alias() {
        let (source, target) = urls();
        let res = resource(vec![field("id", "ID", 4), field("full_name", "FullName", 12)]);
        let statement =
            render_statement(&res, &source, &target, &Settings::default(), &RunOptions::new())
                .unwrap();

        assert!(statement.contains("-mode=INSERT"));
        assert!(statement.contains("-ignoreIdentityColumns=false"));
        assert!(statement.contains("PRAGMA foreign_keys=0"));
        // Same normalized name passes through unaliased
        assert!(statement.contains("\"ID\""));
        // Different normalized name gets an alias
        assert!(statement.contains("\"FullName\" AS \"full_name\""));
        assert!(statement.contains("-targetTable=\"main\".\"t\""));
        assert!(statement.ends_with("FROM T;"));
    }

    #[test]
    fn test_no_blobs_suppression() {
        let (source, target) = urls();
        let res = resource(vec![field("id", "ID", 4), field("payload", "PAYLOAD", 2004)]);
        let mut opts = RunOptions::new();
        opts.no_blobs = true;
        let statement =
            render_statement(&res, &source, &target, &Settings::default(), &opts).unwrap();
        assert!(statement.contains("NULL AS \"payload\""));
    }

    #[test]
    fn test_datetime_adapter_for_sqlite_target() {
        let (source, target) = urls();
        let res = resource(vec![field("seen", "SEEN", 93), field("at", "AT", 92)]);
        let statement =
            render_statement(&res, &source, &target, &Settings::default(), &RunOptions::new())
                .unwrap();
        assert!(statement.contains("DATETIME(SUBSTR(\"SEEN\",1,10), 'unixepoch') AS \"seen\""));
        assert!(statement.contains("TIME(\"AT\") AS \"at\""));
    }

    #[test]
    fn test_plan_round_trip() {
        let (source, target) = urls();
        let tmp = tempfile::tempdir().unwrap();
        let schema_path = tmp.path().join("datapackage.json");
        let copy_path = tmp.path().join("sys-copy.sql");

        let package = Package {
            name: "sys".to_string(),
            profile: "tabular-data-package".to_string(),
            resources: vec![resource(vec![field("id", "ID", 4)])],
        };
        package.write(&schema_path).unwrap();

        create_plan(
            &schema_path,
            &copy_path,
            &source,
            &target,
            &Settings::default(),
            &RunOptions::new(),
            true,
        )
        .unwrap();

        let statements = parse_plan(&copy_path).unwrap();
        assert_eq!(statements.len(), 1);
        assert_eq!(statements[0].source_table, "T");
        assert_eq!(statements[0].target_table, "t");
        assert!(statements[0].source_query.starts_with("SELECT"));
        assert!(statements[0].pragmas.as_ref().unwrap().contains("journal_mode=0"));
    }

    #[test]
    fn test_plan_kept_when_nothing_pending() {
        let (source, target) = urls();
        let tmp = tempfile::tempdir().unwrap();
        let schema_path = tmp.path().join("datapackage.json");
        let copy_path = tmp.path().join("sys-copy.sql");
        Package {
            name: "sys".to_string(),
            profile: "tabular-data-package".to_string(),
            resources: vec![resource(vec![field("id", "ID", 4)])],
        }
        .write(&schema_path)
        .unwrap();

        // Operator-edited plan
        std::fs::write(&copy_path, "COPY -targetTable=\"main\".\"t\" -sourceQuery=SELECT \"ID\" FROM T;").unwrap();
        create_plan(
            &schema_path,
            &copy_path,
            &source,
            &target,
            &Settings::default(),
            &RunOptions::new(),
            false,
        )
        .unwrap();

        let text = std::fs::read_to_string(&copy_path).unwrap();
        assert!(!text.contains("-mode=INSERT"), "edited plan must survive");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        let tmp = tempfile::tempdir().unwrap();
        let copy_path = tmp.path().join("sys-copy.sql");
        std::fs::write(&copy_path, "COPY -mode=INSERT nonsense\n").unwrap();
        assert!(parse_plan(&copy_path).is_err());
    }
}
