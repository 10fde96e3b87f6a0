// src/dialect.rs

//! SQL dialect abstraction
//!
//! One polymorphic dialect object per supported database family. The copy
//! planner, DDL generator and exporter consume the trait uniformly instead
//! of branching on database names: identifier quoting, TRUNCATE support,
//! datetime-to-text expressions and type rendering all live here.

use crate::error::{Error, Result};
use crate::types::{self, LOB_THRESHOLD, TypeSpec};
use std::fmt;
use std::str::FromStr;

/// Supported database families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbKind {
    Sqlite,
    H2,
    Postgresql,
    Mysql,
    Mssql,
    Oracle,
    Access,
}

impl DbKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DbKind::Sqlite => "sqlite",
            DbKind::H2 => "h2",
            DbKind::Postgresql => "postgresql",
            DbKind::Mysql => "mysql",
            DbKind::Mssql => "mssql",
            DbKind::Oracle => "oracle",
            DbKind::Access => "access",
        }
    }

    /// The dialect object for this database family.
    pub fn dialect(&self) -> &'static dyn Dialect {
        match self {
            DbKind::Sqlite => &SqliteDialect,
            DbKind::H2 => &H2Dialect,
            DbKind::Postgresql => &PostgresDialect,
            DbKind::Mysql => &MysqlDialect,
            DbKind::Mssql => &MssqlDialect,
            DbKind::Oracle => &OracleDialect,
            DbKind::Access => &AccessDialect,
        }
    }
}

impl fmt::Display for DbKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DbKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sqlite" => Ok(DbKind::Sqlite),
            "h2" => Ok(DbKind::H2),
            "postgresql" => Ok(DbKind::Postgresql),
            "mysql" => Ok(DbKind::Mysql),
            "mssql" | "sqlserver" => Ok(DbKind::Mssql),
            "oracle" => Ok(DbKind::Oracle),
            "access" | "ucanaccess" => Ok(DbKind::Access),
            _ => Err(Error::Configuration(format!("Unknown database dialect: {s}"))),
        }
    }
}

/// Dialect-specific SQL rendering.
pub trait Dialect {
    /// Dialect name as used in file names and driver config keys.
    fn name(&self) -> &'static str;

    /// Quote an identifier, escaping embedded quote characters.
    fn quote(&self, ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    /// Whether the dialect supports TRUNCATE TABLE. Dialects without it
    /// fall back to DELETE FROM.
    fn supports_truncate(&self) -> bool {
        true
    }

    /// Statement that removes every row from a table.
    fn delete_all_sql(&self, qualified_table: &str) -> String {
        if self.supports_truncate() {
            format!("TRUNCATE TABLE {qualified_table}")
        } else {
            format!("DELETE FROM {qualified_table}")
        }
    }

    /// Whether string enums render as a named ENUM type. Dialects without
    /// native enums get a CHECK constraint instead.
    fn supports_enum(&self) -> bool {
        false
    }

    /// Whether a unique modifier is allowed on text-typed columns.
    /// MySQL refuses unique keys of unknown length.
    fn allows_text_unique(&self) -> bool {
        true
    }

    /// The unbounded character type.
    fn text_type(&self) -> &'static str {
        "text"
    }

    /// Sized character type, promoted to the unbounded form past the LOB
    /// threshold.
    fn varchar(&self, size: i64) -> String {
        if size > LOB_THRESHOLD {
            self.text_type().to_string()
        } else {
            format!("varchar({size})")
        }
    }

    /// Which rendering column of the type registry this dialect reads.
    fn registry_type(&self, spec: &TypeSpec) -> &'static str {
        spec.iso
    }

    /// Render the DDL type for an abstract type code and declared size.
    fn ddl_type(&self, code: i32, size: i64) -> String {
        let rendered = match types::lookup(code) {
            Some(spec) => self.registry_type(spec),
            None => self.text_type(),
        };
        if rendered == "varchar()" {
            if size > 0 {
                self.varchar(size)
            } else {
                self.text_type().to_string()
            }
        } else {
            rendered.to_string()
        }
    }

    /// Regex CHECK expression for a pattern constraint.
    fn regex_check(&self, quoted_col: &str, pattern: &str) -> String {
        format!("{quoted_col} REGEXP '{pattern}'")
    }

    /// Source-side expression rendering a date/timestamp column as
    /// `YYYY-MM-DD HH:MM:SS` text, used when the target stores datetimes
    /// as strings. None when the dialect has no known formatter.
    fn datetime_text_expr(&self, quoted_col: &str) -> Option<String> {
        let _ = quoted_col;
        None
    }

    /// Source-side expression rendering a time column as `HH:MM:SS` text.
    fn time_text_expr(&self, quoted_col: &str) -> Option<String> {
        let _ = quoted_col;
        None
    }
}

/// SQLite: double-quote identifiers, no TRUNCATE, datetimes stored as
/// unix epochs are rendered through DATETIME().
pub struct SqliteDialect;

impl Dialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn supports_truncate(&self) -> bool {
        false
    }

    fn registry_type(&self, spec: &TypeSpec) -> &'static str {
        spec.sqlite
    }

    fn text_type(&self) -> &'static str {
        "clob"
    }

    fn datetime_text_expr(&self, quoted_col: &str) -> Option<String> {
        Some(format!("DATETIME(SUBSTR({quoted_col},1,10), 'unixepoch')"))
    }

    fn time_text_expr(&self, quoted_col: &str) -> Option<String> {
        Some(format!("TIME({quoted_col})"))
    }
}

/// H2 renders DDL and quoting like PostgreSQL but formats datetimes with
/// its own FORMATDATETIME function.
pub struct H2Dialect;

impl Dialect for H2Dialect {
    fn name(&self) -> &'static str {
        "h2"
    }

    fn registry_type(&self, spec: &TypeSpec) -> &'static str {
        spec.postgresql
    }

    fn datetime_text_expr(&self, quoted_col: &str) -> Option<String> {
        Some(format!("FORMATDATETIME({quoted_col},'YYYY-MM-DD HH:mm:ss')"))
    }

    fn time_text_expr(&self, quoted_col: &str) -> Option<String> {
        Some(format!("FORMATDATETIME({quoted_col},'HH:mm:ss')"))
    }
}

/// PostgreSQL: native enums, `~` regex operator.
pub struct PostgresDialect;

impl Dialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgresql"
    }

    fn supports_enum(&self) -> bool {
        true
    }

    fn registry_type(&self, spec: &TypeSpec) -> &'static str {
        spec.postgresql
    }

    fn regex_check(&self, quoted_col: &str, pattern: &str) -> String {
        format!("{quoted_col} ~ '{pattern}'")
    }
}

/// MySQL: backtick quoting, native enums, no unique keys on text columns.
pub struct MysqlDialect;

impl Dialect for MysqlDialect {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn quote(&self, ident: &str) -> String {
        format!("`{}`", ident.replace('`', "``"))
    }

    fn supports_enum(&self) -> bool {
        true
    }

    fn allows_text_unique(&self) -> bool {
        false
    }
}

/// SQL Server: bracket quoting, varchar(max) for unbounded text.
pub struct MssqlDialect;

impl Dialect for MssqlDialect {
    fn name(&self) -> &'static str {
        "mssql"
    }

    fn quote(&self, ident: &str) -> String {
        format!("[{}]", ident.replace(']', "]]"))
    }

    fn text_type(&self) -> &'static str {
        "varchar(max)"
    }
}

/// Oracle: CLOB past 4000 characters, TO_CHAR datetime formatting.
pub struct OracleDialect;

impl Dialect for OracleDialect {
    fn name(&self) -> &'static str {
        "oracle"
    }

    fn registry_type(&self, spec: &TypeSpec) -> &'static str {
        spec.oracle
    }

    fn text_type(&self) -> &'static str {
        "clob"
    }

    fn datetime_text_expr(&self, quoted_col: &str) -> Option<String> {
        Some(format!("TO_CHAR({quoted_col},'YYYY-MM-DD HH24:MM:SS')"))
    }

    fn time_text_expr(&self, quoted_col: &str) -> Option<String> {
        Some(format!("TO_CHAR({quoted_col},'HH24:MM:SS')"))
    }
}

/// Access (UCanAccess): no TRUNCATE, otherwise ISO rendering.
pub struct AccessDialect;

impl Dialect for AccessDialect {
    fn name(&self) -> &'static str {
        "access"
    }

    fn supports_truncate(&self) -> bool {
        false
    }
}
