// src/source.rs

//! Connection URLs and database access
//!
//! Connection strings follow the JDBC conventions: `jdbc:<dialect>:<rest>`
//! with credentials embedded as query parameters (PostgreSQL, MySQL) or
//! path components (Oracle). Short names expand through the alias map in
//! the configuration file.
//!
//! Live database access goes through the [`DbConnection`] trait. SQLite is
//! the embedded, always-available driver; the other dialects parse, plan
//! and render fully but need an external driver to connect, which the
//! engine reports as a configuration error.

use crate::config::Settings;
use crate::dialect::DbKind;
use crate::error::{Error, Result};
use crate::types;
use rusqlite::Connection;
use rusqlite::types::{ToSqlOutput, Value, ValueRef};
use tracing::debug;

/// A parsed connection URL.
#[derive(Debug, Clone)]
pub struct DbUrl {
    pub kind: DbKind,
    /// The full URL as given
    pub url: String,
    /// The URL with credentials stripped
    pub short_url: String,
    pub user: String,
    pub password: String,
    pub schema: String,
}

impl DbUrl {
    /// Parse a connection URL, expanding aliases first.
    pub fn parse(login: &str, settings: &Settings) -> Result<Self> {
        let login = settings.expand_alias(login.trim());

        let rest = login.strip_prefix("jdbc:").ok_or_else(|| {
            Error::Configuration(format!("'{login}' is not a valid connection URL"))
        })?;
        if login.ends_with('/') || login.ends_with('\\') {
            return Err(Error::Configuration(format!(
                "'{login}' is not a valid connection URL"
            )));
        }

        let dialect_token = rest.split(':').next().unwrap_or("");
        let kind: DbKind = dialect_token.parse()?;

        let mut parsed = DbUrl {
            kind,
            url: login.to_string(),
            short_url: login.to_string(),
            user: String::new(),
            password: String::new(),
            schema: String::new(),
        };

        match kind {
            DbKind::Sqlite => {
                parsed.schema = "main".to_string();
            }
            DbKind::H2 => {
                parsed.schema = "PUBLIC".to_string();
            }
            DbKind::Postgresql | DbKind::Mysql | DbKind::Mssql => {
                parsed.user = query_param(login, "user").unwrap_or_default();
                parsed.password = query_param(login, "password").unwrap_or_default();
                parsed.schema = query_param(login, "currentSchema")
                    .or_else(|| query_param(login, "schema"))
                    .unwrap_or_else(|| {
                        if kind == DbKind::Postgresql {
                            "public".to_string()
                        } else {
                            String::new()
                        }
                    });
                parsed.short_url = strip_credentials(login);
            }
            DbKind::Oracle => {
                // jdbc:oracle:thin:user/password@host:port:sid
                let tail = login
                    .strip_prefix("jdbc:oracle:thin:")
                    .ok_or_else(|| {
                        Error::Configuration(format!("'{login}' is not a valid Oracle URL"))
                    })?;
                let at = tail.rfind('@').ok_or_else(|| {
                    Error::Configuration(format!("'{login}' is missing the Oracle host part"))
                })?;
                let credentials = &tail[..at];
                let (user, password) = match credentials.split_once('/') {
                    Some((user, password)) => (user.to_string(), password.to_string()),
                    None => (credentials.to_string(), String::new()),
                };
                parsed.schema = user.to_uppercase();
                parsed.user = user;
                parsed.password = password;
                parsed.short_url = format!("jdbc:oracle:thin:{}", &tail[at..]);
            }
            DbKind::Access => {}
        }

        Ok(parsed)
    }

    /// The filesystem path of a SQLite URL.
    pub fn sqlite_path(&self) -> Option<&str> {
        self.url.strip_prefix("jdbc:sqlite:")
    }
}

fn query_param(url: &str, name: &str) -> Option<String> {
    let query = url.split_once('?').map(|(_, q)| q)?;
    for pair in query.split('&') {
        if let Some((key, value)) = pair.split_once('=') {
            if key == name {
                return Some(value.to_string());
            }
        }
    }
    None
}

fn strip_credentials(url: &str) -> String {
    let Some((base, query)) = url.split_once('?') else {
        return url.to_string();
    };
    let kept: Vec<&str> = query
        .split('&')
        .filter(|pair| {
            !pair.starts_with("user=") && !pair.starts_with("password=")
        })
        .collect();
    if kept.is_empty() {
        base.to_string()
    } else {
        format!("{base}?{}", kept.join("&"))
    }
}

/// One cell of a fetched row.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Int(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl CellValue {
    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }
}

impl rusqlite::ToSql for CellValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            CellValue::Null => ToSqlOutput::Owned(Value::Null),
            CellValue::Int(v) => ToSqlOutput::Owned(Value::Integer(*v)),
            CellValue::Real(v) => ToSqlOutput::Owned(Value::Real(*v)),
            CellValue::Text(v) => ToSqlOutput::Borrowed(ValueRef::Text(v.as_bytes())),
            CellValue::Blob(v) => ToSqlOutput::Borrowed(ValueRef::Blob(v)),
        })
    }
}

/// Receives fully buffered batches of fetched rows.
pub trait RowSink {
    fn batch(&mut self, rows: &[Vec<CellValue>]) -> Result<()>;
}

/// One reflected column of a source table.
#[derive(Debug, Clone)]
pub struct ReflectedColumn {
    pub name: String,
    pub declared_type: String,
    pub type_code: i32,
    pub size: i64,
    pub nullable: bool,
    /// 1-based ordinal
    pub position: i64,
    pub autoincrement: bool,
    pub default: Option<String>,
}

/// One reflected foreign-key edge.
#[derive(Debug, Clone)]
pub struct ReflectedFk {
    pub column: String,
    pub ref_table: String,
    pub ref_column: String,
}

/// Live access to one database. Each connection is owned by one logical
/// stage at a time; statements are closed on both success and failure.
pub trait DbConnection {
    fn kind(&self) -> DbKind;

    /// Execute a statement, returning the affected row count.
    fn execute(&self, sql: &str) -> Result<usize>;

    /// Execute several statements (pragmas, batched DDL).
    fn execute_batch(&self, sql: &str) -> Result<()>;

    /// SELECT COUNT(*) from a (possibly quoted/qualified) table expression.
    fn count(&self, table_expr: &str) -> Result<i64>;

    /// Single scalar query; NULL and no-row both come back as None.
    fn scalar(&self, sql: &str) -> Result<Option<i64>>;

    /// Stream a query in fully buffered batches of `batch_size` rows.
    /// Returns the total row count. A fetch failure aborts the table
    /// without consuming further batches.
    fn query_batches(
        &self,
        sql: &str,
        batch_size: usize,
        sink: &mut dyn RowSink,
    ) -> Result<u64>;

    /// Insert a buffered batch with one parameterized statement per row,
    /// committed as one transaction.
    fn insert_batch(&self, sql: &str, rows: &[Vec<CellValue>]) -> Result<usize>;

    /// (rowid, payload) pairs for sidecar export of one LOB column.
    fn query_lobs(&self, sql: &str) -> Result<Vec<(i64, Vec<u8>)>>;

    /// Base tables of the schema, in enumeration order.
    fn list_tables(&self, schema: &str) -> Result<Vec<String>>;

    fn table_columns(&self, table: &str) -> Result<Vec<ReflectedColumn>>;

    fn primary_key(&self, table: &str) -> Result<Vec<String>>;

    fn foreign_keys(&self, table: &str) -> Result<Vec<ReflectedFk>>;

    /// True maximum character length of a column. SQLite text stored with
    /// blob affinity is measured through a BLOB cast.
    fn max_length(&self, table: &str, column: &str) -> Result<i64>;
}

/// Open a connection for a parsed URL. Only SQLite has an embedded
/// driver; other dialects need an external bridge and fail here.
pub fn connect(url: &DbUrl, settings: &Settings) -> Result<Box<dyn DbConnection>> {
    match url.kind {
        DbKind::Sqlite => {
            let path = url.sqlite_path().ok_or_else(|| {
                Error::Configuration(format!("'{}' is not a valid SQLite URL", url.url))
            })?;
            Ok(Box::new(SqliteConnection::open(path)?))
        }
        kind => {
            let hint = match settings.driver(kind) {
                Some(driver) => format!("driver jar {} is configured but no embedded bridge exists", driver.jar),
                None => format!("no driver configured for '{}'", kind.as_str()),
            };
            Err(Error::Configuration(format!(
                "Cannot connect to '{}': {hint}",
                url.short_url
            )))
        }
    }
}

/// The embedded SQLite driver.
pub struct SqliteConnection {
    conn: Connection,
}

impl SqliteConnection {
    pub fn open(path: &str) -> Result<Self> {
        debug!("Opening SQLite database at: {path}");
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA busy_timeout = 5000;")?;
        Ok(Self { conn })
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self { conn }
    }

    fn quoted(name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    fn cell_from_ref(value: ValueRef<'_>) -> CellValue {
        match value {
            ValueRef::Null => CellValue::Null,
            ValueRef::Integer(v) => CellValue::Int(v),
            ValueRef::Real(v) => CellValue::Real(v),
            ValueRef::Text(v) => CellValue::Text(String::from_utf8_lossy(v).into_owned()),
            ValueRef::Blob(v) => CellValue::Blob(v.to_vec()),
        }
    }
}

impl DbConnection for SqliteConnection {
    fn kind(&self) -> DbKind {
        DbKind::Sqlite
    }

    fn execute(&self, sql: &str) -> Result<usize> {
        Ok(self.conn.execute(sql, [])?)
    }

    fn execute_batch(&self, sql: &str) -> Result<()> {
        self.conn.execute_batch(sql)?;
        Ok(())
    }

    fn count(&self, table_expr: &str) -> Result<i64> {
        let count = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {table_expr}"), [], |row| {
                row.get(0)
            })?;
        Ok(count)
    }

    fn scalar(&self, sql: &str) -> Result<Option<i64>> {
        use rusqlite::OptionalExtension;
        let value = self
            .conn
            .query_row(sql, [], |row| row.get::<_, Option<i64>>(0))
            .optional()?;
        Ok(value.flatten())
    }

    fn query_batches(
        &self,
        sql: &str,
        batch_size: usize,
        sink: &mut dyn RowSink,
    ) -> Result<u64> {
        let batch_size = batch_size.max(1);
        let mut stmt = self.conn.prepare(sql)?;
        let column_count = stmt.column_count();
        let mut rows = stmt.query([])?;

        let mut total = 0u64;
        let mut buffer: Vec<Vec<CellValue>> = Vec::with_capacity(batch_size);
        while let Some(row) = rows.next()? {
            let mut cells = Vec::with_capacity(column_count);
            for idx in 0..column_count {
                cells.push(Self::cell_from_ref(row.get_ref(idx)?));
            }
            buffer.push(cells);
            total += 1;
            if buffer.len() >= batch_size {
                sink.batch(&buffer)?;
                buffer.clear();
            }
        }
        if !buffer.is_empty() {
            sink.batch(&buffer)?;
        }
        Ok(total)
    }

    fn insert_batch(&self, sql: &str, rows: &[Vec<CellValue>]) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(sql)?;
            for row in rows {
                inserted += stmt.execute(rusqlite::params_from_iter(row.iter()))?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    fn query_lobs(&self, sql: &str) -> Result<Vec<(i64, Vec<u8>)>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query([])?;
        let mut lobs = Vec::new();
        while let Some(row) = rows.next()? {
            let rowid: i64 = row.get(0)?;
            let payload = match row.get_ref(1)? {
                ValueRef::Null => continue,
                ValueRef::Blob(v) => v.to_vec(),
                ValueRef::Text(v) => v.to_vec(),
                ValueRef::Integer(v) => v.to_string().into_bytes(),
                ValueRef::Real(v) => v.to_string().into_bytes(),
            };
            lobs.push((rowid, payload));
        }
        Ok(lobs)
    }

    fn list_tables(&self, _schema: &str) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT name FROM sqlite_master
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
             ORDER BY name",
        )?;
        let tables = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(tables)
    }

    fn table_columns(&self, table: &str) -> Result<Vec<ReflectedColumn>> {
        let create_sql: String = self
            .conn
            .query_row(
                "SELECT IFNULL(sql, '') FROM sqlite_master WHERE type='table' AND name = ?1",
                [table],
                |row| row.get(0),
            )
            .unwrap_or_default();
        let has_autoincrement = create_sql.to_uppercase().contains("AUTOINCREMENT");

        let mut stmt = self
            .conn
            .prepare(&format!("PRAGMA table_info({})", Self::quoted(table)))?;
        let mut rows = stmt.query([])?;

        let mut columns = Vec::new();
        while let Some(row) = rows.next()? {
            let cid: i64 = row.get(0)?;
            let name: String = row.get(1)?;
            let declared: String = row.get(2)?;
            let notnull: i64 = row.get(3)?;
            let default: Option<String> = row.get(4)?;
            let pk: i64 = row.get(5)?;

            let (type_code, size) = types::code_for_declared(&declared);
            // Only an INTEGER PRIMARY KEY can be the autoincrement rowid
            let autoincrement = has_autoincrement && pk == 1 && type_code == 4;

            columns.push(ReflectedColumn {
                name,
                declared_type: declared,
                type_code,
                size,
                nullable: notnull == 0,
                position: cid + 1,
                autoincrement,
                default,
            });
        }
        Ok(columns)
    }

    fn primary_key(&self, table: &str) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare(&format!("PRAGMA table_info({})", Self::quoted(table)))?;
        let mut rows = stmt.query([])?;

        let mut keyed: Vec<(i64, String)> = Vec::new();
        while let Some(row) = rows.next()? {
            let name: String = row.get(1)?;
            let pk: i64 = row.get(5)?;
            if pk > 0 {
                keyed.push((pk, name));
            }
        }
        keyed.sort_by_key(|(pk, _)| *pk);
        Ok(keyed.into_iter().map(|(_, name)| name).collect())
    }

    fn foreign_keys(&self, table: &str) -> Result<Vec<ReflectedFk>> {
        let mut stmt = self
            .conn
            .prepare(&format!("PRAGMA foreign_key_list({})", Self::quoted(table)))?;
        let mut rows = stmt.query([])?;

        let mut fks = Vec::new();
        while let Some(row) = rows.next()? {
            let ref_table: String = row.get(2)?;
            let from: String = row.get(3)?;
            let to: Option<String> = row.get(4)?;
            // An implicit reference points at the referenced table's key
            let ref_column = match to {
                Some(column) => column,
                None => self
                    .primary_key(&ref_table)?
                    .into_iter()
                    .next()
                    .unwrap_or_else(|| "rowid".to_string()),
            };
            fks.push(ReflectedFk {
                column: from,
                ref_table,
                ref_column,
            });
        }
        Ok(fks)
    }

    fn max_length(&self, table: &str, column: &str) -> Result<i64> {
        // Text stored with blob affinity only measures through a cast
        let sql = format!(
            "SELECT MAX(LENGTH(CAST({} AS BLOB))) FROM {}",
            Self::quoted(column),
            Self::quoted(table)
        );
        Ok(self.scalar(&sql)?.unwrap_or(0))
    }
}
