//! The database capability the engine runs against.
//!
//! Everything in this crate talks to the database through
//! [`DatabaseAdapter::raw`]: DDL, catalog queries and reconciliation-table
//! reads and writes. The adapter is borrowed already connected; nothing here
//! opens or closes connections.

use std::future::Future;

use sqlx::any::{AnyPoolOptions, AnyRow};
use sqlx::AnyPool;
use sqlx::{Column, Row as _, ValueRef};
use tracing::debug;

use crate::dialect::Dialect;
use crate::error::{MigrateError, Result};

/// A bound parameter or a decoded cell.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// NULL.
    Null,
    /// Integer.
    Integer(i64),
    /// Floating point.
    Real(f64),
    /// Boolean.
    Boolean(bool),
    /// Text.
    Text(String),
    /// Bytes. Some MySQL catalogs report text columns as binary strings.
    Blob(Vec<u8>),
}

impl SqlValue {
    /// Integer view, if the value is one.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            Self::Boolean(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    /// Text view; binary strings are decoded as UTF-8.
    #[must_use]
    pub fn as_text(&self) -> Option<String> {
        match self {
            Self::Text(s) => Some(s.clone()),
            Self::Blob(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
            Self::Integer(i) => Some(i.to_string()),
            Self::Real(f) => Some(f.to_string()),
            Self::Boolean(b) => Some(b.to_string()),
            Self::Null => None,
        }
    }

    /// Truthiness of catalog flags: non-zero integers, `true`, and the
    /// `YES` strings of `information_schema`.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Integer(i) => *i != 0,
            Self::Boolean(b) => *b,
            Self::Text(_) | Self::Blob(_) => self
                .as_text()
                .is_some_and(|s| s.eq_ignore_ascii_case("yes") || s.eq_ignore_ascii_case("true")),
            Self::Real(f) => *f != 0.0,
            Self::Null => false,
        }
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<bool> for SqlValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<f64> for SqlValue {
    fn from(value: f64) -> Self {
        Self::Real(value)
    }
}

/// One result row, columns in select order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: Vec<(String, SqlValue)>,
}

impl Row {
    /// Creates a row from `(column, value)` pairs.
    #[must_use]
    pub fn new(columns: Vec<(String, SqlValue)>) -> Self {
        Self { columns }
    }

    /// Looks a column up by name, ignoring ASCII case (MySQL reports
    /// `information_schema` columns in upper case).
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .find(|(column, _)| column.eq_ignore_ascii_case(name))
            .map(|(_, value)| value)
    }

    /// Text value of a column; `None` for NULL or a missing column.
    #[must_use]
    pub fn text(&self, name: &str) -> Option<String> {
        self.get(name).and_then(SqlValue::as_text)
    }

    /// Integer value of a column.
    #[must_use]
    pub fn integer(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(SqlValue::as_i64)
    }

    /// Truthiness of a flag column.
    #[must_use]
    pub fn flag(&self, name: &str) -> bool {
        self.get(name).is_some_and(SqlValue::is_truthy)
    }
}

/// What [`DatabaseAdapter::raw`] returns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawResult {
    /// Rows, empty for statements that return none.
    pub rows: Vec<Row>,
    /// Affected row count, when the backend reports one.
    pub changes: Option<u64>,
    /// Last inserted id, when the backend reports one.
    pub last_insert_id: Option<i64>,
}

/// The kind of store behind an adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// A relational database speaking one of the SQL dialects.
    Sql(Dialect),
    /// A document store. It takes no part in reconciliation.
    Document,
}

impl Backend {
    /// Derives the backend from a connection URL scheme.
    #[must_use]
    pub fn from_url(url: &str) -> Option<Self> {
        if let Some(dialect) = Dialect::from_url(url) {
            return Some(Self::Sql(dialect));
        }
        let scheme = url.split(':').next()?.to_ascii_lowercase();
        match scheme.as_str() {
            "mongodb" | "mongodb+srv" => Some(Self::Document),
            _ => None,
        }
    }

    /// Returns the SQL dialect, or fails fast with `Unsupported` naming the
    /// attempted operation.
    pub fn sql_dialect(self, operation: &str) -> Result<Dialect> {
        match self {
            Self::Sql(dialect) => Ok(dialect),
            Self::Document => Err(MigrateError::Unsupported(format!(
                "{operation} requires a relational database"
            ))),
        }
    }
}

/// Raw statement execution against one database.
///
/// Statements are awaited one at a time; callers never overlap them.
pub trait DatabaseAdapter: Send + Sync {
    /// The backend tag.
    fn backend(&self) -> Backend;

    /// Executes one statement with positional parameters.
    fn raw(&self, sql: &str, params: &[SqlValue]) -> impl Future<Output = Result<RawResult>> + Send;
}

/// [`DatabaseAdapter`] over a sqlx `Any` pool.
#[derive(Debug, Clone)]
pub struct SqlxAdapter {
    pool: AnyPool,
    dialect: Dialect,
}

impl SqlxAdapter {
    /// Wraps an existing pool.
    #[must_use]
    pub fn new(pool: AnyPool, dialect: Dialect) -> Self {
        Self { pool, dialect }
    }

    /// Connects to `url`, deriving the dialect from its scheme.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let dialect = Dialect::from_url(url).ok_or_else(|| {
            MigrateError::Unsupported(format!("cannot derive a SQL dialect from '{url}'"))
        })?;
        sqlx::any::install_default_drivers();
        let pool = AnyPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        Ok(Self::new(pool, dialect))
    }

    /// Returns the underlying pool.
    #[must_use]
    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    /// Returns the dialect.
    #[must_use]
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }
}

impl DatabaseAdapter for SqlxAdapter {
    fn backend(&self) -> Backend {
        Backend::Sql(self.dialect)
    }

    async fn raw(&self, sql: &str, params: &[SqlValue]) -> Result<RawResult> {
        debug!(sql = %sql, params = params.len(), "Executing SQL");

        let mut query = sqlx::query(sql);
        for param in params {
            query = match param {
                SqlValue::Null => query.bind(Option::<String>::None),
                SqlValue::Integer(i) => query.bind(*i),
                SqlValue::Real(f) => query.bind(*f),
                SqlValue::Boolean(b) => query.bind(*b),
                SqlValue::Text(s) => query.bind(s.clone()),
                SqlValue::Blob(bytes) => query.bind(bytes.clone()),
            };
        }

        // One connection for the statement and any follow-up lookup, so
        // SQLite's last_insert_rowid() sees this insert.
        let mut conn = self.pool.acquire().await?;

        if returns_rows(sql) {
            let rows = query.fetch_all(&mut *conn).await?;
            let rows = rows.iter().map(decode_row).collect::<Result<Vec<_>>>()?;
            Ok(RawResult {
                rows,
                changes: None,
                last_insert_id: None,
            })
        } else {
            let result = query.execute(&mut *conn).await?;
            // The Any driver drops SQLite's rowid from the query result.
            let last_insert_id = match result.last_insert_id() {
                None if self.dialect == Dialect::Sqlite
                    && is_insert(sql)
                    && result.rows_affected() > 0 =>
                {
                    Some(
                        sqlx::query_scalar::<_, i64>("SELECT last_insert_rowid()")
                            .fetch_one(&mut *conn)
                            .await?,
                    )
                }
                id => id,
            };
            Ok(RawResult {
                rows: Vec::new(),
                changes: Some(result.rows_affected()),
                last_insert_id,
            })
        }
    }
}

/// Whether a statement produces a result set.
fn returns_rows(sql: &str) -> bool {
    let upper = sql.trim_start().to_ascii_uppercase();
    ["SELECT", "WITH", "PRAGMA", "SHOW", "VALUES", "EXPLAIN"]
        .iter()
        .any(|keyword| upper.starts_with(keyword))
        || upper.contains(" RETURNING ")
}

fn is_insert(sql: &str) -> bool {
    let upper = sql.trim_start().to_ascii_uppercase();
    upper.starts_with("INSERT") || upper.starts_with("REPLACE")
}

fn decode_row(row: &AnyRow) -> Result<Row> {
    let mut columns = Vec::with_capacity(row.columns().len());
    for (idx, column) in row.columns().iter().enumerate() {
        columns.push((column.name().to_string(), decode_value(row, idx)?));
    }
    Ok(Row::new(columns))
}

/// Decodes a cell without knowing its type up front: the `Any` driver
/// rejects incompatible decodes, so the first type that fits wins.
fn decode_value(row: &AnyRow, idx: usize) -> Result<SqlValue> {
    if row.try_get_raw(idx)?.is_null() {
        return Ok(SqlValue::Null);
    }
    if let Ok(v) = row.try_get::<i64, _>(idx) {
        return Ok(SqlValue::Integer(v));
    }
    if let Ok(v) = row.try_get::<f64, _>(idx) {
        return Ok(SqlValue::Real(v));
    }
    if let Ok(v) = row.try_get::<bool, _>(idx) {
        return Ok(SqlValue::Boolean(v));
    }
    if let Ok(v) = row.try_get::<String, _>(idx) {
        return Ok(SqlValue::Text(v));
    }
    Ok(SqlValue::Blob(row.try_get::<Vec<u8>, _>(idx)?))
}
