//! Live schema introspection.
//!
//! Reads column metadata from each dialect's catalog and canonicalizes it
//! into [`ColumnInfo`]. Results are never cached; every call hits the
//! catalog.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::adapter::{DatabaseAdapter, Row, SqlValue};
use crate::dialect::Dialect;
use crate::error::Result;
use crate::model::ModelInfo;

/// Canonical metadata of one live column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnInfo {
    /// Column name.
    pub name: String,
    /// Dialect-native type string as the catalog reports it.
    #[serde(rename = "type")]
    pub column_type: String,
    /// Whether the column rejects NULL.
    pub not_null: bool,
    /// Default expression as the catalog reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
    /// Whether the column is part of the primary key.
    pub primary_key: bool,
}

/// Introspected tables by name. A table missing from the map does not exist.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveSchema {
    tables: BTreeMap<String, Vec<ColumnInfo>>,
}

impl LiveSchema {
    /// Creates an empty live schema.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the columns of an existing table.
    pub fn insert(&mut self, table: impl Into<String>, columns: Vec<ColumnInfo>) {
        self.tables.insert(table.into(), columns);
    }

    /// Returns the columns of `table`, or `None` if it does not exist.
    #[must_use]
    pub fn table(&self, table: &str) -> Option<&[ColumnInfo]> {
        self.tables.get(table).map(Vec::as_slice)
    }

    /// Existing table names, sorted.
    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }
}

const SQLITE_COLUMNS: &str = r#"SELECT name, type AS column_type, "notnull" AS not_null,
dflt_value AS default_value, pk AS primary_key FROM pragma_table_info(?)"#;

// format_type keeps modifiers, array suffixes and user-defined type names,
// so the reported type can be restated in DDL.
const POSTGRES_COLUMNS: &str = "\
SELECT a.attname::text AS name, format_type(a.atttypid, a.atttypmod) AS column_type, \
CASE WHEN a.attnotnull THEN 'NO' ELSE 'YES' END AS is_nullable, \
pg_get_expr(d.adbin, d.adrelid) AS default_value \
FROM pg_catalog.pg_attribute a \
JOIN pg_catalog.pg_class c ON c.oid = a.attrelid \
JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace \
LEFT JOIN pg_catalog.pg_attrdef d ON d.adrelid = a.attrelid AND d.adnum = a.attnum \
WHERE n.nspname = current_schema() AND c.relname = $1 AND c.relkind = 'r' \
AND a.attnum > 0 AND NOT a.attisdropped \
ORDER BY a.attnum";

const POSTGRES_PRIMARY_KEY: &str = "\
SELECT kcu.column_name::text AS name \
FROM information_schema.table_constraints tc \
JOIN information_schema.key_column_usage kcu \
ON tc.constraint_name = kcu.constraint_name \
AND tc.table_schema = kcu.table_schema \
AND tc.table_name = kcu.table_name \
WHERE tc.constraint_type = 'PRIMARY KEY' \
AND tc.table_schema = current_schema() AND tc.table_name = $1";

const MYSQL_COLUMNS: &str = "\
SELECT COLUMN_NAME AS name, COLUMN_TYPE AS column_type, IS_NULLABLE AS is_nullable, \
COLUMN_DEFAULT AS default_value, COLUMN_KEY AS column_key \
FROM information_schema.COLUMNS \
WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ? \
ORDER BY ORDINAL_POSITION";

const SQLITE_TABLES: &str =
    "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'";

const POSTGRES_TABLES: &str = "\
SELECT table_name::text AS name FROM information_schema.tables \
WHERE table_schema = current_schema() AND table_type = 'BASE TABLE'";

const MYSQL_TABLES: &str = "\
SELECT TABLE_NAME AS name FROM information_schema.TABLES \
WHERE TABLE_SCHEMA = DATABASE() AND TABLE_TYPE = 'BASE TABLE'";

/// Reads the columns of `table`, in catalog order.
///
/// Returns `None` when the table does not exist.
pub async fn introspect_table<A: DatabaseAdapter>(
    db: &A,
    table: &str,
) -> Result<Option<Vec<ColumnInfo>>> {
    let dialect = db.backend().sql_dialect("schema introspection")?;
    let params = [SqlValue::from(table)];

    let columns: Vec<ColumnInfo> = match dialect {
        Dialect::Sqlite => db
            .raw(SQLITE_COLUMNS, &params)
            .await?
            .rows
            .iter()
            .map(|row| ColumnInfo {
                name: row.text("name").unwrap_or_default(),
                column_type: row.text("column_type").unwrap_or_default(),
                not_null: row.flag("not_null"),
                default_value: row.text("default_value"),
                primary_key: row.flag("primary_key"),
            })
            .collect(),
        Dialect::Postgres => {
            let rows = db.raw(POSTGRES_COLUMNS, &params).await?.rows;
            if rows.is_empty() {
                return Ok(None);
            }
            let pk_columns: Vec<String> = db
                .raw(POSTGRES_PRIMARY_KEY, &params)
                .await?
                .rows
                .iter()
                .filter_map(|row| row.text("name"))
                .collect();
            rows.iter()
                .map(|row| {
                    let name = row.text("name").unwrap_or_default();
                    ColumnInfo {
                        primary_key: pk_columns.contains(&name),
                        name,
                        column_type: row.text("column_type").unwrap_or_default(),
                        not_null: !row.flag("is_nullable"),
                        default_value: row.text("default_value"),
                    }
                })
                .collect()
        }
        Dialect::Mysql => db
            .raw(MYSQL_COLUMNS, &params)
            .await?
            .rows
            .iter()
            .map(|row| ColumnInfo {
                name: row.text("name").unwrap_or_default(),
                column_type: row.text("column_type").unwrap_or_default(),
                not_null: !row.flag("is_nullable"),
                default_value: row.text("default_value"),
                primary_key: row
                    .text("column_key")
                    .is_some_and(|key| key.eq_ignore_ascii_case("PRI")),
            })
            .collect(),
    };

    debug!(table = %table, dialect = %dialect, columns = columns.len(), "Introspected table");

    if columns.is_empty() {
        Ok(None)
    } else {
        Ok(Some(columns))
    }
}

/// Lists user tables, sorted. Names starting with `_` are internal and
/// never listed.
pub async fn list_tables<A: DatabaseAdapter>(db: &A) -> Result<Vec<String>> {
    let dialect = db.backend().sql_dialect("schema introspection")?;
    let sql = match dialect {
        Dialect::Sqlite => SQLITE_TABLES,
        Dialect::Postgres => POSTGRES_TABLES,
        Dialect::Mysql => MYSQL_TABLES,
    };

    let mut tables: Vec<String> = db
        .raw(sql, &[])
        .await?
        .rows
        .iter()
        .filter_map(|row: &Row| row.text("name"))
        .filter(|name| !name.starts_with('_'))
        .collect();
    tables.sort();
    Ok(tables)
}

/// Introspects every listed table plus every declared model table.
pub async fn introspect_schema<A: DatabaseAdapter>(
    db: &A,
    models: &[ModelInfo],
) -> Result<LiveSchema> {
    let mut names = list_tables(db).await?;
    for model in models {
        if !names.contains(&model.table) {
            names.push(model.table.clone());
        }
    }

    let mut live = LiveSchema::new();
    for name in names {
        if let Some(columns) = introspect_table(db, &name).await? {
            live.insert(name, columns);
        }
    }
    Ok(live)
}
