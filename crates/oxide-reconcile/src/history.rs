//! Migration history tracking.
//!
//! This module manages the reconciliation table (`_migrations` by default)
//! that records which migrations have been applied. The table lives in the
//! target database itself; a row exists exactly when the migration's `up`
//! step completed.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::adapter::{DatabaseAdapter, SqlValue};
use crate::dialect::Dialect;
use crate::error::{MigrateError, Result};

/// Default name of the reconciliation table.
pub const DEFAULT_TABLE: &str = "_migrations";

/// A record of an applied migration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedMigration {
    /// Migration id.
    pub id: i64,
    /// Migration name.
    pub name: String,
    /// When the migration was applied.
    pub applied_at: DateTime<Utc>,
}

/// Checks that `table` can serve as the tracking table.
///
/// Introspection and diffing skip `_`-prefixed tables, so any other name
/// would be reported as an undeclared table and dropped.
pub fn validate_table_name(table: &str) -> Result<()> {
    match table.strip_prefix('_') {
        Some(rest) if !rest.is_empty() => Ok(()),
        _ => Err(MigrateError::InvalidTrackingTable(table.to_string())),
    }
}

/// SQL creating the tracking table.
#[must_use]
pub fn create_table_sql(dialect: Dialect, table: &str) -> String {
    let (id_type, name_type, applied_type) = match dialect {
        Dialect::Sqlite => ("INTEGER", "TEXT", "TEXT"),
        Dialect::Postgres => ("BIGINT", "TEXT", "TEXT"),
        Dialect::Mysql => ("BIGINT", "VARCHAR(255)", "VARCHAR(40)"),
    };
    format!(
        "CREATE TABLE IF NOT EXISTS {} (id {id_type} PRIMARY KEY, name {name_type} NOT NULL, \
         applied_at {applied_type} NOT NULL)",
        dialect.quote_identifier(table)
    )
}

/// Manages the migration history in the database.
#[derive(Debug)]
pub struct MigrationHistory<'a, A> {
    db: &'a A,
    table: String,
}

impl<'a, A: DatabaseAdapter> MigrationHistory<'a, A> {
    /// Creates a history manager over `table`.
    pub fn new(db: &'a A, table: impl Into<String>) -> Self {
        Self {
            db,
            table: table.into(),
        }
    }

    /// Returns the tracking table name.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    fn dialect(&self) -> Result<Dialect> {
        validate_table_name(&self.table)?;
        self.db.backend().sql_dialect("migration tracking")
    }

    /// Ensures the migrations table exists.
    pub async fn ensure_table(&self) -> Result<()> {
        let dialect = self.dialect()?;
        self.db
            .raw(&create_table_sql(dialect, &self.table), &[])
            .await?;
        Ok(())
    }

    /// Records a migration as applied.
    pub async fn record_applied(&self, id: i64, name: &str) -> Result<()> {
        let dialect = self.dialect()?;
        let sql = format!(
            "INSERT INTO {} (id, name, applied_at) VALUES ({}, {}, {})",
            dialect.quote_identifier(&self.table),
            dialect.placeholder(1),
            dialect.placeholder(2),
            dialect.placeholder(3)
        );
        let params = [
            SqlValue::Integer(id),
            SqlValue::from(name),
            SqlValue::Text(Utc::now().to_rfc3339()),
        ];
        self.db.raw(&sql, &params).await?;
        debug!(id, name = %name, "Recorded migration as applied");
        Ok(())
    }

    /// Removes a migration record (for rollback).
    pub async fn record_unapplied(&self, id: i64) -> Result<()> {
        let dialect = self.dialect()?;
        let sql = format!(
            "DELETE FROM {} WHERE id = {}",
            dialect.quote_identifier(&self.table),
            dialect.placeholder(1)
        );
        let result = self.db.raw(&sql, &[SqlValue::Integer(id)]).await?;

        if result.changes == Some(0) {
            return Err(MigrateError::MigrationNotFound(id));
        }
        debug!(id, "Removed migration record");
        Ok(())
    }

    /// Returns the set of applied ids.
    pub async fn applied_ids(&self) -> Result<BTreeSet<i64>> {
        Ok(self.get_applied().await?.into_iter().map(|m| m.id).collect())
    }

    /// Gets all applied migrations, ascending by id.
    pub async fn get_applied(&self) -> Result<Vec<AppliedMigration>> {
        let dialect = self.dialect()?;
        let sql = format!(
            "SELECT id, name, applied_at FROM {} ORDER BY id",
            dialect.quote_identifier(&self.table)
        );
        let rows = self.db.raw(&sql, &[]).await?.rows;

        let mut migrations = Vec::with_capacity(rows.len());
        for row in rows {
            let id = row.integer("id").ok_or_else(|| {
                MigrateError::InvalidState(format!("non-integer id in {}", self.table))
            })?;
            let applied_at_str = row.text("applied_at").unwrap_or_default();
            let applied_at = DateTime::parse_from_rfc3339(&applied_at_str)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| {
                    MigrateError::InvalidState(format!(
                        "migration {id} has an unreadable applied_at '{applied_at_str}': {e}"
                    ))
                })?;

            migrations.push(AppliedMigration {
                id,
                name: row.text("name").unwrap_or_default(),
                applied_at,
            });
        }

        Ok(migrations)
    }
}
