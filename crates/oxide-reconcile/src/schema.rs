//! Table-level DSL for hand-written migrations.
//!
//! A [`Schema`] only records what a migration wants to do. Nothing touches
//! the database until [`Schema::execute`], which renders every buffered
//! operation for the adapter's dialect and runs the statements one by one in
//! declaration order.
//!
//! ```rust
//! use oxide_reconcile::prelude::*;
//!
//! let mut schema = Schema::new();
//! schema
//!     .create("posts", |t| {
//!         t.add("id", serial().primary_key());
//!         t.add("title", text().not_null());
//!         t.timestamps();
//!     })
//!     .table("users", |t| {
//!         t.add("bio", text());
//!         t.unique(&["email", "org_id"]);
//!     });
//!
//! let sql = schema.statements(Dialect::Sqlite);
//! assert_eq!(sql.len(), 3);
//! assert!(sql[2].starts_with("CREATE UNIQUE INDEX \"uq_users_email_org_id\""));
//! ```

use tracing::{debug, warn};

use crate::adapter::DatabaseAdapter;
use crate::blueprint::{Blueprint, ColumnOp};
use crate::codegen::is_comment;
use crate::dialect::Dialect;
use crate::error::Result;

/// A buffered table-level operation.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaOp {
    /// Creates a table.
    Create {
        /// Table name.
        table: String,
        /// Columns and unique constraints.
        blueprint: Blueprint,
    },
    /// Alters an existing table.
    Alter {
        /// Table name.
        table: String,
        /// Column operations and unique constraints.
        blueprint: Blueprint,
    },
    /// Drops a table.
    Drop(String),
    /// Drops a table if it exists.
    DropIfExists(String),
    /// Renames a table.
    Rename {
        /// Current name.
        from: String,
        /// New name.
        to: String,
    },
    /// Raw SQL, passed through untouched.
    Raw(String),
}

impl SchemaOp {
    /// Renders the operation as SQL statements for `dialect`.
    #[must_use]
    pub fn to_sql(&self, dialect: Dialect) -> Vec<String> {
        match self {
            Self::Create { table, blueprint } => {
                let mut columns = Vec::new();
                for op in blueprint.columns() {
                    match op {
                        ColumnOp::Add { name, field } => columns.push((name.as_str(), field)),
                        ColumnOp::Drop(name) => {
                            warn!(table = %table, column = %name, "Ignoring drop inside create");
                        }
                        ColumnOp::Rename { from, .. } => {
                            warn!(table = %table, column = %from, "Ignoring rename inside create");
                        }
                    }
                }
                vec![dialect.create_table_sql(table, columns, blueprint.uniques())]
            }
            Self::Alter { table, blueprint } => {
                let mut statements: Vec<String> = blueprint
                    .columns()
                    .iter()
                    .map(|op| match op {
                        ColumnOp::Add { name, field } => dialect.add_column_sql(table, name, field),
                        ColumnOp::Drop(name) => dialect.drop_column_sql(table, name),
                        ColumnOp::Rename { from, to } => dialect.rename_column_sql(table, from, to),
                    })
                    .collect();
                statements.extend(
                    blueprint
                        .uniques()
                        .iter()
                        .map(|cols| dialect.create_unique_index_sql(table, cols)),
                );
                statements
            }
            Self::Drop(table) => vec![dialect.drop_table_sql(table, false)],
            Self::DropIfExists(table) => vec![dialect.drop_table_sql(table, true)],
            Self::Rename { from, to } => vec![dialect.rename_table_sql(from, to)],
            Self::Raw(sql) => vec![sql.clone()],
        }
    }
}

/// Buffered schema operations for one migration step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    ops: Vec<SchemaOp>,
}

impl Schema {
    /// Creates an empty schema buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a table; `build` fills in its blueprint.
    pub fn create(
        &mut self,
        table: impl Into<String>,
        build: impl FnOnce(&mut Blueprint),
    ) -> &mut Self {
        let mut blueprint = Blueprint::new();
        build(&mut blueprint);
        self.ops.push(SchemaOp::Create {
            table: table.into(),
            blueprint,
        });
        self
    }

    /// Alters a table; `build` fills in its blueprint.
    pub fn table(
        &mut self,
        table: impl Into<String>,
        build: impl FnOnce(&mut Blueprint),
    ) -> &mut Self {
        let mut blueprint = Blueprint::new();
        build(&mut blueprint);
        self.ops.push(SchemaOp::Alter {
            table: table.into(),
            blueprint,
        });
        self
    }

    /// Drops a table.
    pub fn drop(&mut self, table: impl Into<String>) -> &mut Self {
        self.ops.push(SchemaOp::Drop(table.into()));
        self
    }

    /// Drops a table if it exists.
    pub fn drop_if_exists(&mut self, table: impl Into<String>) -> &mut Self {
        self.ops.push(SchemaOp::DropIfExists(table.into()));
        self
    }

    /// Renames a table.
    pub fn rename(&mut self, from: impl Into<String>, to: impl Into<String>) -> &mut Self {
        self.ops.push(SchemaOp::Rename {
            from: from.into(),
            to: to.into(),
        });
        self
    }

    /// Queues raw SQL.
    pub fn raw(&mut self, sql: impl Into<String>) -> &mut Self {
        self.ops.push(SchemaOp::Raw(sql.into()));
        self
    }

    /// Buffered operations, in declaration order.
    #[must_use]
    pub fn operations(&self) -> &[SchemaOp] {
        &self.ops
    }

    /// Returns true if nothing is buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Renders every buffered operation without executing anything.
    #[must_use]
    pub fn statements(&self, dialect: Dialect) -> Vec<String> {
        self.ops.iter().flat_map(|op| op.to_sql(dialect)).collect()
    }

    /// Executes and drains the buffer, returning the number of statements
    /// run. Entries made only of comment lines are skipped; raw SQL that
    /// merely starts with a comment still runs.
    ///
    /// Fails with `Unsupported` on a non-relational backend. A failing
    /// statement aborts the rest; earlier statements stay applied.
    pub async fn execute<A: DatabaseAdapter>(&mut self, db: &A) -> Result<usize> {
        let dialect = db.backend().sql_dialect("schema execution")?;
        let statements = self.statements(dialect);
        self.ops.clear();

        let mut executed = 0;
        for sql in &statements {
            if is_comment(sql) {
                debug!(comment = %sql, "Skipping comment");
                continue;
            }
            debug!(sql = %sql, "Executing SQL");
            db.raw(sql, &[]).await?;
            executed += 1;
        }
        Ok(executed)
    }
}
