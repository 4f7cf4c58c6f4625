//! Schema reconciliation and migrations for SQLite, PostgreSQL and MySQL.
//!
//! `oxide-reconcile` compares the schema an application declares against the
//! live schema of its database, generates dialect-correct SQL to close the
//! gap, and applies hand-written or generated migrations while tracking them
//! inside the target database.
//!
//! # Architecture
//!
//! - **Dialect** - Type keywords, quoting, placeholders and DDL per backend
//! - **Introspect** - Reads live column metadata from the catalog
//! - **Diff** - Declared models vs. live schema into ordered operations
//! - **Codegen** - Operations into forward/reverse SQL and migration files
//! - **Schema / Blueprint** - Buffered DSL for hand-written migrations
//! - **Runner** - Applies and rolls back migrations in id order
//!
//! Every database access goes through the [`adapter::DatabaseAdapter`]
//! capability; [`adapter::SqlxAdapter`] implements it over a sqlx `Any`
//! pool.
//!
//! # Example
//!
//! ```rust,no_run
//! use oxide_reconcile::prelude::*;
//!
//! # async fn run() -> Result<()> {
//! let db = SqlxAdapter::connect("sqlite:app.db", 1).await?;
//!
//! let mut registry = MigrationRegistry::new();
//! registry.add(
//!     1,
//!     "create_users",
//!     MigrationModule::new(|schema| {
//!         schema.create("users", |t| {
//!             t.add("id", serial().primary_key());
//!             t.add("email", text().not_null().unique());
//!             t.timestamps();
//!         });
//!         Ok(())
//!     })
//!     .with_down(|schema| {
//!         schema.drop_if_exists("users");
//!         Ok(())
//!     }),
//! )?;
//!
//! let runner = MigrationRunner::new(&db, registry);
//! runner.up().await?;
//!
//! // Compare declared models against the live schema.
//! let models = vec![resolve_model_schema(
//!     &ModelDeclaration::new("users")
//!         .field("id", serial().primary_key())
//!         .field("email", text().not_null().unique())
//!         .field("bio", text())
//!         .with_timestamps(),
//! )];
//! let live = introspect_schema(&db, &models).await?;
//! let ops = diff_schema(&models, &live, Dialect::Sqlite);
//! let sql = generate_migration_sql(&ops, Dialect::Sqlite);
//! println!("{}", generate_migration_file(&sql.up, &sql.down));
//! # Ok(())
//! # }
//! ```
//!
//! # CLI Usage
//!
//! ```bash
//! # Show what differs between models.json and the database
//! oxide-reconcile diff --models models.json
//!
//! # Write the next migration file for those differences
//! oxide-reconcile makemigrations --models models.json --name add_bio
//!
//! # Apply pending migrations
//! oxide-reconcile migrate
//!
//! # Roll back the last migration
//! oxide-reconcile rollback
//! ```

pub mod adapter;
pub mod blueprint;
pub mod codegen;
pub mod dialect;
pub mod diff;
pub mod discovery;
pub mod error;
pub mod field;
pub mod history;
pub mod introspect;
pub mod migration;
pub mod model;
pub mod runner;
pub mod schema;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::adapter::{Backend, DatabaseAdapter, RawResult, Row, SqlValue, SqlxAdapter};
    pub use crate::blueprint::{Blueprint, ColumnOp};
    pub use crate::codegen::{
        generate_migration_file, generate_migration_sql, generate_sql_migration_file,
        next_migration_filename, MigrationSql,
    };
    pub use crate::dialect::{types_match, Dialect};
    pub use crate::diff::{diff_schema, DiffOperation};
    pub use crate::discovery::{discover_migrations, parse_migration_filename};
    pub use crate::error::{MigrateError, Result};
    pub use crate::field::{
        boolean, integer, json, real, serial, text, timestamp, uuid, DefaultValue,
        FieldBuilder, FieldDefinition, FieldType, ForeignKeyAction,
    };
    pub use crate::history::{
        validate_table_name, AppliedMigration, MigrationHistory, DEFAULT_TABLE,
    };
    pub use crate::introspect::{
        introspect_schema, introspect_table, list_tables, ColumnInfo, LiveSchema,
    };
    pub use crate::migration::{MigrationModule, MigrationRecord, MigrationRegistry};
    pub use crate::model::{load_models, resolve_model_schema, ModelDeclaration, ModelInfo};
    pub use crate::runner::{Direction, MigrationRunner, MigrationStatus, RunnerOptions};
    pub use crate::schema::Schema;
}
