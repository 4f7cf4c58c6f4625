//! Migration definitions and the registry the runner reads from.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::discovery::{discover_migrations, parse_sql_migration, SqlMigration};
use crate::error::{MigrateError, Result};
use crate::schema::Schema;

/// Identity of one migration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MigrationRecord {
    /// Numeric id; migrations run in ascending id order.
    pub id: i64,
    /// Name, without id prefix and extension.
    pub name: String,
    /// File the migration came from.
    pub filename: String,
}

impl MigrationRecord {
    /// Creates a record.
    #[must_use]
    pub fn new(id: i64, name: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            filename: filename.into(),
        }
    }

    /// File extension, lowercased.
    #[must_use]
    pub fn extension(&self) -> Option<String> {
        Path::new(&self.filename)
            .extension()
            .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
    }
}

/// A migration step: fills a [`Schema`] buffer that the runner executes.
pub type MigrationFn = Arc<dyn Fn(&mut Schema) -> Result<()> + Send + Sync>;

/// The `up` step of a migration and its optional `down` step.
#[derive(Clone)]
pub struct MigrationModule {
    up: MigrationFn,
    down: Option<MigrationFn>,
}

impl MigrationModule {
    /// Creates a module with only an `up` step.
    pub fn new<F>(up: F) -> Self
    where
        F: Fn(&mut Schema) -> Result<()> + Send + Sync + 'static,
    {
        Self {
            up: Arc::new(up),
            down: None,
        }
    }

    /// Adds a `down` step.
    #[must_use]
    pub fn with_down<F>(mut self, down: F) -> Self
    where
        F: Fn(&mut Schema) -> Result<()> + Send + Sync + 'static,
    {
        self.down = Some(Arc::new(down));
        self
    }

    /// Builds a module replaying the statements of a `.sql` migration.
    #[must_use]
    pub fn from_sql(sql: SqlMigration) -> Self {
        let SqlMigration { up, down } = sql;
        let mut module = Self::new(move |schema| {
            for statement in &up {
                schema.raw(statement.clone());
            }
            Ok(())
        });
        if let Some(down) = down {
            module = module.with_down(move |schema| {
                for statement in &down {
                    schema.raw(statement.clone());
                }
                Ok(())
            });
        }
        module
    }

    /// Whether the migration can be rolled back.
    #[must_use]
    pub fn has_down(&self) -> bool {
        self.down.is_some()
    }

    /// Runs the `up` step into `schema`.
    pub fn up(&self, schema: &mut Schema) -> Result<()> {
        (self.up)(schema)
    }

    /// Runs the `down` step into `schema`; `None` when there is none.
    pub fn down(&self, schema: &mut Schema) -> Option<Result<()>> {
        self.down.as_ref().map(|down| down(schema))
    }
}

impl fmt::Debug for MigrationModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationModule")
            .field("has_down", &self.has_down())
            .finish_non_exhaustive()
    }
}

/// Explicit id → migration map, populated at startup.
#[derive(Debug, Clone, Default)]
pub struct MigrationRegistry {
    entries: BTreeMap<i64, (MigrationRecord, MigrationModule)>,
}

impl MigrationRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a migration. Ids must be unique.
    pub fn register(
        &mut self,
        record: MigrationRecord,
        module: MigrationModule,
    ) -> Result<&mut Self> {
        if let Some((existing, _)) = self.entries.get(&record.id) {
            return Err(MigrateError::DuplicateMigration {
                id: record.id,
                first: existing.filename.clone(),
                second: record.filename,
            });
        }
        debug!(id = record.id, name = %record.name, "Registered migration");
        self.entries.insert(record.id, (record, module));
        Ok(self)
    }

    /// Registers a migration defined in code, naming its file
    /// `<id>_<name>.rs`.
    pub fn add(&mut self, id: i64, name: &str, module: MigrationModule) -> Result<&mut Self> {
        self.register(MigrationRecord::new(id, name, format!("{id:04}_{name}.rs")), module)
    }

    /// Loads the migrations found in `dir`.
    ///
    /// `.sql` files are parsed and registered. Any other matching file must
    /// already have been registered from code under the same id.
    pub fn load_dir(&mut self, dir: &Path) -> Result<usize> {
        self.load(dir, true)
    }

    /// Loads the `.sql` migrations found in `dir`, skipping other migration
    /// files that are not registered from code with a warning.
    ///
    /// For callers that cannot register Rust migrations, such as the CLI.
    pub fn load_sql_files(&mut self, dir: &Path) -> Result<usize> {
        self.load(dir, false)
    }

    fn load(&mut self, dir: &Path, strict: bool) -> Result<usize> {
        let mut loaded = 0;
        for record in discover_migrations(dir)? {
            if record.extension().as_deref() == Some("sql") {
                let path = dir.join(&record.filename);
                let contents = std::fs::read_to_string(&path)?;
                let module = MigrationModule::from_sql(parse_sql_migration(&path, &contents)?);
                self.register(record, module)?;
                loaded += 1;
            } else if !self.entries.contains_key(&record.id) {
                if strict {
                    return Err(MigrateError::InvalidState(format!(
                        "migration file '{}' has no registered implementation",
                        record.filename
                    )));
                }
                warn!(
                    file = %record.filename,
                    "Skipping migration that must be registered from code"
                );
            }
        }
        Ok(loaded)
    }

    /// Looks a migration up by id.
    #[must_use]
    pub fn get(&self, id: i64) -> Option<(&MigrationRecord, &MigrationModule)> {
        self.entries.get(&id).map(|(record, module)| (record, module))
    }

    /// Whether `id` is registered.
    #[must_use]
    pub fn contains(&self, id: i64) -> bool {
        self.entries.contains_key(&id)
    }

    /// Registered records, ascending by id.
    pub fn records(&self) -> impl Iterator<Item = &MigrationRecord> {
        self.entries.values().map(|(record, _)| record)
    }

    /// Number of registered migrations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::Dialect;

    fn noop() -> MigrationModule {
        MigrationModule::new(|_| Ok(()))
    }

    #[test]
    fn test_register_rejects_duplicates() {
        let mut registry = MigrationRegistry::new();
        registry.add(1, "init", noop()).unwrap();
        let err = registry.add(1, "again", noop()).unwrap_err();
        assert!(matches!(
            err,
            MigrateError::DuplicateMigration { id: 1, ref first, ref second }
                if first == "0001_init.rs" && second == "0001_again.rs"
        ));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_records_are_ordered() {
        let mut registry = MigrationRegistry::new();
        registry.add(10, "c", noop()).unwrap();
        registry.add(2, "b", noop()).unwrap();
        let ids: Vec<i64> = registry.records().map(|r| r.id).collect();
        assert_eq!(ids, vec![2, 10]);
    }

    #[test]
    fn test_module_steps() {
        let module = MigrationModule::new(|schema| {
            schema.raw("SELECT 1");
            Ok(())
        });
        assert!(!module.has_down());

        let mut schema = Schema::new();
        module.up(&mut schema).unwrap();
        assert_eq!(schema.statements(Dialect::Sqlite), vec!["SELECT 1"]);
        assert!(module.down(&mut schema).is_none());
    }

    #[test]
    fn test_load_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("0001_users.sql"),
            "-- migrate:up\nCREATE TABLE users (id INTEGER);\n-- migrate:down\nDROP TABLE users;\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("0002_posts.rs"), "// code").unwrap();

        let mut registry = MigrationRegistry::new();
        let err = registry.load_dir(dir.path()).unwrap_err();
        assert!(matches!(err, MigrateError::InvalidState(_)));

        let mut registry = MigrationRegistry::new();
        registry.add(2, "posts", noop()).unwrap();
        assert_eq!(registry.load_dir(dir.path()).unwrap(), 1);

        let (record, module) = registry.get(1).unwrap();
        assert_eq!(record.name, "users");
        assert!(module.has_down());

        let mut schema = Schema::new();
        module.down(&mut schema).unwrap().unwrap();
        assert_eq!(schema.statements(Dialect::Sqlite), vec!["DROP TABLE users"]);
    }

    #[test]
    fn test_generated_rust_migration_does_not_block_sql_loading() {
        use crate::codegen::{
            generate_migration_file, generate_sql_migration_file, next_migration_filename,
        };
        use crate::discovery::discover_migrations;

        let dir = tempfile::tempdir().unwrap();
        let up = vec!["CREATE TABLE users (id INTEGER)".to_string()];
        let down = vec!["DROP TABLE users".to_string()];
        let sql_name = next_migration_filename(&[], "users", "sql");
        std::fs::write(dir.path().join(&sql_name), generate_sql_migration_file(&up, &down))
            .unwrap();

        let existing = discover_migrations(dir.path()).unwrap();
        let rust_name = next_migration_filename(&existing, "posts", "rs");
        assert_eq!(rust_name, "0002_posts.rs");
        std::fs::write(dir.path().join(&rust_name), generate_migration_file(&up, &down)).unwrap();

        let mut registry = MigrationRegistry::new();
        assert_eq!(registry.load_sql_files(dir.path()).unwrap(), 1);
        assert!(registry.contains(1));
        assert!(!registry.contains(2));

        let mut strict = MigrationRegistry::new();
        assert!(matches!(
            strict.load_dir(dir.path()),
            Err(MigrateError::InvalidState(_))
        ));
    }
}
