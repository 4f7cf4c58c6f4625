//! Migration runner.
//!
//! This module applies and rolls back registered migrations against a
//! database, strictly in id order, recording each step in the tracking
//! table. A tracking row is written only after the migration's statements
//! all succeeded and deleted only after its `down` statements did.
//!
//! Statements of one migration are not wrapped in a transaction. A failure
//! part-way through leaves the earlier statements applied and the migration
//! unrecorded.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::adapter::DatabaseAdapter;
use crate::dialect::Dialect;
use crate::error::{MigrateError, Result};
use crate::history::{MigrationHistory, DEFAULT_TABLE};
use crate::migration::{MigrationModule, MigrationRecord, MigrationRegistry};
use crate::schema::Schema;

/// Runner configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerOptions {
    /// Name of the tracking table. It must start with `_`; any database
    /// access fails with `InvalidTrackingTable` otherwise.
    pub table: String,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            table: DEFAULT_TABLE.to_string(),
        }
    }
}

/// Which step of a migration to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// The `up` step.
    Up,
    /// The `down` step.
    Down,
}

/// State of one migration, as reported by [`MigrationRunner::status`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationStatus {
    /// Migration id.
    pub id: i64,
    /// Migration name.
    pub name: String,
    /// Source file; `None` for applied migrations that are no longer
    /// registered.
    pub filename: Option<String>,
    /// Whether a tracking row exists.
    pub applied: bool,
    /// When it was applied.
    pub applied_at: Option<DateTime<Utc>>,
}

/// Applies and rolls back migrations from a registry.
pub struct MigrationRunner<'a, A> {
    db: &'a A,
    registry: MigrationRegistry,
    options: RunnerOptions,
}

impl<'a, A: DatabaseAdapter> MigrationRunner<'a, A> {
    /// Creates a runner over an already connected adapter.
    pub fn new(db: &'a A, registry: MigrationRegistry) -> Self {
        Self {
            db,
            registry,
            options: RunnerOptions::default(),
        }
    }

    /// Replaces the runner options.
    #[must_use]
    pub fn with_options(mut self, options: RunnerOptions) -> Self {
        self.options = options;
        self
    }

    /// Returns the registry.
    #[must_use]
    pub fn registry(&self) -> &MigrationRegistry {
        &self.registry
    }

    fn history(&self) -> MigrationHistory<'a, A> {
        MigrationHistory::new(self.db, self.options.table.as_str())
    }

    fn dialect(&self) -> Result<Dialect> {
        self.db.backend().sql_dialect("migrations")
    }

    fn module(&self, id: i64) -> Result<(&MigrationRecord, &MigrationModule)> {
        self.registry
            .get(id)
            .ok_or(MigrateError::MigrationNotFound(id))
    }

    /// Returns the applied ids, creating the tracking table if needed.
    pub async fn applied(&self) -> Result<BTreeSet<i64>> {
        self.dialect()?;
        let history = self.history();
        history.ensure_table().await?;
        history.applied_ids().await
    }

    /// Registered migrations without a tracking row, ascending by id.
    pub async fn pending(&self) -> Result<Vec<MigrationRecord>> {
        let applied = self.applied().await?;
        Ok(self
            .registry
            .records()
            .filter(|record| !applied.contains(&record.id))
            .cloned()
            .collect())
    }

    /// Applies every pending migration in ascending id order and returns
    /// them. The first failure stops the run; migrations applied before it
    /// stay applied.
    pub async fn up(&self) -> Result<Vec<MigrationRecord>> {
        let pending = self.pending().await?;
        if pending.is_empty() {
            info!("No pending migrations");
            return Ok(pending);
        }

        let history = self.history();
        for record in &pending {
            info!(id = record.id, name = %record.name, "Applying migration");
            let (_, module) = self.module(record.id)?;

            let mut schema = Schema::new();
            module.up(&mut schema)?;
            let statements = schema.execute(self.db).await?;

            history.record_applied(record.id, &record.name).await?;
            info!(id = record.id, name = %record.name, statements, "Migration applied");
        }

        Ok(pending)
    }

    /// Rolls back the highest applied migration and returns it, or `None`
    /// when nothing is applied.
    ///
    /// Fails with `MissingDown` when that migration has no `down` step; the
    /// applied set is left unchanged.
    pub async fn down(&self) -> Result<Option<MigrationRecord>> {
        let applied = self.applied().await?;
        let Some(&id) = applied.iter().next_back() else {
            info!("No migrations to roll back");
            return Ok(None);
        };

        let (record, module) = self.module(id)?;
        info!(id, name = %record.name, "Rolling back migration");

        let mut schema = Schema::new();
        match module.down(&mut schema) {
            Some(result) => result?,
            None => {
                warn!(id, name = %record.name, "Migration has no down step");
                return Err(MigrateError::MissingDown {
                    id,
                    name: record.name.clone(),
                });
            }
        }
        let statements = schema.execute(self.db).await?;

        self.history().record_unapplied(id).await?;
        info!(id, name = %record.name, statements, "Migration rolled back");
        Ok(Some(record.clone()))
    }

    /// Rolls back every applied migration, highest first.
    pub async fn down_all(&self) -> Result<Vec<MigrationRecord>> {
        let mut rolled_back = Vec::new();
        while let Some(record) = self.down().await? {
            rolled_back.push(record);
        }
        Ok(rolled_back)
    }

    /// Rolls back applied migrations above `target`, highest first;
    /// `target` itself stays applied.
    pub async fn down_to(&self, target: i64) -> Result<Vec<MigrationRecord>> {
        let mut rolled_back = Vec::new();
        loop {
            let applied = self.applied().await?;
            match applied.iter().next_back() {
                Some(&id) if id > target => {}
                _ => break,
            }
            match self.down().await? {
                Some(record) => rolled_back.push(record),
                None => break,
            }
        }
        debug!(target, count = rolled_back.len(), "Rolled back to target");
        Ok(rolled_back)
    }

    /// Reports every registered migration plus applied rows whose migration
    /// is no longer registered, ascending by id.
    pub async fn status(&self) -> Result<Vec<MigrationStatus>> {
        self.dialect()?;
        let history = self.history();
        history.ensure_table().await?;
        let mut applied: BTreeMap<i64, _> = history
            .get_applied()
            .await?
            .into_iter()
            .map(|m| (m.id, m))
            .collect();

        let mut statuses: Vec<MigrationStatus> = self
            .registry
            .records()
            .map(|record| {
                let row = applied.remove(&record.id);
                MigrationStatus {
                    id: record.id,
                    name: record.name.clone(),
                    filename: Some(record.filename.clone()),
                    applied: row.is_some(),
                    applied_at: row.map(|m| m.applied_at),
                }
            })
            .collect();

        for (id, row) in applied {
            warn!(id, name = %row.name, "Applied migration is not registered");
            statuses.push(MigrationStatus {
                id,
                name: row.name,
                filename: None,
                applied: true,
                applied_at: Some(row.applied_at),
            });
        }
        statuses.sort_by_key(|s| s.id);
        Ok(statuses)
    }

    /// Renders the statements of one step of migration `id` without
    /// executing them.
    pub fn sql_for(&self, id: i64, direction: Direction) -> Result<Vec<String>> {
        let dialect = self.dialect()?;
        let (record, module) = self.module(id)?;

        let mut schema = Schema::new();
        match direction {
            Direction::Up => module.up(&mut schema)?,
            Direction::Down => match module.down(&mut schema) {
                Some(result) => result?,
                None => {
                    return Err(MigrateError::MissingDown {
                        id,
                        name: record.name.clone(),
                    })
                }
            },
        }
        Ok(schema.statements(dialect))
    }
}
