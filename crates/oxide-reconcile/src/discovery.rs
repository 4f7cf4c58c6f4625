//! Migration file discovery and `.sql` migration parsing.

use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

use crate::error::{MigrateError, Result};
use crate::migration::MigrationRecord;

/// Section marker opening the forward statements of a `.sql` migration.
pub const UP_MARKER: &str = "-- migrate:up";
/// Section marker opening the reverse statements of a `.sql` migration.
pub const DOWN_MARKER: &str = "-- migrate:down";

fn filename_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(\d+)[_-](.+)\.([A-Za-z0-9]+)$")
            .expect("Invalid migration filename regex")
    })
}

/// Parses `<digits><_|-><name>.<ext>`. Returns `None` for anything else.
#[must_use]
pub fn parse_migration_filename(filename: &str) -> Option<MigrationRecord> {
    let caps = filename_pattern().captures(filename)?;
    let id = caps[1].parse::<i64>().ok()?;
    Some(MigrationRecord::new(id, &caps[2], filename))
}

/// Lists the migrations in `dir`, sorted by numeric id.
///
/// Files not matching the naming pattern are ignored. Two files sharing an
/// id are rejected.
pub fn discover_migrations(dir: &Path) -> Result<Vec<MigrationRecord>> {
    let mut records = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let filename = entry.file_name().to_string_lossy().into_owned();
        match parse_migration_filename(&filename) {
            Some(record) => records.push(record),
            None => debug!(file = %filename, "Ignoring non-migration file"),
        }
    }

    records.sort_by(|a, b| a.id.cmp(&b.id).then_with(|| a.filename.cmp(&b.filename)));
    for pair in records.windows(2) {
        if pair[0].id == pair[1].id {
            return Err(MigrateError::DuplicateMigration {
                id: pair[0].id,
                first: pair[0].filename.clone(),
                second: pair[1].filename.clone(),
            });
        }
    }
    Ok(records)
}

/// Statements of a `.sql` migration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SqlMigration {
    /// Forward statements.
    pub up: Vec<String>,
    /// Reverse statements; `None` when the file has no down section.
    pub down: Option<Vec<String>>,
}

/// Splits a `.sql` migration into statements.
///
/// A statement ends at a line ending in `;`. Comment lines are dropped.
/// Text before the up marker is not allowed.
pub fn parse_sql_migration(path: &Path, contents: &str) -> Result<SqlMigration> {
    enum Section {
        None,
        Up,
        Down,
    }

    let parse_error = |message: &str| MigrateError::ParseError {
        path: path.to_path_buf(),
        message: message.to_string(),
    };

    let mut section = Section::None;
    let mut up = Vec::new();
    let mut down: Option<Vec<String>> = None;
    let mut current = String::new();

    for line in contents.lines() {
        let trimmed = line.trim();
        if trimmed.eq_ignore_ascii_case(UP_MARKER) || trimmed.eq_ignore_ascii_case(DOWN_MARKER) {
            if !current.trim().is_empty() {
                return Err(parse_error("statement is missing its terminating ';'"));
            }
            current.clear();
            if trimmed.eq_ignore_ascii_case(UP_MARKER) {
                section = Section::Up;
            } else {
                section = Section::Down;
                down.get_or_insert_with(Vec::new);
            }
            continue;
        }
        if trimmed.is_empty() || trimmed.starts_with("--") {
            continue;
        }

        let target = match section {
            Section::None => return Err(parse_error("SQL found before '-- migrate:up'")),
            Section::Up => &mut up,
            Section::Down => down.get_or_insert_with(Vec::new),
        };

        if !current.is_empty() {
            current.push('\n');
        }
        current.push_str(line);
        if trimmed.ends_with(';') {
            let statement = current.trim().trim_end_matches(';').trim_end().to_string();
            if !statement.is_empty() {
                target.push(statement);
            }
            current.clear();
        }
    }

    if !current.trim().is_empty() {
        return Err(parse_error("statement is missing its terminating ';'"));
    }
    if matches!(section, Section::None) {
        return Err(parse_error("missing '-- migrate:up' section"));
    }

    Ok(SqlMigration { up, down })
}
