//! Migration generation.
//!
//! Turns [`DiffOperation`]s into forward and reverse SQL, then into migration
//! source text. Lossy operations never get a fabricated reverse: their down
//! side is an unresolved comment for a human to fill in.

use crate::dialect::Dialect;
use crate::diff::DiffOperation;
use crate::field::DefaultValue;
use crate::migration::MigrationRecord;

/// Generated SQL for one migration.
///
/// Entries starting with `--` are comments and are never executed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationSql {
    /// Forward statements, in operation order.
    pub up: Vec<String>,
    /// Reverse statements, in reverse operation order.
    pub down: Vec<String>,
}

impl MigrationSql {
    /// True when neither direction has anything in it.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.up.is_empty() && self.down.is_empty()
    }
}

/// Whether an entry is nothing but comment lines.
///
/// SQL preceded by a comment line is not a comment.
#[must_use]
pub fn is_comment(sql: &str) -> bool {
    let mut lines = sql
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .peekable();
    lines.peek().is_some() && lines.all(|line| line.starts_with("--"))
}

/// Generates forward and reverse SQL for `ops`.
#[must_use]
pub fn generate_migration_sql(ops: &[DiffOperation], dialect: Dialect) -> MigrationSql {
    let mut up = Vec::new();
    let mut reversed = Vec::with_capacity(ops.len());

    for op in ops {
        let (forward, reverse) = render_operation(op, dialect);
        up.extend(forward);
        reversed.push(reverse);
    }

    let down = reversed.into_iter().rev().flatten().collect();
    MigrationSql { up, down }
}

fn render_operation(op: &DiffOperation, dialect: Dialect) -> (Vec<String>, Vec<String>) {
    match op {
        DiffOperation::CreateTable { table, fields } => (
            vec![dialect.create_table_sql(
                table,
                fields.iter().map(|(name, field)| (name.as_str(), field)),
                &[],
            )],
            vec![dialect.drop_table_sql(table, true)],
        ),
        DiffOperation::AddColumn {
            table,
            column,
            field,
        } => {
            let mut forward = Vec::new();
            let rejected = field.primary_key
                || field.unique
                || (field.not_null && field.default_value.is_none());
            if dialect == Dialect::Sqlite && rejected {
                forward.push(format!(
                    "-- WARNING: SQLite ADD COLUMN rejects {table}.{column}: PRIMARY KEY or UNIQUE \
                     columns and NOT NULL columns without a default cannot be added"
                ));
            }
            forward.push(dialect.add_column_sql(table, column, field));
            (forward, vec![dialect.drop_column_sql(table, column)])
        }
        DiffOperation::DropColumn { table, column } => {
            let mut forward = Vec::new();
            if dialect == Dialect::Sqlite {
                forward.push(format!(
                    "-- WARNING: SQLite cannot drop {table}.{} if it is part of a PRIMARY KEY, \
                     UNIQUE constraint, index or foreign key",
                    column.name
                ));
            }
            forward.push(dialect.drop_column_sql(table, &column.name));
            let reverse = vec![format!(
                "-- IRREVERSIBLE: restore column {table}.{} ({}{}) and its data manually",
                column.name,
                column.column_type,
                if column.not_null { " NOT NULL" } else { "" }
            )];
            (forward, reverse)
        }
        DiffOperation::AlterColumn {
            table,
            column,
            field,
            previous,
        } => {
            let declared = dialect.alter_type_keyword(field.field_type);
            let declared_default = field.default_value.as_ref().map(DefaultValue::to_sql);
            let previous_default = previous.default_value.as_deref().map(catalog_default_sql);
            let forward = dialect.alter_column_type_sql(
                table,
                column,
                declared,
                field.not_null,
                declared_default.as_deref(),
            );
            let reverse = dialect.alter_column_type_sql(
                table,
                column,
                &previous.column_type,
                previous.not_null,
                previous_default.as_deref(),
            );
            match (forward, reverse) {
                (Some(forward), Some(reverse)) => (vec![forward], vec![reverse]),
                _ => (
                    vec![format!(
                        "-- WARNING: {dialect} cannot change {table}.{column} from {} to \
                         {declared} in place; rebuild the table manually",
                        previous.column_type
                    )],
                    vec![format!(
                        "-- WARNING: {dialect} cannot change {table}.{column} back to {} in place; \
                         rebuild the table manually",
                        previous.column_type
                    )],
                ),
            }
        }
        DiffOperation::DropTable { table, columns } => {
            let listing = columns
                .iter()
                .map(|c| format!("{} {}", c.name, c.column_type))
                .collect::<Vec<_>>()
                .join(", ");
            (
                vec![dialect.drop_table_sql(table, true)],
                vec![format!(
                    "-- IRREVERSIBLE: recreate table {table} ({listing}) and its data manually"
                )],
            )
        }
    }
}

/// Turns a default as the catalog reports it back into SQL. MySQL reports
/// string defaults unquoted; numbers, keywords and expressions pass through.
fn catalog_default_sql(raw: &str) -> String {
    let trimmed = raw.trim();
    let upper = trimmed.to_ascii_uppercase();
    let passthrough = trimmed.starts_with('\'')
        || trimmed.starts_with('(')
        || trimmed.parse::<f64>().is_ok()
        || matches!(upper.as_str(), "NULL" | "TRUE" | "FALSE")
        || upper.starts_with("CURRENT_TIMESTAMP")
        || upper.starts_with("NOW(");
    if passthrough {
        trimmed.to_string()
    } else {
        format!("'{}'", trimmed.replace('\'', "''"))
    }
}

/// Renders a Rust migration module with `up` and `down` functions.
///
/// Statements become `schema.raw("...")` calls; comment lines become `//`
/// comments.
#[must_use]
pub fn generate_migration_file(up: &[String], down: &[String]) -> String {
    format!(
        "//! Generated by oxide-reconcile.\n\
         \n\
         use oxide_reconcile::prelude::*;\n\
         \n\
         pub fn up(schema: &mut Schema) -> Result<()> {{\n\
         {}\
         \x20   Ok(())\n\
         }}\n\
         \n\
         pub fn down(schema: &mut Schema) -> Result<()> {{\n\
         {}\
         \x20   Ok(())\n\
         }}\n",
        render_body(up),
        render_body(down)
    )
}

fn render_body(lines: &[String]) -> String {
    let mut out = String::new();
    for line in lines {
        if is_comment(line) {
            let text = line.trim_start().trim_start_matches('-').trim_start();
            out.push_str(&format!("    // {text}\n"));
        } else {
            out.push_str(&format!("    schema.raw(\"{}\");\n", escape_rust_string(line)));
        }
    }
    out
}

/// Escapes text for a Rust string literal.
fn escape_rust_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(ch),
        }
    }
    out
}

/// Renders a `.sql` migration with `-- migrate:up` / `-- migrate:down`
/// sections.
#[must_use]
pub fn generate_sql_migration_file(up: &[String], down: &[String]) -> String {
    let mut out = String::from("-- migrate:up\n");
    push_sql_lines(&mut out, up);
    out.push_str("\n-- migrate:down\n");
    push_sql_lines(&mut out, down);
    out
}

fn push_sql_lines(out: &mut String, lines: &[String]) {
    for line in lines {
        out.push_str(line);
        if !is_comment(line) && !line.trim_end().ends_with(';') {
            out.push(';');
        }
        out.push('\n');
    }
}

/// Filename for the next migration: one past the highest existing id,
/// zero-padded to four digits.
#[must_use]
pub fn next_migration_filename(existing: &[MigrationRecord], name: &str, ext: &str) -> String {
    let next = existing.iter().map(|m| m.id).max().unwrap_or(0) + 1;
    let slug: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("{next:04}_{slug}.{ext}")
}
