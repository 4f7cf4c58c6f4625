//! Dialect-specific SQL text.
//!
//! Everything that differs between SQLite, PostgreSQL and MySQL funnels
//! through [`Dialect`]: type keywords, identifier quoting, placeholders and
//! DDL statement shapes. All functions are pure; every decision is an
//! exhaustive `match`, so adding a dialect fails to compile until each
//! mapping is filled in.

mod equivalence;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::MigrateError;
use crate::field::{FieldDefinition, FieldType};

pub use equivalence::{normalize_type, types_match};

/// A relational SQL backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// SQLite (rowid tables, double-quoted identifiers, `?` placeholders).
    Sqlite,
    /// PostgreSQL (double-quoted identifiers, `$n` placeholders).
    Postgres,
    /// MySQL (backtick identifiers, `?` placeholders).
    Mysql,
}

impl Dialect {
    /// Every dialect.
    pub const ALL: [Self; 3] = [Self::Sqlite, Self::Postgres, Self::Mysql];

    /// Returns the dialect name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Postgres => "postgres",
            Self::Mysql => "mysql",
        }
    }

    /// Derives the dialect from a connection URL scheme.
    #[must_use]
    pub fn from_url(url: &str) -> Option<Self> {
        let scheme = url.split(':').next()?.to_ascii_lowercase();
        match scheme.as_str() {
            "sqlite" => Some(Self::Sqlite),
            "postgres" | "postgresql" => Some(Self::Postgres),
            "mysql" | "mariadb" => Some(Self::Mysql),
            _ => None,
        }
    }

    /// Maps an abstract field type to the dialect's type keyword.
    #[must_use]
    pub const fn type_keyword(self, field_type: FieldType) -> &'static str {
        match self {
            Self::Sqlite => match field_type {
                FieldType::Serial | FieldType::Integer | FieldType::Boolean => "INTEGER",
                FieldType::Text | FieldType::Timestamp | FieldType::Json | FieldType::Uuid => {
                    "TEXT"
                }
                FieldType::Real => "REAL",
            },
            Self::Postgres => match field_type {
                FieldType::Serial => "SERIAL",
                FieldType::Text => "TEXT",
                FieldType::Integer => "INTEGER",
                FieldType::Boolean => "BOOLEAN",
                FieldType::Timestamp => "TIMESTAMPTZ",
                FieldType::Json => "JSONB",
                FieldType::Real => "DOUBLE PRECISION",
                FieldType::Uuid => "UUID",
            },
            Self::Mysql => match field_type {
                FieldType::Serial => "INT AUTO_INCREMENT",
                FieldType::Text => "VARCHAR(255)",
                FieldType::Integer => "INT",
                FieldType::Boolean => "TINYINT(1)",
                FieldType::Timestamp => "DATETIME",
                FieldType::Json => "JSON",
                FieldType::Real => "DOUBLE",
                FieldType::Uuid => "CHAR(36)",
            },
        }
    }

    /// Type keyword used when changing an existing column's type.
    ///
    /// PostgreSQL's `SERIAL` is a pseudo-type that only exists at creation.
    #[must_use]
    pub const fn alter_type_keyword(self, field_type: FieldType) -> &'static str {
        match (self, field_type) {
            (Self::Postgres, FieldType::Serial) => "INTEGER",
            _ => self.type_keyword(field_type),
        }
    }

    /// Returns the identifier quote character.
    #[must_use]
    pub const fn quote_char(self) -> char {
        match self {
            Self::Sqlite | Self::Postgres => '"',
            Self::Mysql => '`',
        }
    }

    /// Quotes an identifier, doubling any embedded quote character.
    #[must_use]
    pub fn quote_identifier(self, name: &str) -> String {
        let q = self.quote_char();
        let escaped = name.replace(q, &format!("{q}{q}"));
        format!("{q}{escaped}{q}")
    }

    /// Positional parameter placeholder for the 1-based `position`.
    #[must_use]
    pub fn placeholder(self, position: usize) -> String {
        match self {
            Self::Sqlite | Self::Mysql => String::from("?"),
            Self::Postgres => format!("${position}"),
        }
    }

    /// Whether the dialect can change a column's type in place.
    #[must_use]
    pub const fn supports_alter_column_type(self) -> bool {
        match self {
            Self::Sqlite => false,
            Self::Postgres | Self::Mysql => true,
        }
    }

    /// Generates SQL for a column definition.
    #[must_use]
    pub fn column_definition(self, name: &str, field: &FieldDefinition) -> String {
        let data_type = match (self, field.field_type, field.primary_key) {
            // A rowid alias must be spelled exactly INTEGER PRIMARY KEY.
            (Self::Sqlite, FieldType::Serial, true) => "INTEGER",
            (_, field_type, _) => self.type_keyword(field_type),
        };

        let mut sql = format!("{} {}", self.quote_identifier(name), data_type);

        if field.primary_key {
            sql.push_str(" PRIMARY KEY");
        } else {
            if field.not_null {
                sql.push_str(" NOT NULL");
            }
            if field.unique {
                sql.push_str(" UNIQUE");
            }
        }

        if let Some(ref default) = field.default_value {
            sql.push_str(" DEFAULT ");
            sql.push_str(&default.to_sql());
        }

        if let Some(ref fk) = field.references {
            sql.push_str(" REFERENCES ");
            sql.push_str(&self.quote_identifier(&fk.table));
            sql.push_str(" (");
            sql.push_str(&self.quote_identifier(&fk.column));
            sql.push(')');
            if let Some(action) = fk.on_delete {
                sql.push_str(" ON DELETE ");
                sql.push_str(action.as_sql());
            }
        }

        sql
    }

    /// Generates `CREATE TABLE IF NOT EXISTS` for the given columns, plus one
    /// table-level `UNIQUE (...)` per entry of `unique_sets`.
    #[must_use]
    pub fn create_table_sql<'a, I>(
        self,
        table: &str,
        columns: I,
        unique_sets: &[Vec<String>],
    ) -> String
    where
        I: IntoIterator<Item = (&'a str, &'a FieldDefinition)>,
    {
        let mut defs: Vec<String> = columns
            .into_iter()
            .map(|(name, field)| self.column_definition(name, field))
            .collect();

        for set in unique_sets {
            defs.push(format!("UNIQUE ({})", self.quote_list(set)));
        }

        format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            self.quote_identifier(table),
            defs.join(", ")
        )
    }

    /// Generates SQL for DROP TABLE.
    #[must_use]
    pub fn drop_table_sql(self, table: &str, if_exists: bool) -> String {
        let mut sql = String::from("DROP TABLE ");
        if if_exists {
            sql.push_str("IF EXISTS ");
        }
        sql.push_str(&self.quote_identifier(table));
        sql
    }

    /// Generates SQL for renaming a table.
    #[must_use]
    pub fn rename_table_sql(self, from: &str, to: &str) -> String {
        match self {
            Self::Sqlite | Self::Postgres => format!(
                "ALTER TABLE {} RENAME TO {}",
                self.quote_identifier(from),
                self.quote_identifier(to)
            ),
            Self::Mysql => format!(
                "RENAME TABLE {} TO {}",
                self.quote_identifier(from),
                self.quote_identifier(to)
            ),
        }
    }

    /// Generates SQL for adding a column.
    #[must_use]
    pub fn add_column_sql(self, table: &str, name: &str, field: &FieldDefinition) -> String {
        format!(
            "ALTER TABLE {} ADD COLUMN {}",
            self.quote_identifier(table),
            self.column_definition(name, field)
        )
    }

    /// Generates SQL for dropping a column.
    #[must_use]
    pub fn drop_column_sql(self, table: &str, column: &str) -> String {
        format!(
            "ALTER TABLE {} DROP COLUMN {}",
            self.quote_identifier(table),
            self.quote_identifier(column)
        )
    }

    /// Generates SQL for renaming a column.
    #[must_use]
    pub fn rename_column_sql(self, table: &str, from: &str, to: &str) -> String {
        format!(
            "ALTER TABLE {} RENAME COLUMN {} TO {}",
            self.quote_identifier(table),
            self.quote_identifier(from),
            self.quote_identifier(to)
        )
    }

    /// Generates SQL changing a column's type, or `None` when the dialect
    /// cannot do it in place.
    ///
    /// MySQL's `MODIFY COLUMN` rewrites the whole column, so nullability and
    /// the default (`default_sql`, already rendered) have to be restated.
    /// PostgreSQL only touches the type and converts existing values with
    /// an explicit `USING` cast.
    #[must_use]
    pub fn alter_column_type_sql(
        self,
        table: &str,
        column: &str,
        type_sql: &str,
        not_null: bool,
        default_sql: Option<&str>,
    ) -> Option<String> {
        match self {
            Self::Sqlite => None,
            Self::Postgres => {
                let table = self.quote_identifier(table);
                let column = self.quote_identifier(column);
                Some(format!(
                    "ALTER TABLE {table} ALTER COLUMN {column} TYPE {type_sql} \
                     USING {column}::{type_sql}"
                ))
            }
            Self::Mysql => {
                let mut sql = format!(
                    "ALTER TABLE {} MODIFY COLUMN {} {}",
                    self.quote_identifier(table),
                    self.quote_identifier(column),
                    type_sql
                );
                if not_null {
                    sql.push_str(" NOT NULL");
                }
                if let Some(default) = default_sql {
                    sql.push_str(" DEFAULT ");
                    sql.push_str(default);
                }
                Some(sql)
            }
        }
    }

    /// Name of the unique index backing a multi-column unique constraint.
    #[must_use]
    pub fn unique_index_name(table: &str, columns: &[String]) -> String {
        format!("uq_{}_{}", table, columns.join("_"))
    }

    /// Generates `CREATE UNIQUE INDEX uq_<table>_<cols>`.
    #[must_use]
    pub fn create_unique_index_sql(self, table: &str, columns: &[String]) -> String {
        format!(
            "CREATE UNIQUE INDEX {} ON {} ({})",
            self.quote_identifier(&Self::unique_index_name(table, columns)),
            self.quote_identifier(table),
            self.quote_list(columns)
        )
    }

    fn quote_list(self, columns: &[String]) -> String {
        columns
            .iter()
            .map(|c| self.quote_identifier(c))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Dialect {
    type Err = MigrateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "postgres" | "postgresql" | "pg" => Ok(Self::Postgres),
            "mysql" | "mariadb" => Ok(Self::Mysql),
            other => Err(MigrateError::Unsupported(format!(
                "unknown SQL dialect '{other}'"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{integer, serial, text, timestamp, ForeignKeyAction};

    #[test]
    fn test_type_keyword_is_total() {
        for dialect in Dialect::ALL {
            for field_type in FieldType::ALL {
                let first = dialect.type_keyword(field_type);
                assert!(!first.is_empty(), "{dialect}/{field_type}");
                assert_eq!(first, dialect.type_keyword(field_type));
            }
        }
    }

    #[test]
    fn test_quote_identifier() {
        assert_eq!(Dialect::Sqlite.quote_identifier("users"), "\"users\"");
        assert_eq!(Dialect::Postgres.quote_identifier("a\"b"), "\"a\"\"b\"");
        assert_eq!(Dialect::Mysql.quote_identifier("users"), "`users`");
    }

    #[test]
    fn test_placeholders() {
        assert_eq!(Dialect::Sqlite.placeholder(3), "?");
        assert_eq!(Dialect::Mysql.placeholder(1), "?");
        assert_eq!(Dialect::Postgres.placeholder(2), "$2");
    }

    #[test]
    fn test_sqlite_serial_primary_key() {
        let id = serial().primary_key().build();
        assert_eq!(
            Dialect::Sqlite.column_definition("id", &id),
            "\"id\" INTEGER PRIMARY KEY"
        );
        assert_eq!(
            Dialect::Postgres.column_definition("id", &id),
            "\"id\" SERIAL PRIMARY KEY"
        );
        assert_eq!(
            Dialect::Mysql.column_definition("id", &id),
            "`id` INT AUTO_INCREMENT PRIMARY KEY"
        );
    }

    #[test]
    fn test_column_definition_constraints() {
        let email = text().not_null().unique().default("none").build();
        assert_eq!(
            Dialect::Sqlite.column_definition("email", &email),
            "\"email\" TEXT NOT NULL UNIQUE DEFAULT 'none'"
        );

        let author = integer()
            .not_null()
            .references("users", "id")
            .on_delete(ForeignKeyAction::Cascade)
            .build();
        assert_eq!(
            Dialect::Postgres.column_definition("author_id", &author),
            "\"author_id\" INTEGER NOT NULL REFERENCES \"users\" (\"id\") ON DELETE CASCADE"
        );

        let created = timestamp().default_expr("CURRENT_TIMESTAMP").build();
        assert_eq!(
            Dialect::Mysql.column_definition("created_at", &created),
            "`created_at` DATETIME DEFAULT CURRENT_TIMESTAMP"
        );
    }

    #[test]
    fn test_create_table_sql() {
        let id = serial().primary_key().build();
        let name = text().not_null().build();
        let sql = Dialect::Sqlite.create_table_sql(
            "users",
            [("id", &id), ("name", &name)],
            &[vec!["name".to_string(), "id".to_string()]],
        );
        assert_eq!(
            sql,
            "CREATE TABLE IF NOT EXISTS \"users\" (\"id\" INTEGER PRIMARY KEY, \
             \"name\" TEXT NOT NULL, UNIQUE (\"name\", \"id\"))"
        );
    }

    #[test]
    fn test_alter_column_type() {
        assert!(Dialect::Sqlite
            .alter_column_type_sql("t", "c", "INTEGER", false, None)
            .is_none());
        assert_eq!(
            Dialect::Postgres
                .alter_column_type_sql("t", "c", "INTEGER", true, Some("0"))
                .unwrap(),
            "ALTER TABLE \"t\" ALTER COLUMN \"c\" TYPE INTEGER USING \"c\"::INTEGER"
        );
        assert_eq!(
            Dialect::Mysql
                .alter_column_type_sql("t", "c", "INT", true, None)
                .unwrap(),
            "ALTER TABLE `t` MODIFY COLUMN `c` INT NOT NULL"
        );
        assert_eq!(
            Dialect::Mysql
                .alter_column_type_sql("t", "c", "varchar(20)", false, Some("'n/a'"))
                .unwrap(),
            "ALTER TABLE `t` MODIFY COLUMN `c` varchar(20) DEFAULT 'n/a'"
        );
        assert_eq!(
            Dialect::Postgres.alter_type_keyword(FieldType::Serial),
            "INTEGER"
        );
    }

    #[test]
    fn test_rename_table() {
        assert_eq!(
            Dialect::Postgres.rename_table_sql("a", "b"),
            "ALTER TABLE \"a\" RENAME TO \"b\""
        );
        assert_eq!(Dialect::Mysql.rename_table_sql("a", "b"), "RENAME TABLE `a` TO `b`");
    }

    #[test]
    fn test_unique_index() {
        let cols = vec!["org_id".to_string(), "email".to_string()];
        assert_eq!(
            Dialect::Sqlite.create_unique_index_sql("members", &cols),
            "CREATE UNIQUE INDEX \"uq_members_org_id_email\" ON \"members\" (\"org_id\", \"email\")"
        );
    }

    #[test]
    fn test_from_url_and_str() {
        assert_eq!(Dialect::from_url("sqlite::memory:"), Some(Dialect::Sqlite));
        assert_eq!(
            Dialect::from_url("postgresql://localhost/app"),
            Some(Dialect::Postgres)
        );
        assert_eq!(Dialect::from_url("mysql://root@db/app"), Some(Dialect::Mysql));
        assert_eq!(Dialect::from_url("mongodb://db"), None);
        assert_eq!("pg".parse::<Dialect>().unwrap(), Dialect::Postgres);
        assert!("oracle".parse::<Dialect>().is_err());
    }
}
