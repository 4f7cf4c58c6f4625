//! Declared vs. live schema comparison.
//!
//! [`diff_schema`] turns the gap between the declared [`ModelInfo`]s and a
//! [`LiveSchema`] into an ordered list of [`DiffOperation`]s. Operations are
//! emitted per model in declaration order, then a global pass drops live
//! tables that no model declares. No attempt is made to order operations
//! around foreign keys.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dialect::{types_match, Dialect};
use crate::field::FieldDefinition;
use crate::introspect::{ColumnInfo, LiveSchema};
use crate::model::ModelInfo;

/// One schema change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DiffOperation {
    /// The table does not exist yet.
    CreateTable {
        /// Table name.
        table: String,
        /// Declared columns, in order.
        fields: IndexMap<String, FieldDefinition>,
    },
    /// A declared column is missing from the live table.
    AddColumn {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
        /// Declared definition.
        field: FieldDefinition,
    },
    /// A live column is no longer declared.
    DropColumn {
        /// Table name.
        table: String,
        /// The live column being dropped.
        column: ColumnInfo,
    },
    /// A column's live type does not satisfy its declared type.
    AlterColumn {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
        /// Declared definition.
        field: FieldDefinition,
        /// The live column before the change.
        previous: ColumnInfo,
    },
    /// A live table has no declared model.
    DropTable {
        /// Table name.
        table: String,
        /// The live columns being dropped.
        columns: Vec<ColumnInfo>,
    },
}

impl DiffOperation {
    /// Table the operation applies to.
    #[must_use]
    pub fn table(&self) -> &str {
        match self {
            Self::CreateTable { table, .. }
            | Self::AddColumn { table, .. }
            | Self::DropColumn { table, .. }
            | Self::AlterColumn { table, .. }
            | Self::DropTable { table, .. } => table,
        }
    }

    /// Whether applying the operation loses data.
    #[must_use]
    pub fn is_destructive(&self) -> bool {
        matches!(self, Self::DropColumn { .. } | Self::DropTable { .. })
    }

    /// Short human-readable description, used by the CLI.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::CreateTable { table, fields } => {
                format!("create table {table} ({} columns)", fields.len())
            }
            Self::AddColumn {
                table,
                column,
                field,
            } => format!("add column {table}.{column} ({})", field.field_type),
            Self::DropColumn { table, column } => {
                format!("drop column {table}.{}", column.name)
            }
            Self::AlterColumn {
                table,
                column,
                field,
                previous,
            } => format!(
                "alter column {table}.{column} ({} -> {})",
                previous.column_type, field.field_type
            ),
            Self::DropTable { table, .. } => format!("drop table {table}"),
        }
    }
}

/// Computes the operations that bring `live` in line with `models`.
///
/// Tables whose name starts with `_` are never dropped.
#[must_use]
pub fn diff_schema(
    models: &[ModelInfo],
    live: &LiveSchema,
    dialect: Dialect,
) -> Vec<DiffOperation> {
    let mut ops = Vec::new();

    for model in models {
        let Some(columns) = live.table(&model.table) else {
            ops.push(DiffOperation::CreateTable {
                table: model.table.clone(),
                fields: model.schema.clone(),
            });
            continue;
        };

        for (name, field) in &model.schema {
            match columns.iter().find(|c| &c.name == name) {
                None => ops.push(DiffOperation::AddColumn {
                    table: model.table.clone(),
                    column: name.clone(),
                    field: field.clone(),
                }),
                Some(live_column)
                    if !types_match(field.field_type, &live_column.column_type, dialect) =>
                {
                    ops.push(DiffOperation::AlterColumn {
                        table: model.table.clone(),
                        column: name.clone(),
                        field: field.clone(),
                        previous: live_column.clone(),
                    });
                }
                Some(_) => {}
            }
        }

        for column in columns {
            if !model.schema.contains_key(&column.name) {
                ops.push(DiffOperation::DropColumn {
                    table: model.table.clone(),
                    column: column.clone(),
                });
            }
        }
    }

    for table in live.table_names() {
        if table.starts_with('_') || models.iter().any(|m| m.table == table) {
            continue;
        }
        ops.push(DiffOperation::DropTable {
            table: table.to_string(),
            columns: live.table(table).map(<[ColumnInfo]>::to_vec).unwrap_or_default(),
        });
    }

    debug!(dialect = %dialect, operations = ops.len(), "Computed schema diff");
    ops
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{integer, serial, text, FieldType};
    use crate::model::{resolve_model_schema, ModelDeclaration};

    fn column(name: &str, column_type: &str) -> ColumnInfo {
        ColumnInfo {
            name: name.to_string(),
            column_type: column_type.to_string(),
            not_null: false,
            default_value: None,
            primary_key: false,
        }
    }

    fn users_model() -> ModelInfo {
        resolve_model_schema(
            &ModelDeclaration::new("users")
                .field("id", serial().primary_key())
                .field("email", text().not_null()),
        )
    }

    #[test]
    fn test_missing_table_is_created() {
        let ops = diff_schema(&[users_model()], &LiveSchema::new(), Dialect::Sqlite);
        assert_eq!(ops.len(), 1);
        match &ops[0] {
            DiffOperation::CreateTable { table, fields } => {
                assert_eq!(table, "users");
                assert_eq!(fields.len(), 2);
            }
            other => panic!("Expected CreateTable, got {other:?}"),
        }
    }

    #[test]
    fn test_matching_table_is_a_fixed_point() {
        let mut live = LiveSchema::new();
        live.insert(
            "users",
            vec![column("id", "INTEGER"), column("email", "TEXT")],
        );
        assert!(diff_schema(&[users_model()], &live, Dialect::Sqlite).is_empty());
    }

    #[test]
    fn test_add_alter_and_drop_columns() {
        let model = resolve_model_schema(
            &ModelDeclaration::new("users")
                .field("id", serial().primary_key())
                .field("age", integer())
                .field("nickname", text()),
        );
        let mut live = LiveSchema::new();
        live.insert(
            "users",
            vec![
                column("id", "integer"),
                column("age", "text"),
                column("legacy_col", "text"),
            ],
        );

        let ops = diff_schema(&[model], &live, Dialect::Postgres);
        assert_eq!(ops.len(), 3);
        assert!(matches!(
            &ops[0],
            DiffOperation::AlterColumn { column, previous, field, .. }
                if column == "age" && previous.column_type == "text"
                    && field.field_type == FieldType::Integer
        ));
        assert!(matches!(
            &ops[1],
            DiffOperation::AddColumn { column, .. } if column == "nickname"
        ));
        assert!(matches!(
            &ops[2],
            DiffOperation::DropColumn { column, .. } if column.name == "legacy_col"
        ));
    }

    #[test]
    fn test_undeclared_tables_dropped_except_internal() {
        let mut live = LiveSchema::new();
        live.insert("_migrations", vec![column("id", "INTEGER")]);
        live.insert("orphans", vec![column("id", "INTEGER")]);
        live.insert("users", vec![column("id", "INTEGER"), column("email", "TEXT")]);

        let ops = diff_schema(&[users_model()], &live, Dialect::Sqlite);
        assert_eq!(ops.len(), 1);
        assert!(ops[0].is_destructive());
        assert_eq!(ops[0].table(), "orphans");
        match &ops[0] {
            DiffOperation::DropTable { columns, .. } => assert_eq!(columns.len(), 1),
            other => panic!("Expected DropTable, got {other:?}"),
        }
    }

    #[test]
    fn test_serializes_with_type_tag() {
        let op = DiffOperation::DropColumn {
            table: "users".to_string(),
            column: column("legacy_col", "TEXT"),
        };
        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(json["type"], "drop_column");
        assert_eq!(json["column"]["name"], "legacy_col");
    }
}
