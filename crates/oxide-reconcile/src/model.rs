//! Declared models.
//!
//! The ORM layer hands over a [`ModelDeclaration`] per table. Resolving it
//! adds the implicit bookkeeping columns and yields the [`ModelInfo`] the
//! differ compares against the live database.

use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::field::{timestamp, FieldDefinition};

/// Column added by `timestamps` for the creation time.
pub const CREATED_AT: &str = "created_at";
/// Column added by `timestamps` for the last update time.
pub const UPDATED_AT: &str = "updated_at";
/// Column added by `soft_deletes`.
pub const DELETED_AT: &str = "deleted_at";

/// The two NOT NULL timestamp columns.
pub(crate) fn timestamp_columns() -> [(&'static str, FieldDefinition); 2] {
    [
        (CREATED_AT, timestamp().not_null().build()),
        (UPDATED_AT, timestamp().not_null().build()),
    ]
}

/// The nullable soft-delete column.
pub(crate) fn soft_delete_column() -> (&'static str, FieldDefinition) {
    (DELETED_AT, timestamp().nullable().build())
}

/// A model as declared by the application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelDeclaration {
    /// Table name.
    pub table: String,
    /// Column name to definition, in declaration order.
    #[serde(default)]
    pub fields: IndexMap<String, FieldDefinition>,
    /// Adds `created_at` / `updated_at`.
    #[serde(default)]
    pub timestamps: bool,
    /// Adds `deleted_at`.
    #[serde(default)]
    pub soft_deletes: bool,
}

impl ModelDeclaration {
    /// Creates an empty declaration.
    #[must_use]
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            fields: IndexMap::new(),
            timestamps: false,
            soft_deletes: false,
        }
    }

    /// Adds a field.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, field: impl Into<FieldDefinition>) -> Self {
        self.fields.insert(name.into(), field.into());
        self
    }

    /// Enables the implicit timestamp columns.
    #[must_use]
    pub fn with_timestamps(mut self) -> Self {
        self.timestamps = true;
        self
    }

    /// Enables the implicit soft-delete column.
    #[must_use]
    pub fn with_soft_deletes(mut self) -> Self {
        self.soft_deletes = true;
        self
    }
}

/// Resolved desired state of one table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Table name.
    pub table: String,
    /// Column name to definition, in declaration order.
    pub schema: IndexMap<String, FieldDefinition>,
}

/// Resolves a declaration into the full desired column set.
///
/// Explicitly declared columns win over the implicit ones of the same name.
#[must_use]
pub fn resolve_model_schema(declaration: &ModelDeclaration) -> ModelInfo {
    let mut schema: IndexMap<String, FieldDefinition> = declaration
        .fields
        .iter()
        .map(|(name, field)| (name.clone(), field.clone().normalized()))
        .collect();

    if declaration.timestamps {
        for (name, field) in timestamp_columns() {
            schema.entry(name.to_string()).or_insert(field);
        }
    }
    if declaration.soft_deletes {
        let (name, field) = soft_delete_column();
        schema.entry(name.to_string()).or_insert(field);
    }

    ModelInfo {
        table: declaration.table.clone(),
        schema,
    }
}

/// Reads a JSON array of model declarations and resolves each one.
pub fn load_models(path: &Path) -> Result<Vec<ModelInfo>> {
    let contents = std::fs::read_to_string(path)?;
    let declarations: Vec<ModelDeclaration> = serde_json::from_str(&contents)?;
    Ok(declarations.iter().map(resolve_model_schema).collect())
}
