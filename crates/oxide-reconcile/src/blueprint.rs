//! Column-level builder for hand-written migrations.

use crate::field::FieldDefinition;
use crate::model::{soft_delete_column, timestamp_columns};

/// A column operation inside one `create` or `table` call.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnOp {
    /// Adds a column.
    Add {
        /// Column name.
        name: String,
        /// Frozen definition.
        field: FieldDefinition,
    },
    /// Drops a column.
    Drop(String),
    /// Renames a column.
    Rename {
        /// Current name.
        from: String,
        /// New name.
        to: String,
    },
}

/// Ordered column operations plus multi-column unique constraints for one
/// table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Blueprint {
    columns: Vec<ColumnOp>,
    uniques: Vec<Vec<String>>,
}

impl Blueprint {
    /// Creates an empty blueprint.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a column. Accepts a builder or an already built definition.
    pub fn add(&mut self, name: impl Into<String>, field: impl Into<FieldDefinition>) -> &mut Self {
        self.columns.push(ColumnOp::Add {
            name: name.into(),
            field: field.into(),
        });
        self
    }

    /// Drops a column.
    pub fn drop(&mut self, name: impl Into<String>) -> &mut Self {
        self.columns.push(ColumnOp::Drop(name.into()));
        self
    }

    /// Renames a column.
    pub fn rename(&mut self, from: impl Into<String>, to: impl Into<String>) -> &mut Self {
        self.columns.push(ColumnOp::Rename {
            from: from.into(),
            to: to.into(),
        });
        self
    }

    /// Declares a unique constraint over `columns`.
    pub fn unique(&mut self, columns: &[&str]) -> &mut Self {
        self.uniques
            .push(columns.iter().map(|c| (*c).to_string()).collect());
        self
    }

    /// Adds `created_at` and `updated_at` (timestamp, not null).
    pub fn timestamps(&mut self) -> &mut Self {
        for (name, field) in timestamp_columns() {
            self.add(name, field);
        }
        self
    }

    /// Adds `deleted_at` (timestamp, nullable).
    pub fn soft_deletes(&mut self) -> &mut Self {
        let (name, field) = soft_delete_column();
        self.add(name, field)
    }

    /// Column operations, in declaration order.
    #[must_use]
    pub fn columns(&self) -> &[ColumnOp] {
        &self.columns
    }

    /// Unique constraints, in declaration order.
    #[must_use]
    pub fn uniques(&self) -> &[Vec<String>] {
        &self.uniques
    }
}
