//! Declared column definitions.
//!
//! A [`FieldDefinition`] is the desired shape of one column. Definitions are
//! produced by a [`FieldBuilder`], which is an immutable value: every modifier
//! consumes the builder and returns a new one, and [`FieldBuilder::build`]
//! freezes it into a plain record.
//!
//! ```rust
//! use oxide_reconcile::field::{serial, text, ForeignKeyAction, integer};
//!
//! let id = serial().primary_key().build();
//! assert!(id.not_null);
//!
//! let email = text().not_null().unique().build();
//! assert!(email.unique);
//!
//! let author = integer()
//!     .references("users", "id")
//!     .on_delete(ForeignKeyAction::Cascade)
//!     .build();
//! assert_eq!(author.references.unwrap().table, "users");
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

/// Abstract column types understood by every dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// Auto-incrementing integer key.
    Serial,
    /// Text.
    Text,
    /// Integer.
    Integer,
    /// Boolean.
    Boolean,
    /// Point in time.
    Timestamp,
    /// JSON document.
    Json,
    /// Floating point.
    Real,
    /// UUID.
    Uuid,
}

impl FieldType {
    /// Every field type, in declaration order.
    pub const ALL: [Self; 8] = [
        Self::Serial,
        Self::Text,
        Self::Integer,
        Self::Boolean,
        Self::Timestamp,
        Self::Json,
        Self::Real,
        Self::Uuid,
    ];

    /// Lowercase name, as used in model files.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Serial => "serial",
            Self::Text => "text",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Timestamp => "timestamp",
            Self::Json => "json",
            Self::Real => "real",
            Self::Uuid => "uuid",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Default value for a column.
///
/// Defaults come from trusted declarations and are rendered inline, never
/// bound as parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DefaultValue {
    /// NULL default.
    Null,
    /// Boolean default.
    Boolean(bool),
    /// Integer default.
    Integer(i64),
    /// Float default.
    Float(f64),
    /// String default.
    String(String),
    /// Raw SQL expression (e.g., `CURRENT_TIMESTAMP`).
    Expression {
        /// The expression text, emitted verbatim.
        expression: String,
    },
}

impl DefaultValue {
    /// Builds an expression default.
    #[must_use]
    pub fn expression(expr: impl Into<String>) -> Self {
        Self::Expression {
            expression: expr.into(),
        }
    }

    /// Returns the SQL representation of the default value.
    ///
    /// Strings are single-quoted with embedded quotes doubled; everything
    /// else is emitted in its literal textual form.
    #[must_use]
    pub fn to_sql(&self) -> String {
        match self {
            Self::Null => String::from("NULL"),
            Self::Boolean(b) => {
                if *b {
                    String::from("TRUE")
                } else {
                    String::from("FALSE")
                }
            }
            Self::Integer(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::String(s) => format!("'{}'", s.replace('\'', "''")),
            Self::Expression { expression } => expression.clone(),
        }
    }
}

impl From<bool> for DefaultValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<i64> for DefaultValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for DefaultValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for DefaultValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for DefaultValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

/// Foreign key referential action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForeignKeyAction {
    /// No action.
    NoAction,
    /// Restrict deletion.
    Restrict,
    /// Cascade the deletion.
    Cascade,
    /// Set to NULL.
    SetNull,
    /// Set to default value.
    SetDefault,
}

impl ForeignKeyAction {
    /// Returns the SQL representation of the action.
    #[must_use]
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::NoAction => "NO ACTION",
            Self::Restrict => "RESTRICT",
            Self::Cascade => "CASCADE",
            Self::SetNull => "SET NULL",
            Self::SetDefault => "SET DEFAULT",
        }
    }
}

/// A reference to a column in another table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForeignKeyRef {
    /// The referenced table name.
    pub table: String,
    /// The referenced column name.
    pub column: String,
    /// Action on delete.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_delete: Option<ForeignKeyAction>,
}

/// The declared, desired shape of one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDefinition {
    /// Abstract column type.
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// Whether this is the primary key.
    #[serde(default)]
    pub primary_key: bool,
    /// Whether the column rejects NULL.
    #[serde(default)]
    pub not_null: bool,
    /// Whether the column is unique.
    #[serde(default)]
    pub unique: bool,
    /// Default value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<DefaultValue>,
    /// Foreign key reference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub references: Option<ForeignKeyRef>,
}

impl FieldDefinition {
    /// Creates a nullable, unconstrained definition.
    #[must_use]
    pub const fn new(field_type: FieldType) -> Self {
        Self {
            field_type,
            primary_key: false,
            not_null: false,
            unique: false,
            default_value: None,
            references: None,
        }
    }

    /// Restores the `primary_key => not_null` invariant on definitions that
    /// did not come through a builder (e.g. deserialized model files).
    #[must_use]
    pub fn normalized(mut self) -> Self {
        if self.primary_key {
            self.not_null = true;
        }
        self
    }
}

/// Immutable column definition builder.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldBuilder {
    field_type: FieldType,
    primary_key: bool,
    not_null: bool,
    unique: bool,
    default_value: Option<DefaultValue>,
    references: Option<ForeignKeyRef>,
}

impl FieldBuilder {
    /// Creates a builder for the given type.
    #[must_use]
    pub const fn new(field_type: FieldType) -> Self {
        Self {
            field_type,
            primary_key: false,
            not_null: false,
            unique: false,
            default_value: None,
            references: None,
        }
    }

    /// Marks the column as the primary key.
    #[must_use]
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.not_null = true;
        self
    }

    /// Sets NOT NULL.
    #[must_use]
    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    /// Allows NULL. Has no effect on primary keys.
    #[must_use]
    pub fn nullable(mut self) -> Self {
        self.not_null = false;
        self
    }

    /// Sets UNIQUE.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Sets the default value.
    #[must_use]
    pub fn default(mut self, value: impl Into<DefaultValue>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    /// Sets a raw SQL expression as default.
    #[must_use]
    pub fn default_expr(mut self, expr: impl Into<String>) -> Self {
        self.default_value = Some(DefaultValue::expression(expr));
        self
    }

    /// References `table(column)`.
    #[must_use]
    pub fn references(mut self, table: impl Into<String>, column: impl Into<String>) -> Self {
        self.references = Some(ForeignKeyRef {
            table: table.into(),
            column: column.into(),
            on_delete: None,
        });
        self
    }

    /// Sets the ON DELETE action. Ignored without [`Self::references`].
    #[must_use]
    pub fn on_delete(mut self, action: ForeignKeyAction) -> Self {
        if let Some(fk) = self.references.as_mut() {
            fk.on_delete = Some(action);
        }
        self
    }

    /// Freezes the builder into a [`FieldDefinition`].
    #[must_use]
    pub fn build(self) -> FieldDefinition {
        FieldDefinition {
            field_type: self.field_type,
            primary_key: self.primary_key,
            not_null: self.not_null || self.primary_key,
            unique: self.unique,
            default_value: self.default_value,
            references: self.references,
        }
    }
}

impl From<FieldBuilder> for FieldDefinition {
    fn from(builder: FieldBuilder) -> Self {
        builder.build()
    }
}

/// Auto-incrementing integer column.
#[must_use]
pub const fn serial() -> FieldBuilder {
    FieldBuilder::new(FieldType::Serial)
}

/// Text column.
#[must_use]
pub const fn text() -> FieldBuilder {
    FieldBuilder::new(FieldType::Text)
}

/// Integer column.
#[must_use]
pub const fn integer() -> FieldBuilder {
    FieldBuilder::new(FieldType::Integer)
}

/// Boolean column.
#[must_use]
pub const fn boolean() -> FieldBuilder {
    FieldBuilder::new(FieldType::Boolean)
}

/// Timestamp column.
#[must_use]
pub const fn timestamp() -> FieldBuilder {
    FieldBuilder::new(FieldType::Timestamp)
}

/// JSON column.
#[must_use]
pub const fn json() -> FieldBuilder {
    FieldBuilder::new(FieldType::Json)
}

/// Floating point column.
#[must_use]
pub const fn real() -> FieldBuilder {
    FieldBuilder::new(FieldType::Real)
}

/// UUID column.
#[must_use]
pub const fn uuid() -> FieldBuilder {
    FieldBuilder::new(FieldType::Uuid)
}
