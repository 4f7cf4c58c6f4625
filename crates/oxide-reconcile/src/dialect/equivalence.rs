//! Type equivalence between declared fields and live catalog types.
//!
//! Catalogs report types in their own spelling (`int(11)`, `tinyint(1)`,
//! `timestamp with time zone`). Comparing raw strings would flag cosmetic
//! differences as `alter_column`, so both sides are normalized first and then
//! checked against a small synonym table.

use super::Dialect;
use crate::field::FieldType;

/// A set of type spellings treated as the same type.
struct Synonym {
    /// Restricts the entry to one dialect; `None` applies everywhere.
    dialect: Option<Dialect>,
    /// When set, the entry applies to this declared type and only the live
    /// side has to appear in `types`.
    declared: Option<FieldType>,
    /// Normalized spellings.
    types: &'static [&'static str],
}

const SYNONYMS: &[Synonym] = &[
    Synonym {
        dialect: None,
        declared: Some(FieldType::Serial),
        types: &["INTEGER", "INT"],
    },
    Synonym {
        dialect: Some(Dialect::Mysql),
        declared: None,
        types: &["INT", "INTEGER"],
    },
    Synonym {
        dialect: Some(Dialect::Postgres),
        declared: None,
        types: &["TIMESTAMPTZ", "TIMESTAMP WITH TIME ZONE"],
    },
];

/// Uppercases a type, strips parenthetical precision and collapses
/// whitespace: `tinyint(1)` becomes `TINYINT`, `numeric (10, 2)` becomes
/// `NUMERIC`.
#[must_use]
pub fn normalize_type(sql_type: &str) -> String {
    let mut stripped = String::with_capacity(sql_type.len());
    let mut depth = 0usize;
    for ch in sql_type.chars() {
        match ch {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            _ if depth == 0 => stripped.push(ch),
            _ => {}
        }
    }
    stripped
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_ascii_uppercase()
}

/// Returns true when a live column type satisfies a declared field type.
#[must_use]
pub fn types_match(declared: FieldType, live: &str, dialect: Dialect) -> bool {
    let declared_sql = normalize_type(dialect.type_keyword(declared));
    let live = normalize_type(live);
    if declared_sql == live {
        return true;
    }

    SYNONYMS
        .iter()
        .filter(|s| s.dialect.map_or(true, |d| d == dialect))
        .any(|s| {
            let live_listed = s.types.contains(&live.as_str());
            match s.declared {
                Some(field_type) => field_type == declared && live_listed,
                None => live_listed && s.types.contains(&declared_sql.as_str()),
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_type() {
        assert_eq!(normalize_type("tinyint(1)"), "TINYINT");
        assert_eq!(normalize_type("varchar(255)"), "VARCHAR");
        assert_eq!(normalize_type("  double   precision "), "DOUBLE PRECISION");
        assert_eq!(normalize_type("numeric (10, 2)"), "NUMERIC");
    }

    #[test]
    fn test_exact_and_cosmetic_matches() {
        assert!(types_match(FieldType::Text, "TEXT", Dialect::Sqlite));
        assert!(types_match(FieldType::Boolean, "tinyint(1)", Dialect::Mysql));
        assert!(types_match(FieldType::Text, "varchar(255)", Dialect::Mysql));
        assert!(types_match(FieldType::Real, "double precision", Dialect::Postgres));
    }

    #[test]
    fn test_serial_matches_integer_everywhere() {
        assert!(types_match(FieldType::Serial, "integer", Dialect::Postgres));
        assert!(types_match(FieldType::Serial, "int(11)", Dialect::Mysql));
        assert!(types_match(FieldType::Serial, "INT", Dialect::Sqlite));
        assert!(!types_match(FieldType::Serial, "text", Dialect::Postgres));
    }

    #[test]
    fn test_mysql_int_integer_synonym() {
        assert!(types_match(FieldType::Integer, "integer", Dialect::Mysql));
        // Outside MySQL the synonym does not apply.
        assert!(!types_match(FieldType::Integer, "INT", Dialect::Postgres));
    }

    #[test]
    fn test_postgres_timestamptz_spelling() {
        assert!(types_match(
            FieldType::Timestamp,
            "timestamp with time zone",
            Dialect::Postgres
        ));
        assert!(!types_match(
            FieldType::Timestamp,
            "timestamp without time zone",
            Dialect::Postgres
        ));
    }

    #[test]
    fn test_real_mismatch() {
        assert!(!types_match(FieldType::Integer, "TEXT", Dialect::Sqlite));
        assert!(!types_match(FieldType::Integer, "integer[]", Dialect::Postgres));
        assert!(!types_match(FieldType::Text, "character varying(80)", Dialect::Postgres));
        assert!(!types_match(FieldType::Text, "ticket_status", Dialect::Postgres));
    }
}
