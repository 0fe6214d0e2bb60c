//! Canonical source-type catalog and the default SQL type table.
//!
//! The catalog is a closed set: these are the only type tags the flattener
//! emits and the only tags a mapping file may carry for a source field. The
//! tags are case- and whitespace-significant.

use bson::Bson;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TypeError {
    #[error("unknown source type '{tag}'")]
    UnknownType { tag: String },
}

/// Canonical source-side types observed on decoded documents.
///
/// `Object` is never a leaf (interior nodes recurse); `Array` is not
/// supported as a leaf in this version and is surfaced as a flatten
/// diagnostic instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CanonicalType {
    String,
    Int32,
    Int64,
    Float64,
    Decimal,
    Bool,
    DateTime,
    ObjectId,
    Object,
    Array,
}

/// The types that can appear as leaves and therefore have a default SQL
/// translation.
pub const LEAF_TYPES: [CanonicalType; 8] = [
    CanonicalType::String,
    CanonicalType::Int32,
    CanonicalType::Int64,
    CanonicalType::Float64,
    CanonicalType::Decimal,
    CanonicalType::Bool,
    CanonicalType::DateTime,
    CanonicalType::ObjectId,
];

impl CanonicalType {
    /// Parse a raw type tag. The set is closed; anything else is an
    /// `UnknownType` error.
    pub fn parse(tag: &str) -> Result<Self, TypeError> {
        match tag {
            "string" => Ok(Self::String),
            "int32" => Ok(Self::Int32),
            "int64" => Ok(Self::Int64),
            "float64" => Ok(Self::Float64),
            "decimal" => Ok(Self::Decimal),
            "bool" => Ok(Self::Bool),
            "datetime" => Ok(Self::DateTime),
            "object_id" => Ok(Self::ObjectId),
            "object" => Ok(Self::Object),
            "array" => Ok(Self::Array),
            other => Err(TypeError::UnknownType {
                tag: other.to_string(),
            }),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::Float64 => "float64",
            Self::Decimal => "decimal",
            Self::Bool => "bool",
            Self::DateTime => "datetime",
            Self::ObjectId => "object_id",
            Self::Object => "object",
            Self::Array => "array",
        }
    }

    /// Default destination type for the Postgres dialect. `Object` and
    /// `Array` have no leaf representation and return `None`.
    pub fn default_sql_type(&self) -> Option<&'static str> {
        match self {
            Self::String => Some("TEXT"),
            Self::Int32 => Some("INTEGER"),
            Self::Int64 => Some("BIGINT"),
            Self::Float64 => Some("DOUBLE PRECISION"),
            Self::Decimal => Some("NUMERIC"),
            Self::Bool => Some("BOOLEAN"),
            Self::DateTime => Some("TIMESTAMPTZ"),
            Self::ObjectId => Some("TEXT"),
            Self::Object | Self::Array => None,
        }
    }

    /// Classify a decoded BSON value. Non-catalog kinds (null, binary,
    /// regex, timestamps, ...) yield `None`; callers report them with
    /// [`raw_type_tag`].
    pub fn of_bson(value: &Bson) -> Option<Self> {
        match value {
            Bson::String(_) => Some(Self::String),
            Bson::Int32(_) => Some(Self::Int32),
            Bson::Int64(_) => Some(Self::Int64),
            Bson::Double(_) => Some(Self::Float64),
            Bson::Decimal128(_) => Some(Self::Decimal),
            Bson::Boolean(_) => Some(Self::Bool),
            Bson::DateTime(_) => Some(Self::DateTime),
            Bson::ObjectId(_) => Some(Self::ObjectId),
            Bson::Document(_) => Some(Self::Object),
            Bson::Array(_) => Some(Self::Array),
            _ => None,
        }
    }
}

/// The reflected runtime-type name of a decoded value, used in diagnostics
/// for values outside the catalog.
pub fn raw_type_tag(value: &Bson) -> &'static str {
    match value {
        Bson::String(_) => "string",
        Bson::Int32(_) => "int32",
        Bson::Int64(_) => "int64",
        Bson::Double(_) => "float64",
        Bson::Decimal128(_) => "decimal",
        Bson::Boolean(_) => "bool",
        Bson::DateTime(_) => "datetime",
        Bson::ObjectId(_) => "object_id",
        Bson::Document(_) => "object",
        Bson::Array(_) => "array",
        Bson::Null => "null",
        Bson::Binary(_) => "binary",
        Bson::RegularExpression(_) => "regex",
        Bson::Timestamp(_) => "timestamp",
        Bson::JavaScriptCode(_) => "javascript",
        Bson::JavaScriptCodeWithScope(_) => "javascript_with_scope",
        Bson::Symbol(_) => "symbol",
        Bson::Undefined => "undefined",
        Bson::MaxKey => "max_key",
        Bson::MinKey => "min_key",
        Bson::DbPointer(_) => "db_pointer",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_round_trips_every_tag() {
        for ty in [
            CanonicalType::String,
            CanonicalType::Int32,
            CanonicalType::Int64,
            CanonicalType::Float64,
            CanonicalType::Decimal,
            CanonicalType::Bool,
            CanonicalType::DateTime,
            CanonicalType::ObjectId,
            CanonicalType::Object,
            CanonicalType::Array,
        ] {
            assert_eq!(CanonicalType::parse(ty.as_str()).unwrap(), ty);
        }
    }

    #[test]
    fn parse_is_case_and_whitespace_significant() {
        assert!(CanonicalType::parse("String").is_err());
        assert!(CanonicalType::parse(" string").is_err());
        assert!(CanonicalType::parse("varchar").is_err());
    }

    #[test]
    fn every_leaf_type_has_a_sql_translation() {
        for ty in LEAF_TYPES {
            let sql = ty.default_sql_type().expect("leaf type must map");
            assert!(!sql.is_empty());
        }
    }

    #[test]
    fn interior_types_have_no_sql_translation() {
        assert!(CanonicalType::Object.default_sql_type().is_none());
        assert!(CanonicalType::Array.default_sql_type().is_none());
    }

    #[test]
    fn bson_classification_matches_catalog() {
        assert_eq!(
            CanonicalType::of_bson(&Bson::String("x".into())),
            Some(CanonicalType::String)
        );
        assert_eq!(
            CanonicalType::of_bson(&Bson::Int32(7)),
            Some(CanonicalType::Int32)
        );
        assert_eq!(CanonicalType::of_bson(&Bson::Null), None);
        assert_eq!(raw_type_tag(&Bson::Null), "null");
    }
}
