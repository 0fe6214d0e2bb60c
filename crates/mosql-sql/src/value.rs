//! Typed SQL parameter values and the document-to-row projection helpers.

use bson::Bson;
use bytes::BytesMut;
use chrono::{DateTime, Utc};
use mosql_core::CanonicalType;
use tokio_postgres::types::{to_sql_checked, IsNull, ToSql, Type};
use tracing::warn;

/// One bind parameter for a destination insert.
///
/// `Numeric` carries the decimal's textual form; its placeholder is cast
/// through text on the server side (see [`crate::InsertPlan`]).
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Text(String),
    Int4(i32),
    Int8(i64),
    Float8(f64),
    Bool(bool),
    Numeric(String),
    Timestamp(DateTime<Utc>),
    Null,
}

impl SqlValue {
    /// Project one flattened leaf into a bind value. A value whose shape
    /// does not match its declared canonical type becomes `Null` with a
    /// warning; the mapping, not the document, is authoritative.
    pub fn from_flat(field_type: CanonicalType, value: &Bson) -> SqlValue {
        match (field_type, value) {
            (CanonicalType::String, Bson::String(s)) => SqlValue::Text(s.clone()),
            (CanonicalType::ObjectId, Bson::String(s)) => SqlValue::Text(s.clone()),
            (CanonicalType::Int32, Bson::Int32(v)) => SqlValue::Int4(*v),
            (CanonicalType::Int64, Bson::Int64(v)) => SqlValue::Int8(*v),
            (CanonicalType::Float64, Bson::Double(v)) => SqlValue::Float8(*v),
            (CanonicalType::Bool, Bson::Boolean(v)) => SqlValue::Bool(*v),
            (CanonicalType::Decimal, Bson::Decimal128(d)) => SqlValue::Numeric(d.to_string()),
            (CanonicalType::DateTime, Bson::DateTime(dt)) => {
                SqlValue::Timestamp(dt.to_chrono())
            }
            (expected, got) => {
                warn!(
                    expected = expected.as_str(),
                    got = ?got,
                    "value does not match mapped type, writing NULL"
                );
                SqlValue::Null
            }
        }
    }
}

impl ToSql for SqlValue {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn std::error::Error + Sync + Send>> {
        match self {
            SqlValue::Text(v) => v.to_sql(ty, out),
            SqlValue::Int4(v) => v.to_sql(ty, out),
            SqlValue::Int8(v) => v.to_sql(ty, out),
            SqlValue::Float8(v) => v.to_sql(ty, out),
            SqlValue::Bool(v) => v.to_sql(ty, out),
            SqlValue::Numeric(v) => v.to_sql(ty, out),
            SqlValue::Timestamp(v) => v.to_sql(ty, out),
            SqlValue::Null => Ok(IsNull::Yes),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        // The variant decides the wire encoding; placeholders that need a
        // server-side conversion carry an explicit cast in the statement.
        true
    }

    to_sql_checked!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn projects_matching_values() {
        assert_eq!(
            SqlValue::from_flat(CanonicalType::String, &Bson::String("a".into())),
            SqlValue::Text("a".into())
        );
        assert_eq!(
            SqlValue::from_flat(CanonicalType::Int32, &Bson::Int32(10)),
            SqlValue::Int4(10)
        );
        assert_eq!(
            SqlValue::from_flat(CanonicalType::Bool, &Bson::Boolean(true)),
            SqlValue::Bool(true)
        );
        let dec = bson::Decimal128::from_str("10.363").unwrap();
        assert_eq!(
            SqlValue::from_flat(CanonicalType::Decimal, &Bson::Decimal128(dec)),
            SqlValue::Numeric("10.363".into())
        );
    }

    #[test]
    fn shape_mismatch_becomes_null() {
        assert_eq!(
            SqlValue::from_flat(CanonicalType::Int32, &Bson::String("ten".into())),
            SqlValue::Null
        );
    }
}
