//! Document flattener: nested document -> flat set of typed leaf fields.
//!
//! A document is a tree whose interior nodes are string-keyed objects and
//! whose leaves are catalog-typed scalars. Flattening walks the tree and
//! emits one entry per leaf, keyed by the dotted path from the collection
//! name down to the leaf:
//!
//! ```text
//! {
//!     "_id": ObjectId("662c212535722ce52a911f20"),
//!     "attributes": {
//!         "communicationChannels": { "email": "hello@mosql.io" }
//!     },
//!     "city": "San Francisco"
//! }
//! ```
//!
//! over collection `users` becomes
//!
//! ```text
//! users.id                                         -> (object_id, "662c…")
//! users.attributes.communicationChannels.email     -> (string, "hello@mosql.io")
//! users.city                                       -> (string, "San Francisco")
//! ```
//!
//! The reserved `_id` key is renamed to `id` at whichever level it appears.
//! Arrays are not expanded in this version; they and any value outside the
//! catalog produce a diagnostic instead of a field.

use std::collections::BTreeMap;

use bson::{Bson, Document};
use tracing::warn;

use crate::catalog::{raw_type_tag, CanonicalType};

/// One flattened leaf: its canonical type and the decoded value.
///
/// `object_id` leaves carry their hexadecimal string form.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatValue {
    pub field_type: CanonicalType,
    pub value: Bson,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// An array at a leaf position; skipped, not expanded.
    UnsupportedArray,
    /// A value outside the type catalog.
    UnknownType { raw: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlattenDiagnostic {
    pub path: String,
    pub kind: DiagnosticKind,
}

/// Result of flattening one document. Field iteration order is
/// lexicographic by path.
#[derive(Debug, Default, Clone)]
pub struct FlatDocument {
    pub fields: BTreeMap<String, FlatValue>,
    pub diagnostics: Vec<FlattenDiagnostic>,
}

impl FlatDocument {
    /// True if any diagnostic reports a value outside the catalog.
    pub fn has_unknown_types(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| matches!(d.kind, DiagnosticKind::UnknownType { .. }))
    }
}

/// Flatten `doc` under the top-level path `collection`.
pub fn flatten(collection: &str, doc: &Document) -> FlatDocument {
    let mut out = FlatDocument::default();
    flatten_into(collection, doc, &mut out);
    out
}

fn flatten_into(parent: &str, doc: &Document, out: &mut FlatDocument) {
    for (key, value) in doc.iter() {
        // only the reserved identifier key is renamed, and only at this level
        let key = if key == "_id" { "id" } else { key.as_str() };
        let path = format!("{parent}.{key}");

        match value {
            Bson::Document(nested) => flatten_into(&path, nested, out),
            Bson::Array(_) => {
                warn!(path = %path, "array leaf not supported, skipping");
                out.diagnostics.push(FlattenDiagnostic {
                    path,
                    kind: DiagnosticKind::UnsupportedArray,
                });
            }
            leaf => match CanonicalType::of_bson(leaf) {
                Some(CanonicalType::ObjectId) => {
                    let hex = match leaf {
                        Bson::ObjectId(oid) => oid.to_hex(),
                        _ => unreachable!("classified as object_id"),
                    };
                    out.fields.insert(
                        path,
                        FlatValue {
                            field_type: CanonicalType::ObjectId,
                            value: Bson::String(hex),
                        },
                    );
                }
                Some(field_type) => {
                    out.fields.insert(
                        path,
                        FlatValue {
                            field_type,
                            value: leaf.clone(),
                        },
                    );
                }
                None => {
                    let raw = raw_type_tag(leaf);
                    warn!(path = %path, raw_type = raw, "type not in catalog, skipping");
                    out.diagnostics.push(FlattenDiagnostic {
                        path,
                        kind: DiagnosticKind::UnknownType {
                            raw: raw.to_string(),
                        },
                    });
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::oid::ObjectId;
    use bson::{doc, DateTime};

    fn sample_user() -> Document {
        doc! {
            "_id": ObjectId::parse_str("662c212535722ce52a911f20").unwrap(),
            "attributes": {
                "communicationChannels": {
                    "email": "hello@mosql.io",
                    "phone": "111222333",
                },
                "phoneNumberVerified": true,
            },
            "city": "San Francisco",
            "intValue": 10_i32,
            "dateValue": DateTime::parse_rfc3339_str("2024-03-19T06:01:17Z").unwrap(),
        }
    }

    #[test]
    fn flattens_nested_document_to_exact_key_set() {
        let flat = flatten("users", &sample_user());

        let keys: Vec<&str> = flat.fields.keys().map(String::as_str).collect();
        assert_eq!(
            keys,
            vec![
                "users.attributes.communicationChannels.email",
                "users.attributes.communicationChannels.phone",
                "users.attributes.phoneNumberVerified",
                "users.city",
                "users.dateValue",
                "users.id",
                "users.intValue",
            ]
        );

        let ty = |k: &str| flat.fields[k].field_type;
        assert_eq!(ty("users.id"), CanonicalType::ObjectId);
        assert_eq!(
            ty("users.attributes.communicationChannels.email"),
            CanonicalType::String
        );
        assert_eq!(
            ty("users.attributes.communicationChannels.phone"),
            CanonicalType::String
        );
        assert_eq!(ty("users.attributes.phoneNumberVerified"), CanonicalType::Bool);
        assert_eq!(ty("users.city"), CanonicalType::String);
        assert_eq!(ty("users.intValue"), CanonicalType::Int32);
        assert_eq!(ty("users.dateValue"), CanonicalType::DateTime);

        assert!(flat.diagnostics.is_empty());
    }

    #[test]
    fn object_id_is_stored_as_hex_string() {
        let flat = flatten("users", &sample_user());
        assert_eq!(
            flat.fields["users.id"].value,
            Bson::String("662c212535722ce52a911f20".to_string())
        );
    }

    #[test]
    fn flatten_is_idempotent_over_the_same_document() {
        let doc = sample_user();
        let a = flatten("users", &doc);
        let b = flatten("users", &doc);
        assert_eq!(a.fields, b.fields);
        assert_eq!(a.diagnostics, b.diagnostics);
    }

    #[test]
    fn id_rename_is_not_recursive_beyond_the_reserved_key() {
        // `_id` renames at any level it literally appears; other keys with
        // underscores are untouched.
        let doc = doc! {
            "_id": "top",
            "nested": { "_id": "inner", "id_tag": "kept" },
        };
        let flat = flatten("c", &doc);
        let keys: Vec<&str> = flat.fields.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["c.id", "c.nested.id", "c.nested.id_tag"]);
    }

    #[test]
    fn arrays_surface_a_diagnostic_and_are_skipped() {
        let doc = doc! { "tags": ["a", "b"], "name": "x" };
        let flat = flatten("c", &doc);
        assert_eq!(flat.fields.len(), 1);
        assert_eq!(
            flat.diagnostics,
            vec![FlattenDiagnostic {
                path: "c.tags".into(),
                kind: DiagnosticKind::UnsupportedArray,
            }]
        );
        assert!(!flat.has_unknown_types());
    }

    #[test]
    fn unknown_leaf_types_surface_a_diagnostic() {
        let doc = doc! { "gone": Bson::Null, "name": "x" };
        let flat = flatten("c", &doc);
        assert_eq!(flat.fields.len(), 1);
        assert!(flat.has_unknown_types());
        assert_eq!(
            flat.diagnostics[0].kind,
            DiagnosticKind::UnknownType { raw: "null".into() }
        );
    }
}
