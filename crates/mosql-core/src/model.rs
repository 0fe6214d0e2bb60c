//! Mapping model entities: Export, Schema, FieldMapping, Connection, User.
//!
//! An Export exclusively owns its Schemas, and each Schema owns its
//! FieldMappings. Back-references are ids, never pointers; the persistence
//! layer materializes the whole aggregate on load.

use chrono::{DateTime, Utc};

/// Version label the generator stamps on a freshly generated Schema.
pub const GENERATED_VERSION: &str = "1.0-default-generated";

/// A named connection to a source or destination database. Credentials are
/// opaque; the core never parses the URI.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Connection {
    pub name: String,
    pub connection_uri: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct User {
    pub user_name: String,
    pub full_name: String,
    pub email: String,
}

/// Stored login record for a user. Persisted alongside users; mosql itself
/// performs no authentication.
#[derive(Debug, Clone, Default)]
pub struct UserLogin {
    pub id: i64,
    pub user_id: i64,
    pub password_hash: String,
    pub status: String,
    pub login_type: String,
}

/// One row of the rename/retype table: a dotted source field path mapped to
/// a destination column and SQL type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMapping {
    pub id: i64,
    pub schema_id: i64,
    pub source_field_name: String,
    pub destination_field_name: String,
    pub source_field_type: String,
    pub destination_field_type: String,
}

/// Mapping of one source collection onto one destination table.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    pub id: i64,
    pub export_id: i64,
    pub namespace: String,
    pub collection: String,
    pub table: String,
    pub primary_key: Option<String>,
    pub version: String,
    pub indexes: String,
    pub mappings: Vec<FieldMapping>,
}

/// A named export definition: where to read, where to write, and the
/// schema mappings that drive the move.
#[derive(Debug, Clone)]
pub struct Export {
    pub id: i64,
    /// Globally unique name; also the destination-side schema qualifier.
    pub namespace: String,
    /// Type tag of the form `mongo_to_<destkind>`, e.g. `mongo_to_postgres`.
    pub export_type: String,
    pub source_connection: Connection,
    pub destination_connection: Connection,
    pub schemas: Vec<Schema>,
    /// Comma-joined collection names. At most one of include/exclude is
    /// effective; include wins when both are present.
    pub include_collections: String,
    pub exclude_collections: String,
    pub creator: User,
    pub updater: User,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Default for Export {
    fn default() -> Self {
        Self {
            id: 0,
            namespace: String::new(),
            export_type: String::new(),
            source_connection: Connection::default(),
            destination_connection: Connection::default(),
            schemas: Vec::new(),
            include_collections: String::new(),
            exclude_collections: String::new(),
            creator: User::default(),
            updater: User::default(),
            created_at: DateTime::UNIX_EPOCH,
            updated_at: DateTime::UNIX_EPOCH,
        }
    }
}

impl Export {
    pub fn type_tag(destination_kind: &str) -> String {
        format!("mongo_to_{}", destination_kind.to_lowercase())
    }

    pub fn include_list(&self) -> Vec<String> {
        to_collection_list(&self.include_collections)
    }

    pub fn exclude_list(&self) -> Vec<String> {
        to_collection_list(&self.exclude_collections)
    }

    pub fn schema_for_collection(&self, collection: &str) -> Option<&Schema> {
        self.schemas.iter().find(|s| s.collection == collection)
    }
}

/// Split a comma-joined collection list. An empty string is the empty list.
pub fn to_collection_list(value: &str) -> Vec<String> {
    if value.trim().is_empty() {
        return Vec::new();
    }
    value.split(',').map(|s| s.trim().to_string()).collect()
}

/// Normalize a user-entered collection list: trim entries, re-join on `,`.
pub fn format_collection_list(value: &str) -> String {
    to_collection_list(value).join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_tag_lowercases_destination_kind() {
        assert_eq!(Export::type_tag("Postgres"), "mongo_to_postgres");
    }

    #[test]
    fn collection_list_round_trip() {
        assert_eq!(to_collection_list(""), Vec::<String>::new());
        assert_eq!(to_collection_list("a, b ,c"), vec!["a", "b", "c"]);
        assert_eq!(format_collection_list(" a , b "), "a,b");
    }

    #[test]
    fn schema_lookup_by_collection() {
        let export = Export {
            schemas: vec![Schema {
                collection: "users".into(),
                table: "users".into(),
                ..Default::default()
            }],
            ..Default::default()
        };
        assert!(export.schema_for_collection("users").is_some());
        assert!(export.schema_for_collection("orders").is_none());
    }
}
