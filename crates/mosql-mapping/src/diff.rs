//! Structured changeset between a stored export and a just-loaded one.
//!
//! The changeset is the authoritative driver for destination reconciliation
//! after `load-mappings`: an empty changeset means no action. Each export
//! field is compared under a stable human-readable label; a mismatch records
//! the change and updates the stored copy in place, so the caller can hand
//! the stored aggregate straight back to the store.

use std::fmt;

use tracing::debug;

use mosql_core::{Export, Schema};

use crate::errors::{MappingError, MappingResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEntry {
    pub field: &'static str,
    pub old: String,
    pub new: String,
}

impl fmt::Display for ChangeEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} changed from '{}' to '{}'",
            self.field, self.old, self.new
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaChange {
    SchemaAdded {
        collection: String,
    },
    SchemaRemoved {
        collection: String,
    },
    TableRenamed {
        collection: String,
        old: String,
        new: String,
    },
    PrimaryKeyChanged {
        collection: String,
        old: Option<String>,
        new: Option<String>,
    },
    VersionChanged {
        collection: String,
        old: String,
        new: String,
    },
    FieldAdded {
        collection: String,
        field: String,
    },
    FieldRemoved {
        collection: String,
        field: String,
    },
    FieldTypeChanged {
        collection: String,
        field: String,
        old: String,
        new: String,
    },
    FieldColumnRenamed {
        collection: String,
        field: String,
        old: String,
        new: String,
    },
}

impl fmt::Display for SchemaChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SchemaAdded { collection } => {
                write!(f, "schema for collection '{collection}' added")
            }
            Self::SchemaRemoved { collection } => {
                write!(f, "schema for collection '{collection}' removed")
            }
            Self::TableRenamed {
                collection,
                old,
                new,
            } => write!(f, "{collection}: table renamed from '{old}' to '{new}'"),
            Self::PrimaryKeyChanged {
                collection,
                old,
                new,
            } => write!(
                f,
                "{collection}: primary key changed from '{}' to '{}'",
                old.as_deref().unwrap_or("<none>"),
                new.as_deref().unwrap_or("<none>")
            ),
            Self::VersionChanged {
                collection,
                old,
                new,
            } => write!(f, "{collection}: version changed from '{old}' to '{new}'"),
            Self::FieldAdded { collection, field } => {
                write!(f, "{collection}: field '{field}' added")
            }
            Self::FieldRemoved { collection, field } => {
                write!(f, "{collection}: field '{field}' removed")
            }
            Self::FieldTypeChanged {
                collection,
                field,
                old,
                new,
            } => write!(
                f,
                "{collection}: field '{field}' type changed from '{old}' to '{new}'"
            ),
            Self::FieldColumnRenamed {
                collection,
                field,
                old,
                new,
            } => write!(
                f,
                "{collection}: field '{field}' column renamed from '{old}' to '{new}'"
            ),
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct Changeset {
    pub entries: Vec<ChangeEntry>,
    pub schema_changes: Vec<SchemaChange>,
}

impl Changeset {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.schema_changes.is_empty()
    }

    /// The labels of all changed export fields, in comparison order.
    pub fn fields(&self) -> Vec<&'static str> {
        self.entries.iter().map(|e| e.field).collect()
    }
}

/// Compare `stored` against `incoming` (same export, freshly loaded from
/// mapping files). An id mismatch is a fatal mapping-load error; everything
/// else is a labelled change entry, applied to `stored` as it is recorded.
pub fn diff_export(stored: &mut Export, incoming: &Export) -> MappingResult<Changeset> {
    if stored.id != incoming.id {
        return Err(MappingError::MappingFileInvalid {
            details: format!(
                "export id mismatch: stored {} but file has {}",
                stored.id, incoming.id
            ),
        });
    }

    let mut changeset = Changeset::default();

    compare(
        &mut changeset,
        "Namespace",
        &mut stored.namespace,
        &incoming.namespace,
    );
    compare(
        &mut changeset,
        "Export type",
        &mut stored.export_type,
        &incoming.export_type,
    );
    compare(
        &mut changeset,
        "Source database connection name",
        &mut stored.source_connection.name,
        &incoming.source_connection.name,
    );
    compare(
        &mut changeset,
        "Source database connection uri",
        &mut stored.source_connection.connection_uri,
        &incoming.source_connection.connection_uri,
    );
    compare(
        &mut changeset,
        "Destination database connection name",
        &mut stored.destination_connection.name,
        &incoming.destination_connection.name,
    );
    compare(
        &mut changeset,
        "Destination database connection uri",
        &mut stored.destination_connection.connection_uri,
        &incoming.destination_connection.connection_uri,
    );
    compare(
        &mut changeset,
        "Creator user name",
        &mut stored.creator.user_name,
        &incoming.creator.user_name,
    );
    compare(
        &mut changeset,
        "Creator full name",
        &mut stored.creator.full_name,
        &incoming.creator.full_name,
    );
    compare(
        &mut changeset,
        "Creator email",
        &mut stored.creator.email,
        &incoming.creator.email,
    );
    compare(
        &mut changeset,
        "Updater user name",
        &mut stored.updater.user_name,
        &incoming.updater.user_name,
    );
    compare(
        &mut changeset,
        "Updater full name",
        &mut stored.updater.full_name,
        &incoming.updater.full_name,
    );
    compare(
        &mut changeset,
        "Updater email",
        &mut stored.updater.email,
        &incoming.updater.email,
    );
    compare(
        &mut changeset,
        "Include collections",
        &mut stored.include_collections,
        &incoming.include_collections,
    );
    compare(
        &mut changeset,
        "Exclude collections",
        &mut stored.exclude_collections,
        &incoming.exclude_collections,
    );

    diff_schemas(&mut changeset, stored, incoming);

    debug!(
        changes = changeset.entries.len(),
        schema_changes = changeset.schema_changes.len(),
        "export diff computed"
    );
    Ok(changeset)
}

fn compare(changeset: &mut Changeset, field: &'static str, stored: &mut String, incoming: &str) {
    if stored != incoming {
        changeset.entries.push(ChangeEntry {
            field,
            old: stored.clone(),
            new: incoming.to_string(),
        });
        *stored = incoming.to_string();
    }
}

fn diff_schemas(changeset: &mut Changeset, stored: &mut Export, incoming: &Export) {
    // removals first, so the retained walk below only sees survivors
    let removed: Vec<String> = stored
        .schemas
        .iter()
        .filter(|s| incoming.schema_for_collection(&s.collection).is_none())
        .map(|s| s.collection.clone())
        .collect();
    for collection in removed {
        changeset
            .schema_changes
            .push(SchemaChange::SchemaRemoved {
                collection: collection.clone(),
            });
        stored.schemas.retain(|s| s.collection != collection);
    }

    for incoming_schema in &incoming.schemas {
        match stored
            .schemas
            .iter_mut()
            .find(|s| s.collection == incoming_schema.collection)
        {
            Some(stored_schema) => {
                diff_schema(&mut changeset.schema_changes, stored_schema, incoming_schema)
            }
            None => {
                changeset.schema_changes.push(SchemaChange::SchemaAdded {
                    collection: incoming_schema.collection.clone(),
                });
                let mut added = incoming_schema.clone();
                added.export_id = stored.id;
                added.namespace = stored.namespace.clone();
                stored.schemas.push(added);
            }
        }
    }
}

/// Schema-level diff: table name, primary key, version, and the field
/// mapping set keyed by source field path.
pub fn diff_schema(
    changes: &mut Vec<SchemaChange>,
    stored: &mut Schema,
    incoming: &Schema,
) {
    let collection = stored.collection.clone();

    if stored.table != incoming.table {
        changes.push(SchemaChange::TableRenamed {
            collection: collection.clone(),
            old: stored.table.clone(),
            new: incoming.table.clone(),
        });
        stored.table = incoming.table.clone();
    }
    if stored.primary_key != incoming.primary_key {
        changes.push(SchemaChange::PrimaryKeyChanged {
            collection: collection.clone(),
            old: stored.primary_key.clone(),
            new: incoming.primary_key.clone(),
        });
        stored.primary_key = incoming.primary_key.clone();
    }
    if stored.version != incoming.version {
        changes.push(SchemaChange::VersionChanged {
            collection: collection.clone(),
            old: stored.version.clone(),
            new: incoming.version.clone(),
        });
        stored.version = incoming.version.clone();
    }

    for stored_mapping in &stored.mappings {
        if !incoming
            .mappings
            .iter()
            .any(|m| m.source_field_name == stored_mapping.source_field_name)
        {
            changes.push(SchemaChange::FieldRemoved {
                collection: collection.clone(),
                field: stored_mapping.source_field_name.clone(),
            });
        }
    }

    for incoming_mapping in &incoming.mappings {
        match stored
            .mappings
            .iter()
            .find(|m| m.source_field_name == incoming_mapping.source_field_name)
        {
            None => changes.push(SchemaChange::FieldAdded {
                collection: collection.clone(),
                field: incoming_mapping.source_field_name.clone(),
            }),
            Some(stored_mapping) => {
                if stored_mapping.destination_field_name
                    != incoming_mapping.destination_field_name
                {
                    changes.push(SchemaChange::FieldColumnRenamed {
                        collection: collection.clone(),
                        field: incoming_mapping.source_field_name.clone(),
                        old: stored_mapping.destination_field_name.clone(),
                        new: incoming_mapping.destination_field_name.clone(),
                    });
                }
                if stored_mapping.destination_field_type
                    != incoming_mapping.destination_field_type
                    || stored_mapping.source_field_type != incoming_mapping.source_field_type
                {
                    changes.push(SchemaChange::FieldTypeChanged {
                        collection: collection.clone(),
                        field: incoming_mapping.source_field_name.clone(),
                        old: stored_mapping.destination_field_type.clone(),
                        new: incoming_mapping.destination_field_type.clone(),
                    });
                }
            }
        }
    }

    stored.mappings = incoming.mappings.clone();
}
