//! The portable textual form of a mapping: one `export_<namespace>.json`
//! plus one `<collection>.json` per schema, all inside a caller-supplied
//! directory. The export file references schema files by relative path.
//!
//! The JSON keys are a stable contract; the DTOs here exist so the on-disk
//! shape can evolve independently of the in-memory model.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use mosql_core::{Connection, Export, FieldMapping, Schema, User};

use crate::errors::{MappingError, MappingResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionFile {
    pub name: String,
    pub connection_uri: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserFile {
    pub user_name: String,
    pub full_name: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingEntry {
    pub source_field_name: String,
    pub destination_field_name: String,
    pub source_field_type: String,
    pub destination_field_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaFile {
    pub id: i64,
    pub export_id: i64,
    pub collection: String,
    #[serde(rename = "sql_table")]
    pub table: String,
    pub primary_key: Option<String>,
    pub version: String,
    pub indexes: String,
    pub mappings: Vec<MappingEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportFile {
    pub id: i64,
    pub namespace: String,
    #[serde(rename = "type")]
    pub export_type: String,
    pub source_connection: ConnectionFile,
    pub destination_connection: ConnectionFile,
    pub creator: UserFile,
    pub updater: UserFile,
    pub include_collections: String,
    pub exclude_collections: String,
    /// Schema file names relative to the export file's directory.
    pub schemas: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Connection> for ConnectionFile {
    fn from(c: &Connection) -> Self {
        Self {
            name: c.name.clone(),
            connection_uri: c.connection_uri.clone(),
        }
    }
}

impl From<&User> for UserFile {
    fn from(u: &User) -> Self {
        Self {
            user_name: u.user_name.clone(),
            full_name: u.full_name.clone(),
            email: u.email.clone(),
        }
    }
}

impl From<&FieldMapping> for MappingEntry {
    fn from(m: &FieldMapping) -> Self {
        Self {
            source_field_name: m.source_field_name.clone(),
            destination_field_name: m.destination_field_name.clone(),
            source_field_type: m.source_field_type.clone(),
            destination_field_type: m.destination_field_type.clone(),
        }
    }
}

impl From<&Schema> for SchemaFile {
    fn from(s: &Schema) -> Self {
        Self {
            id: s.id,
            export_id: s.export_id,
            collection: s.collection.clone(),
            table: s.table.clone(),
            primary_key: s.primary_key.clone(),
            version: s.version.clone(),
            indexes: s.indexes.clone(),
            mappings: s.mappings.iter().map(MappingEntry::from).collect(),
        }
    }
}

pub fn export_file_name(namespace: &str) -> String {
    format!("export_{namespace}.json")
}

pub fn schema_file_name(collection: &str) -> String {
    format!("{collection}.json")
}

/// Serialize a full export aggregate into `dir`, one file per schema plus
/// the export file. Returns the written paths, export file first.
pub fn write_mapping_dir(export: &Export, dir: &Path) -> MappingResult<Vec<PathBuf>> {
    fs::create_dir_all(dir)?;

    let mut schema_names = Vec::with_capacity(export.schemas.len());
    let mut written = Vec::with_capacity(export.schemas.len() + 1);

    for schema in &export.schemas {
        let name = schema_file_name(&schema.collection);
        let path = dir.join(&name);
        write_pretty(&path, &SchemaFile::from(schema))?;
        schema_names.push(name);
        written.push(path);
    }

    let export_file = ExportFile {
        id: export.id,
        namespace: export.namespace.clone(),
        export_type: export.export_type.clone(),
        source_connection: ConnectionFile::from(&export.source_connection),
        destination_connection: ConnectionFile::from(&export.destination_connection),
        creator: UserFile::from(&export.creator),
        updater: UserFile::from(&export.updater),
        include_collections: export.include_collections.clone(),
        exclude_collections: export.exclude_collections.clone(),
        schemas: schema_names,
        created_at: export.created_at,
        updated_at: export.updated_at,
    };
    let export_path = dir.join(export_file_name(&export.namespace));
    write_pretty(&export_path, &export_file)?;
    written.insert(0, export_path);

    debug!(dir = %dir.display(), files = written.len(), "mapping files written");
    Ok(written)
}

/// Read an export aggregate back from `dir`. Unreadable or malformed files
/// are a `MappingFileInvalid` error.
pub fn read_mapping_dir(dir: &Path, namespace: &str) -> MappingResult<Export> {
    let export_path = dir.join(export_file_name(namespace));
    let export_file: ExportFile = read_json(&export_path)?;

    let mut schemas = Vec::with_capacity(export_file.schemas.len());
    for name in &export_file.schemas {
        let schema_file: SchemaFile = read_json(&dir.join(name))?;
        let schema_id = schema_file.id;
        schemas.push(Schema {
            id: schema_id,
            export_id: schema_file.export_id,
            namespace: export_file.namespace.clone(),
            collection: schema_file.collection,
            table: schema_file.table,
            primary_key: schema_file.primary_key,
            version: schema_file.version,
            indexes: schema_file.indexes,
            mappings: schema_file
                .mappings
                .into_iter()
                .map(|m| FieldMapping {
                    id: 0,
                    schema_id,
                    source_field_name: m.source_field_name,
                    destination_field_name: m.destination_field_name,
                    source_field_type: m.source_field_type,
                    destination_field_type: m.destination_field_type,
                })
                .collect(),
        });
    }

    Ok(Export {
        id: export_file.id,
        namespace: export_file.namespace,
        export_type: export_file.export_type,
        source_connection: Connection {
            name: export_file.source_connection.name,
            connection_uri: export_file.source_connection.connection_uri,
        },
        destination_connection: Connection {
            name: export_file.destination_connection.name,
            connection_uri: export_file.destination_connection.connection_uri,
        },
        schemas,
        include_collections: export_file.include_collections,
        exclude_collections: export_file.exclude_collections,
        creator: User {
            user_name: export_file.creator.user_name,
            full_name: export_file.creator.full_name,
            email: export_file.creator.email,
        },
        updater: User {
            user_name: export_file.updater.user_name,
            full_name: export_file.updater.full_name,
            email: export_file.updater.email,
        },
        created_at: export_file.created_at,
        updated_at: export_file.updated_at,
    })
}

fn write_pretty<T: Serialize>(path: &Path, value: &T) -> MappingResult<()> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json)?;
    Ok(())
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> MappingResult<T> {
    let raw = fs::read_to_string(path).map_err(|e| MappingError::MappingFileInvalid {
        details: format!("{}: {e}", path.display()),
    })?;
    serde_json::from_str(&raw).map_err(|e| MappingError::MappingFileInvalid {
        details: format!("{}: {e}", path.display()),
    })
}
