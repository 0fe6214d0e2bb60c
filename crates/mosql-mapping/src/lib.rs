//! Mapping engine: default schema generation from sampled documents, the
//! portable JSON mapping files, and the differ that reconciles edited files
//! with the stored export.

mod diff;
mod errors;
mod files;
mod generate;
mod loader;

pub use diff::{diff_export, diff_schema, ChangeEntry, Changeset, SchemaChange};
pub use errors::{MappingError, MappingResult};
pub use files::{
    export_file_name, read_mapping_dir, schema_file_name, write_mapping_dir, ExportFile,
    MappingEntry, SchemaFile,
};
pub use generate::{generate_schema_mapping, retained_collections, GeneratedMapping};
pub use loader::{load_schema_mapping, LoadedMapping};
