//! Default schema mapping generation.
//!
//! For every retained source collection, fetch one sample document, flatten
//! it, and synthesize a FieldMapping per leaf with the catalog's default SQL
//! type. The generator is sample-based by design: it does not reconcile
//! variation across documents. Out-of-sample fields are either added by the
//! user editing the mapping files and reloading, or dropped at move time.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use mosql_core::{
    flatten, snake_case, CanonicalType, Export, FieldMapping, Schema, GENERATED_VERSION,
};
use mosql_source::DocumentSource;
use mosql_store::MappingStore;

use crate::errors::{MappingError, MappingResult};
use crate::files::write_mapping_dir;

/// Outcome of a generation run: the persisted aggregate and the mapping
/// artefacts written for the user to edit.
pub struct GeneratedMapping {
    pub export: Export,
    pub files: Vec<PathBuf>,
}

/// Generate default mappings for the export stored under `namespace`,
/// persist them, and write the mapping files into `dir`.
pub async fn generate_schema_mapping(
    store: &MappingStore,
    source: &dyn DocumentSource,
    namespace: &str,
    dir: &Path,
) -> MappingResult<GeneratedMapping> {
    let mut export = store.find_export_by_namespace(namespace)?;

    let collections = retained_collections(&export, source).await?;
    info!(
        namespace,
        collections = collections.len(),
        "generating default schema mappings"
    );

    for collection in &collections {
        let schema = build_schema(&export, source, collection).await?;
        let schema_id = store.create_schema(&schema)?;
        info!(collection = %collection, schema_id, "schema generated");

        let mut schema = schema;
        schema.id = schema_id;
        for mapping in &mut schema.mappings {
            mapping.schema_id = schema_id;
        }
        export.schemas.push(schema);
    }

    let files = write_mapping_dir(&export, dir)?;
    info!(namespace, dir = %dir.display(), "export schema mappings generated");

    Ok(GeneratedMapping { export, files })
}

/// Apply the export's collection filters to the source's collection list.
/// Include wins over exclude; an include entry naming an absent collection
/// is an error, and ending with no collections at all is an error.
pub async fn retained_collections(
    export: &Export,
    source: &dyn DocumentSource,
) -> MappingResult<Vec<String>> {
    let all = source.collection_names().await?;
    if all.is_empty() {
        return Err(MappingError::FilterInvalid {
            details: "no collections found at the source".to_string(),
        });
    }

    let includes = export.include_list();
    let excludes = export.exclude_list();

    let retained: Vec<String> = if !includes.is_empty() {
        for include in &includes {
            if !all.contains(include) {
                return Err(MappingError::FilterInvalid {
                    details: format!(
                        "included collection '{include}' not in collection list"
                    ),
                });
            }
        }
        all.into_iter().filter(|c| includes.contains(c)).collect()
    } else if !excludes.is_empty() {
        all.into_iter().filter(|c| !excludes.contains(c)).collect()
    } else {
        all
    };

    if retained.is_empty() {
        return Err(MappingError::FilterInvalid {
            details: "collection filters retained nothing".to_string(),
        });
    }

    Ok(retained)
}

async fn build_schema(
    export: &Export,
    source: &dyn DocumentSource,
    collection: &str,
) -> MappingResult<Schema> {
    let sample = source
        .sample_document(collection)
        .await?
        .ok_or_else(|| MappingError::EmptyCollection {
            collection: collection.to_string(),
        })?;

    let flat = flatten(collection, &sample);
    for diagnostic in &flat.diagnostics {
        match &diagnostic.kind {
            mosql_core::DiagnosticKind::UnknownType { raw } => {
                return Err(MappingError::UnknownType {
                    field: diagnostic.path.clone(),
                    tag: raw.clone(),
                });
            }
            mosql_core::DiagnosticKind::UnsupportedArray => {
                warn!(path = %diagnostic.path, "array field skipped in generated mapping");
            }
        }
    }

    let prefix = format!("{collection}.");
    let mut mappings = Vec::with_capacity(flat.fields.len());
    for (path, value) in &flat.fields {
        let source_field = path.strip_prefix(&prefix).unwrap_or(path);
        let sql_type = value.field_type.default_sql_type().ok_or_else(|| {
            MappingError::UnknownType {
                field: source_field.to_string(),
                tag: value.field_type.as_str().to_string(),
            }
        })?;

        mappings.push(FieldMapping {
            id: 0,
            schema_id: 0,
            source_field_name: source_field.to_string(),
            destination_field_name: snake_case(&source_field.replace('.', "_")),
            source_field_type: value.field_type.as_str().to_string(),
            destination_field_type: sql_type.to_string(),
        });
    }

    // the flattener renames `_id` to `id`; when that column came through,
    // it is the natural primary key
    let primary_key = mappings
        .iter()
        .find(|m| {
            m.destination_field_name == "id"
                && matches!(
                    CanonicalType::parse(&m.source_field_type),
                    Ok(CanonicalType::ObjectId)
                )
        })
        .map(|m| m.destination_field_name.clone());

    Ok(Schema {
        id: 0,
        export_id: export.id,
        namespace: export.namespace.clone(),
        collection: collection.to_string(),
        table: snake_case(collection),
        primary_key,
        version: GENERATED_VERSION.to_string(),
        indexes: String::new(),
        mappings,
    })
}
