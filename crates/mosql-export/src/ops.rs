//! The export operations behind the command surface.

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use mosql_core::{format_collection_list, Connection, Export, User};
use mosql_mapping::{
    generate_schema_mapping, load_schema_mapping, retained_collections, GeneratedMapping,
    LoadedMapping,
};
use mosql_source::{DocumentSource, MongoDocumentSource};
use mosql_sql::{prepare_export, SqlDestination};
use mosql_store::{MappingStore, StoreError};

use crate::progress::ExportProgress;
use crate::runner::{
    build_change_stream_pipeline, build_full_export_pipeline, run_change_stream_export,
    run_full_export,
};

/// Answers collected by the interactive `export init` prompt.
#[derive(Debug, Clone, Default)]
pub struct InitData {
    pub source_database_name: String,
    pub source_database_connection_string: String,
    pub destination_database_name: String,
    pub destination_database_connection_string: String,
    pub destination_database_type: String,
    pub collections_to_include: String,
    pub collections_to_exclude: String,
    pub user_name: String,
    pub email: String,
}

/// The two supported export run types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportType {
    Full,
    ChangeStream,
}

impl std::str::FromStr for ExportType {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "full" => Ok(Self::Full),
            "change-stream" => Ok(Self::ChangeStream),
            other => bail!("unknown export type '{other}', expected 'full' or 'change-stream'"),
        }
    }
}

/// Create the export definition. Generating the default schema mappings is a
/// separate step; an export must be initialized first.
pub fn initialize_export(
    store: &MappingStore,
    namespace: &str,
    data: InitData,
) -> Result<i64> {
    match store.find_export_by_namespace(namespace) {
        Ok(_) => {
            return Err(StoreError::DuplicateNamespace {
                namespace: namespace.to_string(),
            })
            .context("export exists");
        }
        Err(StoreError::NotFound) => {}
        Err(e) => return Err(e).context("looking up namespace"),
    }

    let destination_kind = if data.destination_database_type.trim().is_empty() {
        "postgres".to_string()
    } else {
        data.destination_database_type.trim().to_string()
    };

    let user = User {
        user_name: data.user_name,
        email: data.email,
        ..Default::default()
    };

    let export = Export {
        namespace: namespace.to_string(),
        export_type: Export::type_tag(&destination_kind),
        source_connection: Connection {
            name: data.source_database_name,
            connection_uri: data.source_database_connection_string,
        },
        destination_connection: Connection {
            name: data.destination_database_name,
            connection_uri: data.destination_database_connection_string,
        },
        include_collections: format_collection_list(&data.collections_to_include),
        exclude_collections: format_collection_list(&data.collections_to_exclude),
        creator: user.clone(),
        updater: user,
        ..Default::default()
    };

    let id = store.create_export(&export)?;
    info!(namespace, export_id = id, "export initialized");
    Ok(id)
}

/// Generate default mappings for a saved export, connecting to the actual
/// source database.
pub async fn generate_mappings(
    store: &MappingStore,
    namespace: &str,
    dir: &Path,
) -> Result<GeneratedMapping> {
    let export = store.find_export_by_namespace(namespace)?;
    let source = connect_source(&export).await?;

    generate_schema_mapping(store, source.as_ref(), namespace, dir)
        .await
        .context("generating schema mappings")
}

/// Load customized mapping files and reconcile the stored export.
pub fn load_mappings(store: &MappingStore, namespace: &str, dir: &Path) -> Result<LoadedMapping> {
    load_schema_mapping(store, namespace, dir).context("loading schema mappings")
}

/// Namespaces of all saved exports.
pub fn list_exports(store: &MappingStore) -> Result<Vec<String>> {
    Ok(store
        .list_exports()?
        .into_iter()
        .map(|e| e.namespace)
        .collect())
}

pub fn show_export(store: &MappingStore, namespace: &str) -> Result<Export> {
    Ok(store.find_export_by_namespace(namespace)?)
}

pub fn delete_export(store: &MappingStore, namespace: &str) -> Result<()> {
    let export = store.find_export_by_namespace(namespace)?;
    store.delete_export(export.id)?;
    info!(namespace, "export deleted");
    Ok(())
}

/// Start an export run. Prepares the destination (create / truncate /
/// additive alter) and drives the staged pipeline until the run completes
/// or `shutdown` fires.
pub async fn start_export(
    store: &MappingStore,
    namespace: &str,
    export_type: ExportType,
    shutdown: CancellationToken,
) -> Result<u64> {
    let export = store.find_export_by_namespace(namespace)?;
    if export.schemas.is_empty() {
        bail!(
            "export '{namespace}' has no schema mappings, run generate-mappings first"
        );
    }

    let source = connect_source(&export).await?;
    let destination = Arc::new(
        SqlDestination::connect(&export.destination_connection.connection_uri)
            .await
            .context("connecting to destination")?,
    );

    prepare_export(&export.schemas, destination.as_ref())
        .await
        .context("preparing destination tables")?;

    let export = Arc::new(export);
    match export_type {
        ExportType::Full => {
            let collections = retained_collections(&export, source.as_ref()).await?;
            let progress = Arc::new(ExportProgress::new(collections.len()));
            let pipeline = build_full_export_pipeline(
                export.clone(),
                source,
                destination,
                collections,
                progress.clone(),
            )?;
            run_full_export(pipeline, progress, shutdown).await
        }
        ExportType::ChangeStream => {
            let progress = Arc::new(ExportProgress::new(0));
            let pipeline = build_change_stream_pipeline(
                export.clone(),
                source,
                destination,
                progress.clone(),
            )?;
            run_change_stream_export(pipeline, progress, shutdown).await
        }
    }
}

async fn connect_source(export: &Export) -> Result<Arc<dyn DocumentSource>> {
    let mut uri = export.source_connection.connection_uri.clone();
    if uri.trim().is_empty() {
        match std::env::var("DATABASE_URL") {
            Ok(fallback) => uri = fallback,
            Err(_) => warn!(
                "source connection uri is empty and DATABASE_URL is not set"
            ),
        }
    }

    let source = MongoDocumentSource::connect(
        &uri,
        &export.source_connection.name,
        &CancellationToken::new(),
    )
    .await
    .context("connecting to source")?;
    Ok(Arc::new(source))
}
