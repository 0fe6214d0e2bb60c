//! Load customized mapping files back into the store.

use std::path::Path;

use tracing::info;

use mosql_core::Export;
use mosql_store::MappingStore;

use crate::diff::{diff_export, Changeset};
use crate::errors::MappingResult;
use crate::files::read_mapping_dir;

pub struct LoadedMapping {
    pub export: Export,
    pub changeset: Changeset,
}

/// Read the mapping files for `namespace` from `dir`, diff them against the
/// stored export, and persist the reconciled aggregate when anything
/// changed. The returned changeset drives destination DDL reconciliation;
/// empty means no action.
pub fn load_schema_mapping(
    store: &MappingStore,
    namespace: &str,
    dir: &Path,
) -> MappingResult<LoadedMapping> {
    let incoming = read_mapping_dir(dir, namespace)?;
    let mut stored = store.find_export_by_namespace(namespace)?;

    let changeset = diff_export(&mut stored, &incoming)?;

    if changeset.is_empty() {
        info!(namespace, "mappings loaded, no changes");
    } else {
        for entry in &changeset.entries {
            info!(namespace, change = %entry, "mapping change");
        }
        for change in &changeset.schema_changes {
            info!(namespace, change = %change, "schema mapping change");
        }
        store.update_export(&stored)?;
        info!(
            namespace,
            changes = changeset.entries.len() + changeset.schema_changes.len(),
            "mappings loaded and stored export updated"
        );
    }

    Ok(LoadedMapping {
        export: stored,
        changeset,
    })
}
