//! Pure SQL renderers over a Schema.
//!
//! Tables are fully qualified as `<namespace>.<table>`. Identifiers come out
//! of the snake-case transform, so they contain only `[a-z0-9_]` and are
//! emitted verbatim. Destination types are uppercased in DDL output.

use mosql_core::Schema;

/// A column row from the destination's information_schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub is_nullable: bool,
    pub ordinal: i32,
}

pub fn full_table_name(schema: &Schema) -> String {
    format!("{}.{}", schema.namespace, schema.table)
}

/// `CREATE SCHEMA IF NOT EXISTS <namespace>`; the namespace is the
/// destination-side qualifier for every exported table.
pub fn create_namespace_sql(schema: &Schema) -> String {
    format!("CREATE SCHEMA IF NOT EXISTS {}", schema.namespace)
}

/// CREATE TABLE IF NOT EXISTS <ns>.<table> ( col TYPE [PRIMARY KEY], ... )
///
/// Columns follow FieldMapping order; the PRIMARY KEY marker lands on the
/// single column whose name equals the schema's primary key.
pub fn create_table_if_not_exists_sql(schema: &Schema) -> String {
    let columns: Vec<String> = schema
        .mappings
        .iter()
        .map(|m| {
            let mut defn = format!(
                "{} {}",
                m.destination_field_name,
                m.destination_field_type.to_uppercase()
            );
            if schema.primary_key.as_deref() == Some(m.destination_field_name.as_str()) {
                defn.push_str(" PRIMARY KEY");
            }
            defn
        })
        .collect();

    format!(
        "CREATE TABLE IF NOT EXISTS {} ( {} )",
        full_table_name(schema),
        columns.join(",\n")
    )
}

pub fn truncate_table_sql(schema: &Schema) -> String {
    format!("TRUNCATE TABLE {}", full_table_name(schema))
}

pub fn drop_table_if_exists_sql(schema: &Schema) -> String {
    format!("DROP TABLE IF EXISTS {}", full_table_name(schema))
}

/// Existence probe against information_schema.
pub fn table_exists_sql(schema: &Schema) -> String {
    format!(
        "SELECT table_name FROM information_schema.tables \
         WHERE table_schema = '{}' AND table_name = '{}'",
        schema.namespace, schema.table
    )
}

/// Column introspection: enough to detect adds, drops, type changes and
/// nullability changes against the mapping.
pub fn table_definition_sql(schema: &Schema) -> String {
    format!(
        "SELECT column_name, data_type, is_nullable, ordinal_position \
         FROM information_schema.columns \
         WHERE table_schema = '{}' AND table_name = '{}' \
         ORDER BY ordinal_position",
        schema.namespace, schema.table
    )
}
