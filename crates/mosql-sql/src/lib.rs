//! Destination SQL for mosql: pure DDL renderers over a Schema, the typed
//! bind values, batched inserts, and the prepare step that reconciles the
//! destination with the mapping before an export run.

mod destination;
mod errors;
mod prepare;
mod render;
mod value;

pub use destination::{DdlExecutor, InsertPlan, RowWriter, SqlDestination};
pub use errors::{DdlError, DdlResult};
pub use prepare::{additive_alter_plan, prepare_export};
pub use render::{
    create_namespace_sql, create_table_if_not_exists_sql, drop_table_if_exists_sql,
    full_table_name, table_definition_sql, table_exists_sql, truncate_table_sql, ColumnInfo,
};
pub use value::SqlValue;
