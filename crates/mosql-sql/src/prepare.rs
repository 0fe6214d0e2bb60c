//! Destination preparation: create-if-missing, truncate-if-existed, and the
//! additive ALTER plan for mapping columns the live table lacks.

use mosql_core::Schema;
use tracing::{info, warn};

use crate::destination::DdlExecutor;
use crate::errors::DdlResult;
use crate::render::{
    create_namespace_sql, create_table_if_not_exists_sql, full_table_name, truncate_table_sql,
    ColumnInfo,
};

/// Additive reconciliation between the mapping and the live table: one
/// `ADD COLUMN` per mapped column missing from the table. Extra live columns
/// and type drift are logged, not planned; anything beyond additive changes
/// is the operator's call.
pub fn additive_alter_plan(schema: &Schema, live: &[ColumnInfo]) -> Vec<String> {
    let mut plan = Vec::new();

    for mapping in &schema.mappings {
        match live.iter().find(|c| c.name == mapping.destination_field_name) {
            None => plan.push(format!(
                "ALTER TABLE {} ADD COLUMN {} {}",
                full_table_name(schema),
                mapping.destination_field_name,
                mapping.destination_field_type.to_uppercase()
            )),
            Some(column) => {
                let mapped = mapping.destination_field_type.to_lowercase();
                let actual = column.data_type.to_lowercase();
                if !mapped.starts_with(&actual) && !actual.starts_with(&mapped) {
                    warn!(
                        table = %full_table_name(schema),
                        column = %column.name,
                        mapped = %mapped,
                        actual = %actual,
                        "column type differs from mapping, not altering"
                    );
                }
            }
        }
    }

    for column in live {
        if !schema
            .mappings
            .iter()
            .any(|m| m.destination_field_name == column.name)
        {
            warn!(
                table = %full_table_name(schema),
                column = %column.name,
                "live column has no mapping, leaving in place"
            );
        }
    }

    plan
}

/// Prepare the destination for an export run. For each schema: create the
/// table if missing, truncate it if it already existed, then apply the
/// additive alter plan.
pub async fn prepare_export(
    schemas: &[Schema],
    executor: &dyn DdlExecutor,
) -> DdlResult<()> {
    for schema in schemas {
        executor.execute(&create_namespace_sql(schema)).await?;

        let existed = executor.table_exists(schema).await?;
        executor
            .execute(&create_table_if_not_exists_sql(schema))
            .await?;
        if existed {
            let truncated = executor.execute(&truncate_table_sql(schema)).await?;
            info!(
                table = %full_table_name(schema),
                rows = truncated,
                "existing table truncated"
            );
        } else {
            info!(table = %full_table_name(schema), "table created");
        }

        let live = executor.table_columns(schema).await?;
        for statement in additive_alter_plan(schema, &live) {
            info!(statement = %statement, "applying additive schema change");
            executor.execute(&statement).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mosql_core::FieldMapping;
    use std::sync::Mutex;

    fn mapping(dest: &str, sql_type: &str) -> FieldMapping {
        FieldMapping {
            id: 0,
            schema_id: 0,
            source_field_name: dest.to_string(),
            destination_field_name: dest.to_string(),
            source_field_type: "string".to_string(),
            destination_field_type: sql_type.to_string(),
        }
    }

    fn schema() -> Schema {
        Schema {
            namespace: "ns".into(),
            collection: "users".into(),
            table: "users".into(),
            mappings: vec![mapping("name", "TEXT"), mapping("city", "TEXT")],
            ..Default::default()
        }
    }

    fn column(name: &str, data_type: &str, ordinal: i32) -> ColumnInfo {
        ColumnInfo {
            name: name.to_string(),
            data_type: data_type.to_string(),
            is_nullable: true,
            ordinal,
        }
    }

    /// Records every statement; scripted answers for the probes.
    struct RecordingExecutor {
        executed: Mutex<Vec<String>>,
        exists: bool,
        columns: Vec<ColumnInfo>,
    }

    impl RecordingExecutor {
        fn new(exists: bool, columns: Vec<ColumnInfo>) -> Self {
            Self {
                executed: Mutex::new(Vec::new()),
                exists,
                columns,
            }
        }

        fn statements(&self) -> Vec<String> {
            self.executed.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl DdlExecutor for RecordingExecutor {
        async fn execute(&self, sql: &str) -> DdlResult<u64> {
            self.executed.lock().unwrap().push(sql.to_string());
            Ok(0)
        }

        async fn table_exists(&self, _schema: &Schema) -> DdlResult<bool> {
            Ok(self.exists)
        }

        async fn table_columns(&self, _schema: &Schema) -> DdlResult<Vec<ColumnInfo>> {
            Ok(self.columns.clone())
        }
    }

    #[test]
    fn plans_add_column_for_missing_mapped_columns() {
        let live = vec![column("name", "text", 1)];
        let plan = additive_alter_plan(&schema(), &live);
        assert_eq!(plan, vec!["ALTER TABLE ns.users ADD COLUMN city TEXT"]);
    }

    #[test]
    fn empty_plan_when_table_matches_mapping() {
        let live = vec![column("name", "text", 1), column("city", "text", 2)];
        assert!(additive_alter_plan(&schema(), &live).is_empty());
    }

    #[tokio::test]
    async fn fresh_table_is_created_without_truncate() {
        let executor = RecordingExecutor::new(
            false,
            vec![column("name", "text", 1), column("city", "text", 2)],
        );
        prepare_export(&[schema()], &executor).await.unwrap();

        let statements = executor.statements();
        assert_eq!(statements.len(), 2);
        assert!(statements[0].starts_with("CREATE SCHEMA IF NOT EXISTS ns"));
        assert!(statements[1].starts_with("CREATE TABLE IF NOT EXISTS ns.users"));
    }

    #[tokio::test]
    async fn existing_table_is_truncated_then_reconciled() {
        let executor = RecordingExecutor::new(true, vec![column("name", "text", 1)]);
        prepare_export(&[schema()], &executor).await.unwrap();

        let statements = executor.statements();
        assert!(statements[1].starts_with("CREATE TABLE IF NOT EXISTS"));
        assert_eq!(statements[2], "TRUNCATE TABLE ns.users");
        assert_eq!(
            statements[3],
            "ALTER TABLE ns.users ADD COLUMN city TEXT"
        );
    }
}
