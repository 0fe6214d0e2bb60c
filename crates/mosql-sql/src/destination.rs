//! Destination database access.
//!
//! [`DdlExecutor`] is the seam the prepare step works against; the real
//! implementation is [`SqlDestination`] over tokio-postgres. Batched row
//! inserts go through an [`InsertPlan`] derived from a Schema's mappings.

use std::time::Duration;

use async_trait::async_trait;
use mosql_core::Schema;
use tokio::sync::Mutex;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, NoTls};
use tracing::{debug, info, warn};

use crate::errors::{DdlError, DdlResult};
use crate::render::{full_table_name, table_definition_sql, table_exists_sql, ColumnInfo};
use crate::value::SqlValue;

/// Destination-side operations needed to prepare and run an export.
#[async_trait]
pub trait DdlExecutor: Send + Sync {
    async fn execute(&self, sql: &str) -> DdlResult<u64>;
    async fn table_exists(&self, schema: &Schema) -> DdlResult<bool>;
    async fn table_columns(&self, schema: &Schema) -> DdlResult<Vec<ColumnInfo>>;
}

/// Row sink for the export pipeline's write stage. Rows arrive ordered per
/// the schema's FieldMappings.
#[async_trait]
pub trait RowWriter: Send + Sync {
    async fn write_rows(&self, schema: &Schema, rows: Vec<Vec<SqlValue>>) -> DdlResult<u64>;
}

/// Parameterized insert shape for one destination table, derived from the
/// Schema's FieldMappings. Columns keep mapping order; numeric columns are
/// bound as text and cast server-side.
#[derive(Debug, Clone)]
pub struct InsertPlan {
    pub table: String,
    pub columns: Vec<String>,
    casts: Vec<Option<&'static str>>,
}

impl InsertPlan {
    pub fn for_schema(schema: &Schema) -> Self {
        let columns = schema
            .mappings
            .iter()
            .map(|m| m.destination_field_name.clone())
            .collect();
        let casts = schema
            .mappings
            .iter()
            .map(|m| {
                let ty = m.destination_field_type.to_uppercase();
                if ty.starts_with("NUMERIC") || ty.starts_with("DECIMAL") {
                    Some("::text::numeric")
                } else {
                    None
                }
            })
            .collect();
        Self {
            table: full_table_name(schema),
            columns,
            casts,
        }
    }

    /// Multi-row `INSERT INTO ... VALUES ...` statement for `row_count` rows.
    pub fn statement(&self, row_count: usize) -> String {
        let width = self.columns.len();
        let mut groups = Vec::with_capacity(row_count);
        for row in 0..row_count {
            let placeholders: Vec<String> = (0..width)
                .map(|col| {
                    let n = row * width + col + 1;
                    match self.casts[col] {
                        Some(cast) => format!("${n}{cast}"),
                        None => format!("${n}"),
                    }
                })
                .collect();
            groups.push(format!("({})", placeholders.join(", ")));
        }

        format!(
            "INSERT INTO {} ({}) VALUES {}",
            self.table,
            self.columns.join(", "),
            groups.join(", ")
        )
    }

    /// Rows per statement so the bind-parameter count stays well under the
    /// protocol limit.
    pub fn max_rows_per_batch(&self) -> usize {
        (60_000 / self.columns.len().max(1)).max(1)
    }
}

/// A live Postgres destination.
pub struct SqlDestination {
    client: Mutex<Client>,
}

impl SqlDestination {
    /// Connect with a short bounded backoff so a momentarily unavailable
    /// destination does not fail the run at startup.
    pub async fn connect(uri: &str) -> DdlResult<Self> {
        let mut backoff = Duration::from_millis(500);
        let mut last_err = None;

        for attempt in 1..=5u32 {
            match tokio_postgres::connect(uri, NoTls).await {
                Ok((client, connection)) => {
                    tokio::spawn(async move {
                        if let Err(e) = connection.await {
                            warn!(error = %e, "destination connection closed with error");
                        }
                    });
                    info!("connected to destination database");
                    return Ok(Self {
                        client: Mutex::new(client),
                    });
                }
                Err(e) => {
                    warn!(attempt, error = %e, "destination connect failed, backing off");
                    last_err = Some(e);
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(Duration::from_secs(8));
                }
            }
        }

        Err(DdlError::Connect {
            details: format!(
                "destination unreachable: {}",
                last_err.map(|e| e.to_string()).unwrap_or_default()
            )
            .into(),
        })
    }

    /// Insert `rows` (each ordered per the plan's columns) inside one
    /// transaction, chunked to respect the bind-parameter limit.
    pub async fn insert_rows(
        &self,
        plan: &InsertPlan,
        rows: &[Vec<SqlValue>],
    ) -> DdlResult<u64> {
        if rows.is_empty() {
            return Ok(0);
        }

        let mut client = self.client.lock().await;
        let tx = client.transaction().await?;

        let mut written = 0u64;
        for chunk in rows.chunks(plan.max_rows_per_batch()) {
            let statement = plan.statement(chunk.len());
            let params: Vec<&(dyn ToSql + Sync)> = chunk
                .iter()
                .flat_map(|row| row.iter().map(|v| v as &(dyn ToSql + Sync)))
                .collect();
            written += tx.execute(statement.as_str(), &params).await?;
        }

        tx.commit().await?;
        debug!(table = %plan.table, rows = written, "batch inserted");
        Ok(written)
    }
}

#[async_trait]
impl RowWriter for SqlDestination {
    async fn write_rows(&self, schema: &Schema, rows: Vec<Vec<SqlValue>>) -> DdlResult<u64> {
        let plan = InsertPlan::for_schema(schema);
        self.insert_rows(&plan, &rows).await
    }
}

#[async_trait]
impl DdlExecutor for SqlDestination {
    async fn execute(&self, sql: &str) -> DdlResult<u64> {
        let client = self.client.lock().await;
        Ok(client.execute(sql, &[]).await?)
    }

    async fn table_exists(&self, schema: &Schema) -> DdlResult<bool> {
        let client = self.client.lock().await;
        let rows = client.query(table_exists_sql(schema).as_str(), &[]).await?;
        Ok(!rows.is_empty())
    }

    async fn table_columns(&self, schema: &Schema) -> DdlResult<Vec<ColumnInfo>> {
        let client = self.client.lock().await;
        let rows = client
            .query(table_definition_sql(schema).as_str(), &[])
            .await?;

        Ok(rows
            .iter()
            .map(|row| ColumnInfo {
                name: row.get::<_, String>(0),
                data_type: row.get::<_, String>(1),
                is_nullable: row.get::<_, String>(2) == "YES",
                ordinal: row.get::<_, i32>(3),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mosql_core::FieldMapping;

    fn schema() -> Schema {
        Schema {
            namespace: "ns".into(),
            table: "users".into(),
            mappings: vec![
                FieldMapping {
                    id: 0,
                    schema_id: 0,
                    source_field_name: "name".into(),
                    destination_field_name: "name".into(),
                    source_field_type: "string".into(),
                    destination_field_type: "TEXT".into(),
                },
                FieldMapping {
                    id: 0,
                    schema_id: 0,
                    source_field_name: "balance".into(),
                    destination_field_name: "balance".into(),
                    source_field_type: "decimal".into(),
                    destination_field_type: "numeric(10, 2)".into(),
                },
            ],
            ..Default::default()
        }
    }

    #[test]
    fn statement_numbers_placeholders_across_rows() {
        let plan = InsertPlan::for_schema(&schema());
        assert_eq!(
            plan.statement(2),
            "INSERT INTO ns.users (name, balance) VALUES \
             ($1, $2::text::numeric), ($3, $4::text::numeric)"
        );
    }

    #[test]
    fn batch_size_accounts_for_column_count() {
        let plan = InsertPlan::for_schema(&schema());
        assert_eq!(plan.max_rows_per_batch(), 30_000);
    }
}
