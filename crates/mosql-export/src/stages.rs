//! Concrete pipeline stages for an export run.
//!
//! A full export is three stages: a producer that yields collection names,
//! a producer-consumer that reads each collection's documents and projects
//! them through the FieldMappings, and a consumer that writes typed rows to
//! the destination in batches. The change-stream variant swaps the producer
//! for one that drains the source's change feed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use metrics::counter;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use mosql_core::{flatten, CanonicalType, Export, FlatDocument, Schema};
use mosql_pipeline::{Consumer, Producer, ProducerConsumer, Stage};
use mosql_source::{ChangeOperation, DocumentSource, SourceChange, SourceResult};
use mosql_sql::{RowWriter, SqlValue};

use crate::progress::ExportProgress;

/// Documents fetched per source round-trip in the read stage.
const READ_BATCH_SIZE: i64 = 500;

/// How long an exhausted producer sleeps before answering a demand with an
/// empty batch, so a finished export does not spin the demand loop.
const EXHAUSTED_IDLE: Duration = Duration::from_millis(200);

/// Longest wait for the first change-feed event of a produce round.
const CHANGE_POLL_WINDOW: Duration = Duration::from_secs(1);

/// Payload flowing between export stages.
#[derive(Debug)]
pub enum ExportPayload {
    /// A collection name awaiting its read pass.
    Collection(String),
    /// One destination row, values ordered per the schema's mappings.
    Row(TableRow),
    /// All documents of the named collection have been emitted.
    CollectionDone(String),
}

#[derive(Debug)]
pub struct TableRow {
    pub collection: String,
    pub values: Vec<SqlValue>,
}

/// Project one flattened document through a schema's FieldMappings. Fields
/// absent from the mapping are dropped; mapped fields absent from the
/// document become NULL.
pub fn project_row(schema: &Schema, flat: &FlatDocument) -> TableRow {
    let values = schema
        .mappings
        .iter()
        .map(|mapping| {
            let path = format!("{}.{}", schema.collection, mapping.source_field_name);
            match flat.fields.get(&path) {
                Some(value) => match CanonicalType::parse(&mapping.source_field_type) {
                    Ok(field_type) => SqlValue::from_flat(field_type, &value.value),
                    Err(e) => {
                        warn!(
                            field = %mapping.source_field_name,
                            error = %e,
                            "mapping carries unknown source type, writing NULL"
                        );
                        SqlValue::Null
                    }
                },
                None => SqlValue::Null,
            }
        })
        .collect();

    TableRow {
        collection: schema.collection.clone(),
        values,
    }
}

// ----------------------------------------------------------------------------
// Stage 1: segment producer
// ----------------------------------------------------------------------------

/// Yields the filtered collection names, up to `demand` per round, then
/// empty batches once exhausted.
pub struct CollectionSegmentProducer {
    collections: Vec<String>,
    cursor: AtomicUsize,
}

impl CollectionSegmentProducer {
    pub fn new(collections: Vec<String>) -> Self {
        Self {
            collections,
            cursor: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Stage for CollectionSegmentProducer {
    fn identifier(&self) -> &str {
        "full_export_producer"
    }
}

#[async_trait]
impl Producer<ExportPayload> for CollectionSegmentProducer {
    async fn produce(&self, demand: usize) -> anyhow::Result<Vec<ExportPayload>> {
        let start = self
            .cursor
            .fetch_add(demand, Ordering::SeqCst)
            .min(self.collections.len());
        let end = (start + demand).min(self.collections.len());

        if start == end {
            tokio::time::sleep(EXHAUSTED_IDLE).await;
            return Ok(Vec::new());
        }

        debug!(from = start, to = end, "segmenting collections");
        Ok(self.collections[start..end]
            .iter()
            .cloned()
            .map(ExportPayload::Collection)
            .collect())
    }
}

// ----------------------------------------------------------------------------
// Stage 2: document reader
// ----------------------------------------------------------------------------

/// Reads each named collection in batches, flattens every document and
/// projects it into rows. A read failure loses that collection's remainder
/// but still emits its completion marker so the run can finish.
pub struct DocumentReadStage {
    export: Arc<Export>,
    source: Arc<dyn DocumentSource>,
}

impl DocumentReadStage {
    pub fn new(export: Arc<Export>, source: Arc<dyn DocumentSource>) -> Self {
        Self { export, source }
    }

    async fn read_collection(&self, collection: &str) -> Vec<ExportPayload> {
        let Some(schema) = self.export.schema_for_collection(collection) else {
            warn!(collection, "no schema mapping for collection, skipping");
            return vec![ExportPayload::CollectionDone(collection.to_string())];
        };

        let mut payloads = Vec::new();
        let mut skip = 0u64;
        loop {
            let batch = match self
                .source
                .read_batch(collection, skip, READ_BATCH_SIZE)
                .await
            {
                Ok(batch) => batch,
                Err(e) => {
                    warn!(collection, error = %e, "read failed, abandoning remainder");
                    break;
                }
            };
            let fetched = batch.len();

            for doc in &batch {
                let flat = flatten(collection, doc);
                payloads.push(ExportPayload::Row(project_row(schema, &flat)));
            }

            skip += fetched as u64;
            if (fetched as i64) < READ_BATCH_SIZE {
                break;
            }
        }

        debug!(collection, rows = payloads.len(), "collection read complete");
        payloads.push(ExportPayload::CollectionDone(collection.to_string()));
        payloads
    }
}

#[async_trait]
impl Stage for DocumentReadStage {
    fn identifier(&self) -> &str {
        "full_export_producer_consumer"
    }
}

#[async_trait]
impl ProducerConsumer<ExportPayload> for DocumentReadStage {
    async fn process(&self, payloads: Vec<ExportPayload>) -> anyhow::Result<Vec<ExportPayload>> {
        let mut out = Vec::new();
        for payload in payloads {
            match payload {
                ExportPayload::Collection(name) => {
                    out.extend(self.read_collection(&name).await);
                }
                other => out.push(other),
            }
        }
        Ok(out)
    }
}

// ----------------------------------------------------------------------------
// Stage 3: SQL writer
// ----------------------------------------------------------------------------

/// Batches rows per destination table and writes them through the
/// [`RowWriter`] inside parameterized inserts.
pub struct SqlWriteStage {
    export: Arc<Export>,
    writer: Arc<dyn RowWriter>,
    progress: Arc<ExportProgress>,
}

impl SqlWriteStage {
    pub fn new(
        export: Arc<Export>,
        writer: Arc<dyn RowWriter>,
        progress: Arc<ExportProgress>,
    ) -> Self {
        Self {
            export,
            writer,
            progress,
        }
    }
}

#[async_trait]
impl Stage for SqlWriteStage {
    fn identifier(&self) -> &str {
        "full_export_consumer"
    }
}

#[async_trait]
impl Consumer<ExportPayload> for SqlWriteStage {
    async fn consume(&self, payloads: Vec<ExportPayload>) -> anyhow::Result<()> {
        let mut grouped: HashMap<String, Vec<Vec<SqlValue>>> = HashMap::new();
        let mut done = Vec::new();

        for payload in payloads {
            match payload {
                ExportPayload::Row(row) => {
                    grouped.entry(row.collection).or_default().push(row.values)
                }
                ExportPayload::CollectionDone(name) => done.push(name),
                ExportPayload::Collection(name) => {
                    warn!(collection = %name, "unread collection reached the writer");
                }
            }
        }

        let mut first_error = None;
        for (collection, rows) in grouped {
            let Some(schema) = self.export.schema_for_collection(&collection) else {
                warn!(collection = %collection, "no schema mapping at write time, dropping rows");
                continue;
            };
            let count = rows.len();
            match self.writer.write_rows(schema, rows).await {
                Ok(written) => {
                    self.progress.add_rows(written);
                    counter!(
                        "mosql_export_rows_written_total",
                        "namespace" => self.export.namespace.clone(),
                        "collection" => collection.clone()
                    )
                    .increment(written);
                    debug!(collection = %collection, rows = count, "rows written");
                }
                Err(e) => {
                    warn!(collection = %collection, error = %e, "destination write failed");
                    if first_error.is_none() {
                        first_error = Some(anyhow::Error::from(e));
                    }
                }
            }
        }

        for collection in done {
            info!(
                collection = %collection,
                rows_so_far = self.progress.rows_written(),
                "collection export finished"
            );
            self.progress.mark_collection_done(&collection);
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

// ----------------------------------------------------------------------------
// Change-stream producer
// ----------------------------------------------------------------------------

/// Subscribes to the source change feed and turns insert/replace events
/// into destination rows. Other operation kinds are logged and skipped in
/// this version.
pub struct ChangeStreamProducer {
    export: Arc<Export>,
    source: Arc<dyn DocumentSource>,
    stream: Mutex<Option<BoxStream<'static, SourceResult<SourceChange>>>>,
}

impl ChangeStreamProducer {
    pub fn new(export: Arc<Export>, source: Arc<dyn DocumentSource>) -> Self {
        Self {
            export,
            source,
            stream: Mutex::new(None),
        }
    }

    fn change_to_row(&self, change: &SourceChange) -> Option<ExportPayload> {
        match change.operation {
            ChangeOperation::Insert | ChangeOperation::Replace | ChangeOperation::Update => {}
            ref other => {
                debug!(operation = ?other, collection = %change.collection, "change kind skipped");
                return None;
            }
        }

        let Some(schema) = self.export.schema_for_collection(&change.collection) else {
            debug!(collection = %change.collection, "change for unmapped collection, skipping");
            return None;
        };
        let Some(doc) = &change.document else {
            warn!(collection = %change.collection, "change carries no document image, skipping");
            return None;
        };

        let flat = flatten(&change.collection, doc);
        Some(ExportPayload::Row(project_row(schema, &flat)))
    }
}

#[async_trait]
impl Stage for ChangeStreamProducer {
    fn identifier(&self) -> &str {
        "change_stream_producer"
    }

    async fn init(&self) -> anyhow::Result<()> {
        let stream = self.source.change_stream().await?;
        *self.stream.lock().await = Some(stream);
        info!(namespace = %self.export.namespace, "subscribed to source change stream");
        Ok(())
    }
}

#[async_trait]
impl Producer<ExportPayload> for ChangeStreamProducer {
    async fn produce(&self, demand: usize) -> anyhow::Result<Vec<ExportPayload>> {
        let mut guard = self.stream.lock().await;
        let stream = guard
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("change stream not initialized"))?;

        let mut payloads = Vec::new();
        // wait up to the poll window for the first event, then drain
        // whatever else is already buffered, up to the demanded count
        let deadline = tokio::time::Instant::now() + CHANGE_POLL_WINDOW;
        while payloads.len() < demand {
            let next = tokio::time::timeout_at(deadline, stream.next()).await;
            match next {
                Err(_) => break, // window elapsed
                Ok(None) => break,
                Ok(Some(Err(e))) => {
                    warn!(error = %e, "change stream error");
                    break;
                }
                Ok(Some(Ok(change))) => {
                    if let Some(payload) = self.change_to_row(&change) {
                        payloads.push(payload);
                    }
                }
            }
        }

        if payloads.is_empty() {
            // quiet feed; don't spin the demand loop
            tokio::time::sleep(EXHAUSTED_IDLE).await;
        }

        Ok(payloads)
    }
}
