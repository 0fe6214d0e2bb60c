//! Pipeline assembly and execution for the two export types.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use mosql_core::Export;
use mosql_pipeline::{Pipeline, StageConfig, StageKind};
use mosql_source::DocumentSource;
use mosql_sql::RowWriter;

use crate::progress::ExportProgress;
use crate::stages::{
    ChangeStreamProducer, CollectionSegmentProducer, DocumentReadStage, ExportPayload,
    SqlWriteStage,
};

pub const SEGMENT_PRODUCER_ID: &str = "producer_stage_1_segment_collections";
pub const READ_STAGE_ID: &str = "producer_consumer_stage_2_read_collection";
pub const WRITE_CONSUMER_ID: &str = "consumer_stage_3_insert_sql";
pub const CHANGE_PRODUCER_ID: &str = "producer_stage_1_change_stream";

/// Wire the three full-export stages into a pipeline named after the
/// export's namespace.
pub fn build_full_export_pipeline(
    export: Arc<Export>,
    source: Arc<dyn DocumentSource>,
    writer: Arc<dyn RowWriter>,
    collections: Vec<String>,
    progress: Arc<ExportProgress>,
) -> Result<Pipeline<ExportPayload>> {
    let mut pipeline = Pipeline::new(export.namespace.clone());

    pipeline.add_stage(
        StageKind::Producer(Arc::new(CollectionSegmentProducer::new(collections))),
        StageConfig::producer(SEGMENT_PRODUCER_ID),
    )?;
    pipeline.add_stage(
        StageKind::ProducerConsumer(Arc::new(DocumentReadStage::new(
            export.clone(),
            source,
        ))),
        StageConfig::producer_consumer(READ_STAGE_ID, vec![SEGMENT_PRODUCER_ID.into()]),
    )?;
    pipeline.add_stage(
        StageKind::Consumer(Arc::new(SqlWriteStage::new(export, writer, progress))),
        StageConfig::consumer(WRITE_CONSUMER_ID, vec![READ_STAGE_ID.into()]),
    )?;

    Ok(pipeline)
}

/// Wire the change-stream topology: the feed producer straight into the SQL
/// writer.
pub fn build_change_stream_pipeline(
    export: Arc<Export>,
    source: Arc<dyn DocumentSource>,
    writer: Arc<dyn RowWriter>,
    progress: Arc<ExportProgress>,
) -> Result<Pipeline<ExportPayload>> {
    let mut pipeline = Pipeline::new(export.namespace.clone());

    pipeline.add_stage(
        StageKind::Producer(Arc::new(ChangeStreamProducer::new(
            export.clone(),
            source,
        ))),
        StageConfig::producer(CHANGE_PRODUCER_ID),
    )?;
    pipeline.add_stage(
        StageKind::Consumer(Arc::new(SqlWriteStage::new(export, writer, progress))),
        StageConfig::consumer(WRITE_CONSUMER_ID, vec![CHANGE_PRODUCER_ID.into()]),
    )?;

    Ok(pipeline)
}

/// Run a full export to completion: start the pipeline, wait until every
/// collection reports done (or the shutdown token fires), then stop.
pub async fn run_full_export(
    mut pipeline: Pipeline<ExportPayload>,
    progress: Arc<ExportProgress>,
    shutdown: CancellationToken,
) -> Result<u64> {
    pipeline.start().await.context("start export pipeline")?;

    tokio::select! {
        _ = progress.wait_complete() => {
            info!(
                collections = progress.completed_collections(),
                rows = progress.rows_written(),
                "full export complete"
            );
        }
        _ = shutdown.cancelled() => {
            warn!("shutdown requested before export completed");
        }
    }

    pipeline.stop().await;
    Ok(progress.rows_written())
}

/// Run a change-stream export until the shutdown token fires.
pub async fn run_change_stream_export(
    mut pipeline: Pipeline<ExportPayload>,
    progress: Arc<ExportProgress>,
    shutdown: CancellationToken,
) -> Result<u64> {
    pipeline.start().await.context("start change-stream pipeline")?;

    shutdown.cancelled().await;
    info!(rows = progress.rows_written(), "stopping change-stream export");

    pipeline.stop().await;
    Ok(progress.rows_written())
}
