//! Export orchestration: the operations behind the `mosql export` commands
//! and the concrete pipeline stages that move documents into the
//! destination.

pub mod ops;
mod progress;
mod runner;
mod stages;

pub use ops::{
    delete_export, generate_mappings, initialize_export, list_exports, load_mappings,
    show_export, start_export, ExportType, InitData,
};
pub use progress::ExportProgress;
pub use runner::{
    build_change_stream_pipeline, build_full_export_pipeline, run_change_stream_export,
    run_full_export, CHANGE_PRODUCER_ID, READ_STAGE_ID, SEGMENT_PRODUCER_ID, WRITE_CONSUMER_ID,
};
pub use stages::{
    project_row, ChangeStreamProducer, CollectionSegmentProducer, DocumentReadStage,
    ExportPayload, SqlWriteStage, TableRow,
};
