//! Source document-store access for mosql.
//!
//! The [`DocumentSource`] trait is the seam between the mapping engine /
//! export stages and the actual driver. [`MongoDocumentSource`] binds it to a
//! MongoDB deployment; [`MemoryDocumentSource`] is an in-process
//! implementation used by tests and examples.

mod errors;
mod memory;
mod mongo;
mod retry;

use async_trait::async_trait;
use bson::Document;
use futures::stream::BoxStream;

pub use errors::{SourceError, SourceResult};
pub use memory::MemoryDocumentSource;
pub use mongo::MongoDocumentSource;
pub use retry::{retry_connect, RetryPolicy};

/// One entry of a source change feed.
#[derive(Debug, Clone)]
pub struct SourceChange {
    pub collection: String,
    pub operation: ChangeOperation,
    /// Full document image, when the operation carries one.
    pub document: Option<Document>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeOperation {
    Insert,
    Update,
    Replace,
    Delete,
    Other(String),
}

/// Read-side operations mosql needs from a schemaless document store.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// All collection names visible in the source database.
    async fn collection_names(&self) -> SourceResult<Vec<String>>;

    /// One sample document from a collection, implementation-defined pick.
    async fn sample_document(&self, collection: &str) -> SourceResult<Option<Document>>;

    /// A window of documents from an unfiltered scan of `collection`.
    async fn read_batch(
        &self,
        collection: &str,
        skip: u64,
        limit: i64,
    ) -> SourceResult<Vec<Document>>;

    /// Subscribe to the database-wide change feed.
    async fn change_stream(&self)
        -> SourceResult<BoxStream<'static, SourceResult<SourceChange>>>;
}
