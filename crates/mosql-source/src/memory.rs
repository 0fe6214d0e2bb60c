//! In-process document source used by tests and demos.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use bson::Document;
use futures::stream::BoxStream;
use futures::StreamExt;

use crate::errors::{SourceError, SourceResult};
use crate::{DocumentSource, SourceChange};

/// A fixed set of collections held in memory. Collections iterate in name
/// order; documents keep insertion order.
#[derive(Default)]
pub struct MemoryDocumentSource {
    collections: BTreeMap<String, Vec<Document>>,
    changes: Mutex<Vec<SourceChange>>,
}

impl MemoryDocumentSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_collection(
        mut self,
        name: impl Into<String>,
        docs: Vec<Document>,
    ) -> Self {
        self.collections.insert(name.into(), docs);
        self
    }

    /// Queue change-feed entries returned by [`DocumentSource::change_stream`].
    pub fn with_changes(self, changes: Vec<SourceChange>) -> Self {
        *self.changes.lock().unwrap() = changes;
        self
    }
}

#[async_trait]
impl DocumentSource for MemoryDocumentSource {
    async fn collection_names(&self) -> SourceResult<Vec<String>> {
        Ok(self.collections.keys().cloned().collect())
    }

    async fn sample_document(&self, collection: &str) -> SourceResult<Option<Document>> {
        let docs = self.collections.get(collection).ok_or_else(|| {
            SourceError::NotFound {
                details: format!("collection '{collection}'").into(),
            }
        })?;
        Ok(docs.first().cloned())
    }

    async fn read_batch(
        &self,
        collection: &str,
        skip: u64,
        limit: i64,
    ) -> SourceResult<Vec<Document>> {
        let docs = self.collections.get(collection).ok_or_else(|| {
            SourceError::NotFound {
                details: format!("collection '{collection}'").into(),
            }
        })?;
        Ok(docs
            .iter()
            .skip(skip as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn change_stream(
        &self,
    ) -> SourceResult<BoxStream<'static, SourceResult<SourceChange>>> {
        let changes: Vec<SourceChange> = std::mem::take(&mut *self.changes.lock().unwrap());
        Ok(futures::stream::iter(changes.into_iter().map(Ok)).boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[tokio::test]
    async fn batches_respect_skip_and_limit() {
        let source = MemoryDocumentSource::new().with_collection(
            "users",
            vec![
                doc! { "n": 1 },
                doc! { "n": 2 },
                doc! { "n": 3 },
            ],
        );

        let batch = source.read_batch("users", 1, 1).await.unwrap();
        assert_eq!(batch, vec![doc! { "n": 2 }]);

        let sample = source.sample_document("users").await.unwrap().unwrap();
        assert_eq!(sample, doc! { "n": 1 });
    }

    #[tokio::test]
    async fn unknown_collection_is_not_found() {
        let source = MemoryDocumentSource::new();
        assert!(matches!(
            source.sample_document("nope").await,
            Err(SourceError::NotFound { .. })
        ));
    }
}
