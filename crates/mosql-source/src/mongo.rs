//! MongoDB binding for [`DocumentSource`].

use async_trait::async_trait;
use bson::{doc, Document};
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use mongodb::change_stream::event::{ChangeStreamEvent, OperationType};
use mongodb::{Client, Database};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::errors::{SourceError, SourceResult};
use crate::retry::{retry_connect, RetryPolicy};
use crate::{ChangeOperation, DocumentSource, SourceChange};

pub struct MongoDocumentSource {
    db: Database,
}

impl MongoDocumentSource {
    /// Connect to `uri` and bind to database `db_name`. Connection attempts
    /// are retried with backoff until the policy is exhausted or `cancel`
    /// fires.
    pub async fn connect(
        uri: &str,
        db_name: &str,
        cancel: &CancellationToken,
    ) -> SourceResult<Self> {
        let client = retry_connect(
            || async {
                let client = Client::with_uri_str(uri).await?;
                // cheap round-trip so a bad URI fails here, not on first read
                client
                    .database(db_name)
                    .run_command(doc! { "ping": 1 })
                    .await?;
                Ok(client)
            },
            RetryPolicy::default(),
            cancel,
            "mongo_connect",
        )
        .await?;

        info!(db = db_name, "connected to source document store");
        Ok(Self {
            db: client.database(db_name),
        })
    }
}

#[async_trait]
impl DocumentSource for MongoDocumentSource {
    async fn collection_names(&self) -> SourceResult<Vec<String>> {
        Ok(self.db.list_collection_names().await?)
    }

    async fn sample_document(&self, collection: &str) -> SourceResult<Option<Document>> {
        // the first document of an unfiltered find
        Ok(self
            .db
            .collection::<Document>(collection)
            .find_one(doc! {})
            .await?)
    }

    async fn read_batch(
        &self,
        collection: &str,
        skip: u64,
        limit: i64,
    ) -> SourceResult<Vec<Document>> {
        let mut cursor = self
            .db
            .collection::<Document>(collection)
            .find(doc! {})
            .skip(skip)
            .limit(limit)
            .await?;

        let mut docs = Vec::new();
        while let Some(doc) = cursor.try_next().await? {
            docs.push(doc);
        }
        Ok(docs)
    }

    async fn change_stream(
        &self,
    ) -> SourceResult<BoxStream<'static, SourceResult<SourceChange>>> {
        let stream = self.db.watch().await?;
        Ok(stream
            .map(|item| {
                item.map(to_source_change)
                    .map_err(SourceError::Driver)
            })
            .boxed())
    }
}

fn to_source_change(event: ChangeStreamEvent<Document>) -> SourceChange {
    let collection = event
        .ns
        .as_ref()
        .and_then(|ns| ns.coll.clone())
        .unwrap_or_default();

    let operation = match event.operation_type {
        OperationType::Insert => ChangeOperation::Insert,
        OperationType::Update => ChangeOperation::Update,
        OperationType::Replace => ChangeOperation::Replace,
        OperationType::Delete => ChangeOperation::Delete,
        other => ChangeOperation::Other(format!("{other:?}")),
    };

    SourceChange {
        collection,
        operation,
        document: event.full_document,
    }
}
