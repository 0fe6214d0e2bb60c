//! Stage roles, per-stage configuration, and the inter-stage Message.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::mpsc;

/// Demand a consumer worker posts after finishing a message.
pub const DEFAULT_DEMAND_COUNT: usize = 100;

/// Capacity of a stage's output queue when the config leaves it unset.
pub const DEFAULT_BUFFER_LIMIT: usize = 100;

/// The carrier between stages: an id, a batch of payloads, and a single-slot
/// acknowledgement channel that travels with the message so the terminal
/// consumer's ack reaches the originating producer.
///
/// The id is a microsecond timestamp taken at emit time. It hints at
/// emission order but is not a sequence number; downstream must not treat it
/// as a key.
#[derive(Debug)]
pub struct Message<P> {
    pub id: String,
    pub payloads: Vec<P>,
    pub ack: mpsc::Sender<String>,
}

pub(crate) fn next_message_id() -> String {
    Utc::now().timestamp_micros().to_string()
}

/// Common surface of every stage.
#[async_trait]
pub trait Stage: Send + Sync {
    fn identifier(&self) -> &str;

    /// One-time initialization before workers start.
    async fn init(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Synthesizes payloads on demand.
#[async_trait]
pub trait Producer<P>: Stage {
    async fn produce(&self, demand: usize) -> anyhow::Result<Vec<P>>;
}

/// Intermediate stage: consumes from an upstream, produces for a downstream.
#[async_trait]
pub trait ProducerConsumer<P>: Stage {
    async fn process(&self, payloads: Vec<P>) -> anyhow::Result<Vec<P>>;
}

/// Terminal sink.
#[async_trait]
pub trait Consumer<P>: Stage {
    async fn consume(&self, payloads: Vec<P>) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageType {
    Producer,
    ProducerConsumer,
    Consumer,
}

impl StageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Producer => "Producer",
            Self::ProducerConsumer => "ProducerConsumer",
            Self::Consumer => "Consumer",
        }
    }
}

impl std::fmt::Display for StageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A registered stage behind its role-specific capability.
pub enum StageKind<P> {
    Producer(Arc<dyn Producer<P>>),
    ProducerConsumer(Arc<dyn ProducerConsumer<P>>),
    Consumer(Arc<dyn Consumer<P>>),
}

impl<P> StageKind<P> {
    pub fn stage_type(&self) -> StageType {
        match self {
            Self::Producer(_) => StageType::Producer,
            Self::ProducerConsumer(_) => StageType::ProducerConsumer,
            Self::Consumer(_) => StageType::Consumer,
        }
    }

    pub(crate) async fn init(&self) -> anyhow::Result<()> {
        match self {
            Self::Producer(s) => s.init().await,
            Self::ProducerConsumer(s) => s.init().await,
            Self::Consumer(s) => s.init().await,
        }
    }
}

/// Per-stage configuration. `worker_count` and `buffer_limit` fall back to
/// their defaults when left at zero.
#[derive(Debug, Clone)]
pub struct StageConfig {
    pub stage_type: StageType,
    pub identifier: String,
    pub worker_count: usize,
    pub buffer_limit: usize,
    /// Upstream stage identifiers. Required for consumers and
    /// producer-consumers; producers must leave it empty.
    pub subscribed_to: Vec<String>,
}

impl StageConfig {
    pub fn producer(identifier: impl Into<String>) -> Self {
        Self {
            stage_type: StageType::Producer,
            identifier: identifier.into(),
            worker_count: 1,
            buffer_limit: DEFAULT_BUFFER_LIMIT,
            subscribed_to: Vec::new(),
        }
    }

    pub fn producer_consumer(
        identifier: impl Into<String>,
        subscribed_to: Vec<String>,
    ) -> Self {
        Self {
            stage_type: StageType::ProducerConsumer,
            identifier: identifier.into(),
            worker_count: 1,
            buffer_limit: DEFAULT_BUFFER_LIMIT,
            subscribed_to,
        }
    }

    pub fn consumer(identifier: impl Into<String>, subscribed_to: Vec<String>) -> Self {
        Self {
            stage_type: StageType::Consumer,
            identifier: identifier.into(),
            worker_count: 1,
            buffer_limit: DEFAULT_BUFFER_LIMIT,
            subscribed_to,
        }
    }

    pub fn with_workers(mut self, count: usize) -> Self {
        self.worker_count = count;
        self
    }

    pub fn with_buffer_limit(mut self, limit: usize) -> Self {
        self.buffer_limit = limit;
        self
    }

    pub(crate) fn effective_workers(&self) -> usize {
        if self.worker_count == 0 {
            1
        } else {
            self.worker_count
        }
    }

    pub(crate) fn effective_buffer(&self) -> usize {
        if self.buffer_limit == 0 {
            DEFAULT_BUFFER_LIMIT
        } else {
            self.buffer_limit
        }
    }
}
