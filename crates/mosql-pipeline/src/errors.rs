use thiserror::Error;

use crate::stage::StageType;

/// Structural rejections raised at registration or start time. Runtime
/// produce/process/consume failures are never surfaced here; they are logged
/// and the worker continues.
#[derive(Debug, Error)]
pub enum TopologyError {
    #[error("'{identifier}' already exists")]
    DuplicateIdentifier { identifier: String },

    #[error("'{identifier}' declared {declared} but registered as {actual}")]
    RoleMismatch {
        identifier: String,
        declared: StageType,
        actual: StageType,
    },

    #[error("'{identifier}' not subscribed to any producer")]
    MissingSubscription { identifier: String },

    #[error("producer '{identifier}' must not subscribe to an upstream")]
    ProducerWithSubscription { identifier: String },

    #[error("'{identifier}' subscribed to unknown stage '{upstream}'")]
    UnknownUpstream {
        identifier: String,
        upstream: String,
    },

    #[error("'{identifier}' subscribed to '{upstream}', which produces nothing")]
    UpstreamNotAProducer {
        identifier: String,
        upstream: String,
    },

    #[error("subscription cycle through '{identifier}'")]
    Cycle { identifier: String },
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Topology(#[from] TopologyError),

    #[error("stage '{identifier}' failed to initialize: {source}")]
    InitFailed {
        identifier: String,
        source: anyhow::Error,
    },

    #[error("pipeline already started")]
    AlreadyStarted,

    #[error("stages can only be added before start")]
    NotBuildable,
}
