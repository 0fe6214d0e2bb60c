//! A minimal staged data pipeline framework.
//!
//! A pipeline is a DAG of stages of three roles:
//!
//! 1. **Producer**: synthesizes payloads on demand.
//! 2. **ProducerConsumer**: intermediate stage that transforms payloads
//!    flowing from a producer to another consumer.
//! 3. **Consumer**: terminal sink.
//!
//! Each stage runs a pool of workers against bounded queues. Back-pressure
//! is pull-based: consumers post integer demand counts upstream, producers
//! park until demand arrives. Every message carries a single-slot
//! acknowledgement channel from its originating producer; the terminal
//! consumer's ack (or a timeout) releases the producer for the next demand.
//! Cancellation is cooperative through one shared done token.

mod errors;
mod pipeline;
mod stage;
mod worker;

pub use errors::{PipelineError, TopologyError};
pub use pipeline::Pipeline;
pub use stage::{
    Consumer, Message, Producer, ProducerConsumer, Stage, StageConfig, StageKind, StageType,
    DEFAULT_BUFFER_LIMIT, DEFAULT_DEMAND_COUNT,
};
