//! Stage worker loops.
//!
//! Every wait site enumerates its alternatives: a worker suspends only on
//! its input queue, the demand queue, the done token, or a per-message
//! timer, so closing the done token unparks every worker by its next select
//! point. No loop performs blocking I/O outside a select.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tokio::sync::{mpsc, Mutex};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::stage::{
    next_message_id, Consumer, Message, Producer, ProducerConsumer, DEFAULT_DEMAND_COUNT,
};

/// Competitive multi-worker end of a queue: every worker of every subscriber
/// pulls from the same receiver.
pub(crate) type SharedReceiver<T> = Arc<Mutex<mpsc::Receiver<T>>>;

pub(crate) async fn recv_shared<T>(rx: &SharedReceiver<T>) -> Option<T> {
    rx.lock().await.recv().await
}

pub(crate) struct WorkerCtx {
    pub pipeline: String,
    pub stage: String,
    pub worker: usize,
    pub cancel: CancellationToken,
    pub ack_timeout: Duration,
}

/// Producer loop: park on demand, produce, emit one message, then wait for
/// its ack (or time out) before taking the next demand.
pub(crate) async fn run_producer<P: Send + 'static>(
    ctx: WorkerCtx,
    producer: Arc<dyn Producer<P>>,
    demand: SharedReceiver<usize>,
    out: mpsc::Sender<Message<P>>,
) {
    debug!(pipeline = %ctx.pipeline, stage = %ctx.stage, worker = ctx.worker, "producer worker started");

    loop {
        let demand_count = tokio::select! {
            _ = ctx.cancel.cancelled() => break,
            n = recv_shared(&demand) => match n {
                Some(n) => n,
                None => break,
            },
        };
        debug!(stage = %ctx.stage, demand = demand_count, "demand received");

        let payloads = match producer.produce(demand_count).await {
            Ok(payloads) => payloads,
            Err(e) => {
                warn!(stage = %ctx.stage, error = %e, "produce failed, waiting for next demand");
                counter!(
                    "mosql_pipeline_stage_errors_total",
                    "pipeline" => ctx.pipeline.clone(),
                    "stage" => ctx.stage.clone()
                )
                .increment(1);
                continue;
            }
        };

        let (ack_tx, mut ack_rx) = mpsc::channel::<String>(1);
        let message = Message {
            id: next_message_id(),
            payloads,
            ack: ack_tx,
        };
        let message_id = message.id.clone();

        tokio::select! {
            _ = ctx.cancel.cancelled() => break,
            sent = out.send(message) => {
                if sent.is_err() {
                    // all subscribers gone
                    break;
                }
            }
        }
        counter!(
            "mosql_pipeline_messages_total",
            "pipeline" => ctx.pipeline.clone(),
            "stage" => ctx.stage.clone()
        )
        .increment(1);

        tokio::select! {
            _ = ctx.cancel.cancelled() => break,
            ack = ack_rx.recv() => {
                if let Some(id) = ack {
                    debug!(stage = %ctx.stage, message_id = %id, "message acknowledged");
                }
            }
            _ = sleep(ctx.ack_timeout) => {
                warn!(stage = %ctx.stage, message_id = %message_id, "acknowledgement timed out");
                counter!(
                    "mosql_pipeline_ack_timeouts_total",
                    "pipeline" => ctx.pipeline.clone(),
                    "stage" => ctx.stage.clone()
                )
                .increment(1);
            }
        }
    }

    debug!(pipeline = %ctx.pipeline, stage = %ctx.stage, worker = ctx.worker, "producer worker exiting");
}

/// Producer-consumer loop: pull a message, transform its payloads, forward
/// under demand. The forwarded message keeps the inbound id and ack channel;
/// if no demand arrives within the timeout the worker self-acknowledges and
/// drops the message.
///
/// Demand flows upstream *through* the stage: the worker posts one initial
/// demand when it starts and re-posts each demand count it consumes after
/// forwarding, so the token it takes off the channel is given back for the
/// producer. Without this, every message through an intermediate stage would
/// retire a demand token the terminal consumer never regenerates.
pub(crate) async fn run_producer_consumer<P: Send + 'static>(
    ctx: WorkerCtx,
    stage: Arc<dyn ProducerConsumer<P>>,
    input: SharedReceiver<Message<P>>,
    demand: SharedReceiver<usize>,
    demand_tx: mpsc::Sender<usize>,
    out: mpsc::Sender<Message<P>>,
) {
    debug!(pipeline = %ctx.pipeline, stage = %ctx.stage, worker = ctx.worker, "producer-consumer worker started");

    tokio::select! {
        _ = ctx.cancel.cancelled() => return,
        _ = demand_tx.send(DEFAULT_DEMAND_COUNT) => {}
    }

    loop {
        let message = tokio::select! {
            _ = ctx.cancel.cancelled() => break,
            m = recv_shared(&input) => match m {
                Some(m) => m,
                None => break,
            },
        };

        let Message { id, payloads, ack } = message;
        let processed = match stage.process(payloads).await {
            Ok(processed) => processed,
            Err(e) => {
                // forward the (now empty) message so the ack path stays alive
                warn!(stage = %ctx.stage, message_id = %id, error = %e, "process failed");
                counter!(
                    "mosql_pipeline_stage_errors_total",
                    "pipeline" => ctx.pipeline.clone(),
                    "stage" => ctx.stage.clone()
                )
                .increment(1);
                Vec::new()
            }
        };

        let forwarded = Message {
            id: id.clone(),
            payloads: processed,
            ack: ack.clone(),
        };

        tokio::select! {
            _ = ctx.cancel.cancelled() => break,
            d = recv_shared(&demand) => {
                let Some(taken) = d else { break };
                tokio::select! {
                    _ = ctx.cancel.cancelled() => break,
                    sent = out.send(forwarded) => {
                        if sent.is_err() {
                            break;
                        }
                    }
                }
                // hand the consumed demand token back to the producers
                tokio::select! {
                    _ = ctx.cancel.cancelled() => break,
                    _ = demand_tx.send(taken) => {}
                }
            }
            _ = sleep(ctx.ack_timeout) => {
                // no downstream demand: drop and self-ack so the producer
                // does not stall on this message
                warn!(stage = %ctx.stage, message_id = %id, "no demand, dropping message");
                let _ = ack.try_send(id);
            }
        }
    }

    debug!(pipeline = %ctx.pipeline, stage = %ctx.stage, worker = ctx.worker, "producer-consumer worker exiting");
}

/// Consumer loop: pull, consume, acknowledge, re-demand. A consume error is
/// logged but the message is still acknowledged so the pipeline never
/// stalls on a poisoned batch.
pub(crate) async fn run_consumer<P: Send + 'static>(
    ctx: WorkerCtx,
    consumer: Arc<dyn Consumer<P>>,
    input: SharedReceiver<Message<P>>,
    demand: mpsc::Sender<usize>,
) {
    debug!(pipeline = %ctx.pipeline, stage = %ctx.stage, worker = ctx.worker, "consumer worker started");

    // initial demand unparks the producers
    tokio::select! {
        _ = ctx.cancel.cancelled() => return,
        _ = demand.send(DEFAULT_DEMAND_COUNT) => {}
    }

    loop {
        let message = tokio::select! {
            _ = ctx.cancel.cancelled() => break,
            m = recv_shared(&input) => match m {
                Some(m) => m,
                None => break,
            },
        };

        if let Err(e) = consumer.consume(message.payloads).await {
            warn!(stage = %ctx.stage, message_id = %message.id, error = %e, "consume failed");
            counter!(
                "mosql_pipeline_stage_errors_total",
                "pipeline" => ctx.pipeline.clone(),
                "stage" => ctx.stage.clone()
            )
            .increment(1);
        }
        counter!(
            "mosql_pipeline_messages_total",
            "pipeline" => ctx.pipeline.clone(),
            "stage" => ctx.stage.clone()
        )
        .increment(1);

        debug!(stage = %ctx.stage, message_id = %message.id, "acknowledging and demanding more");
        let _ = message.ack.try_send(message.id);

        tokio::select! {
            _ = ctx.cancel.cancelled() => break,
            _ = demand.send(DEFAULT_DEMAND_COUNT) => {}
        }
    }

    debug!(pipeline = %ctx.pipeline, stage = %ctx.stage, worker = ctx.worker, "consumer worker exiting");
}
