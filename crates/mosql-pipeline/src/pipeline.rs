//! Pipeline assembly, validation, start and stop.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::{PipelineError, TopologyError};
use crate::stage::{Message, StageConfig, StageKind, StageType};
use crate::worker::{
    run_consumer, run_producer, run_producer_consumer, SharedReceiver, WorkerCtx,
};

const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PipelineState {
    Built,
    Started,
    Stopping,
    Stopped,
}

struct RegisteredStage<P> {
    kind: StageKind<P>,
    config: StageConfig,
}

/// A staged data pipeline: a DAG of producer / producer-consumer / consumer
/// stages linked by subscriptions, with per-stage worker pools, bounded
/// queues between stages, pull-based demand and per-message acknowledgement.
///
/// Lifecycle: `built -> started -> stopping -> stopped`. Stages are added
/// only while built; `start` freezes the topology; there is no restart.
pub struct Pipeline<P> {
    name: String,
    state: PipelineState,
    stages: Vec<RegisteredStage<P>>,
    index: HashMap<String, usize>,
    cancel: CancellationToken,
    ack_timeout: Duration,
    stop_grace: Duration,
    workers: Vec<JoinHandle<()>>,
}

impl<P: Send + 'static> Pipeline<P> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: PipelineState::Built,
            stages: Vec::new(),
            index: HashMap::new(),
            cancel: CancellationToken::new(),
            ack_timeout: DEFAULT_ACK_TIMEOUT,
            stop_grace: DEFAULT_STOP_GRACE,
            workers: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Override the per-message acknowledgement timeout (default 10 s).
    pub fn with_ack_timeout(mut self, timeout: Duration) -> Self {
        self.ack_timeout = timeout;
        self
    }

    /// Override the stop grace interval (default 5 s).
    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }

    /// Register a stage. Rejected if the pipeline already started, the
    /// identifier is taken, the declared role does not match the registered
    /// capability, or the subscription list is wrong for the role.
    pub fn add_stage(
        &mut self,
        kind: StageKind<P>,
        config: StageConfig,
    ) -> Result<(), PipelineError> {
        if self.state != PipelineState::Built {
            return Err(PipelineError::NotBuildable);
        }

        if config.stage_type != kind.stage_type() {
            return Err(TopologyError::RoleMismatch {
                identifier: config.identifier.clone(),
                declared: config.stage_type,
                actual: kind.stage_type(),
            }
            .into());
        }

        match config.stage_type {
            StageType::Producer => {
                if !config.subscribed_to.is_empty() {
                    return Err(TopologyError::ProducerWithSubscription {
                        identifier: config.identifier.clone(),
                    }
                    .into());
                }
            }
            StageType::ProducerConsumer | StageType::Consumer => {
                if config.subscribed_to.is_empty() {
                    return Err(TopologyError::MissingSubscription {
                        identifier: config.identifier.clone(),
                    }
                    .into());
                }
            }
        }

        if self.index.contains_key(&config.identifier) {
            return Err(TopologyError::DuplicateIdentifier {
                identifier: config.identifier.clone(),
            }
            .into());
        }

        debug!(
            pipeline = %self.name,
            stage = %config.identifier,
            stage_type = %config.stage_type,
            workers = config.effective_workers(),
            buffer = config.effective_buffer(),
            "stage registered"
        );
        self.index
            .insert(config.identifier.clone(), self.stages.len());
        self.stages.push(RegisteredStage { kind, config });
        Ok(())
    }

    /// Validate the topology, initialize every stage, and spawn the worker
    /// pools. Fails on structural errors only; runtime stage failures are
    /// logged by the workers and never propagate here.
    pub async fn start(&mut self) -> Result<(), PipelineError> {
        match self.state {
            PipelineState::Built => {}
            _ => return Err(PipelineError::AlreadyStarted),
        }

        self.validate_subscriptions()?;

        for stage in &self.stages {
            stage.kind.init().await.map_err(|source| {
                PipelineError::InitFailed {
                    identifier: stage.config.identifier.clone(),
                    source,
                }
            })?;
        }

        info!(pipeline = %self.name, stages = self.stages.len(), "pipeline starting");

        // pipeline-wide demand signal; producers share the receiving end
        let (demand_tx, demand_rx) = mpsc::channel::<usize>(1);
        let demand_rx: SharedReceiver<usize> = Arc::new(Mutex::new(demand_rx));

        // one bounded output queue per producing stage
        let mut out_txs: HashMap<String, mpsc::Sender<Message<P>>> = HashMap::new();
        let mut out_rxs: HashMap<String, SharedReceiver<Message<P>>> = HashMap::new();
        for stage in &self.stages {
            if stage.kind.stage_type() != StageType::Consumer {
                let (tx, rx) = mpsc::channel::<Message<P>>(stage.config.effective_buffer());
                out_txs.insert(stage.config.identifier.clone(), tx);
                out_rxs.insert(
                    stage.config.identifier.clone(),
                    Arc::new(Mutex::new(rx)),
                );
            }
        }

        let mut spawned = Vec::new();
        for stage in &self.stages {
            let config = &stage.config;
            let workers = config.effective_workers();

            match &stage.kind {
                StageKind::Producer(producer) => {
                    let out = out_txs[&config.identifier].clone();
                    for worker in 0..workers {
                        spawned.push(tokio::spawn(run_producer(
                            self.worker_ctx(&config.identifier, worker),
                            producer.clone(),
                            demand_rx.clone(),
                            out.clone(),
                        )));
                    }
                }
                StageKind::ProducerConsumer(pc) => {
                    let out = out_txs[&config.identifier].clone();
                    for upstream in &config.subscribed_to {
                        let input = out_rxs[upstream].clone();
                        for worker in 0..workers {
                            spawned.push(tokio::spawn(run_producer_consumer(
                                self.worker_ctx(&config.identifier, worker),
                                pc.clone(),
                                input.clone(),
                                demand_rx.clone(),
                                demand_tx.clone(),
                                out.clone(),
                            )));
                        }
                    }
                }
                StageKind::Consumer(consumer) => {
                    for upstream in &config.subscribed_to {
                        let input = out_rxs[upstream].clone();
                        for worker in 0..workers {
                            spawned.push(tokio::spawn(run_consumer(
                                self.worker_ctx(&config.identifier, worker),
                                consumer.clone(),
                                input.clone(),
                                demand_tx.clone(),
                            )));
                        }
                    }
                }
            }
        }

        self.workers = spawned;
        self.state = PipelineState::Started;
        info!(pipeline = %self.name, workers = self.workers.len(), "pipeline started");
        Ok(())
    }

    /// Signal done and give workers a grace interval to drain. Cancellation
    /// is cooperative; the grace is advisory and the method does not
    /// guarantee every worker has exited when it returns.
    pub async fn stop(&mut self) {
        if self.state != PipelineState::Started {
            warn!(pipeline = %self.name, "stop ignored, pipeline not running");
            return;
        }

        info!(pipeline = %self.name, "sending stop signal to the pipeline");
        self.state = PipelineState::Stopping;
        self.cancel.cancel();

        tokio::time::sleep(self.stop_grace).await;

        for handle in self.workers.drain(..) {
            if !handle.is_finished() {
                warn!(pipeline = %self.name, "worker still running after grace interval");
            }
        }

        self.state = PipelineState::Stopped;
        info!(pipeline = %self.name, "pipeline stopped");
    }

    /// The done token shared by every worker. Exposed so embedders can wire
    /// external shutdown (e.g. ctrl-c) into the same signal.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn worker_ctx(&self, stage: &str, worker: usize) -> WorkerCtx {
        WorkerCtx {
            pipeline: self.name.clone(),
            stage: stage.to_string(),
            worker,
            cancel: self.cancel.clone(),
            ack_timeout: self.ack_timeout,
        }
    }

    fn validate_subscriptions(&self) -> Result<(), TopologyError> {
        for stage in &self.stages {
            for upstream in &stage.config.subscribed_to {
                let Some(&up_idx) = self.index.get(upstream) else {
                    return Err(TopologyError::UnknownUpstream {
                        identifier: stage.config.identifier.clone(),
                        upstream: upstream.clone(),
                    });
                };
                if self.stages[up_idx].kind.stage_type() == StageType::Consumer {
                    return Err(TopologyError::UpstreamNotAProducer {
                        identifier: stage.config.identifier.clone(),
                        upstream: upstream.clone(),
                    });
                }
            }
        }

        // subscriptions must form a DAG
        let mut visiting = HashSet::new();
        let mut done = HashSet::new();
        for idx in 0..self.stages.len() {
            self.check_cycle(idx, &mut visiting, &mut done)?;
        }
        Ok(())
    }

    fn check_cycle(
        &self,
        idx: usize,
        visiting: &mut HashSet<usize>,
        done: &mut HashSet<usize>,
    ) -> Result<(), TopologyError> {
        if done.contains(&idx) {
            return Ok(());
        }
        if !visiting.insert(idx) {
            return Err(TopologyError::Cycle {
                identifier: self.stages[idx].config.identifier.clone(),
            });
        }
        for upstream in &self.stages[idx].config.subscribed_to {
            if let Some(&up_idx) = self.index.get(upstream) {
                self.check_cycle(up_idx, visiting, done)?;
            }
        }
        visiting.remove(&idx);
        done.insert(idx);
        Ok(())
    }
}
