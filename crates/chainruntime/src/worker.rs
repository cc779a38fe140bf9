use crate::dispatcher::Dispatcher;
use crate::registry::SubscriptionRegistry;
use crate::tracker::CompletionTracker;
use chaincore::{
    ChainError, ChainNode, CodecError, Envelope, EventBus, NodeFailure, RunEmitter, RunEvent,
    RunId, INPUT_SOURCE, QUEUE_CAPACITY,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

type SinkDecoder = Box<dyn Fn(&Envelope) -> Result<serde_json::Value, CodecError> + Send + Sync>;

/// Orchestrates one run of the subscription graph: seeds the input
/// envelopes, starts every node task, runs the dispatcher and the result
/// collector, and blocks the caller until quiescence or cancellation.
pub struct Worker {
    registry: SubscriptionRegistry,
    seeds: Vec<Envelope>,
    seed_failures: Vec<NodeFailure>,
    sinks: HashMap<String, SinkDecoder>,
    event_bus: Arc<EventBus>,
    config: WorkerConfig,
}

/// Worker configuration
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Capacity of the run-event broadcast channel.
    pub event_buffer_size: usize,
    /// What to do with seed values that fail to encode.
    pub seed_policy: SeedPolicy,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            event_buffer_size: 1000,
            seed_policy: SeedPolicy::LogAndSkip,
        }
    }
}

/// Policy for seed values that cannot be encoded. Unlike node encode
/// failures, seed failures happen before the run starts, so recording them
/// in the error list is optional.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedPolicy {
    /// Log the failure and drop the value (default).
    LogAndSkip,
    /// Log the failure and also record it in the run's error list.
    Record,
}

/// Final state of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Every value introduced into the graph was fully processed.
    Quiescent,
    /// The cancellation signal fired; partial results were collected.
    Cancelled,
}

/// One decoded value captured from a designated sink
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SinkOutput {
    pub producer: String,
    pub value: serde_json::Value,
}

/// Outcome of a worker run
#[derive(Debug)]
pub struct RunReport {
    pub run_id: RunId,
    pub state: RunState,
    /// Decoded sink outputs in arrival order, not input order.
    pub results: Vec<SinkOutput>,
    /// Per-delivery failures; none of them aborted the run.
    pub errors: Vec<NodeFailure>,
    pub duration: Duration,
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("subscription graph contains a cycle through node {0}")]
    CyclicTopology(String),
}

impl Worker {
    /// Create a worker seeded with `initial` values, encoded under the
    /// reserved producer name [`INPUT_SOURCE`].
    pub fn new<T: Serialize>(initial: &[T]) -> Self {
        Self::with_config(initial, WorkerConfig::default())
    }

    pub fn with_config<T: Serialize>(initial: &[T], config: WorkerConfig) -> Self {
        let mut seeds = Vec::with_capacity(initial.len());
        let mut seed_failures = Vec::new();
        for value in initial {
            match Envelope::encode(INPUT_SOURCE, true, value) {
                Ok(envelope) => seeds.push(envelope),
                Err(e) => {
                    tracing::warn!(error = %e, "skipping unencodable seed value");
                    if config.seed_policy == SeedPolicy::Record {
                        seed_failures.push(NodeFailure::new(INPUT_SOURCE, ChainError::Encode(e)));
                    }
                }
            }
        }
        Self {
            registry: SubscriptionRegistry::new(),
            seeds,
            seed_failures,
            sinks: HashMap::new(),
            event_bus: Arc::new(EventBus::new(config.event_buffer_size)),
            config,
        }
    }

    /// Register nodes as consumers of `producer`'s output. Subscribing to
    /// [`INPUT_SOURCE`] wires the seed batch.
    pub fn subscribe(
        &mut self,
        producer: impl Into<String>,
        nodes: impl IntoIterator<Item = Arc<dyn ChainNode>>,
    ) {
        self.registry.subscribe(producer, nodes);
    }

    /// Designate `name` as a result sink whose envelopes decode as `T`.
    /// Repeated calls accumulate sinks; a later call for the same name
    /// replaces its expected type.
    pub fn set_output<T>(&mut self, name: impl Into<String>)
    where
        T: DeserializeOwned + Serialize + 'static,
    {
        self.sinks.insert(
            name.into(),
            Box::new(|envelope: &Envelope| {
                let value: T = envelope.decode()?;
                serde_json::to_value(&value).map_err(|e| CodecError::Unencodable(e.to_string()))
            }),
        );
    }

    /// Subscribe to the run-event stream.
    pub fn subscribe_events(&self) -> broadcast::Receiver<RunEvent> {
        self.event_bus.subscribe()
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    /// Run the graph to quiescence, or until `shutdown` fires.
    ///
    /// Errors never abort the run; they are collected in the report. The
    /// only early exits are the cancellation signal and a cyclic topology,
    /// which is rejected before anything starts.
    pub async fn run(self, shutdown: CancellationToken) -> Result<RunReport, WorkerError> {
        if let Some(node) = self.registry.find_cycle() {
            return Err(WorkerError::CyclicTopology(node));
        }

        let run_id = RunId::new_v4();
        let started = Instant::now();
        let emitter = self.event_bus.emitter(run_id);
        tracing::info!(
            %run_id,
            nodes = self.registry.len(),
            seeds = self.seeds.len(),
            sinks = self.sinks.len(),
            "starting run",
        );
        emitter.run_started(self.seeds.len());

        let registry = Arc::new(self.registry);
        let tracker = Arc::new(CompletionTracker::new());
        let tasks_token = shutdown.child_token();

        // One concurrent task per node.
        let mut tasks = Vec::new();
        for node in registry.nodes() {
            emitter.node_started(node.name());
            let node = Arc::clone(node);
            let token = tasks_token.clone();
            tasks.push(tokio::spawn(async move { node.run(token).await }));
        }

        // Two forwarding tasks per node drain its output and error queues.
        let (results_tx, results_rx) = mpsc::channel(QUEUE_CAPACITY);
        let (failures_tx, failures_rx) = mpsc::channel(QUEUE_CAPACITY);
        let dispatcher = Arc::new(Dispatcher {
            registry: Arc::clone(&registry),
            sinks: self.sinks.keys().cloned().collect(),
            tracker: Arc::clone(&tracker),
            results_tx,
            failures_tx,
            emitter: emitter.clone(),
            shutdown: tasks_token.clone(),
        });
        for node in registry.nodes() {
            tasks.extend(dispatcher.spawn(node));
        }

        let results = Arc::new(Mutex::new(Vec::new()));
        let errors = Arc::new(Mutex::new(self.seed_failures));
        let collector = Collector {
            sinks: self.sinks,
            tracker: Arc::clone(&tracker),
            results: Arc::clone(&results),
            errors: Arc::clone(&errors),
            emitter: emitter.clone(),
            shutdown: tasks_token.clone(),
        };
        tasks.push(tokio::spawn(collector.collect(results_rx, failures_rx)));

        // Seed the graph. Every delivery to an INPUT_SOURCE subscriber is
        // tracked; with no subscribers the batch evaporates and the run is
        // quiescent immediately.
        for envelope in &self.seeds {
            dispatcher.fan_out(envelope).await;
        }

        let state = tokio::select! {
            _ = tracker.quiescent() => RunState::Quiescent,
            _ = shutdown.cancelled() => RunState::Cancelled,
        };

        // Stop every task; on cancellation in-flight envelopes are dropped
        // and the tracker's final value is meaningless.
        tasks_token.cancel();
        futures::future::join_all(tasks).await;

        let results = std::mem::take(&mut *results.lock().expect("results poisoned"));
        let errors = std::mem::take(&mut *errors.lock().expect("errors poisoned"));
        let duration = started.elapsed();
        emitter.run_finished(
            state == RunState::Cancelled,
            results.len(),
            errors.len(),
            duration.as_millis() as u64,
        );
        tracing::info!(%run_id, ?state, results = results.len(), errors = errors.len(), "run finished");

        Ok(RunReport {
            run_id,
            state,
            results,
            errors,
            duration,
        })
    }
}

/// Accumulates sink outputs and node failures, settling the tracker for
/// every terminal envelope and every error it accounts for.
struct Collector {
    sinks: HashMap<String, SinkDecoder>,
    tracker: Arc<CompletionTracker>,
    results: Arc<Mutex<Vec<SinkOutput>>>,
    errors: Arc<Mutex<Vec<NodeFailure>>>,
    emitter: RunEmitter,
    shutdown: CancellationToken,
}

impl Collector {
    async fn collect(
        self,
        mut results_rx: mpsc::Receiver<Envelope>,
        mut failures_rx: mpsc::Receiver<NodeFailure>,
    ) {
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => return,
                received = results_rx.recv() => match received {
                    None => return,
                    Some(envelope) => self.record_result(envelope),
                },
                received = failures_rx.recv() => match received {
                    None => return,
                    Some(failure) => self.record_failure(failure),
                },
            }
        }
    }

    fn record_result(&self, envelope: Envelope) {
        if let Some(decode) = self.sinks.get(&envelope.producer) {
            match decode(&envelope) {
                Ok(value) => {
                    self.emitter.result_collected(&envelope.producer);
                    self.results
                        .lock()
                        .expect("results poisoned")
                        .push(SinkOutput {
                            producer: envelope.producer.clone(),
                            value,
                        });
                }
                Err(e) => {
                    let failure =
                        NodeFailure::new(&envelope.producer, ChainError::Decode(e));
                    tracing::error!(error = %failure, "sink decode failed");
                    self.emitter.node_failed(&failure.node, &failure.error);
                    self.errors.lock().expect("errors poisoned").push(failure);
                }
            }
        }
        // Decode failures still end the lineage of a terminal envelope.
        if envelope.terminal {
            self.tracker.settle();
        }
    }

    fn record_failure(&self, failure: NodeFailure) {
        self.emitter.node_failed(&failure.node, &failure.error);
        self.errors.lock().expect("errors poisoned").push(failure);
        // An error always terminates the lineage of the delivery that
        // caused it.
        self.tracker.settle();
    }
}
