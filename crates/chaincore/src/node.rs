use crate::envelope::Envelope;
use crate::error::NodeFailure;
use async_trait::async_trait;
use std::sync::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Capacity of every node-owned queue. Small on purpose: full queues apply
/// backpressure to fast producers.
pub const QUEUE_CAPACITY: usize = 8;

/// Core trait implemented by both node strategies.
///
/// A `ChainNode` is one named concurrent processing unit. It owns three
/// bounded queues: an input queue written by the seeder and the dispatcher
/// and read only by the node's own task, and output/error queues written
/// only by the node and drained by the dispatcher's forwarding tasks.
#[async_trait]
pub trait ChainNode: Send + Sync {
    /// Stable name, unique within one worker. Used as the registry lookup
    /// key and stamped as `producer` on every output envelope.
    fn name(&self) -> &str;

    /// Clonable sender for this node's input queue.
    fn input(&self) -> mpsc::Sender<Envelope>;

    /// Hand the output queue receiver to the dispatcher. Yields `Some` only
    /// on the first call.
    fn take_output(&self) -> Option<mpsc::Receiver<Envelope>>;

    /// Hand the error queue receiver to the dispatcher. Yields `Some` only
    /// on the first call.
    fn take_errors(&self) -> Option<mpsc::Receiver<NodeFailure>>;

    /// Process deliveries until the input queue closes or the token fires.
    async fn run(&self, shutdown: CancellationToken);
}

/// The three queues every node owns, with take-once receivers.
pub(crate) struct NodeQueues {
    input_tx: mpsc::Sender<Envelope>,
    input_rx: Mutex<Option<mpsc::Receiver<Envelope>>>,
    output_tx: mpsc::Sender<Envelope>,
    output_rx: Mutex<Option<mpsc::Receiver<Envelope>>>,
    error_tx: mpsc::Sender<NodeFailure>,
    error_rx: Mutex<Option<mpsc::Receiver<NodeFailure>>>,
}

impl NodeQueues {
    pub(crate) fn new(capacity: usize) -> Self {
        let (input_tx, input_rx) = mpsc::channel(capacity);
        let (output_tx, output_rx) = mpsc::channel(capacity);
        let (error_tx, error_rx) = mpsc::channel(capacity);
        Self {
            input_tx,
            input_rx: Mutex::new(Some(input_rx)),
            output_tx,
            output_rx: Mutex::new(Some(output_rx)),
            error_tx,
            error_rx: Mutex::new(Some(error_rx)),
        }
    }

    pub(crate) fn input(&self) -> mpsc::Sender<Envelope> {
        self.input_tx.clone()
    }

    pub(crate) fn take_input(&self) -> Option<mpsc::Receiver<Envelope>> {
        self.input_rx.lock().expect("input receiver poisoned").take()
    }

    pub(crate) fn take_output(&self) -> Option<mpsc::Receiver<Envelope>> {
        self.output_rx
            .lock()
            .expect("output receiver poisoned")
            .take()
    }

    pub(crate) fn take_errors(&self) -> Option<mpsc::Receiver<NodeFailure>> {
        self.error_rx.lock().expect("error receiver poisoned").take()
    }

    /// Send on the output queue, observing backpressure and cancellation.
    /// Returns false when the node task should stop.
    pub(crate) async fn emit(&self, envelope: Envelope, shutdown: &CancellationToken) -> bool {
        tokio::select! {
            _ = shutdown.cancelled() => false,
            sent = self.output_tx.send(envelope) => sent.is_ok(),
        }
    }

    /// Send on the error queue, observing backpressure and cancellation.
    /// Returns false when the node task should stop.
    pub(crate) async fn fail(&self, failure: NodeFailure, shutdown: &CancellationToken) -> bool {
        tracing::error!(node = %failure.node, error = %failure.error, "delivery failed");
        tokio::select! {
            _ = shutdown.cancelled() => false,
            sent = self.error_tx.send(failure) => sent.is_ok(),
        }
    }
}
