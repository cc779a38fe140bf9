use crate::registry::SubscriptionRegistry;
use crate::tracker::CompletionTracker;
use chaincore::{ChainNode, Envelope, NodeFailure, RunEmitter};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Concurrent multiplexer over the output and error queues of all nodes.
///
/// Rather than a single task selecting over a runtime-determined set of
/// queues, the dispatcher runs two lightweight forwarding tasks per node:
/// one draining its output queue, one its error queue. Each performs the
/// registry lookup and redelivery directly. Per-producer FIFO follows from
/// each output queue having exactly one forwarding task.
pub(crate) struct Dispatcher {
    pub(crate) registry: Arc<SubscriptionRegistry>,
    pub(crate) sinks: HashSet<String>,
    pub(crate) tracker: Arc<CompletionTracker>,
    pub(crate) results_tx: mpsc::Sender<Envelope>,
    pub(crate) failures_tx: mpsc::Sender<NodeFailure>,
    pub(crate) emitter: RunEmitter,
    pub(crate) shutdown: CancellationToken,
}

impl Dispatcher {
    /// Spawn the forwarding tasks for one node's output and error queues.
    pub(crate) fn spawn(self: &Arc<Self>, node: &Arc<dyn ChainNode>) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::with_capacity(2);
        match node.take_output() {
            Some(output) => {
                let dispatcher = Arc::clone(self);
                handles.push(tokio::spawn(
                    async move { dispatcher.forward_outputs(output).await },
                ));
            }
            None => tracing::warn!(node = node.name(), "output queue already taken"),
        }
        match node.take_errors() {
            Some(errors) => {
                let dispatcher = Arc::clone(self);
                handles.push(tokio::spawn(
                    async move { dispatcher.forward_errors(errors).await },
                ));
            }
            None => tracing::warn!(node = node.name(), "error queue already taken"),
        }
        handles
    }

    async fn forward_outputs(&self, mut output: mpsc::Receiver<Envelope>) {
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => return,
                received = output.recv() => match received {
                    None => return,
                    Some(envelope) => self.route(envelope).await,
                },
            }
        }
    }

    /// Route one output envelope: fan it out to every subscriber, capture it
    /// as a result when its producer is a designated sink, and settle the
    /// tracker when its lineage ends here.
    async fn route(&self, envelope: Envelope) {
        if envelope.is_marker() {
            // Markers carry no value; they exist only to close out the
            // delivery that triggered an empty generator expansion.
            if envelope.terminal {
                self.tracker.settle();
            }
            return;
        }

        self.fan_out(&envelope).await;

        if self.sinks.contains(&envelope.producer) {
            // The collector settles terminal envelopes after recording them.
            tokio::select! {
                _ = self.shutdown.cancelled() => {}
                _ = self.results_tx.send(envelope) => {}
            }
        } else if envelope.terminal {
            self.tracker.settle();
        }
    }

    /// Deliver `envelope` to every subscriber of its producer except the
    /// producer itself. Each delivery is tracked before it is enqueued.
    pub(crate) async fn fan_out(&self, envelope: &Envelope) {
        for subscriber in self.registry.subscribers(&envelope.producer) {
            // Self-subscription is never redelivered: a node feeding its own
            // input queue would loop or deadlock.
            if subscriber.name() == envelope.producer {
                continue;
            }
            self.tracker.track();
            let input = subscriber.input();
            tokio::select! {
                _ = self.shutdown.cancelled() => return,
                sent = input.send(envelope.clone()) => {
                    if sent.is_err() {
                        tracing::warn!(
                            producer = %envelope.producer,
                            consumer = subscriber.name(),
                            "subscriber stopped; delivery dropped",
                        );
                        self.tracker.settle();
                    } else {
                        self.emitter
                            .delivered(&envelope.producer, subscriber.name(), envelope.terminal);
                    }
                }
            }
        }
    }

    async fn forward_errors(&self, mut errors: mpsc::Receiver<NodeFailure>) {
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => return,
                received = errors.recv() => match received {
                    None => return,
                    Some(failure) => {
                        // The collector records the failure and settles the
                        // delivery it terminated.
                        tokio::select! {
                            _ = self.shutdown.cancelled() => return,
                            _ = self.failures_tx.send(failure) => {}
                        }
                    }
                },
            }
        }
    }
}
