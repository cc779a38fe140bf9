use crate::envelope::Envelope;
use crate::error::{ChainError, NodeFailure};
use crate::node::{ChainNode, NodeQueues, QUEUE_CAPACITY};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// One-to-many strategy: a concrete tool expanding one input batch into an
/// ordered, finite sequence of outputs.
///
/// The returned iterator is consumed exactly once; it is never restarted.
pub trait Generate: Send + Sync {
    type Input;
    type Output;

    /// Stable name, unique within one worker.
    fn name(&self) -> &str;

    fn expand(&self, inputs: Vec<Self::Input>) -> Box<dyn Iterator<Item = Self::Output> + Send>;
}

/// Executing node wrapping a [`Generate`] tool.
///
/// One delivery decodes to `Vec<Input>`; one output envelope is emitted per
/// produced element, in order, `terminal = false` except the last.
pub struct GeneratorNode<G: Generate> {
    tool: G,
    queues: NodeQueues,
}

impl<G: Generate> GeneratorNode<G> {
    pub fn new(tool: G) -> Self {
        Self::with_capacity(tool, QUEUE_CAPACITY)
    }

    pub fn with_capacity(tool: G, capacity: usize) -> Self {
        Self {
            tool,
            queues: NodeQueues::new(capacity),
        }
    }
}

impl<G> GeneratorNode<G>
where
    G: Generate,
    G::Input: DeserializeOwned,
    G::Output: Serialize,
{
    /// Handle one delivery. Returns false when the node task should stop.
    async fn handle(&self, envelope: Envelope, shutdown: &CancellationToken) -> bool {
        let inputs: Vec<G::Input> = match envelope.decode() {
            Ok(inputs) => inputs,
            Err(e) => {
                let failure = NodeFailure::new(self.tool.name(), ChainError::Decode(e));
                return self.queues.fail(failure, shutdown).await;
            }
        };

        let mut items = self.tool.expand(inputs);

        // An empty expansion must still emit one terminal signal, or the
        // pending count for the triggering delivery would leak.
        let Some(first) = items.next() else {
            return self.queues.emit(Envelope::marker(self.tool.name()), shutdown).await;
        };

        let mut current = first;
        loop {
            let next = items.next();
            let out = match Envelope::encode(self.tool.name(), next.is_none(), &current) {
                Ok(out) => out,
                Err(e) => {
                    // Abort the rest of the sequence; the error settles the
                    // triggering delivery.
                    let failure = NodeFailure::new(self.tool.name(), ChainError::Encode(e));
                    return self.queues.fail(failure, shutdown).await;
                }
            };
            if !self.queues.emit(out, shutdown).await {
                return false;
            }
            match next {
                Some(item) => current = item,
                None => return true,
            }
        }
    }
}

#[async_trait]
impl<G> ChainNode for GeneratorNode<G>
where
    G: Generate,
    G::Input: DeserializeOwned + Send,
    G::Output: Serialize + Send,
{
    fn name(&self) -> &str {
        self.tool.name()
    }

    fn input(&self) -> mpsc::Sender<Envelope> {
        self.queues.input()
    }

    fn take_output(&self) -> Option<mpsc::Receiver<Envelope>> {
        self.queues.take_output()
    }

    fn take_errors(&self) -> Option<mpsc::Receiver<NodeFailure>> {
        self.queues.take_errors()
    }

    async fn run(&self, shutdown: CancellationToken) {
        let Some(mut input) = self.queues.take_input() else {
            tracing::warn!(node = self.tool.name(), "node task already started");
            return;
        };
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return,
                delivery = input.recv() => match delivery {
                    None => return,
                    Some(envelope) => {
                        if !self.handle(envelope, &shutdown).await {
                            return;
                        }
                    }
                },
            }
        }
    }
}
