use crate::envelope::Envelope;
use crate::error::{ChainError, NodeFailure, ToolError};
use crate::node::{ChainNode, NodeQueues, QUEUE_CAPACITY};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// One-to-one strategy: a concrete tool turning one input into one output.
///
/// The engine decodes each delivery as `Input`, calls `apply`, and emits the
/// result as a single terminal envelope. A failed `apply` produces no output
/// at all; the failure is routed to the error queue instead.
pub trait Transform: Send + Sync {
    type Input;
    type Output;

    /// Stable name, unique within one worker.
    fn name(&self) -> &str;

    fn apply(&self, input: Self::Input) -> Result<Self::Output, ToolError>;
}

/// Executing node wrapping a [`Transform`] tool.
pub struct TransformNode<T: Transform> {
    tool: T,
    queues: NodeQueues,
}

impl<T: Transform> TransformNode<T> {
    pub fn new(tool: T) -> Self {
        Self::with_capacity(tool, QUEUE_CAPACITY)
    }

    pub fn with_capacity(tool: T, capacity: usize) -> Self {
        Self {
            tool,
            queues: NodeQueues::new(capacity),
        }
    }
}

impl<T> TransformNode<T>
where
    T: Transform,
    T::Input: DeserializeOwned,
    T::Output: Serialize,
{
    /// Handle one delivery. Returns false when the node task should stop.
    async fn handle(&self, envelope: Envelope, shutdown: &CancellationToken) -> bool {
        let input: T::Input = match envelope.decode() {
            Ok(input) => input,
            Err(e) => {
                let failure = NodeFailure::new(self.tool.name(), ChainError::Decode(e));
                return self.queues.fail(failure, shutdown).await;
            }
        };

        let output = match self.tool.apply(input) {
            Ok(output) => output,
            Err(e) => {
                let failure = NodeFailure::new(self.tool.name(), ChainError::Tool(e));
                return self.queues.fail(failure, shutdown).await;
            }
        };

        let out = match Envelope::encode(self.tool.name(), true, &output) {
            Ok(out) => out,
            Err(e) => {
                let failure = NodeFailure::new(self.tool.name(), ChainError::Encode(e));
                return self.queues.fail(failure, shutdown).await;
            }
        };

        self.queues.emit(out, shutdown).await
    }
}

#[async_trait]
impl<T> ChainNode for TransformNode<T>
where
    T: Transform,
    T::Input: DeserializeOwned + Send,
    T::Output: Serialize + Send,
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
