use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

pub type RunId = Uuid;

/// Events emitted during a worker run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RunEvent {
    RunStarted {
        run_id: RunId,
        seeded: usize,
        timestamp: DateTime<Utc>,
    },
    RunFinished {
        run_id: RunId,
        cancelled: bool,
        results: usize,
        errors: usize,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    NodeStarted {
        run_id: RunId,
        node: String,
        timestamp: DateTime<Utc>,
    },
    Delivered {
        run_id: RunId,
        producer: String,
        consumer: String,
        terminal: bool,
        timestamp: DateTime<Utc>,
    },
    ResultCollected {
        run_id: RunId,
        producer: String,
        timestamp: DateTime<Utc>,
    },
    NodeFailed {
        run_id: RunId,
        node: String,
        error: String,
        timestamp: DateTime<Utc>,
    },
}

/// Broadcast bus for run events. Lossy by design: with no subscribers,
/// events are dropped.
pub struct EventBus {
    sender: broadcast::Sender<RunEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: RunEvent) {
        let _ = self.sender.send(event);
    }

    pub fn emitter(&self, run_id: RunId) -> RunEmitter {
        RunEmitter {
            run_id,
            sender: self.sender.clone(),
        }
    }
}

/// Run-scoped emitter handed to the runtime's tasks
#[derive(Clone)]
pub struct RunEmitter {
    run_id: RunId,
    sender: broadcast::Sender<RunEvent>,
}

impl RunEmitter {
    fn emit(&self, event: RunEvent) {
        let _ = self.sender.send(event);
    }

    pub fn run_started(&self, seeded: usize) {
        self.emit(RunEvent::RunStarted {
            run_id: self.run_id,
            seeded,
            timestamp: Utc::now(),
        });
    }

    pub fn run_finished(&self, cancelled: bool, results: usize, errors: usize, duration_ms: u64) {
        self.emit(RunEvent::RunFinished {
            run_id: self.run_id,
            cancelled,
            results,
            errors,
            duration_ms,
            timestamp: Utc::now(),
        });
    }

    pub fn node_started(&self, node: impl Into<String>) {
        self.emit(RunEvent::NodeStarted {
            run_id: self.run_id,
            node: node.into(),
            timestamp: Utc::now(),
        });
    }

    pub fn delivered(&self, producer: impl Into<String>, consumer: impl Into<String>, terminal: bool) {
        self.emit(RunEvent::Delivered {
            run_id: self.run_id,
            producer: producer.into(),
            consumer: consumer.into(),
            terminal,
            timestamp: Utc::now(),
        });
    }

    pub fn result_collected(&self, producer: impl Into<String>) {
        self.emit(RunEvent::ResultCollected {
            run_id: self.run_id,
            producer: producer.into(),
            timestamp: Utc::now(),
        });
    }

    pub fn node_failed(&self, node: impl Into<String>, error: impl std::fmt::Display) {
        self.emit(RunEvent::NodeFailed {
            run_id: self.run_id,
            node: node.into(),
            error: error.to_string(),
            timestamp: Utc::now(),
        });
    }
}
