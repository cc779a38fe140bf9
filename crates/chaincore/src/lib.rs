//! Core abstractions for the chain engine
//!
//! This crate provides the envelope protocol that carries opaque values
//! between nodes, the two node execution strategies (Transform and
//! Generator), and the run-event bus. The runtime that wires nodes
//! together lives in `chainruntime`.

mod envelope;
mod error;
pub mod events;
mod generator;
mod node;
mod transform;

pub use envelope::{Envelope, Payload, INPUT_SOURCE};
pub use error::{ChainError, CodecError, NodeFailure, ToolError};
pub use events::{EventBus, RunEmitter, RunEvent, RunId};
pub use generator::{Generate, GeneratorNode};
pub use node::{ChainNode, QUEUE_CAPACITY};
pub use transform::{Transform, TransformNode};
