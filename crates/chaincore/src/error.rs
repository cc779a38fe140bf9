use thiserror::Error;

/// Payload encode/decode failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CodecError {
    #[error("payload type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    #[error("payload is a completion marker and carries no value")]
    EmptyPayload,

    #[error("payload decoding failed: {0}")]
    Malformed(String),

    #[error("value encoding failed: {0}")]
    Unencodable(String),
}

/// Failure reported by a tool's own transformation logic
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{0}")]
pub struct ToolError(pub String);

impl ToolError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Everything that can go wrong while handling one delivery.
///
/// All three variants are fatal only to the delivery that caused them: the
/// node task continues with subsequent deliveries, and the run never aborts
/// on its own.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChainError {
    #[error("decode data error: {0}")]
    Decode(CodecError),

    #[error("encode data error: {0}")]
    Encode(CodecError),

    #[error("tool error: {0}")]
    Tool(#[from] ToolError),
}

/// An error tagged with the node it came from, as surfaced in the run report
#[derive(Error, Debug, Clone, PartialEq)]
#[error("node {node}: {error}")]
pub struct NodeFailure {
    pub node: String,
    pub error: ChainError,
}

impl NodeFailure {
    pub fn new(node: impl Into<String>, error: ChainError) -> Self {
        Self {
            node: node.into(),
            error,
        }
    }
}
