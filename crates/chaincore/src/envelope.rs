use crate::error::CodecError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Reserved producer name for the seed batch. Nodes subscribed to this
/// name receive the worker's initial input values.
pub const INPUT_SOURCE: &str = "input";

/// The unit of data flowing on every edge of the graph.
///
/// An envelope carries the name of the node that emitted it, a terminal
/// flag, and an opaque payload. `terminal` is true iff this is the last
/// envelope emitted in response to one particular triggering delivery:
/// always true for Transform outputs, true only for the final item of a
/// Generator's sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub producer: String,
    pub terminal: bool,
    payload: Payload,
}

/// Type-erased payload: either a completion marker with no value, or the
/// encoded bytes of a value tagged with the Rust type that produced them.
///
/// The tag lets `decode` fail with a clear diagnosis instead of relying on
/// caller discipline alone to supply the matching expected type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Payload {
    Empty,
    Typed { type_name: String, bytes: Vec<u8> },
}

impl Envelope {
    /// Encode a value into an envelope stamped with `producer`.
    pub fn encode<T: Serialize>(
        producer: impl Into<String>,
        terminal: bool,
        value: &T,
    ) -> Result<Self, CodecError> {
        let bytes =
            serde_json::to_vec(value).map_err(|e| CodecError::Unencodable(e.to_string()))?;
        Ok(Self {
            producer: producer.into(),
            terminal,
            payload: Payload::Typed {
                type_name: std::any::type_name::<T>().to_string(),
                bytes,
            },
        })
    }

    /// Build the terminal, payload-free envelope a Generator emits when its
    /// expansion produced no elements. Markers keep the completion count
    /// balanced; they are never delivered to subscribers.
    pub fn marker(producer: impl Into<String>) -> Self {
        Self {
            producer: producer.into(),
            terminal: true,
            payload: Payload::Empty,
        }
    }

    /// Recover the value with the exact type the receiver declares.
    ///
    /// A payload produced by a different type fails with
    /// [`CodecError::TypeMismatch`]; that is a wiring error in the
    /// subscription graph, not a runtime-recoverable condition.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, CodecError> {
        match &self.payload {
            Payload::Empty => Err(CodecError::EmptyPayload),
            Payload::Typed { type_name, bytes } => {
                let expected = std::any::type_name::<T>();
                if type_name != expected {
                    return Err(CodecError::TypeMismatch {
                        expected: expected.to_string(),
                        actual: type_name.clone(),
                    });
                }
                serde_json::from_slice(bytes).map_err(|e| CodecError::Malformed(e.to_string()))
            }
        }
    }

    /// True for marker envelopes, which carry no value.
    pub fn is_marker(&self) -> bool {
        matches!(self.payload, Payload::Empty)
    }
}
